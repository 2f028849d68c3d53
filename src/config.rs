//! Configuration for both pipeline stages
//!
//! All configuration is loaded from environment variables prefixed with
//! `MAIL_RELAY_` into explicit structs. Each component receives the struct it
//! needs at construction; nothing reads the environment after startup.

use std::env;
use std::env::VarError;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

/// Name of the normalized record written by the extractor
pub const DATA_FILE: &str = "data.json";
/// Name of the enrichment result written by the enricher
pub const SUMMARY_FILE: &str = "summary.json";

/// Shared resource root
///
/// Holds the four attachment category folders plus the two well-known output
/// files. Both stages must point at the same directory.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Root directory
    pub root: PathBuf,
}

impl ResourceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn from_env() -> AppResult<Self> {
        Ok(Self::new(string_env("MAIL_RELAY_RESOURCE_DIR", "./resources")?))
    }

    /// Path of `data.json`
    pub fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    /// Path of `summary.json`
    pub fn summary_path(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    /// Resolve a root-relative path
    ///
    /// Returns `None` for absolute paths and paths that climb out of the root.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if relative.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(rel))
    }
}

/// Gmail REST backend settings
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// API base URL (overridable for tests and proxies)
    pub api_base: String,
    /// Static access token, takes precedence over the token file
    pub access_token: Option<SecretString>,
    /// JSON token file written by an external auth flow
    pub token_file: PathBuf,
}

/// IMAP backend settings
#[derive(Debug, Clone)]
pub struct ImapConfig {
    /// IMAP server hostname
    pub host: String,
    /// IMAP server port (typically 993 for TLS)
    pub port: u16,
    /// Whether to use TLS (insecure connections are rejected)
    pub secure: bool,
    /// Username for authentication
    pub user: String,
    /// Password stored in a type that prevents accidental logging
    pub pass: SecretString,
    /// Mailbox searched for messages
    pub mailbox: String,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// IMAP greeting/TLS handshake timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Socket I/O timeout in milliseconds
    pub socket_timeout_ms: u64,
}

/// Which mail backend the extractor talks to
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Gmail(GmailConfig),
    Imap(ImapConfig),
}

/// Extractor stage configuration
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub resources: ResourceConfig,
    pub provider: ProviderConfig,
    /// Base URL of the enricher's HTTP intake adapter
    pub enricher_url: String,
}

impl ExtractorConfig {
    /// Load extractor configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is malformed or if the IMAP backend
    /// is selected without host, user and password.
    pub fn load_from_env() -> AppResult<Self> {
        let provider = match string_env("MAIL_RELAY_PROVIDER", "gmail")?
            .to_ascii_lowercase()
            .as_str()
        {
            "gmail" => ProviderConfig::Gmail(GmailConfig {
                api_base: string_env("MAIL_RELAY_GMAIL_API_BASE", "https://gmail.googleapis.com")?,
                access_token: optional_env("MAIL_RELAY_GMAIL_ACCESS_TOKEN")?
                    .map(|t| SecretString::new(t.into())),
                token_file: PathBuf::from(string_env(
                    "MAIL_RELAY_GMAIL_TOKEN_FILE",
                    "./secrets/token.json",
                )?),
            }),
            "imap" => ProviderConfig::Imap(ImapConfig {
                host: required_env("MAIL_RELAY_IMAP_HOST")?,
                port: parse_u16_env("MAIL_RELAY_IMAP_PORT", 993)?,
                secure: parse_bool_env("MAIL_RELAY_IMAP_SECURE", true)?,
                user: required_env("MAIL_RELAY_IMAP_USER")?,
                pass: SecretString::new(required_env("MAIL_RELAY_IMAP_PASS")?.into()),
                mailbox: string_env("MAIL_RELAY_IMAP_MAILBOX", "INBOX")?,
                connect_timeout_ms: parse_u64_env("MAIL_RELAY_CONNECT_TIMEOUT_MS", 30_000)?,
                greeting_timeout_ms: parse_u64_env("MAIL_RELAY_GREETING_TIMEOUT_MS", 15_000)?,
                socket_timeout_ms: parse_u64_env("MAIL_RELAY_SOCKET_TIMEOUT_MS", 300_000)?,
            }),
            other => {
                return Err(AppError::InvalidInput(format!(
                    "unknown MAIL_RELAY_PROVIDER '{other}', expected gmail or imap"
                )));
            }
        };

        Ok(Self {
            resources: ResourceConfig::from_env()?,
            provider,
            enricher_url: string_env("MAIL_RELAY_ENRICHER_URL", "http://127.0.0.1:6278")?,
        })
    }
}

/// Enricher stage configuration
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub resources: ResourceConfig,
    /// Video index key; `None` disables the video step
    pub youtube_api_key: Option<SecretString>,
    /// Web search key; `None` disables the web step
    pub search_api_key: Option<SecretString>,
    /// Custom search engine id; `None` disables the web step
    pub google_cx: Option<String>,
    pub youtube_api_base: String,
    pub search_api_base: String,
    /// Maximum entries per resource list
    pub result_limit: usize,
    /// Attachment characters quoted in the summary text
    pub summary_chars: usize,
    /// Listen address of the HTTP intake adapter
    pub bridge_addr: SocketAddr,
}

/// Optional key file contents
#[derive(Debug, Default, Deserialize)]
struct KeyFile {
    #[serde(rename = "YOUTUBE_API_KEY", default)]
    youtube_api_key: Option<String>,
    #[serde(rename = "GOOGLE_CX", default)]
    google_cx: Option<String>,
}

impl EnricherConfig {
    /// Configuration with every optional enrichment disabled
    #[cfg(test)]
    pub fn offline(resources: ResourceConfig) -> Self {
        Self {
            resources,
            youtube_api_key: None,
            search_api_key: None,
            google_cx: None,
            youtube_api_base: "https://www.googleapis.com/youtube/v3".to_owned(),
            search_api_base: "https://www.googleapis.com/customsearch/v1".to_owned(),
            result_limit: 5,
            summary_chars: 700,
            bridge_addr: SocketAddr::from(([127, 0, 0, 1], 6278)),
        }
    }

    /// Load enricher configuration from environment variables
    ///
    /// API keys come from the environment first, then from the JSON key file
    /// named by `MAIL_RELAY_KEY_FILE`. A missing or unreadable key file only
    /// disables the optional enrichment steps.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is malformed.
    pub fn load_from_env() -> AppResult<Self> {
        let key_file_path = string_env("MAIL_RELAY_KEY_FILE", "./secrets/enricher.json")?;
        let key_file = read_key_file(Path::new(&key_file_path));

        let youtube_api_key = optional_env("MAIL_RELAY_YOUTUBE_API_KEY")?
            .or(key_file.youtube_api_key)
            .filter(|k| !k.trim().is_empty());
        let search_api_key = optional_env("MAIL_RELAY_SEARCH_API_KEY")?
            .or_else(|| youtube_api_key.clone());
        let google_cx = optional_env("MAIL_RELAY_GOOGLE_CX")?
            .or(key_file.google_cx)
            .filter(|k| !k.trim().is_empty());

        if youtube_api_key.is_none() {
            info!("no video index key configured; video enrichment disabled");
        }
        if google_cx.is_none() || search_api_key.is_none() {
            info!("no web search credentials configured; web enrichment disabled");
        }

        let bridge_addr = string_env("MAIL_RELAY_BRIDGE_ADDR", "127.0.0.1:6278")?;
        let bridge_addr = bridge_addr.parse::<SocketAddr>().map_err(|_| {
            AppError::InvalidInput(format!("invalid MAIL_RELAY_BRIDGE_ADDR: '{bridge_addr}'"))
        })?;

        Ok(Self {
            resources: ResourceConfig::from_env()?,
            youtube_api_key: youtube_api_key.map(|k| SecretString::new(k.into())),
            search_api_key: search_api_key.map(|k| SecretString::new(k.into())),
            google_cx,
            youtube_api_base: string_env(
                "MAIL_RELAY_YOUTUBE_API_BASE",
                "https://www.googleapis.com/youtube/v3",
            )?,
            search_api_base: string_env(
                "MAIL_RELAY_SEARCH_API_BASE",
                "https://www.googleapis.com/customsearch/v1",
            )?,
            result_limit: parse_usize_env("MAIL_RELAY_RESULT_LIMIT", 5)?,
            summary_chars: parse_usize_env("MAIL_RELAY_SUMMARY_CHARS", 700)?,
            bridge_addr,
        })
    }
}

fn read_key_file(path: &Path) -> KeyFile {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "key file not readable; continuing without external keys");
            return KeyFile::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "key file is not valid JSON; continuing without external keys");
        KeyFile::default()
    })
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable; empty counts as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn string_env(key: &str, default: &str) -> AppResult<String> {
    Ok(optional_env(key)?.unwrap_or_else(|| default.to_owned()))
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match optional_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<u16>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u16 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<usize>().map_err(|_| {
            AppError::InvalidInput(format!("invalid usize environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}
