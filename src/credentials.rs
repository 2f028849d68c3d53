//! Credential capability for the mail provider
//!
//! The extractor only ever asks for "a valid credential right now". Obtaining,
//! refreshing and persisting tokens belongs to an external auth flow that
//! writes the token file this module reads.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::SecretString;
use serde::Deserialize;

use crate::config::GmailConfig;
use crate::errors::{AppError, AppResult};

/// Supplies a valid bearer credential on demand
pub trait CredentialSource: Send + Sync {
    /// Return a usable access token
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` when no valid credential is available.
    fn access_token(&self) -> BoxFuture<'_, AppResult<SecretString>>;
}

/// Fixed token supplied through configuration
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

impl CredentialSource for StaticToken {
    fn access_token(&self) -> BoxFuture<'_, AppResult<SecretString>> {
        futures::future::ready(Ok(self.0.clone())).boxed()
    }
}

/// Token file maintained by an external auth flow
///
/// Re-read on every call so refreshed tokens are picked up without restart.
pub struct TokenFile {
    path: PathBuf,
}

#[derive(Deserialize)]
struct TokenFileContents {
    access_token: String,
    /// RFC 3339 expiry, if the auth flow records one
    #[serde(default)]
    expiry: Option<String>,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for TokenFile {
    fn access_token(&self) -> BoxFuture<'_, AppResult<SecretString>> {
        async move {
            let raw = tokio::fs::read_to_string(&self.path).await.map_err(|_| {
                AppError::Unauthorized(format!("token file missing: {}", self.path.display()))
            })?;
            parse_token(&raw)
        }
        .boxed()
    }
}

fn parse_token(raw: &str) -> AppResult<SecretString> {
    let contents: TokenFileContents = serde_json::from_str(raw)
        .map_err(|e| AppError::Unauthorized(format!("token file unreadable: {e}")))?;

    if contents.access_token.trim().is_empty() {
        return Err(AppError::Unauthorized("token file has no access_token".to_owned()));
    }
    if let Some(expiry) = contents.expiry.as_deref() {
        let expiry = DateTime::parse_from_rfc3339(expiry).map_err(|_| {
            AppError::Unauthorized(format!("token file has invalid expiry '{expiry}'"))
        })?;
        if expiry.with_timezone(&Utc) <= Utc::now() {
            return Err(AppError::Unauthorized("access token expired".to_owned()));
        }
    }

    Ok(SecretString::new(contents.access_token.into()))
}

/// Pick the credential source configured for the Gmail backend
pub fn from_config(config: &GmailConfig) -> Arc<dyn CredentialSource> {
    match &config.access_token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(TokenFile::new(config.token_file.clone())),
    }
}
