//! IMAP backend
//!
//! Provides timeout-bounded wrappers around `async-imap` operations and maps
//! them onto [`MailProvider`]. Message ids are UIDs in the configured mailbox;
//! fetched RFC822 sources are converted into the provider part tree with all
//! attachment bytes inline.

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::Fetch;
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::ImapConfig;
use crate::errors::{AppError, AppResult};
use crate::mime;
use crate::provider::{MailProvider, MailQuery, ProviderMessage};

/// Authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

fn socket_timeout(config: &ImapConfig) -> Duration {
    Duration::from_millis(config.socket_timeout_ms)
}

/// Connect to IMAP server and authenticate
///
/// Performs TCP connect, TLS handshake with webpki roots, greeting read and
/// LOGIN, each bounded by the configured timeouts.
///
/// # Errors
///
/// - `InvalidInput` if `secure` is false or hostname is invalid for TLS SNI
/// - `Timeout` if any connection phase times out
/// - `Unauthorized` if authentication fails
/// - `Internal` for TCP, TLS, or greeting failures
pub async fn connect_authenticated(config: &ImapConfig) -> AppResult<ImapSession> {
    if !config.secure {
        return Err(AppError::InvalidInput(
            "insecure IMAP is not supported; set MAIL_RELAY_IMAP_SECURE=true".to_owned(),
        ));
    }

    let connect_duration = Duration::from_millis(config.connect_timeout_ms);
    let greeting_duration = Duration::from_millis(config.greeting_timeout_ms);

    let tcp = timeout(
        connect_duration,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Internal(format!("tcp connect failed: {e}"))))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
    let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("TLS handshake failed: {e}"))))?;

    let mut client = Client::new(tls_stream);
    let greeting = timeout(greeting_duration, client.read_response())
        .await
        .map_err(|_| AppError::Timeout("IMAP greeting timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("IMAP greeting failed: {e}"))))?;

    if greeting.is_none() {
        return Err(AppError::Internal(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }

    let pass = config.pass.expose_secret();
    timeout(greeting_duration, client.login(config.user.as_str(), pass))
        .await
        .map_err(|_| AppError::Timeout("IMAP login timeout".to_owned()))
        .and_then(|r| {
            r.map_err(|(e, _)| {
                let msg = e.to_string();
                if msg.to_ascii_lowercase().contains("auth") || msg.contains("LOGIN") {
                    AppError::Unauthorized(msg)
                } else {
                    AppError::Internal(msg)
                }
            })
        })
}

/// Select mailbox in read-only mode
///
/// Uses `EXAMINE` so fetching does not mark messages as read.
pub async fn select_mailbox_readonly(
    config: &ImapConfig,
    session: &mut ImapSession,
    mailbox: &str,
) -> AppResult<()> {
    let encoded = utf7_imap::encode_utf7_imap(mailbox.to_owned());
    timeout(socket_timeout(config), session.examine(&encoded))
        .await
        .map_err(|_| AppError::Timeout(format!("EXAMINE timed out for mailbox '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::NotFound(format!("cannot examine mailbox '{mailbox}': {e}")))
        })?;
    Ok(())
}

/// Search for messages matching query
///
/// Returns matching UIDs in descending order (newest first).
pub async fn uid_search(
    config: &ImapConfig,
    session: &mut ImapSession,
    query: &str,
) -> AppResult<Vec<u32>> {
    let set = timeout(socket_timeout(config), session.uid_search(query))
        .await
        .map_err(|_| AppError::Timeout("UID SEARCH timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid search failed: {e}"))))?;
    let mut uids: Vec<u32> = set.into_iter().collect();
    uids.sort_unstable_by(|a, b| b.cmp(a));
    Ok(uids)
}

/// Fetch full RFC822 message source
///
/// Uses `BODY.PEEK[]` to leave the `\Seen` flag untouched.
pub async fn fetch_raw_message(
    config: &ImapConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<Vec<u8>> {
    let stream = timeout(
        socket_timeout(config),
        session.uid_fetch(uid.to_string(), "UID BODY.PEEK[]"),
    )
    .await
    .map_err(|_| AppError::Timeout("UID FETCH timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid fetch failed: {e}"))))?;
    let fetches: Vec<Fetch> = timeout(socket_timeout(config), stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID FETCH stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Internal(format!("uid fetch stream failed: {e}"))))?;

    let fetch = fetches
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("message uid {uid} not found")))?;
    let body = fetch
        .body()
        .ok_or_else(|| AppError::Internal("message has no RFC822 body".to_owned()))?;
    Ok(body.to_vec())
}

/// Build an IMAP SEARCH expression from provider-neutral criteria
pub fn build_search_query(query: &MailQuery) -> AppResult<String> {
    let mut parts = Vec::new();
    if let Some(v) = &query.from {
        parts.push(format!("FROM \"{}\"", escape_imap_quoted(v)?));
    }
    if let Some(v) = &query.to {
        parts.push(format!("TO \"{}\"", escape_imap_quoted(v)?));
    }
    if !query.subject_any.is_empty() {
        parts.push(subject_any(&query.subject_any)?);
    }

    if parts.is_empty() {
        Ok("ALL".to_owned())
    } else {
        Ok(parts.join(" "))
    }
}

/// Nest binary `OR` keys so any one subject term matches
fn subject_any(terms: &[String]) -> AppResult<String> {
    match terms {
        [] => Ok(String::new()),
        [only] => Ok(format!("SUBJECT \"{}\"", escape_imap_quoted(only)?)),
        [first, rest @ ..] => Ok(format!(
            "OR SUBJECT \"{}\" {}",
            escape_imap_quoted(first)?,
            subject_any(rest)?
        )),
    }
}

/// Escape backslashes and quotes for IMAP quoted strings
fn escape_imap_quoted(input: &str) -> AppResult<String> {
    if input.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(
            "search text must not contain control characters".to_owned(),
        ));
    }
    Ok(input.replace('\\', "\\\\").replace('"', "\\\""))
}

/// IMAP-backed provider
///
/// Opens a fresh session per call.
pub struct ImapProvider {
    config: ImapConfig,
}

impl ImapProvider {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    async fn session(&self) -> AppResult<ImapSession> {
        let mut session = connect_authenticated(&self.config).await?;
        select_mailbox_readonly(&self.config, &mut session, &self.config.mailbox).await?;
        Ok(session)
    }
}

impl MailProvider for ImapProvider {
    async fn list_message_ids(
        &self,
        query: &MailQuery,
        max_results: usize,
    ) -> AppResult<Vec<String>> {
        let search = build_search_query(query)?;
        debug!(query = %search, max_results, "imap uid search");
        let mut session = self.session().await?;
        let uids = uid_search(&self.config, &mut session, &search).await?;
        Ok(uids
            .into_iter()
            .take(max_results)
            .map(|uid| uid.to_string())
            .collect())
    }

    async fn get_message(&self, id: &str) -> AppResult<ProviderMessage> {
        let uid = id
            .parse::<u32>()
            .map_err(|_| AppError::InvalidInput(format!("invalid IMAP message id '{id}'")))?;
        let mut session = self.session().await?;
        let raw = fetch_raw_message(&self.config, &mut session, uid).await?;
        mime::parse_rfc822(id, &raw)
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<String> {
        Err(AppError::NotFound(format!(
            "attachment '{attachment_id}' of message {message_id}: IMAP attachments are always inline"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{build_search_query, escape_imap_quoted};
    use crate::provider::MailQuery;

    #[test]
    fn builds_sender_receiver_search() {
        let query = MailQuery {
            from: Some("a@x.com".to_owned()),
            to: Some("b@y.com".to_owned()),
            subject_any: Vec::new(),
        };
        assert_eq!(
            build_search_query(&query).expect("query"),
            "FROM \"a@x.com\" TO \"b@y.com\""
        );
    }

    #[test]
    fn nests_subject_alternatives() {
        let query = MailQuery {
            from: None,
            to: None,
            subject_any: vec!["meeting".to_owned(), "summary".to_owned(), "minutes".to_owned()],
        };
        assert_eq!(
            build_search_query(&query).expect("query"),
            "OR SUBJECT \"meeting\" OR SUBJECT \"summary\" SUBJECT \"minutes\""
        );
    }

    #[test]
    fn empty_query_matches_all() {
        assert_eq!(build_search_query(&MailQuery::default()).expect("query"), "ALL");
    }

    #[test]
    fn escape_rejects_linebreaks() {
        let err = escape_imap_quoted("a\nb").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
    }
}
