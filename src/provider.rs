//! Mail provider seam
//!
//! The extractor consumes a provider through three read-only calls: list
//! message ids by query, get a message by id, and get attachment bytes by id.
//! Messages are expressed as a MIME part tree whose leaves carry base64url
//! data, which is the Gmail wire shape; other backends map into it.

use std::future::Future;

use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::errors::AppResult;
use crate::gmail::GmailProvider;
use crate::imap::ImapProvider;

/// Message as returned by a provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// One node of the MIME part tree
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub part_id: String,
    #[serde(default)]
    pub mime_type: String,
    /// Empty for non-attachment parts
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Part body
///
/// Either `data` is inline or `attachment_id` names bytes fetched through
/// [`MailProvider::get_attachment`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    /// Declared size in bytes
    #[serde(default)]
    pub size: u64,
    /// base64url-encoded content
    #[serde(default)]
    pub data: Option<String>,
}

/// Provider-neutral search criteria
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Subject must contain at least one of these terms
    pub subject_any: Vec<String>,
}

impl MailQuery {
    /// Render as a Gmail search expression
    pub fn to_gmail_query(&self) -> String {
        let mut parts = Vec::new();
        if let Some(from) = &self.from {
            parts.push(format!("from:{from}"));
        }
        if let Some(to) = &self.to {
            parts.push(format!("to:{to}"));
        }
        match self.subject_any.as_slice() {
            [] => {}
            [one] => parts.push(format!("subject:{one}")),
            many => parts.push(format!("subject:({})", many.join(" OR "))),
        }
        parts.join(" ")
    }
}

/// Read-only mail provider
pub trait MailProvider: Send + Sync + 'static {
    /// Ids of messages matching `query`, newest first, at most `max_results`
    fn list_message_ids(
        &self,
        query: &MailQuery,
        max_results: usize,
    ) -> impl Future<Output = AppResult<Vec<String>>> + Send;

    /// Full message with its part tree
    fn get_message(&self, id: &str) -> impl Future<Output = AppResult<ProviderMessage>> + Send;

    /// base64url attachment data for a part whose bytes are not inline
    fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> impl Future<Output = AppResult<String>> + Send;
}

/// Backend selected by configuration
pub enum MailBackend {
    Gmail(GmailProvider),
    Imap(ImapProvider),
}

impl MailBackend {
    pub fn from_config(config: &ProviderConfig) -> Self {
        match config {
            ProviderConfig::Gmail(gmail) => Self::Gmail(GmailProvider::new(gmail)),
            ProviderConfig::Imap(imap) => Self::Imap(ImapProvider::new(imap.clone())),
        }
    }
}

impl MailProvider for MailBackend {
    async fn list_message_ids(
        &self,
        query: &MailQuery,
        max_results: usize,
    ) -> AppResult<Vec<String>> {
        match self {
            Self::Gmail(p) => p.list_message_ids(query, max_results).await,
            Self::Imap(p) => p.list_message_ids(query, max_results).await,
        }
    }

    async fn get_message(&self, id: &str) -> AppResult<ProviderMessage> {
        match self {
            Self::Gmail(p) => p.get_message(id).await,
            Self::Imap(p) => p.get_message(id).await,
        }
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<String> {
        match self {
            Self::Gmail(p) => p.get_attachment(message_id, attachment_id).await,
            Self::Imap(p) => p.get_attachment(message_id, attachment_id).await,
        }
    }
}
