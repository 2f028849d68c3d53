//! Input/output DTOs and schema-bearing types
//!
//! Defines the records handed between the two stages and the data structures
//! used in MCP tool contracts. Types crossing a tool boundary are annotated
//! with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata included in all tool responses
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Attachment category, decided by MIME type
///
/// Doubles as the subdirectory name under the resource root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentCategory {
    Image,
    Pdf,
    Word,
    Misc,
}

impl AttachmentCategory {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Misc => "misc",
        }
    }
}

/// Attachment reference
///
/// The bytes behind `relative_path` are written by the detached capture task
/// and may not exist yet when this record is observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Attachment {
    /// Original filename from the MIME part
    pub filename: String,
    /// MIME content type (e.g., `application/pdf`, `image/jpeg`)
    pub mime_type: String,
    /// Size declared by the provider, in bytes
    pub size_bytes: u64,
    /// Category derived from `mime_type`
    pub category: AttachmentCategory,
    /// Path relative to the shared resource root
    pub relative_path: String,
}

/// Normalized message as fetched from the provider
#[derive(Debug, Clone)]
pub struct Message {
    /// Provider message identifier
    pub id: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub date: String,
    /// Plain-text body, empty when nothing decodable exists
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Record handed from the extractor to the enricher
///
/// Persisted as `data.json`. Carries attachment paths only, never bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRecord {
    /// Fresh record identifier (UUID v4)
    pub id: String,
    /// Provider message identifier
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub cc: String,
    #[serde(default = "default_reply_to")]
    pub reply_to: String,
    /// Always set by the extractor; older records may lack it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_body_type")]
    pub body_type: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl NormalizedRecord {
    /// Build a record from a normalized message under a fresh identifier
    pub fn from_message(message: Message) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message.id,
            date: message.date,
            subject: message.subject,
            from: message.from,
            to: message.to,
            cc: message.cc,
            reply_to: message.reply_to.unwrap_or_else(default_reply_to),
            priority: Some(default_priority()),
            body: message.body,
            body_type: default_body_type(),
            attachments: message.attachments,
        }
    }
}

/// Filtered view of a record sent over the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForwardPayload {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
    /// Root-relative attachment paths; always present, possibly empty
    pub attachments: Vec<String>,
}

impl From<&NormalizedRecord> for ForwardPayload {
    fn from(record: &NormalizedRecord) -> Self {
        Self {
            id: record.id.clone(),
            subject: record.subject.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            body: record.body.clone(),
            attachments: record
                .attachments
                .iter()
                .map(|a| a.relative_path.clone())
                .collect(),
        }
    }
}

/// Result of a forward attempt
///
/// Never raised as an error; the caller always gets one of these.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ForwardOutcome {
    /// Enricher answered 200
    Success {
        http_status: u16,
        /// Enricher response body
        result: serde_json::Value,
    },
    /// Non-200 answer or transport failure
    Error {
        /// Absent for transport failures
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
        error: String,
    },
}

impl ForwardOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One entry of `fetch_meeting_summaries`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MeetingSummary {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub body: String,
    pub keywords: Vec<String>,
}

/// Output of `get_email_details`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmailDetails {
    #[serde(flatten)]
    pub record: NormalizedRecord,
    /// Present when the record was forwarded in the same call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardOutcome>,
}

/// Enrichment request
///
/// Accepts the plain `{keywords, attachments}` shape as well as a forwarded
/// record; unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SummarizeRequest {
    /// Keywords; derived from subject and body when empty
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Root-relative attachment paths
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// How an attachment's text was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextStatus {
    Extracted,
    Missing,
    Unsupported,
    Failed,
    InvalidPath,
}

/// Text resolved for one attachment path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttachmentText {
    pub path: String,
    pub status: TextStatus,
    /// Extracted text, or a bracketed placeholder
    pub text: String,
}

/// Video index hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoResource {
    pub title: String,
    pub url: String,
    pub views: u64,
}

/// Web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebResource {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Enrichment result, persisted as `summary.json`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SummaryResult {
    pub summary: String,
    pub keywords: Vec<String>,
    pub attachments: Vec<String>,
    pub attachment_texts: Vec<AttachmentText>,
    pub youtube_videos: Vec<VideoResource>,
    pub web_resources: Vec<WebResource>,
}

/// Output of `receive_emails`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReceiveResult {
    pub status: String,
    pub message: String,
    pub summary_result: SummaryResult,
}

/// Output of `summarize_email`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmailDigest {
    pub summary_id: String,
    pub date: String,
    pub email_subject: String,
    pub from: String,
    pub to: String,
    pub summary_text: String,
    pub attachment_files: Vec<String>,
    pub priority: String,
}

/// Input: meeting summaries from one sender
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FetchMeetingSummariesInput {
    /// Sender address to filter on
    pub sender_email: String,
    /// Maximum messages to return (1..50, default 5)
    #[serde(default = "default_summary_limit")]
    pub max_results: usize,
}

/// Input: structured details of the latest message between two addresses
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetEmailDetailsInput {
    /// Sender address
    pub sender_email: String,
    /// Recipient address
    pub receiver_email: String,
    /// Messages requested from the provider (1..50, default 1); the first is used
    #[serde(default = "default_details_limit")]
    pub max_results: usize,
    /// Forward the record to the enricher after persisting it
    #[serde(default)]
    pub forward: bool,
}

/// Input: forward a record to the enricher
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendToEnricherInput {
    /// Record to forward; the persisted `data.json` is used when omitted
    #[serde(default)]
    pub record: Option<NormalizedRecord>,
}

/// Input: digest a persisted record
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SummarizeEmailInput {
    /// File name under the resource root (default `data.json`)
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

fn default_reply_to() -> String {
    "noreply@system.com".to_owned()
}

fn default_priority() -> String {
    "High".to_owned()
}

fn default_body_type() -> String {
    "text/plain".to_owned()
}

fn default_summary_limit() -> usize {
    5
}

fn default_details_limit() -> usize {
    1
}

fn default_data_file() -> String {
    crate::config::DATA_FILE.to_owned()
}
