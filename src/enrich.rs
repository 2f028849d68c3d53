//! Enrichment aggregator
//!
//! Runs the four enrichment steps for one request and persists the result as
//! `summary.json`. Each step absorbs its own failures; only a failure to
//! persist the result is surfaced to the caller.

use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use tracing::info;

use crate::attachment_text;
use crate::config::{EnricherConfig, ResourceConfig};
use crate::errors::AppResult;
use crate::keywords::extract_keywords;
use crate::mime::truncate_chars;
use crate::models::{AttachmentText, EmailDigest, NormalizedRecord, SummarizeRequest, SummaryResult, TextStatus};
use crate::resources::{VideoIndex, WebSearch};
use crate::store;

/// Body characters quoted in an email digest
const DIGEST_CHARS: usize = 200;
/// Priority reported for records that carry none
const DIGEST_PRIORITY: &str = "Normal";

pub struct Enricher {
    resources: ResourceConfig,
    summary_chars: usize,
    videos: VideoIndex,
    web: WebSearch,
}

impl Enricher {
    pub fn new(config: &EnricherConfig) -> Self {
        let client = Client::new();
        Self {
            resources: config.resources.clone(),
            summary_chars: config.summary_chars,
            videos: VideoIndex::new(client.clone(), config),
            web: WebSearch::new(client, config),
        }
    }

    pub fn resources(&self) -> &ResourceConfig {
        &self.resources
    }

    /// Enrich one request and persist the result
    ///
    /// # Errors
    ///
    /// Returns `Internal` only if `summary.json` cannot be written.
    pub async fn summarize(&self, request: SummarizeRequest) -> AppResult<SummaryResult> {
        let keywords = request_keywords(&request);
        let attachment_texts =
            attachment_text::resolve_all(&self.resources, &request.attachments).await;
        let summary = compose_summary(&keywords, &attachment_texts, self.summary_chars);

        let (youtube_videos, web_resources) = tokio::join!(
            self.videos.related_videos(&keywords),
            self.web.related_pages(&keywords)
        );

        let result = SummaryResult {
            summary,
            keywords,
            attachments: request.attachments,
            attachment_texts,
            youtube_videos,
            web_resources,
        };
        store::write_json(&self.resources.summary_path(), &result).await?;
        info!(
            record_id = request.id.as_deref().unwrap_or("-"),
            keywords = result.keywords.len(),
            attachments = result.attachments.len(),
            videos = result.youtube_videos.len(),
            pages = result.web_resources.len(),
            "enrichment complete"
        );
        Ok(result)
    }
}

/// Supplied keywords, or keywords derived from subject and body
fn request_keywords(request: &SummarizeRequest) -> Vec<String> {
    let supplied: Vec<String> = request
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect();
    if !supplied.is_empty() {
        return supplied;
    }

    let text = [request.subject.as_deref(), request.body.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n");
    extract_keywords(&text)
}

/// Keyword preamble plus the head of the extracted attachment text
///
/// Placeholders for missing or unreadable attachments never count as content.
pub fn compose_summary(keywords: &[String], texts: &[AttachmentText], max_chars: usize) -> String {
    let mut summary = format!("Summary based on keywords: {}.\n\n", keywords.join(", "));

    let combined = texts
        .iter()
        .filter(|t| t.status == TextStatus::Extracted && !t.text.is_empty())
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if combined.is_empty() {
        summary.push_str("No attachment content found.");
    } else {
        summary.push_str("Attachment Highlights:\n");
        summary.push_str(&truncate_chars(&combined, max_chars));
        summary.push_str("...");
    }
    summary
}

/// Short digest of a persisted record
///
/// The digest gets its own identifier and timestamp; a record without a
/// priority reports [`DIGEST_PRIORITY`].
pub fn digest_record(record: &NormalizedRecord) -> EmailDigest {
    EmailDigest {
        summary_id: uuid::Uuid::new_v4().to_string(),
        date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        email_subject: record.subject.clone(),
        from: record.from.clone(),
        to: record.to.clone(),
        summary_text: format!("{}...", truncate_chars(&record.body, DIGEST_CHARS)),
        attachment_files: record
            .attachments
            .iter()
            .map(|a| a.filename.clone())
            .collect(),
        priority: record
            .priority
            .clone()
            .unwrap_or_else(|| DIGEST_PRIORITY.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Enricher, compose_summary, digest_record, request_keywords};
    use crate::config::{EnricherConfig, ResourceConfig};
    use crate::models::{AttachmentText, NormalizedRecord, SummarizeRequest, SummaryResult, TextStatus};
    use crate::store;

    fn offline(root: &std::path::Path) -> Enricher {
        Enricher::new(&EnricherConfig::offline(ResourceConfig::new(root)))
    }

    fn text(status: TextStatus, text: &str) -> AttachmentText {
        AttachmentText {
            path: "misc/a.txt".to_owned(),
            status,
            text: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn empty_request_without_keys_yields_empty_resource_lists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let enricher = offline(dir.path());

        let result = enricher
            .summarize(SummarizeRequest::default())
            .await
            .expect("enrichment");
        assert!(result.summary.ends_with("No attachment content found."));
        assert!(result.youtube_videos.is_empty());
        assert!(result.web_resources.is_empty());

        let persisted: SummaryResult = store::read_json(&dir.path().join("summary.json"))
            .await
            .expect("summary.json");
        assert_eq!(persisted.summary, result.summary);
    }

    #[tokio::test]
    async fn missing_attachment_does_not_hide_the_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("misc")).expect("mkdir");
        std::fs::write(dir.path().join("misc/agenda.txt"), "Roadmap review").expect("write");
        let enricher = offline(dir.path());

        let request = SummarizeRequest {
            keywords: vec!["roadmap".to_owned()],
            attachments: vec!["pdf/later.pdf".to_owned(), "misc/agenda.txt".to_owned()],
            ..SummarizeRequest::default()
        };
        let result = enricher.summarize(request).await.expect("enrichment");

        assert_eq!(result.attachment_texts[0].status, TextStatus::Missing);
        assert_eq!(result.attachment_texts[1].text, "Roadmap review");
        assert_eq!(
            result.summary,
            "Summary based on keywords: roadmap.\n\nAttachment Highlights:\nRoadmap review..."
        );
    }

    #[test]
    fn placeholders_are_not_highlights() {
        let texts = vec![
            text(TextStatus::Missing, "[File not found: pdf/a.pdf]"),
            text(TextStatus::Failed, "[Extraction failed: pdf/b.pdf]"),
        ];
        let summary = compose_summary(&["budget".to_owned()], &texts, 700);
        assert_eq!(
            summary,
            "Summary based on keywords: budget.\n\nNo attachment content found."
        );
    }

    #[test]
    fn highlights_are_truncated() {
        let texts = vec![text(TextStatus::Extracted, "abcdefghij")];
        let summary = compose_summary(&[], &texts, 4);
        assert!(summary.ends_with("Attachment Highlights:\nabcd..."));
    }

    #[test]
    fn keywords_fall_back_to_subject_and_body() {
        let request = SummarizeRequest {
            subject: Some("Quarterly planning".to_owned()),
            body: Some("Please review the budget".to_owned()),
            ..SummarizeRequest::default()
        };
        assert_eq!(
            request_keywords(&request),
            vec!["Quarterly", "planning", "Please", "review", "budget"]
        );
    }

    #[test]
    fn digest_quotes_body_head() {
        let record: NormalizedRecord = serde_json::from_value(serde_json::json!({
            "id": "rec-9",
            "subject": "Standup",
            "body": "x".repeat(250),
        }))
        .expect("record");
        let digest = digest_record(&record);
        assert_ne!(digest.summary_id, "rec-9");
        assert!(uuid::Uuid::parse_str(&digest.summary_id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&digest.date).is_ok());
        assert_eq!(digest.summary_text.chars().count(), 203);
        assert_eq!(digest.priority, "Normal");
        assert!(digest.attachment_files.is_empty());
    }

    #[test]
    fn digest_lists_attachment_names_and_keeps_priority() {
        let record: NormalizedRecord = serde_json::from_value(serde_json::json!({
            "id": "rec-10",
            "priority": "High",
            "attachments": [{"filename": "agenda.pdf", "mime_type": "application/pdf",
                "size_bytes": 10, "category": "pdf", "relative_path": "pdf/agenda.pdf"}],
        }))
        .expect("record");
        let digest = digest_record(&record);
        assert_eq!(digest.attachment_files, vec!["agenda.pdf"]);
        assert_eq!(digest.priority, "High");
        assert_eq!(digest.summary_text, "...");
    }
}
