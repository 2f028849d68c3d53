//! Extractor stage
//!
//! Fetches messages through a [`MailProvider`], normalizes them, starts the
//! detached attachment capture, persists `data.json` and forwards records to
//! the enricher.

use std::sync::Arc;

use tracing::{info, warn};

use crate::attachments::spawn_capture;
use crate::bridge::EnricherClient;
use crate::config::ResourceConfig;
use crate::errors::{AppError, AppResult};
use crate::keywords::extract_keywords;
use crate::mime::{attachment_parts, normalize_message};
use crate::models::{EmailDetails, ForwardOutcome, MeetingSummary, NormalizedRecord};
use crate::provider::{MailProvider, MailQuery, MessagePart};
use crate::store;

/// Subject terms that mark a meeting summary
const MEETING_SUBJECT_TERMS: [&str; 4] = ["meeting", "summary", "discussion", "minutes"];

pub struct Extractor<P> {
    provider: Arc<P>,
    resources: ResourceConfig,
    enricher: EnricherClient,
}

impl<P: MailProvider> Extractor<P> {
    pub fn new(provider: Arc<P>, resources: ResourceConfig, enricher: EnricherClient) -> Self {
        Self {
            provider,
            resources,
            enricher,
        }
    }

    /// Meeting-like messages from one sender, with body keywords
    ///
    /// No match is an empty list. A message that disappears between listing
    /// and fetching is skipped.
    pub async fn meeting_summaries(
        &self,
        sender: &str,
        max_results: usize,
    ) -> AppResult<Vec<MeetingSummary>> {
        let query = MailQuery {
            from: Some(sender.to_owned()),
            to: None,
            subject_any: MEETING_SUBJECT_TERMS.iter().map(|t| (*t).to_owned()).collect(),
        };
        let ids = self.provider.list_message_ids(&query, max_results).await?;
        if ids.is_empty() {
            info!(query = %query.to_gmail_query(), "no meeting summary messages found");
            return Ok(Vec::new());
        }

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let raw = match self.provider.get_message(&id).await {
                Ok(raw) => raw,
                Err(AppError::NotFound(msg)) => {
                    warn!(message_id = %id, reason = %msg, "listed message vanished");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let message = normalize_message(&raw);
            summaries.push(MeetingSummary {
                keywords: extract_keywords(&message.body),
                id: message.id,
                subject: message.subject,
                from: message.from,
                date: message.date,
                body: message.body,
            });
        }
        info!(count = summaries.len(), "meeting summaries retrieved");
        Ok(summaries)
    }

    /// Normalize the latest message between two addresses and persist it
    ///
    /// Attachment bytes are written by a detached task; the returned record
    /// may reference files that do not exist yet.
    ///
    /// # Errors
    ///
    /// `NotFound` when no message matches, or any provider / persistence error.
    pub async fn email_details(
        &self,
        sender: &str,
        receiver: &str,
        max_results: usize,
        forward: bool,
    ) -> AppResult<EmailDetails> {
        let query = MailQuery {
            from: Some(sender.to_owned()),
            to: Some(receiver.to_owned()),
            subject_any: Vec::new(),
        };
        let ids = self.provider.list_message_ids(&query, max_results).await?;
        let Some(id) = ids.first() else {
            return Err(AppError::NotFound(format!(
                "no messages found from {sender} to {receiver}"
            )));
        };

        let raw = self.provider.get_message(id).await?;
        let parts: Vec<MessagePart> = raw
            .payload
            .as_ref()
            .map(|p| attachment_parts(p).into_iter().cloned().collect())
            .unwrap_or_default();
        if !parts.is_empty() {
            // detached; nothing waits on the handle
            drop(spawn_capture(
                Arc::clone(&self.provider),
                self.resources.clone(),
                raw.id.clone(),
                parts,
            ));
        }

        let record = NormalizedRecord::from_message(normalize_message(&raw));
        store::write_json(&self.resources.data_path(), &record).await?;
        info!(
            record_id = %record.id,
            message_id = %record.message_id,
            thread_id = raw.thread_id.as_deref().unwrap_or("-"),
            attachments = record.attachments.len(),
            "record saved to data.json"
        );

        let forward = if forward {
            Some(self.enricher.forward(&record).await)
        } else {
            None
        };
        Ok(EmailDetails { record, forward })
    }

    /// Forward `record`, or the persisted `data.json` when none is given
    ///
    /// Failures, including an unreadable `data.json`, come back as an error
    /// outcome rather than an `Err`.
    pub async fn send_to_enricher(&self, record: Option<NormalizedRecord>) -> ForwardOutcome {
        let record = match record {
            Some(record) => record,
            None => match store::read_json(&self.resources.data_path()).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "no record to forward");
                    return ForwardOutcome::Error {
                        http_status: None,
                        error: e.to_string(),
                    };
                }
            },
        };
        self.enricher.forward(&record).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::Extractor;
    use crate::bridge::{EnricherClient, INTAKE_ROUTE};
    use crate::config::ResourceConfig;
    use crate::errors::{AppError, AppResult};
    use crate::models::{ForwardOutcome, NormalizedRecord};
    use crate::provider::{MailProvider, MailQuery, ProviderMessage};
    use crate::store;
    use crate::test_support::{dead_base_url, spawn_router};

    /// In-memory mailbox; every query matches every message
    struct FakeMailbox {
        messages: Vec<ProviderMessage>,
    }

    impl MailProvider for FakeMailbox {
        async fn list_message_ids(&self, _: &MailQuery, max_results: usize) -> AppResult<Vec<String>> {
            Ok(self
                .messages
                .iter()
                .take(max_results)
                .map(|m| m.id.clone())
                .collect())
        }

        async fn get_message(&self, id: &str) -> AppResult<ProviderMessage> {
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(id.to_owned()))
        }

        async fn get_attachment(&self, _: &str, attachment_id: &str) -> AppResult<String> {
            Err(AppError::NotFound(attachment_id.to_owned()))
        }
    }

    /// Mailbox whose attachment downloads never complete
    struct StalledMailbox(FakeMailbox);

    impl MailProvider for StalledMailbox {
        async fn list_message_ids(&self, query: &MailQuery, max_results: usize) -> AppResult<Vec<String>> {
            self.0.list_message_ids(query, max_results).await
        }

        async fn get_message(&self, id: &str) -> AppResult<ProviderMessage> {
            self.0.get_message(id).await
        }

        async fn get_attachment(&self, _: &str, _: &str) -> AppResult<String> {
            std::future::pending().await
        }
    }

    /// "Agenda: serverless budget review" / "%PDF-1.4"
    fn meeting_message(id: &str) -> ProviderMessage {
        serde_json::from_value(json!({
            "id": id,
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "From", "value": "a@x.com"},
                    {"name": "To", "value": "b@y.com"},
                    {"name": "Subject", "value": "Weekly meeting"},
                    {"name": "Date", "value": "Wed, 1 Jan 2025 09:00:00 +0000"}
                ],
                "parts": [
                    {"mimeType": "text/plain", "body": {"size": 32,
                        "data": "QWdlbmRhOiBzZXJ2ZXJsZXNzIGJ1ZGdldCByZXZpZXc"}},
                    {"mimeType": "application/pdf", "filename": "agenda.pdf",
                     "body": {"size": 8, "data": "JVBERi0xLjQ"}}
                ]
            }
        }))
        .expect("message")
    }

    fn extractor(
        root: &std::path::Path,
        messages: Vec<ProviderMessage>,
        enricher_url: &str,
    ) -> Extractor<FakeMailbox> {
        Extractor::new(
            Arc::new(FakeMailbox { messages }),
            ResourceConfig::new(root),
            EnricherClient::new(enricher_url),
        )
    }

    async fn wait_for(path: &std::path::Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn no_meeting_messages_is_an_empty_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(dir.path(), Vec::new(), "http://127.0.0.1:9");
        let summaries = extractor
            .meeting_summaries("a@x.com", 5)
            .await
            .expect("summaries");
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn meeting_summaries_carry_body_keywords() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(
            dir.path(),
            vec![meeting_message("m1"), meeting_message("m2")],
            "http://127.0.0.1:9",
        );
        let summaries = extractor
            .meeting_summaries("a@x.com", 1)
            .await
            .expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].subject, "Weekly meeting");
        assert_eq!(summaries[0].keywords, vec!["Agenda", "serverless", "budget", "review"]);
    }

    #[tokio::test]
    async fn email_details_persists_record_and_captures_attachment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(dir.path(), vec![meeting_message("m1")], "http://127.0.0.1:9");

        let details = extractor
            .email_details("a@x.com", "b@y.com", 1, false)
            .await
            .expect("details");
        assert!(details.forward.is_none());
        assert_eq!(details.record.message_id, "m1");
        assert_eq!(details.record.reply_to, "noreply@system.com");
        assert_eq!(details.record.attachments[0].relative_path, "pdf/agenda.pdf");

        let saved: NormalizedRecord = store::read_json(&dir.path().join("data.json"))
            .await
            .expect("data.json");
        assert_eq!(saved, details.record);

        let attachment = dir.path().join("pdf/agenda.pdf");
        assert!(wait_for(&attachment).await, "capture task never wrote the file");
        assert_eq!(std::fs::read(attachment).expect("read"), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn no_matching_message_names_both_addresses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(dir.path(), Vec::new(), "http://127.0.0.1:9");
        let err = extractor
            .email_details("a@x.com", "b@y.com", 1, false)
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.to_string().contains("a@x.com"));
        assert!(err.to_string().contains("b@y.com"));
    }

    #[tokio::test]
    async fn forward_embeds_enricher_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = Router::new().route(
            INTAKE_ROUTE,
            post(|Json(body): Json<Value>| async move {
                Json(json!({"status": "success", "result": {"echo": body["attachments"]}}))
            }),
        );
        let base = spawn_router(router).await;
        let extractor = extractor(dir.path(), vec![meeting_message("m1")], &base);

        let details = extractor
            .email_details("a@x.com", "b@y.com", 1, true)
            .await
            .expect("details");
        match details.forward {
            Some(ForwardOutcome::Success { result, .. }) => {
                assert_eq!(result["echo"], json!(["pdf/agenda.pdf"]));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_without_record_or_data_file_is_an_error_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(dir.path(), Vec::new(), &dead_base_url().await);
        let outcome = extractor.send_to_enricher(None).await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn unreachable_enricher_is_an_error_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(dir.path(), vec![meeting_message("m1")], &dead_base_url().await);
        let details = extractor
            .email_details("a@x.com", "b@y.com", 1, true)
            .await
            .expect("details survive a failed forward");
        match details.forward {
            Some(ForwardOutcome::Error { http_status, .. }) => assert_eq!(http_status, None),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn email_details_returns_before_capture_completes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let message: ProviderMessage = serde_json::from_value(json!({
            "id": "m7",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [{"name": "Subject", "value": "Board pack"}],
                "parts": [
                    {"mimeType": "text/plain", "body": {"size": 32,
                        "data": "QWdlbmRhOiBzZXJ2ZXJsZXNzIGJ1ZGdldCByZXZpZXc"}},
                    {"mimeType": "application/pdf", "filename": "big.pdf",
                     "body": {"size": 4096, "attachmentId": "big-1"}}
                ]
            }
        }))
        .expect("message");
        let extractor = Extractor::new(
            Arc::new(StalledMailbox(FakeMailbox {
                messages: vec![message],
            })),
            ResourceConfig::new(dir.path()),
            EnricherClient::new("http://127.0.0.1:9"),
        );

        let details = tokio::time::timeout(
            Duration::from_secs(2),
            extractor.email_details("a@x.com", "b@y.com", 1, false),
        )
        .await
        .expect("email_details must not wait for attachment bytes")
        .expect("details");

        assert_eq!(details.record.attachments[0].relative_path, "pdf/big.pdf");
        assert!(dir.path().join("data.json").exists());
        assert!(!dir.path().join("pdf/big.pdf").exists());
    }
}
