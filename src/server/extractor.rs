//! Extractor MCP server

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};

use super::{finalize_tool, validate_email, validate_max_results};
use crate::bridge::EnricherClient;
use crate::config::ExtractorConfig;
use crate::errors::AppResult;
use crate::extract::Extractor;
use crate::models::{
    EmailDetails, FetchMeetingSummariesInput, ForwardOutcome, GetEmailDetailsInput,
    MeetingSummary, SendToEnricherInput, ToolEnvelope,
};
use crate::provider::MailBackend;

/// Extractor stage MCP server
///
/// Fetches, normalizes and persists messages; can hand records to the
/// enricher over HTTP.
#[derive(Clone)]
pub struct ExtractorServer {
    extractor: Arc<Extractor<MailBackend>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ExtractorServer {
    pub fn new(config: ExtractorConfig) -> Self {
        let extractor = Extractor::new(
            Arc::new(MailBackend::from_config(&config.provider)),
            config.resources,
            EnricherClient::new(&config.enricher_url),
        );
        Self {
            extractor: Arc::new(extractor),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: Meeting-like messages from one sender
    ///
    /// Subject must mention a meeting, summary, discussion or minutes. Each
    /// entry carries keywords drawn from its body.
    #[tool(
        name = "fetch_meeting_summaries",
        description = "Fetch meeting summary emails from a sender"
    )]
    async fn fetch_meeting_summaries(
        &self,
        Parameters(input): Parameters<FetchMeetingSummariesInput>,
    ) -> Result<Json<ToolEnvelope<Vec<MeetingSummary>>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.fetch_meeting_summaries_impl(input)
                .await
                .map(|data| (format!("{} meeting summary message(s)", data.len()), data)),
        )
    }

    /// Tool: Structured details of the latest message between two addresses
    ///
    /// Persists the record as `data.json` and starts attachment capture in
    /// the background; optionally forwards the record to the enricher.
    #[tool(
        name = "get_email_details",
        description = "Get structured details of the latest email between two addresses"
    )]
    async fn get_email_details(
        &self,
        Parameters(input): Parameters<GetEmailDetailsInput>,
    ) -> Result<Json<ToolEnvelope<EmailDetails>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.get_email_details_impl(input).await.map(|data| {
                let summary = match &data.forward {
                    Some(outcome) if outcome.is_success() => "Record saved and forwarded",
                    Some(_) => "Record saved; forwarding failed",
                    None => "Record saved",
                };
                (summary.to_owned(), data)
            }),
        )
    }

    /// Tool: Forward a record to the enricher
    #[tool(
        name = "send_to_enricher",
        description = "Forward an email record (default: saved data.json) to the enricher"
    )]
    async fn send_to_enricher(
        &self,
        Parameters(input): Parameters<SendToEnricherInput>,
    ) -> Result<Json<ToolEnvelope<ForwardOutcome>>, ErrorData> {
        let started = Instant::now();
        let outcome = self.extractor.send_to_enricher(input.record).await;
        let summary = if outcome.is_success() {
            "Record forwarded"
        } else {
            "Forwarding failed"
        };
        finalize_tool(started, Ok((summary.to_owned(), outcome)))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ExtractorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(
                "Mail extractor. Fetches messages read-only, saves data.json and attachments under the resource root, and can forward records to the enricher.",
            )
    }
}

impl ExtractorServer {
    async fn fetch_meeting_summaries_impl(
        &self,
        input: FetchMeetingSummariesInput,
    ) -> AppResult<Vec<MeetingSummary>> {
        validate_email(&input.sender_email, "sender_email")?;
        validate_max_results(input.max_results)?;
        self.extractor
            .meeting_summaries(input.sender_email.trim(), input.max_results)
            .await
    }

    async fn get_email_details_impl(&self, input: GetEmailDetailsInput) -> AppResult<EmailDetails> {
        validate_email(&input.sender_email, "sender_email")?;
        validate_email(&input.receiver_email, "receiver_email")?;
        validate_max_results(input.max_results)?;
        self.extractor
            .email_details(
                input.sender_email.trim(),
                input.receiver_email.trim(),
                input.max_results,
                input.forward,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use rmcp::handler::server::wrapper::Parameters;

    use super::ExtractorServer;
    use crate::config::{ExtractorConfig, GmailConfig, ProviderConfig, ResourceConfig};
    use crate::models::{FetchMeetingSummariesInput, SendToEnricherInput};

    fn server(root: &std::path::Path) -> ExtractorServer {
        ExtractorServer::new(ExtractorConfig {
            resources: ResourceConfig::new(root),
            provider: ProviderConfig::Gmail(GmailConfig {
                api_base: "http://127.0.0.1:9".to_owned(),
                access_token: None,
                token_file: root.join("token.json"),
            }),
            enricher_url: "http://127.0.0.1:9".to_owned(),
        })
    }

    #[test]
    fn router_lists_extractor_tools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut names: Vec<String> = server(dir.path())
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["fetch_meeting_summaries", "get_email_details", "send_to_enricher"]
        );
    }

    #[tokio::test]
    async fn missing_token_surfaces_as_unauthorized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = server(dir.path())
            .fetch_meeting_summaries(Parameters(FetchMeetingSummariesInput {
                sender_email: "a@x.com".to_owned(),
                max_results: 5,
            }))
            .await
            .err()
            .expect("must fail");
        assert_eq!(
            err.data.as_ref().and_then(|d| d["code"].as_str()),
            Some("unauthorized")
        );
    }

    #[tokio::test]
    async fn invalid_sender_is_rejected_before_the_provider() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = server(dir.path())
            .fetch_meeting_summaries(Parameters(FetchMeetingSummariesInput {
                sender_email: "a@x.com OR subject:secret".to_owned(),
                max_results: 5,
            }))
            .await
            .err()
            .expect("must fail");
        assert_eq!(
            err.data.as_ref().and_then(|d| d["code"].as_str()),
            Some("invalid_input")
        );
    }

    #[tokio::test]
    async fn send_without_saved_record_reports_error_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let envelope = server(dir.path())
            .send_to_enricher(Parameters(SendToEnricherInput { record: None }))
            .await
            .expect("envelope")
            .0;
        assert_eq!(envelope.summary, "Forwarding failed");
        let json = serde_json::to_value(&envelope.data).expect("serialize");
        assert_eq!(json["status"], "error");
    }
}
