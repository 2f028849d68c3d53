//! Enricher MCP server

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tracing::info;

use super::{finalize_tool, validate_file_name};
use crate::config::EnricherConfig;
use crate::enrich::{Enricher, digest_record};
use crate::errors::AppResult;
use crate::models::{
    EmailDigest, NormalizedRecord, ReceiveResult, SummarizeEmailInput, SummarizeRequest,
    SummaryResult, ToolEnvelope,
};
use crate::store;

/// Enricher stage MCP server
#[derive(Clone)]
pub struct EnricherServer {
    enricher: Arc<Enricher>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl EnricherServer {
    pub fn new(config: &EnricherConfig) -> Self {
        Self {
            enricher: Arc::new(Enricher::new(config)),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: Enrich keywords and attachments
    ///
    /// Accepts `{keywords, attachments}` or a forwarded record; keywords are
    /// derived from subject and body when none are given. The result is also
    /// written to `summary.json`.
    #[tool(
        name = "summarize_context",
        description = "Summarize attachments and find related videos and web pages"
    )]
    async fn summarize_context(
        &self,
        Parameters(input): Parameters<SummarizeRequest>,
    ) -> Result<Json<ToolEnvelope<SummaryResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.enricher
                .summarize(input)
                .await
                .map(|data| ("Enrichment complete".to_owned(), data)),
        )
    }

    /// Tool: Receive a forwarded record and enrich it
    #[tool(
        name = "receive_emails",
        description = "Receive a forwarded email record and summarize it"
    )]
    async fn receive_emails(
        &self,
        Parameters(input): Parameters<SummarizeRequest>,
    ) -> Result<Json<ToolEnvelope<ReceiveResult>>, ErrorData> {
        let started = Instant::now();
        info!(
            record_id = input.id.as_deref().unwrap_or("-"),
            attachments = input.attachments.len(),
            "received record from extractor"
        );
        finalize_tool(
            started,
            self.enricher.summarize(input).await.map(|summary_result| {
                (
                    "Record received and summarized".to_owned(),
                    ReceiveResult {
                        status: "success".to_owned(),
                        message: "Data received from the extractor and summarized successfully."
                            .to_owned(),
                        summary_result,
                    },
                )
            }),
        )
    }

    /// Tool: Digest a persisted record
    #[tool(
        name = "summarize_email",
        description = "Summarize a saved email record (default: data.json)"
    )]
    async fn summarize_email(
        &self,
        Parameters(input): Parameters<SummarizeEmailInput>,
    ) -> Result<Json<ToolEnvelope<EmailDigest>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.summarize_email_impl(input)
                .await
                .map(|data| (format!("Digest of '{}'", data.email_subject), data)),
        )
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for EnricherServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(
                "Mail enricher. Extracts attachment text, composes a summary and looks up related videos and web pages; results are saved to summary.json.",
            )
    }
}

impl EnricherServer {
    async fn summarize_email_impl(&self, input: SummarizeEmailInput) -> AppResult<EmailDigest> {
        validate_file_name(&input.data_file, "data_file")?;
        let path = self.enricher.resources().root.join(&input.data_file);
        let record: NormalizedRecord = store::read_json(&path).await?;
        Ok(digest_record(&record))
    }
}
