//! Forwarding bridge from extractor to enricher
//!
//! One plain POST per record to the enricher's intake route. No retry: the
//! outcome, good or bad, is handed back to the caller as a [`ForwardOutcome`].

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

use crate::mime::truncate_chars;
use crate::models::{ForwardOutcome, ForwardPayload, NormalizedRecord};

/// Route served by the enricher's intake adapter
pub const INTAKE_ROUTE: &str = "/tools/summarize_context";

/// Error text kept from a failed response body
const ERROR_BODY_CHARS: usize = 500;

/// HTTP client for the enricher intake route
#[derive(Clone)]
pub struct EnricherClient {
    client: Client,
    endpoint: String,
}

impl EnricherClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}{INTAKE_ROUTE}", base_url.trim_end_matches('/')),
        }
    }

    /// Forward the filtered view of `record`
    pub async fn forward(&self, record: &NormalizedRecord) -> ForwardOutcome {
        self.forward_payload(&ForwardPayload::from(record)).await
    }

    /// Post a payload and fold every outcome into a [`ForwardOutcome`]
    pub async fn forward_payload(&self, payload: &ForwardPayload) -> ForwardOutcome {
        info!(
            endpoint = %self.endpoint,
            record_id = %payload.id,
            attachments = payload.attachments.len(),
            "forwarding record to enricher"
        );

        let response = match self.client.post(&self.endpoint).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "enricher unreachable");
                return ForwardOutcome::Error {
                    http_status: None,
                    error: format!("transport failure: {e}"),
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return ForwardOutcome::Error {
                    http_status: Some(status.as_u16()),
                    error: format!("failed reading enricher response: {e}"),
                };
            }
        };

        if status != StatusCode::OK {
            warn!(endpoint = %self.endpoint, status = %status, "enricher rejected record");
            return ForwardOutcome::Error {
                http_status: Some(status.as_u16()),
                error: format!(
                    "enricher returned {status}: {}",
                    truncate_chars(&body, ERROR_BODY_CHARS)
                ),
            };
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(mut envelope) => {
                let result = match envelope.get_mut("result") {
                    Some(result) => result.take(),
                    None => envelope,
                };
                ForwardOutcome::Success {
                    http_status: status.as_u16(),
                    result,
                }
            }
            Err(e) => ForwardOutcome::Error {
                http_status: Some(status.as_u16()),
                error: format!("invalid enricher response: {e}"),
            },
        }
    }
}
