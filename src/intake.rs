//! HTTP intake adapter for the enricher
//!
//! Exposes `POST /tools/summarize_context` so the extractor can hand records
//! over plain HTTP, plus `GET /health`. Enrichment runs on its own task so a
//! slow aggregation never stalls other requests.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::bridge::INTAKE_ROUTE;
use crate::config::EnricherConfig;
use crate::enrich::Enricher;
use crate::errors::{AppError, AppResult};
use crate::models::{SummarizeRequest, SummaryResult};

/// Error body shared by every failing intake response
#[derive(Debug)]
struct IntakeError {
    status: StatusCode,
    text: String,
}

impl IntakeError {
    fn new(status: StatusCode, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "error",
            "code": self.status.as_u16(),
            "text": self.text,
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct IntakeReply {
    status: &'static str,
    result: SummaryResult,
}

/// Build the intake router around a shared aggregator
pub fn router(enricher: Arc<Enricher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(INTAKE_ROUTE, post(summarize_context))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(log_request))
        .with_state(enricher)
}

/// Serve the intake router until Ctrl-C
pub async fn serve(config: &EnricherConfig) -> AppResult<()> {
    let enricher = Arc::new(Enricher::new(config));
    let listener = TcpListener::bind(config.bridge_addr)
        .await
        .map_err(|e| AppError::Internal(format!("cannot bind {}: {e}", config.bridge_addr)))?;
    info!(addr = %config.bridge_addr, route = INTAKE_ROUTE, "intake adapter listening");

    axum::serve(listener, router(enricher))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("intake adapter shutting down");
        })
        .await
        .map_err(|e| AppError::Internal(format!("intake adapter failed: {e}")))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn summarize_context(
    State(enricher): State<Arc<Enricher>>,
    body: Bytes,
) -> Result<Json<IntakeReply>, IntakeError> {
    let request = parse_request(&body)
        .map_err(|e| IntakeError::new(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")))?;
    info!(
        attachments = request.attachments.len(),
        keywords = request.keywords.len(),
        "enrichment request received"
    );

    let task = tokio::spawn(async move { enricher.summarize(request).await });
    match task.await {
        Ok(Ok(result)) => Ok(Json(IntakeReply {
            status: "success",
            result,
        })),
        Ok(Err(e)) => {
            error!(error = %e, "enrichment failed");
            Err(IntakeError::new(e.status_code(), e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "enrichment task aborted");
            Err(IntakeError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("enrichment task failed: {e}"),
            ))
        }
    }
}

/// An empty body is an empty request
fn parse_request(body: &[u8]) -> Result<SummarizeRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SummarizeRequest::default());
    }
    serde_json::from_slice(body)
}
