//! mail-relay-mcp: two-stage mail pipeline served over MCP
//!
//! The extractor fetches a message through a mail provider (Gmail REST or
//! IMAP), normalizes it, captures its attachments in the background and saves
//! the record as `data.json`. The enricher turns a record into a summary with
//! attachment text and related videos and web pages, saved as `summary.json`.
//! The two stages share only a resource directory and one HTTP route.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and subcommand dispatch
//! - [`config`]: Environment-driven configuration for both stages
//! - [`errors`]: Application error model with MCP and HTTP error mapping
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`credentials`]: Access token supply for the Gmail backend
//! - [`provider`]: Mail provider seam and backend selection
//! - [`gmail`]: Gmail REST backend
//! - [`imap`]: IMAP backend with timeout-wrapped session operations
//! - [`mime`]: Body resolution, base64url decoding and RFC822 conversion
//! - [`attachments`]: Attachment classification and detached capture
//! - [`keywords`]: Keyword derivation
//! - [`store`]: `data.json` / `summary.json` persistence
//! - [`extract`]: Extractor stage orchestration
//! - [`bridge`]: HTTP client for the enricher intake route
//! - [`attachment_text`]: Attachment text extraction
//! - [`resources`]: Video index and web search clients
//! - [`enrich`]: Enrichment aggregator
//! - [`intake`]: HTTP intake adapter
//! - [`server`]: MCP tool servers for both stages

mod attachment_text;
mod attachments;
mod bridge;
mod config;
mod credentials;
mod enrich;
mod errors;
mod extract;
mod gmail;
mod imap;
mod intake;
mod keywords;
mod mime;
mod models;
mod provider;
mod resources;
mod server;
mod store;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use config::{EnricherConfig, ExtractorConfig};
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mail-relay-mcp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the extractor tools over MCP stdio
    Extractor,
    /// Serve the enricher tools over MCP stdio
    Enricher,
    /// Serve the enricher's HTTP intake route
    Bridge,
}

/// Application entry point
///
/// Initializes tracing from environment, loads the configuration of the
/// selected stage and serves it. MCP stages expect to be spawned by an MCP
/// client via `stdio` transport; logs go to stderr.
///
/// # Environment Variables
///
/// See [`ExtractorConfig::load_from_env`] and [`EnricherConfig::load_from_env`].
///
/// # Example
///
/// ```no_run
/// MAIL_RELAY_RESOURCE_DIR=./resources \
/// MAIL_RELAY_GMAIL_TOKEN_FILE=./secrets/token.json \
/// cargo run -- extractor
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extractor => {
            let config = ExtractorConfig::load_from_env()?;
            info!(root = %config.resources.root.display(), "starting extractor");
            let service = server::ExtractorServer::new(config).serve(stdio()).await?;
            service.waiting().await?;
        }
        Command::Enricher => {
            let config = EnricherConfig::load_from_env()?;
            info!(root = %config.resources.root.display(), "starting enricher");
            let service = server::EnricherServer::new(&config).serve(stdio()).await?;
            service.waiting().await?;
        }
        Command::Bridge => {
            let config = EnricherConfig::load_from_env()?;
            intake::serve(&config).await?;
        }
    }
    Ok(())
}
