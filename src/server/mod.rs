//! MCP tool servers for both pipeline stages
//!
//! Each stage is a separate `ServerHandler`; this module holds the response
//! envelope helpers and input validation they share.

mod enricher;
mod extractor;

use std::time::Instant;

use rmcp::Json;
use rmcp::model::ErrorData;

pub use enricher::EnricherServer;
pub use extractor::ExtractorServer;

use crate::errors::{AppError, AppResult};
use crate::models::{Meta, ToolEnvelope};

/// Maximum messages requested from the provider per tool call
const MAX_RESULTS: usize = 50;
/// Longest accepted address
const MAX_EMAIL_CHARS: usize = 254;

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate an address that ends up inside a provider search expression
fn validate_email(value: &str, field: &str) -> AppResult<()> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > MAX_EMAIL_CHARS {
        return Err(AppError::invalid(format!(
            "{field} must be 1..{MAX_EMAIL_CHARS} characters"
        )));
    }
    validate_no_controls(value, field)?;
    if value
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | '{' | '}'))
    {
        return Err(AppError::invalid(format!(
            "{field} must be a single address without spaces or grouping characters"
        )));
    }
    if !value.contains('@') {
        return Err(AppError::invalid(format!("{field} must contain '@'")));
    }
    Ok(())
}

/// Reject control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

fn validate_max_results(value: usize) -> AppResult<()> {
    if value == 0 || value > MAX_RESULTS {
        return Err(AppError::InvalidInput(format!(
            "max_results must be in range 1..{MAX_RESULTS}"
        )));
    }
    Ok(())
}

/// A bare file name directly under the resource root
fn validate_file_name(value: &str, field: &str) -> AppResult<()> {
    validate_no_controls(value, field)?;
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(AppError::InvalidInput(format!(
            "{field} must be a plain file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_email, validate_file_name, validate_max_results};

    #[test]
    fn accepts_bare_addresses() {
        validate_email("a@x.com", "sender_email").expect("valid address");
        validate_email(" first.last+tag@example.org ", "sender_email").expect("trimmed");
    }

    #[test]
    fn rejects_query_injection_in_addresses() {
        let err = validate_email("a@x.com OR subject:secret", "sender_email").expect_err("must fail");
        assert!(err.to_string().contains("single address"));
        let err = validate_email("a@x\r.com", "sender_email").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
        validate_email("nobody", "sender_email").expect_err("missing @");
    }

    #[test]
    fn max_results_bounds() {
        validate_max_results(1).expect("lower bound");
        validate_max_results(50).expect("upper bound");
        validate_max_results(0).expect_err("zero");
        validate_max_results(51).expect_err("too many");
    }

    #[test]
    fn data_file_must_stay_at_the_root() {
        validate_file_name("data.json", "data_file").expect("plain name");
        for bad in ["", "..", "../data.json", "pdf/a.json", "a\\b.json"] {
            validate_file_name(bad, "data_file").expect_err(bad);
        }
    }
}
