//! Attachment text resolution
//!
//! Turns root-relative attachment paths into text. Every path yields an entry:
//! files that are absent (possibly still being captured), unsupported or
//! unreadable get a bracketed placeholder instead of failing the batch.

use std::path::{Path, PathBuf};

use docx_rs::{DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRowChild};
use tracing::{info, warn};

use crate::config::ResourceConfig;
use crate::models::{AttachmentText, TextStatus};

/// Document kinds with a text extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

fn document_kind(path: &str) -> Option<DocumentKind> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;
    match ext.as_str() {
        "pdf" => Some(DocumentKind::Pdf),
        "docx" => Some(DocumentKind::Docx),
        "txt" | "md" | "csv" => Some(DocumentKind::PlainText),
        _ => None,
    }
}

/// Resolve text for each path, in order
pub async fn resolve_all(resources: &ResourceConfig, paths: &[String]) -> Vec<AttachmentText> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        out.push(resolve(resources, path).await);
    }
    out
}

/// Resolve text for a single root-relative path
pub async fn resolve(resources: &ResourceConfig, path: &str) -> AttachmentText {
    let entry = |status, text: String| AttachmentText {
        path: path.to_owned(),
        status,
        text,
    };

    let Some(full_path) = resources.resolve(path) else {
        warn!(path, "attachment path outside the resource root");
        return entry(
            TextStatus::InvalidPath,
            format!("[Invalid attachment path: {path}]"),
        );
    };

    if !tokio::fs::try_exists(&full_path).await.unwrap_or(false) {
        info!(path, "attachment not on disk (yet)");
        return entry(TextStatus::Missing, format!("[File not found: {path}]"));
    }

    let Some(kind) = document_kind(path) else {
        return entry(
            TextStatus::Unsupported,
            format!("[Unsupported document: {path}]"),
        );
    };

    match extract(kind, full_path).await {
        Ok(text) => entry(TextStatus::Extracted, text.trim().to_owned()),
        Err(e) => {
            warn!(path, error = %e, "attachment text extraction failed");
            entry(TextStatus::Failed, format!("[Extraction failed: {path}]"))
        }
    }
}

/// Run the synchronous extractor on the blocking pool
///
/// Panics inside the parsers surface as a join error.
async fn extract(kind: DocumentKind, path: PathBuf) -> Result<String, String> {
    tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => pdf_extract::extract_text(&path).map_err(|e| e.to_string()),
        DocumentKind::Docx => {
            let bytes = std::fs::read(&path).map_err(|e| e.to_string())?;
            docx_text(&bytes)
        }
        DocumentKind::PlainText => std::fs::read(&path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| e.to_string()),
    })
    .await
    .map_err(|e| format!("extractor task failed: {e}"))?
}

/// Paragraph and table text of a DOCX document, one paragraph per line
fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| format!("failed to parse DOCX: {e}"))?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
            DocumentChild::Table(t) => {
                for row in &t.rows {
                    let TableChild::TableRow(r) = row;
                    let cells = r
                        .cells
                        .iter()
                        .map(|cell| {
                            let TableRowChild::TableCell(c) = cell;
                            c.children
                                .iter()
                                .filter_map(|content| match content {
                                    TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                                    _ => None,
                                })
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect::<Vec<_>>();
                    lines.push(cells.join(" | "));
                }
            }
            _ => {}
        }
    }

    Ok(lines
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        match child {
            ParagraphChild::Run(r) => push_run(&mut text, r),
            ParagraphChild::Hyperlink(h) => {
                for inner in &h.children {
                    if let ParagraphChild::Run(r) = inner {
                        push_run(&mut text, r);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_run(text: &mut String, run: &docx_rs::Run) {
    for child in &run.children {
        match child {
            RunChild::Text(t) => text.push_str(&t.text),
            RunChild::Tab(_) => text.push('\t'),
            RunChild::Break(_) => text.push('\n'),
            _ => {}
        }
    }
}
