//! Attachment classification and capture
//!
//! Attachments are described synchronously from the part tree, then their
//! bytes are persisted by a detached task under
//! `<resource root>/<category>/<filename>`. The record that references those
//! paths is returned and may be forwarded before the task finishes, so readers
//! of the resource root must treat a missing file as "not yet captured".

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ResourceConfig;
use crate::errors::{AppError, AppResult};
use crate::mime::decode_base64url;
use crate::models::{Attachment, AttachmentCategory};
use crate::provider::{MailProvider, MessagePart};

/// Longest filename kept on disk, in characters
const MAX_FILENAME_CHARS: usize = 150;

const WORD_MIME_TYPES: [&str; 2] = [
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Map a MIME type onto its storage category
///
/// Anything that is not an image, a PDF or a Word document lands in `misc`.
pub fn categorize(mime_type: &str) -> AttachmentCategory {
    let mime = mime_type.trim().to_ascii_lowercase();
    if mime.starts_with("image/") {
        AttachmentCategory::Image
    } else if mime == "application/pdf" {
        AttachmentCategory::Pdf
    } else if WORD_MIME_TYPES.contains(&mime.as_str()) {
        AttachmentCategory::Word
    } else {
        AttachmentCategory::Misc
    }
}

/// Reduce an attachment filename to a single safe path component
pub fn safe_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '@' | ' ' | '(' | ')' | '+') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();
    let trimmed = sanitized.trim();

    if trimmed.chars().all(|c| c == '.') {
        "attachment".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Describe an attachment part without touching its bytes
pub fn describe(part: &MessagePart) -> Attachment {
    let mime_type = if part.mime_type.is_empty() {
        "application/octet-stream".to_owned()
    } else {
        part.mime_type.clone()
    };
    let category = categorize(&mime_type);
    Attachment {
        relative_path: format!("{}/{}", category.dir_name(), safe_filename(&part.filename)),
        filename: part.filename.clone(),
        mime_type,
        size_bytes: part.body.size,
        category,
    }
}

/// Outcome of one capture run, reported through logs
#[derive(Debug, Default)]
pub struct CaptureReport {
    /// Root-relative paths written
    pub saved: Vec<String>,
    /// Root-relative paths skipped or failed, with the reason
    pub failed: Vec<(String, String)>,
}

/// Start the detached capture task
///
/// The returned handle may be dropped; the task keeps running and reports
/// only through logs and the files it writes.
pub fn spawn_capture<P: MailProvider>(
    provider: Arc<P>,
    resources: ResourceConfig,
    message_id: String,
    parts: Vec<MessagePart>,
) -> JoinHandle<CaptureReport> {
    tokio::spawn(async move {
        let report = capture_attachments(provider.as_ref(), &resources, &message_id, &parts).await;
        info!(
            message_id = %message_id,
            saved = report.saved.len(),
            failed = report.failed.len(),
            "attachment capture finished"
        );
        report
    })
}

/// Persist every attachment part, continuing past individual failures
pub async fn capture_attachments<P: MailProvider>(
    provider: &P,
    resources: &ResourceConfig,
    message_id: &str,
    parts: &[MessagePart],
) -> CaptureReport {
    let mut report = CaptureReport::default();
    for part in parts.iter().filter(|p| !p.filename.is_empty()) {
        let relative = describe(part).relative_path;
        match save_attachment(provider, resources, message_id, part, &relative).await {
            Ok(()) => {
                debug!(path = %relative, part_id = %part.part_id, "attachment saved");
                report.saved.push(relative);
            }
            Err(e) => {
                warn!(path = %relative, error = %e, "attachment not captured");
                report.failed.push((relative, e.to_string()));
            }
        }
    }
    report
}

async fn save_attachment<P: MailProvider>(
    provider: &P,
    resources: &ResourceConfig,
    message_id: &str,
    part: &MessagePart,
    relative: &str,
) -> AppResult<()> {
    let data = match (part.body.data.as_deref(), part.body.attachment_id.as_deref()) {
        (Some(data), _) if !data.is_empty() => data.to_owned(),
        (_, Some(attachment_id)) => provider.get_attachment(message_id, attachment_id).await?,
        _ => {
            return Err(AppError::NotFound(format!(
                "attachment '{}' has neither inline data nor an attachment id",
                part.filename
            )));
        }
    };

    let path = resources
        .resolve(relative)
        .ok_or_else(|| AppError::Internal(format!("unsafe attachment path '{relative}'")))?;
    write_atomically(&path, &decode_base64url(&data)).await
}

/// Write through a sibling temp file so readers never see a partial file
async fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Internal(format!("no parent for {}", path.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| AppError::Internal(format!("cannot create {}: {e}", parent.display())))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.part"));
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| AppError::Internal(format!("cannot write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Internal(format!("cannot move into {}: {e}", path.display())))
}
