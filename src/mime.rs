//! Message normalization and MIME handling
//!
//! Resolves the plain-text body of a provider message by depth-first search of
//! its part tree, decodes base64url content leniently, and converts raw RFC822
//! sources (IMAP) into the provider part tree with `mailparse`.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use mailparse::ParsedMail;
use tracing::warn;

use crate::attachments;
use crate::errors::{AppError, AppResult};
use crate::models::Message;
use crate::provider::{Header, MessagePart, PartBody, ProviderMessage};

/// base64url decoder that tolerates padding and trailing bits
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Width used when rendering HTML bodies to text
const HTML_RENDER_WIDTH: usize = 100;

/// Normalize a provider message
///
/// Never fails: missing headers become empty strings and undecodable content
/// becomes best-effort text.
pub fn normalize_message(msg: &ProviderMessage) -> Message {
    let payload = msg.payload.as_ref();
    let header = |name: &str| {
        payload
            .and_then(|p| p.header(name))
            .unwrap_or_default()
            .to_owned()
    };

    Message {
        id: msg.id.clone(),
        from: header("From"),
        to: header("To"),
        cc: header("Cc"),
        reply_to: payload.and_then(|p| p.header("Reply-To")).map(str::to_owned),
        subject: header("Subject"),
        date: header("Date"),
        body: extract_body(msg),
        attachments: payload
            .map(|p| {
                attachment_parts(p)
                    .into_iter()
                    .map(attachments::describe)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Resolve the plain-text body
///
/// Order: first `text/plain` leaf in depth-first order, then the top-level
/// body, then the first `text/html` leaf rendered to text. Returns an empty
/// string when nothing decodable exists.
pub fn extract_body(msg: &ProviderMessage) -> String {
    let Some(payload) = msg.payload.as_ref() else {
        return String::new();
    };

    if let Some(data) = find_leaf_data(&payload.parts, "text/plain") {
        return decode_text(data);
    }

    if let Some(data) = non_empty(payload.body.data.as_deref()) {
        let text = decode_text(data);
        return if payload.mime_type.eq_ignore_ascii_case("text/html") {
            html_to_text(&text)
        } else {
            text
        };
    }

    find_leaf_data(&payload.parts, "text/html")
        .map(|data| html_to_text(&decode_text(data)))
        .unwrap_or_default()
}

/// Depth-first search for the first inline leaf of `mime_type` carrying data
fn find_leaf_data<'a>(parts: &'a [MessagePart], mime_type: &str) -> Option<&'a str> {
    for part in parts {
        if part.mime_type.eq_ignore_ascii_case(mime_type)
            && part.filename.is_empty()
            && let Some(data) = non_empty(part.body.data.as_deref())
        {
            return Some(data);
        }
        if let Some(found) = find_leaf_data(&part.parts, mime_type) {
            return Some(found);
        }
    }
    None
}

fn non_empty(data: Option<&str>) -> Option<&str> {
    data.filter(|d| !d.trim().is_empty())
}

/// Every part in the tree that names a file, in depth-first order
pub fn attachment_parts(root: &MessagePart) -> Vec<&MessagePart> {
    fn walk<'a>(part: &'a MessagePart, out: &mut Vec<&'a MessagePart>) {
        if !part.filename.is_empty() {
            out.push(part);
        }
        for sub in &part.parts {
            walk(sub, out);
        }
    }

    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

/// Decode base64url content, salvaging what it can
///
/// Accepts the standard alphabet too, ignores padding, whitespace and stray
/// characters, and drops a dangling final symbol.
pub fn decode_base64url(data: &str) -> Vec<u8> {
    let cleaned: String = data
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect();

    match LENIENT_URL_SAFE.decode(&cleaned) {
        Ok(bytes) => bytes,
        Err(_) => {
            let usable = cleaned.len() - cleaned.len() % 4;
            LENIENT_URL_SAFE
                .decode(&cleaned[..usable])
                .unwrap_or_default()
        }
    }
}

/// Decode base64url content into text, replacing invalid UTF-8
pub fn decode_text(data: &str) -> String {
    String::from_utf8_lossy(&decode_base64url(data)).into_owned()
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH).unwrap_or_else(|_| html.to_owned())
}

/// Convert an RFC822 source into the provider message shape
///
/// Leaf bodies are transfer-decoded and re-encoded as base64url so the rest of
/// the pipeline sees one format regardless of backend.
///
/// # Errors
///
/// - `Internal` if `mailparse` cannot parse the message structure
pub fn parse_rfc822(id: &str, raw: &[u8]) -> AppResult<ProviderMessage> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| AppError::Internal(format!("failed to parse RFC822 message: {e}")))?;

    Ok(ProviderMessage {
        id: id.to_owned(),
        thread_id: None,
        payload: Some(convert_part(&parsed, String::new())),
    })
}

fn convert_part(part: &ParsedMail<'_>, part_id: String) -> MessagePart {
    let mime_type = part.ctype.mimetype.to_ascii_lowercase();
    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .cloned()
        .or_else(|| part.ctype.params.get("name").cloned())
        .unwrap_or_default();

    let body = if part.subparts.is_empty() {
        let bytes = if mime_type.starts_with("text/") && filename.is_empty() {
            part.get_body().map(String::into_bytes)
        } else {
            part.get_body_raw()
        };
        match bytes {
            Ok(bytes) => PartBody {
                attachment_id: None,
                size: bytes.len() as u64,
                data: Some(URL_SAFE_NO_PAD.encode(&bytes)),
            },
            Err(e) => {
                warn!(part_id = %part_id, error = %e, "undecodable MIME part body");
                PartBody::default()
            }
        }
    } else {
        PartBody::default()
    };

    let parts = part
        .subparts
        .iter()
        .enumerate()
        .map(|(idx, sub)| {
            let child_id = if part_id.is_empty() {
                idx.to_string()
            } else {
                format!("{part_id}.{idx}")
            };
            convert_part(sub, child_id)
        })
        .collect();

    MessagePart {
        part_id,
        mime_type,
        filename,
        headers: part
            .headers
            .iter()
            .map(|h| Header {
                name: h.get_key(),
                value: h.get_value(),
            })
            .collect(),
        body,
        parts,
    }
}

/// Truncate string to maximum characters (Unicode-aware)
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}
