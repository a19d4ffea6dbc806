//! Inline photo/video attachments carried by queued hazard reports.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};

use super::BlobStore;
use crate::models::RequestId;
use crate::util::is_http_url;

/// Payload fields holding inline attachments, with the field that receives
/// the uploaded reference.
pub const ATTACHMENT_FIELDS: [(&str, &str); 2] = [("photo", "photo_url"), ("video", "video_url")];

/// A decoded inline attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAttachment {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl InlineAttachment {
    fn file_name(&self, field: &str) -> String {
        let extension = match self.content_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/heic" => "heic",
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/webm" => "webm",
            _ => "bin",
        };
        format!("{field}.{extension}")
    }
}

/// Decode raw base64 or a `data:<mime>;base64,` URL.
pub fn decode_inline_attachment(raw: &str, fallback_type: &str) -> Result<InlineAttachment, String> {
    let raw = raw.trim();
    let (content_type, encoded) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, encoded) = rest
                .split_once(',')
                .ok_or_else(|| "data URL is missing its payload".to_string())?;
            let mut parts = header.split(';');
            let mime = parts.next().unwrap_or_default().trim();
            if !parts.any(|part| part.trim().eq_ignore_ascii_case("base64")) {
                return Err("data URL is not base64 encoded".to_string());
            }
            let mime = if mime.is_empty() { fallback_type } else { mime };
            (mime.to_ascii_lowercase(), encoded)
        }
        None => (fallback_type.to_string(), raw),
    };

    let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|error| format!("invalid base64 payload: {error}"))?;

    Ok(InlineAttachment {
        content_type,
        bytes,
    })
}

/// Replace inline attachments in a report payload with uploaded references.
///
/// Attachments that cannot be decoded, exceed `max_bytes`, or fail to upload
/// are dropped from the payload. The report itself always proceeds.
pub async fn upload_inline_attachments(
    payload: &mut Value,
    request_id: &RequestId,
    blobs: Option<&dyn BlobStore>,
    max_bytes: usize,
) {
    let Some(fields) = payload.as_object_mut() else {
        return;
    };

    for (field, reference_field) in ATTACHMENT_FIELDS {
        let Some(raw) = fields.remove(field) else {
            continue;
        };
        if let Some(reference) =
            upload_one(field, &raw, request_id, blobs, max_bytes).await
        {
            insert_reference(fields, reference_field, reference);
        }
    }
}

async fn upload_one(
    field: &str,
    raw: &Value,
    request_id: &RequestId,
    blobs: Option<&dyn BlobStore>,
    max_bytes: usize,
) -> Option<String> {
    let raw = match raw {
        Value::String(raw) if !raw.trim().is_empty() => raw.trim(),
        Value::Null | Value::String(_) => return None,
        _ => {
            tracing::warn!("Omitting {field} from report {request_id}: not an inline string");
            return None;
        }
    };

    if is_http_url(raw) {
        return Some(raw.to_string());
    }

    let fallback_type = if field == "video" {
        "video/mp4"
    } else {
        "image/jpeg"
    };
    let attachment = match decode_inline_attachment(raw, fallback_type) {
        Ok(attachment) => attachment,
        Err(error) => {
            tracing::warn!("Omitting {field} from report {request_id}: {error}");
            return None;
        }
    };

    if attachment.bytes.len() > max_bytes {
        tracing::warn!(
            "Omitting {field} from report {request_id}: {} bytes exceeds the {max_bytes} byte limit",
            attachment.bytes.len()
        );
        return None;
    }

    let Some(blobs) = blobs else {
        tracing::warn!("Omitting {field} from report {request_id}: no blob storage configured");
        return None;
    };

    let file_name = attachment.file_name(field);
    let size = attachment.bytes.len();
    match blobs
        .upload(
            &format!("reports/{request_id}"),
            &file_name,
            &attachment.content_type,
            attachment.bytes,
        )
        .await
    {
        Ok(reference) => {
            tracing::debug!("Uploaded {size} byte {field} for report {request_id}");
            Some(reference)
        }
        Err(error) => {
            tracing::warn!("Omitting {field} from report {request_id}: upload failed: {error}");
            None
        }
    }
}

fn insert_reference(fields: &mut Map<String, Value>, reference_field: &str, reference: String) {
    fields.insert(reference_field.to_string(), Value::String(reference));
}
