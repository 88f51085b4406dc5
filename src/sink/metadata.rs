use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::PersistenceError;
use crate::event::CaptureEvent;

const SOI: [u8; 2] = [0xFF, 0xD8];
const COM: u8 = 0xFE;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const TAG: &[u8] = b"sentrycam:";
/// Segment length field counts itself
const MAX_PAYLOAD: usize = u16::MAX as usize - 2;

/// Insert the event as a JPEG comment segment directly after SOI
pub fn embed_event(jpeg: &[u8], event: &CaptureEvent) -> Result<Vec<u8>, PersistenceError> {
    if !jpeg.starts_with(&SOI) {
        return Err(PersistenceError::Metadata {
            details: "image data does not start with a JPEG SOI marker".to_string(),
        });
    }

    let json = event.to_json().map_err(|e| PersistenceError::Metadata {
        details: format!("Failed to serialize event: {}", e),
    })?;

    let payload_len = TAG.len() + json.len();
    if payload_len > MAX_PAYLOAD {
        return Err(PersistenceError::Metadata {
            details: format!(
                "event metadata is {} bytes, a comment segment holds at most {}",
                payload_len, MAX_PAYLOAD
            ),
        });
    }
    let segment_len = (payload_len + 2) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&SOI);
    out.extend_from_slice(&[0xFF, COM]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(TAG);
    out.extend_from_slice(json.as_bytes());
    out.extend_from_slice(&jpeg[2..]);
    Ok(out)
}

/// Find and parse an embedded event. `Ok(None)` when the image carries none.
pub fn extract_event(jpeg: &[u8]) -> Result<Option<CaptureEvent>, PersistenceError> {
    if !jpeg.starts_with(&SOI) {
        return Err(PersistenceError::Metadata {
            details: "image data does not start with a JPEG SOI marker".to_string(),
        });
    }

    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            break;
        }
        let marker = jpeg[pos + 1];
        if marker == SOS || marker == EOI {
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return Err(PersistenceError::Metadata {
                details: format!("truncated segment 0xFF{:02X} at offset {}", marker, pos),
            });
        }

        let payload = &jpeg[pos + 4..end];
        if marker == COM && payload.starts_with(TAG) {
            let json = std::str::from_utf8(&payload[TAG.len()..]).map_err(|e| {
                PersistenceError::Metadata {
                    details: format!("embedded metadata is not UTF-8: {}", e),
                }
            })?;
            let event = CaptureEvent::from_json(json).map_err(|e| PersistenceError::Metadata {
                details: format!("embedded metadata is not a capture event: {}", e),
            })?;
            return Ok(Some(event));
        }
        pos = end;
    }

    Ok(None)
}

/// Read a saved image and parse its embedded event
pub async fn read_embedded_event<P: AsRef<Path>>(
    path: P,
) -> Result<Option<CaptureEvent>, PersistenceError> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .await
        .map_err(|source| PersistenceError::Read {
            path: path.display().to_string(),
            source,
        })?;
    extract_event(&bytes)
}

/// Pretty JSON copy of the event next to the image
pub(crate) async fn write_sidecar(
    image_path: &Path,
    event: &CaptureEvent,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(event).map_err(|e| PersistenceError::Metadata {
        details: format!("Failed to serialize event: {}", e),
    })?;

    let sidecar = image_path.with_extension("json");
    fs::write(&sidecar, json)
        .await
        .map_err(|source| PersistenceError::Write {
            path: sidecar.display().to_string(),
            source,
        })?;

    debug!("Saved metadata sidecar to {}", sidecar.display());
    Ok(())
}
