use chrono_tz::Tz;
use tracing::warn;

use crate::event::CaptureEvent;

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

fn sanitize_node(node: &str) -> String {
    let cleaned: String = node
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "node".to_string()
    } else {
        cleaned
    }
}

/// `{node}-{YYYY-MM-DD_HH-MM-SS.mmm}-c{camera}-{O|n}-{P|n}.jpg`
///
/// The timestamp is always UTC so names never repeat or run backwards across
/// a daylight-saving change; zero-padded fields keep names from one node and
/// camera in time order.
pub fn capture_filename(event: &CaptureEvent) -> String {
    format!(
        "{}-{}-c{}-{}-{}.jpg",
        sanitize_node(event.node_identity()),
        event.capture_time().format("%Y-%m-%d_%H-%M-%S%.3f"),
        event.camera_index(),
        if event.object_detected() { "O" } else { "n" },
        if event.presence() { "P" } else { "n" },
    )
}
