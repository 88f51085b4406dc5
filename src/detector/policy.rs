use std::collections::HashSet;

use crate::config::DetectorConfig;
use crate::event::Detection;

/// Drops detections under the confidence threshold or with an ignored label
#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    confidence_threshold: f32,
    ignored_labels: HashSet<String>,
}

impl DetectionPolicy {
    pub fn new<I, S>(confidence_threshold: f32, ignored_labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            confidence_threshold,
            ignored_labels: ignored_labels
                .into_iter()
                .map(|l| l.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.confidence_threshold, &config.ignored_labels)
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence >= self.confidence_threshold
            && !self
                .ignored_labels
                .contains(&detection.label.to_lowercase())
    }

    /// Filter in place, keeping the original order
    pub fn apply(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.retain(|d| self.accepts(d));
        detections
    }
}
