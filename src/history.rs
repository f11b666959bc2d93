//! Session history of completed analyses.
//!
//! Entries hold the normalized detections verbatim so a past analysis can be
//! reloaded into the viewer or exported without re-running the model. The
//! log is bounded; storage itself is the shell's concern, reached through
//! the KV capability as an opaque snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ModelVersion;
use crate::detection::Detection;
use crate::{AnalysisId, AppError, ErrorKind, UnixTimeMs, MAX_HISTORY_ENTRIES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: AnalysisId,
    pub captured_at: UnixTimeMs,
    pub file_name: String,
    pub model_version: ModelVersion,
    /// Count of everything the detector reported, before any threshold is
    /// applied.
    pub total_count: usize,
    pub detections: Vec<Detection>,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        model_version: ModelVersion,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            id: AnalysisId::generate(),
            captured_at: UnixTimeMs::now(),
            file_name: file_name.into(),
            model_version,
            total_count: detections.len(),
            detections,
        }
    }

    #[must_use]
    pub fn summary_text(&self) -> String {
        format!("Detected {} objects", self.total_count)
    }
}

#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("failed to serialize history snapshot: {0}")]
    Serialize(String),
    #[error("failed to read history snapshot: {0}")]
    Deserialize(String),
    #[error("history snapshot schema {found} is not supported (current: {current})")]
    UnsupportedSchema { found: u32, current: u32 },
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        let kind = match &e {
            HistoryError::Serialize(_) => ErrorKind::Serialization,
            HistoryError::Deserialize(_) | HistoryError::UnsupportedSchema { .. } => {
                ErrorKind::Deserialization
            }
        };
        AppError::new(kind, e.to_string())
    }
}

/// Newest-first, capacity-bounded log of analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    schema_version: u32,
}

impl HistoryLog {
    pub const CURRENT_SCHEMA_VERSION: u32 = 1;

    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            schema_version: Self::CURRENT_SCHEMA_VERSION,
        }
    }

    /// Prepends an entry, evicting the oldest once the cap is reached.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
    }

    #[must_use]
    pub fn get(&self, id: &AnalysisId) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serializes the log for the KV store.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Serialize`] when encoding fails.
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>, HistoryError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| HistoryError::Serialize(e.to_string()))?;
        Ok(bytes)
    }

    /// Restores a log from KV bytes, refusing snapshots written by a newer
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when decoding fails or the schema version is
    /// unknown.
    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self, HistoryError> {
        let log: Self = ciborium::from_reader(bytes)
            .map_err(|e| HistoryError::Deserialize(e.to_string()))?;

        if log.schema_version > Self::CURRENT_SCHEMA_VERSION {
            return Err(HistoryError::UnsupportedSchema {
                found: log.schema_version,
                current: Self::CURRENT_SCHEMA_VERSION,
            });
        }

        Ok(log)
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn entry(file_name: &str) -> HistoryEntry {
        HistoryEntry::new(
            file_name,
            ModelVersion::V2,
            vec![Detection {
                class_label: "Pallet".into(),
                confidence: 0.93,
                bbox: Some(BoundingBox::clamped(0.35, 0.3, 0.3, 0.4)),
            }],
        )
    }

    #[test]
    fn entries_are_newest_first() {
        let mut log = HistoryLog::new();
        log.push(entry("first.jpg"));
        log.push(entry("second.jpg"));

        let names: Vec<&str> = log.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["second.jpg", "first.jpg"]);
    }

    #[test]
    fn log_is_capacity_bounded() {
        let mut log = HistoryLog::new();
        for i in 0..(MAX_HISTORY_ENTRIES + 10) {
            log.push(entry(&format!("photo-{i}.jpg")));
        }

        assert_eq!(log.len(), MAX_HISTORY_ENTRIES);
        // The newest entry survived, the oldest were evicted.
        assert_eq!(
            log.iter().next().unwrap().file_name,
            format!("photo-{}.jpg", MAX_HISTORY_ENTRIES + 9)
        );
    }

    #[test]
    fn select_by_id() {
        let mut log = HistoryLog::new();
        let e = entry("target.jpg");
        let id = e.id.clone();
        log.push(entry("other.jpg"));
        log.push(e);

        assert_eq!(log.get(&id).unwrap().file_name, "target.jpg");
        assert!(log.get(&AnalysisId::new("missing")).is_none());
    }

    #[test]
    fn entry_summary_matches_total() {
        let e = entry("photo.jpg");
        assert_eq!(e.total_count, 1);
        assert_eq!(e.summary_text(), "Detected 1 objects");
    }

    #[test]
    fn snapshot_round_trip_preserves_detections_verbatim() {
        let mut log = HistoryLog::new();
        log.push(entry("a.jpg"));
        log.push(entry("b.jpg"));

        let bytes = log.to_snapshot_bytes().unwrap();
        let restored = HistoryLog::from_snapshot_bytes(&bytes).unwrap();

        assert_eq!(restored, log);
        let detection = &restored.iter().nth(1).unwrap().detections[0];
        assert_eq!(detection.class_label, "Pallet");
        assert!(detection.bbox.is_some());
    }

    #[test]
    fn newer_schema_snapshot_refused() {
        let mut log = HistoryLog::new();
        log.schema_version = HistoryLog::CURRENT_SCHEMA_VERSION + 1;
        let bytes = log.to_snapshot_bytes().unwrap();

        assert!(matches!(
            HistoryLog::from_snapshot_bytes(&bytes),
            Err(HistoryError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn garbage_snapshot_is_an_error_not_a_panic() {
        assert!(matches!(
            HistoryLog::from_snapshot_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]),
            Err(HistoryError::Deserialize(_))
        ));
    }
}
