//! In-memory prescription history.
//!
//! Records are grouped per patient and appended in creation order. Nothing is
//! ever removed or rewritten; history lives as long as the process.

use std::collections::HashMap;

use crate::models::{PrescriptionRecord, PrescriptionSummary};

/// Append-only per-patient record lists.
#[derive(Debug, Default)]
pub struct PrescriptionStore {
    records: HashMap<String, Vec<PrescriptionRecord>>,
}

impl PrescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finalized record under `identity_id`.
    pub fn append(&mut self, identity_id: &str, record: PrescriptionRecord) {
        self.records
            .entry(identity_id.to_string())
            .or_default()
            .push(record);
    }

    /// Snapshot of a patient's records, most recent first.
    ///
    /// Unknown identities get an empty list. Later appends do not show up in
    /// a list already returned.
    pub fn list_for(&self, identity_id: &str) -> Vec<PrescriptionRecord> {
        self.records
            .get(identity_id)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// History lines for a patient, most recent first.
    pub fn summaries_for(&self, identity_id: &str) -> Vec<PrescriptionSummary> {
        self.records
            .get(identity_id)
            .map(|list| list.iter().rev().map(PrescriptionRecord::summary).collect())
            .unwrap_or_default()
    }

    pub fn count_for(&self, identity_id: &str) -> usize {
        self.records.get(identity_id).map_or(0, Vec::len)
    }

    /// Total number of records across all patients.
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any record in the store, for any patient, has this id.
    pub fn contains_record_id(&self, record_id: &str) -> bool {
        self.records.values().flatten().any(|r| r.id() == record_id)
    }

    /// True if any record in the store carries this numeric code.
    pub fn contains_code(&self, numeric_code: &str) -> bool {
        self.find_by_code(numeric_code).is_some()
    }

    /// Pharmacist redemption lookup.
    pub fn find_by_code(&self, numeric_code: &str) -> Option<PrescriptionRecord> {
        self.records
            .values()
            .flatten()
            .find(|r| r.numeric_code() == numeric_code)
            .cloned()
    }
}
