use serde::{Deserialize, Serialize};

/// Name given to entries the patient adds by hand during review.
pub const NEW_MEDICINE_NAME: &str = "New Medicine";

/// One medicine line of a prescription.
///
/// Every field is free text: dosages keep their unit suffix and
/// frequencies keep the wording found on the paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineEntry {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
}

impl MedicineEntry {
    pub fn new(
        name: impl Into<String>,
        dosage: impl Into<String>,
        frequency: impl Into<String>,
        duration: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            frequency: frequency.into(),
            duration: duration.into(),
        }
    }

    /// Entry with only a name; the rest is left for the patient to fill in.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Placeholder appended by "add medicine" during review.
    pub fn blank() -> Self {
        Self::named(NEW_MEDICINE_NAME)
    }
}
