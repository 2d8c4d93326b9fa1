use serde::{Deserialize, Serialize};

/// A registered patient as known to the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentity {
    /// Identity-document number (fixed-length digit string).
    pub id: String,
    pub name: String,
    /// Where one-time passcodes are delivered.
    pub contact: String,
}

impl PatientIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            contact: contact.into(),
        }
    }

    /// Id with all but the last four digits hidden, for logs.
    pub fn masked_id(&self) -> String {
        mask_identity(&self.id)
    }
}

/// Hide all but the last four characters of an identity number.
pub fn mask_identity(id: &str) -> String {
    let count = id.chars().count();
    let visible = count.min(4);
    let mut masked = "*".repeat(count - visible);
    masked.extend(id.chars().skip(count - visible));
    masked
}
