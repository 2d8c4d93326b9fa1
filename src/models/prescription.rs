use chrono::NaiveDateTime;
use serde::Serialize;

use super::medication::MedicineEntry;
use super::patient::PatientIdentity;
use crate::codes;

/// Compact timestamp used as the prescription id.
pub const RECORD_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Date shown to patients and pharmacists.
pub const DISPLAY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A finalized prescription.
///
/// Built once by the pipeline and never mutated afterwards: fields are only
/// reachable through accessors, and the QR payload is derived at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrescriptionRecord {
    id: String,
    patient_id: String,
    patient_name: String,
    created_at: NaiveDateTime,
    medicines: Vec<MedicineEntry>,
    numeric_code: String,
    qr_payload: String,
}

impl PrescriptionRecord {
    pub(crate) fn new(
        id: String,
        patient: &PatientIdentity,
        created_at: NaiveDateTime,
        medicines: Vec<MedicineEntry>,
        numeric_code: String,
    ) -> Self {
        debug_assert!(!medicines.is_empty(), "finalized prescriptions carry medicines");
        let mut record = Self {
            id,
            patient_id: patient.id.clone(),
            patient_name: patient.name.clone(),
            created_at,
            medicines,
            numeric_code,
            qr_payload: String::new(),
        };
        record.qr_payload = codes::qr_payload(&record);
        record
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn patient_name(&self) -> &str {
        &self.patient_name
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    /// `YYYY-MM-DD HH:MM`, as embedded in the QR payload.
    pub fn display_date(&self) -> String {
        self.created_at.format(DISPLAY_DATE_FORMAT).to_string()
    }

    pub fn medicines(&self) -> &[MedicineEntry] {
        &self.medicines
    }

    /// 8-digit fallback code for patients without a smartphone.
    pub fn numeric_code(&self) -> &str {
        &self.numeric_code
    }

    pub fn qr_payload(&self) -> &str {
        &self.qr_payload
    }

    pub fn summary(&self) -> PrescriptionSummary {
        PrescriptionSummary {
            id: self.id.clone(),
            date: self.display_date(),
            medicine_count: self.medicines.len(),
            numeric_code: self.numeric_code.clone(),
        }
    }
}

/// One line of the history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrescriptionSummary {
    pub id: String,
    pub date: String,
    pub medicine_count: usize,
    pub numeric_code: String,
}
