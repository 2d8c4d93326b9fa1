//! Redemption encodings for finalized prescriptions.
//!
//! Two tokens let a pharmacist retrieve a prescription:
//! - a QR code carrying a JSON payload of the whole record
//! - an 8-digit numeric code for patients who cannot show a screen
//!
//! Codes are text, never integers: `"00481223"` keeps its leading zeros.

use rand::Rng;
use serde_json::{json, Value};

use crate::models::PrescriptionRecord;

/// Length of the numeric redemption code.
pub const NUMERIC_CODE_LEN: usize = 8;

/// Errors from QR rendering.
#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    #[error("QR generation failed: {0}")]
    QrGeneration(String),
}

/// Draw an 8-digit numeric redemption code, each digit uniform over 0-9.
pub fn numeric_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..NUMERIC_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// True if `code` has the shape of a numeric redemption code.
pub fn is_numeric_code(code: &str) -> bool {
    code.len() == NUMERIC_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

/// Serialize a record into the JSON carried by its QR code.
///
/// Keys: `id`, `patient`, `aadhar` (patient id), `date`, `medicines`, `code`.
/// The same record always produces byte-identical output.
pub fn qr_payload(record: &PrescriptionRecord) -> String {
    let medicines: Vec<Value> = record
        .medicines()
        .iter()
        .map(|m| {
            json!({
                "name": m.name,
                "dosage": m.dosage,
                "frequency": m.frequency,
                "duration": m.duration,
            })
        })
        .collect();

    json!({
        "id": record.id(),
        "patient": record.patient_name(),
        "aadhar": record.patient_id(),
        "date": record.display_date(),
        "medicines": medicines,
        "code": record.numeric_code(),
    })
    .to_string()
}

/// Render a QR payload as an SVG image for display or download.
pub fn render_qr_svg(payload: &str) -> Result<String, CodeError> {
    use qrcode::render::svg;
    use qrcode::QrCode;

    let code =
        QrCode::new(payload.as_bytes()).map_err(|e| CodeError::QrGeneration(e.to_string()))?;

    let svg_string = code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .max_dimensions(300, 300)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build();

    Ok(svg_string)
}
