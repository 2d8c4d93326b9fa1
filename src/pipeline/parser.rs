//! Heuristic medicine extraction from recognized prescription text.
//!
//! Three tiers, first non-empty result wins:
//! 1. Known names: tokens containing a reference medicine name, each with
//!    dosage, frequency and duration scanned in a window after the token.
//! 2. Dosage patterns: up to three `Medicine {n}` placeholders, one per
//!    quantity found anywhere in the text.
//! 3. A single blank `Medicine 1` for the patient to fill in.
//!
//! Parsing never fails. Garbage in, an editable draft out.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::MedicineEntry;

/// Reference name fragments. A token matches when it contains one.
const KNOWN_MEDICINES: &[&str] = &[
    "paracetamol", "amoxicillin", "azithromycin", "ciprofloxacin",
    "metformin", "aspirin", "ibuprofen", "omeprazole", "vitamin",
    "crocin", "dolo", "calpol", "augmentin", "pantoprazole",
];

const FREQUENCY_KEYWORDS: &[&str] = &["once", "twice", "thrice", "daily", "times"];

pub const DEFAULT_DOSAGE: &str = "500mg";
pub const DEFAULT_FREQUENCY: &str = "2 times daily";
pub const DEFAULT_DURATION: &str = "5 days";

/// Tokens scanned after the medicine name, per attribute.
const DOSAGE_LOOKAHEAD: usize = 3;
const FREQUENCY_LOOKAHEAD: usize = 6;
const DURATION_LOOKAHEAD: usize = 8;

/// A frequency is the trigger token plus up to this many following tokens.
const FREQUENCY_TRAILING_TOKENS: usize = 2;

/// Cap on placeholder entries produced from bare dosages.
const MAX_PLACEHOLDER_MEDICINES: usize = 3;

static DOSAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(?:mg|ml|g|mcg|iu)").unwrap());

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(?:day|days|week|weeks|month)").unwrap());

/// Turn recognized text into an ordered, non-empty list of medicine entries.
pub fn parse_medicines(text: &str) -> Vec<MedicineEntry> {
    let lowered = text.to_lowercase();
    let tokens = tokenize(&lowered);

    let known = match_known_names(&tokens);
    if !known.is_empty() {
        tracing::debug!(count = known.len(), "Medicines matched by name");
        return known;
    }

    let placeholders = match_dosage_patterns(&lowered);
    if !placeholders.is_empty() {
        tracing::debug!(count = placeholders.len(), "Medicines inferred from dosages");
        return placeholders;
    }

    tracing::debug!(text_len = text.len(), "No medicines recognized, using blank entry");
    vec![MedicineEntry::named(placeholder_name(1))]
}

/// Split on whitespace. Callers fold case before tokenizing.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

fn match_known_names(tokens: &[&str]) -> Vec<MedicineEntry> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| KNOWN_MEDICINES.iter().any(|name| token.contains(name)))
        .map(|(index, token)| MedicineEntry {
            name: title_case(token),
            dosage: extract_dosage(tokens, index),
            frequency: extract_frequency(tokens, index),
            duration: extract_duration(tokens, index),
        })
        .collect()
}

fn match_dosage_patterns(lowered: &str) -> Vec<MedicineEntry> {
    DOSAGE_PATTERN
        .find_iter(lowered)
        .take(MAX_PLACEHOLDER_MEDICINES)
        .enumerate()
        .map(|(i, dose)| {
            MedicineEntry::new(
                placeholder_name(i + 1),
                dose.as_str(),
                DEFAULT_FREQUENCY,
                DEFAULT_DURATION,
            )
        })
        .collect()
}

fn placeholder_name(n: usize) -> String {
    format!("Medicine {n}")
}

/// Tokens from `anchor` through `anchor + lookahead`, clipped to the input.
fn window<'a>(tokens: &'a [&'a str], anchor: usize, lookahead: usize) -> &'a [&'a str] {
    let end = anchor.saturating_add(lookahead + 1).min(tokens.len());
    &tokens[anchor.min(end)..end]
}

/// First token near `anchor` that looks like a quantity (`500mg`, `10ml`).
pub fn extract_dosage(tokens: &[&str], anchor: usize) -> String {
    window(tokens, anchor, DOSAGE_LOOKAHEAD)
        .iter()
        .find(|token| DOSAGE_PATTERN.is_match(token))
        .map_or_else(|| DEFAULT_DOSAGE.to_string(), |token| token.to_string())
}

/// First frequency keyword near `anchor`, joined with the two tokens after it.
pub fn extract_frequency(tokens: &[&str], anchor: usize) -> String {
    let found = window(tokens, anchor, FREQUENCY_LOOKAHEAD)
        .iter()
        .position(|token| FREQUENCY_KEYWORDS.iter().any(|k| token.contains(k)));

    match found {
        Some(offset) => {
            let start = anchor + offset;
            let end = (start + 1 + FREQUENCY_TRAILING_TOKENS).min(tokens.len());
            tokens[start..end].join(" ")
        }
        None => DEFAULT_FREQUENCY.to_string(),
    }
}

/// First token near `anchor` that looks like a course length (`5days`).
pub fn extract_duration(tokens: &[&str], anchor: usize) -> String {
    window(tokens, anchor, DURATION_LOOKAHEAD)
        .iter()
        .find(|token| DURATION_PATTERN.is_match(token))
        .map_or_else(|| DEFAULT_DURATION.to_string(), |token| token.to_string())
}

/// Uppercase letters that follow a non-letter, lowercase the rest.
/// `dolo-650` becomes `Dolo-650`, `650mg` becomes `650Mg`.
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_is_letter = false;
    for ch in word.chars() {
        if prev_is_letter {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        prev_is_letter = ch.is_alphabetic();
    }
    out
}
