use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::model::VehicleType;

/// Reduce a free-form label to a slug token.
///
/// Normalization steps:
/// - lowercase
/// - decompose (NFD) and drop combining marks, so "Citroën" becomes "citroen"
/// - every char outside `[a-z0-9]` becomes a separator
/// - runs of separators collapse to a single hyphen, none at either end
pub fn slugify(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_sep = false;
    for c in lowered.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Deterministic record identifier from (type, brand, model, year).
///
/// Components that slug to nothing are skipped so the result never carries
/// doubled hyphens. Distinct labels that differ only in accents or punctuation
/// collide on purpose; the merge step resolves such collisions.
pub fn normalize_id(vehicle_type: VehicleType, brand: &str, model: &str, year: i32) -> String {
    let year = year.to_string();
    [vehicle_type.as_str(), brand, model, year.as_str()]
        .iter()
        .map(|part| slugify(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
