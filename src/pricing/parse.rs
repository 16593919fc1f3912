use std::sync::OnceLock;

use regex::Regex;

/// Upstream year code for brand-new ("zero km") listings.
pub const ZERO_KM_YEAR: i32 = 32000;

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d.,]*").expect("static regex"))
}

fn thousands_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").expect("static regex"))
}

/// Parse a price label into a number.
///
/// Handles the upstream Brazilian format (`R$ 1.234.567,89`), plain decimals
/// (`1234.56`) and dotted thousands without decimals (`45.000`).
pub fn parse_price_text(raw: &str) -> Option<f64> {
    let token = amount_re().find(raw)?.as_str().trim_end_matches(['.', ',']);
    let normalized = if token.contains(',') {
        token.replace('.', "").replace(',', ".")
    } else if thousands_only_re().is_match(token) {
        token.replace('.', "")
    } else {
        token.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Year component of an upstream year code such as `"2014-1"`.
/// The zero-km sentinel maps to the following model year.
pub fn year_from_code(code: &str, current_year: i32) -> Option<i32> {
    let head = code.trim().split('-').next()?.trim();
    let year = head.parse::<i32>().ok()?;
    if year == ZERO_KM_YEAR {
        Some(current_year + 1)
    } else {
        Some(year)
    }
}
