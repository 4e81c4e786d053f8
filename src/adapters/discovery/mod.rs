//! Discovery Adapters
//!
//! Provider clients that search for businesses and map results into
//! `PartialLead`s with canonical signals.

pub mod google_places;
pub mod yelp;

pub use google_places::GooglePlacesAdapter;
pub use yelp::YelpFusionAdapter;

/// Format North American numbers as `+1-XXX-XXX-XXXX`; others pass through trimmed
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    let local = match digits.len() {
        10 => Some(digits.as_str()),
        11 if digits.starts_with('1') => Some(&digits[1..]),
        _ => None,
    };

    match local {
        Some(d) => Some(format!("+1-{}-{}-{}", &d[..3], &d[3..6], &d[6..])),
        None => Some(trimmed.to_string()),
    }
}
