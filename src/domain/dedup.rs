//! Lead Deduplication
//!
//! Merge-based deduplication of the discovery pool. Two leads are the same
//! business when their website domains match, when neither has a domain but
//! name and phone digits match, or when they were found at the same source URL.
//! Duplicates are merged into the earliest record, never dropped.

use super::lead::Lead;

/// Lowercased host with scheme, `www.`, port and path removed
pub fn normalize_domain(url: &str) -> Option<String> {
    let trimmed = url.trim().to_lowercase();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }

    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed.as_str(),
    };
    let host_part = without_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let host_part = host_part.rsplit('@').next().unwrap_or_default();
    let host = host_part.split(':').next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host).trim_end_matches('.');

    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(host.to_string())
}

/// Case-folded name with whitespace runs collapsed to single spaces
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digits of a phone number
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Which rule matched two leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    Domain,
    NamePhone,
    SourceUrl,
}

/// Decide whether two leads describe the same business
pub fn duplicate_reason(a: &Lead, b: &Lead) -> Option<DuplicateReason> {
    match (a.domain(), b.domain()) {
        (Some(x), Some(y)) if x == y => return Some(DuplicateReason::Domain),
        (None, None) => {
            let name_a = normalize_name(&a.name);
            let digits_a = a.phone.as_deref().map(phone_digits).unwrap_or_default();
            let digits_b = b.phone.as_deref().map(phone_digits).unwrap_or_default();
            if !name_a.is_empty()
                && !digits_a.is_empty()
                && name_a == normalize_name(&b.name)
                && digits_a == digits_b
            {
                return Some(DuplicateReason::NamePhone);
            }
        }
        _ => {}
    }

    match (a.source_url.as_deref(), b.source_url.as_deref()) {
        (Some(x), Some(y)) if !x.trim().is_empty() && x.trim() == y.trim() => {
            Some(DuplicateReason::SourceUrl)
        }
        _ => None,
    }
}

/// Merge duplicates, keeping first-seen order and identity.
///
/// Passes repeat until nothing merges, so merges that make two kept records
/// newly match are collapsed too and the result is a fixed point.
pub fn merge_duplicates(leads: Vec<Lead>) -> Vec<Lead> {
    let original = leads.len();
    let mut pool = leads;

    loop {
        let before = pool.len();
        pool = merge_pass(pool);
        if pool.len() == before {
            break;
        }
    }

    let merged = original - pool.len();
    if merged > 0 {
        tracing::info!("Merged {} duplicate leads ({} unique)", merged, pool.len());
    }
    pool
}

fn merge_pass(leads: Vec<Lead>) -> Vec<Lead> {
    let mut kept: Vec<Lead> = Vec::with_capacity(leads.len());

    for lead in leads {
        let existing = kept
            .iter()
            .position(|k| duplicate_reason(k, &lead).is_some());

        match existing {
            Some(idx) => {
                tracing::debug!(
                    "Duplicate: '{}' merged into '{}' ({:?})",
                    lead.name,
                    kept[idx].name,
                    duplicate_reason(&kept[idx], &lead)
                );
                kept[idx].merge_from(&lead);
            }
            None => kept.push(lead),
        }
    }

    kept
}
