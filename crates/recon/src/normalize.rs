//! Key normalization for vessel and place names.
//!
//! Both normalizers are pure and idempotent: feeding an already-normalized key back in
//! returns it unchanged. Absent or blank input yields an empty key.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    VesselName,
    LocationName,
}

/// Leading qualifier words stripped from place names.
const LOCATION_PREFIXES: [&str; 3] = ["PORT OF ", "PORT ", "THE "];

/// Institutional suffixes stripped from place names. Longest first, so that
/// `STATE PORT AUTHORITY` is not cut down to `STATE` by `PORT AUTHORITY`.
const LOCATION_SUFFIXES: [&str; 6] = [
    " AUTHORITY OF HARRIS COUNTY",
    " UNIFIED PORT DISTRICT",
    " STATE PORT AUTHORITY",
    " STATE AUTHORITY",
    " PORT AUTHORITY",
    " PORT DISTRICT",
];

pub fn normalize(raw: Option<&str>, kind: KeyKind) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match kind {
        KeyKind::VesselName => normalize_vessel_name(raw),
        KeyKind::LocationName => normalize_location_name(raw),
    }
}

/// `"M/V  Alpha-1"` → `"mv alpha1"`.
pub fn normalize_vessel_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&kept.to_lowercase())
}

/// `"Port of Houston Authority of Harris County, TX"` → `"HOUSTON"`.
pub fn normalize_location_name(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let head = upper.split(',').next().unwrap_or("");
    let mut key = collapse_whitespace(head);

    loop {
        let before = key.len();
        for prefix in LOCATION_PREFIXES {
            if let Some(rest) = key.strip_prefix(prefix) {
                key = rest.trim_start().to_string();
            }
        }
        for suffix in LOCATION_SUFFIXES {
            if let Some(rest) = key.strip_suffix(suffix) {
                key = rest.trim_end().to_string();
            }
        }
        if key.len() == before {
            break;
        }
    }

    key
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
