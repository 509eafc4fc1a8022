use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Uppercase and collapse interior whitespace so cosmetic differences
/// between statement exports ("VENDOR  X " vs "vendor x") hash alike.
pub fn normalize_description(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Stable fingerprint of a bank line: SHA-256 over the normalized
/// `date|description|debit|credit` string. The same row always hashes to
/// the same value across reruns of an import file, which is what makes
/// re-importing safe.
pub fn fingerprint(
    date: NaiveDate,
    description: &str,
    debit_cents: Option<i64>,
    credit_cents: Option<i64>,
) -> String {
    let debit = debit_cents.map_or_else(|| "-".to_string(), |v| v.to_string());
    let credit = credit_cents.map_or_else(|| "-".to_string(), |v| v.to_string());
    let canonical = format!(
        "{date}|{}|d:{debit}|c:{credit}",
        normalize_description(description)
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash: [u8; 32] = hasher.finalize().into();
    to_hex(&hash)
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}
