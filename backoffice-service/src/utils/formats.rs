//! Indian contact and tax identifier formats.

use once_cell::sync::Lazy;
use regex::Regex;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").expect("valid regex"));

static PINCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{5}$").expect("valid regex"));

static GSTIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{2}[A-Z]{5}\d{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("valid regex")
});

/// 10-digit mobile number starting with 6-9.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub fn is_valid_pincode(pincode: &str) -> bool {
    PINCODE_RE.is_match(pincode)
}

/// 15-character GSTIN: state code, PAN, entity number, `Z`, checksum.
pub fn is_valid_gstin(gstin: &str) -> bool {
    GSTIN_RE.is_match(gstin)
}
