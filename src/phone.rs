//! Russian mobile number validation and normalization

use regex::Regex;
use std::sync::OnceLock;

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\A(7|8)(\d{10})\z").unwrap())
}

fn digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Whether the number is an 11-digit number starting with 7 or 8 (`+7` included)
pub fn is_valid(phone: &str) -> bool {
    phone_pattern().is_match(&digits(phone))
}

/// Rewrite a valid number as `<prefix><10 digits>`
pub fn normalize(phone: &str, prefix: &str) -> Option<String> {
    let digits = digits(phone);
    phone_pattern()
        .captures(&digits)
        .and_then(|caps| caps.get(2))
        .map(|local| format!("{}{}", prefix, local.as_str()))
}
