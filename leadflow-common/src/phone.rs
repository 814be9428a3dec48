//! Phone number normalization
//!
//! Canonical form is E.164-like: digits with a leading `+`. Display
//! formatting is a separate, pure function for US numbers.

use thiserror::Error;

/// Minimum digit count for any phone number we accept
pub const MIN_PHONE_DIGITS: usize = 10;

/// Maximum digit count for international numbers
pub const MAX_PHONE_DIGITS: usize = 15;

/// Phone normalization error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("Invalid phone number: {0:?}")]
    InvalidPhone(String),
}

/// Keep only ASCII digits
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Keep only ASCII digits and a leading `+`
///
/// A `+` survives only as the first retained character. This is the reduction
/// applied to every `phone` field before it is stored, compared or sent anywhere.
pub fn strip_to_dial_chars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() || (c == '+' && out.is_empty()) {
            out.push(c);
        }
    }
    out
}

/// Count ASCII digits in a string
pub fn digit_count(raw: &str) -> usize {
    raw.chars().filter(|c| c.is_ascii_digit()).count()
}

/// True when the string carries at least [`MIN_PHONE_DIGITS`] digits
pub fn has_valid_length(raw: &str) -> bool {
    digit_count(raw) >= MIN_PHONE_DIGITS
}

/// Normalize a raw phone string into canonical `+<digits>` form
///
/// Rules, in order:
/// 1. Leading `+`: strip non-digits from the remainder, accept with 10+ digits.
/// 2. Otherwise strip non-digits: 10 digits get country code `1`; 11 digits
///    starting with `1` are used as-is; 10-15 digits get a `+` prefix.
/// 3. Anything else is rejected.
pub fn normalize_phone(raw: &str) -> Result<String, PhoneError> {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix('+') {
        let digits = digits_only(rest);
        if digits.len() >= MIN_PHONE_DIGITS {
            return Ok(format!("+{}", digits));
        }
        return Err(PhoneError::InvalidPhone(raw.to_string()));
    }

    let digits = digits_only(trimmed);
    match digits.len() {
        10 => Ok(format!("+1{}", digits)),
        11 if digits.starts_with('1') => Ok(format!("+{}", digits)),
        len if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&len) => Ok(format!("+{}", digits)),
        _ => Err(PhoneError::InvalidPhone(raw.to_string())),
    }
}

/// Format a phone number for display (US format)
///
/// 10 digits render as `(AAA) BBB-CCCC`; 11 digits with a leading `1` drop the
/// country code first. Anything else is returned unchanged.
pub fn format_phone_display(phone: &str) -> String {
    let mut digits = digits_only(phone);

    if digits.len() == 11 && digits.starts_with('1') {
        digits.remove(0);
    }

    if digits.len() == 10 {
        return format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..]);
    }

    phone.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digits_get_us_country_code() {
        assert_eq!(normalize_phone("9045551234").unwrap(), "+19045551234");
        assert_eq!(normalize_phone("(904) 555-1234").unwrap(), "+19045551234");
        assert_eq!(normalize_phone(" 904.555.1234 ").unwrap(), "+19045551234");
    }

    #[test]
    fn test_every_ten_digit_string_is_prefixed_with_one() {
        for seed in [0u64, 1, 1234567890, 5555555555, 9999999999] {
            let d = format!("{:010}", seed);
            assert_eq!(normalize_phone(&d).unwrap(), format!("+1{}", d));
        }
    }

    #[test]
    fn test_eleven_digits_with_leading_one() {
        assert_eq!(normalize_phone("1-904-555-1234").unwrap(), "+19045551234");
    }

    #[test]
    fn test_international_lengths() {
        assert_eq!(normalize_phone("44 20 7946 0958").unwrap(), "+442079460958");
        assert_eq!(normalize_phone("123456789012345").unwrap(), "+123456789012345");
        assert!(normalize_phone("1234567890123456").is_err());
    }

    #[test]
    fn test_plus_prefix_preserved_and_remainder_stripped() {
        assert_eq!(normalize_phone("+44 (20) 7946-0958").unwrap(), "+442079460958");
        assert_eq!(normalize_phone("+123456789").unwrap_err(), PhoneError::InvalidPhone("+123456789".into()));
        assert_eq!(normalize_phone("+1234567890").unwrap(), "+1234567890");
    }

    #[test]
    fn test_too_short_or_empty_rejected() {
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("555-1234").is_err());
        assert!(normalize_phone("call me").is_err());
    }

    #[test]
    fn test_display_format() {
        assert_eq!(format_phone_display("9045551234"), "(904) 555-1234");
        assert_eq!(format_phone_display("+19045551234"), "(904) 555-1234");
        assert_eq!(format_phone_display("+442079460958"), "+442079460958");
        assert_eq!(format_phone_display("n/a"), "n/a");
    }

    #[test]
    fn test_display_of_normalized_us_number() {
        for raw in ["9045557890", "(386) 555-0100", "321.555.0199"] {
            let normalized = normalize_phone(raw).unwrap();
            let display = format_phone_display(&normalized);
            let d = digits_only(raw);
            assert_eq!(display, format!("({}) {}-{}", &d[0..3], &d[3..6], &d[6..]));
        }
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_to_dial_chars("+1 (904) 555-1234 ext"), "+19045551234");
        assert_eq!(digits_only("+1 (904)"), "1904");
        assert!(has_valid_length("904-555-1234"));
        assert!(!has_valid_length("555-1234"));
    }

    #[test]
    fn test_plus_kept_only_in_leading_position() {
        assert_eq!(strip_to_dial_chars("904+555+1234"), "9045551234");
        assert_eq!(strip_to_dial_chars(" (+44) 20+7946"), "+44207946");
        assert_eq!(strip_to_dial_chars("++1 904"), "+1904");
        assert_eq!(strip_to_dial_chars("tel: 1+2"), "12");
    }
}
