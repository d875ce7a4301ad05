//! Luhn check-digit validation for order numbers.
//!
//! Any character other than an ASCII digit makes the input invalid, as does
//! the empty string. Callers that accept padded input must trim it first.

/// Returns `true` when `number` is a non-empty string of ASCII digits whose
/// Luhn checksum is a multiple of ten.
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum: u32 = 0;
    for (position, byte) in number.bytes().rev().enumerate() {
        if !byte.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(byte - b'0');
        if position % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Computes the digit that makes `payload` followed by it Luhn-valid.
pub fn check_digit(payload: &str) -> Option<u8> {
    let mut sum: u32 = 0;
    // The check digit will occupy position 0, so payload digits start at 1.
    for (position, byte) in payload.bytes().rev().enumerate() {
        if !byte.is_ascii_digit() {
            return None;
        }
        let mut digit = u32::from(byte - b'0');
        if position % 2 == 0 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    Some(((10 - sum % 10) % 10) as u8)
}
