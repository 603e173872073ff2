//! Human-typeable code generation.
//!
//! Redemption and pairing codes are short strings meant to be typed from a
//! TV screen or read over the phone, so the alphabet drops the ambiguous
//! characters (0/O, 1/I). Uniqueness is NOT guaranteed here; callers insert
//! the candidate and retry on a UNIQUE constraint violation.

use rand::Rng;

/// 32 characters, no 0/O/1/I.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Standard code length for redemption and pairing codes.
pub const CODE_LEN: usize = 8;

/// Insert attempts before falling back to a timestamp-suffixed code.
pub const MAX_GENERATION_ATTEMPTS: usize = 10;

/// Generate a random candidate code of the given length.
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Fallback code used after `MAX_GENERATION_ATTEMPTS` collisions: four
/// random characters plus the tail of the current timestamp in base36.
/// Collisions here would require two exhausted retry loops in the same
/// second that also drew the same random prefix.
pub fn fallback_code(now: i64) -> String {
    let suffix = to_base36_upper(now);
    let tail = &suffix[suffix.len().saturating_sub(4)..];
    format!("{}{}", generate_code(CODE_LEN - tail.len()), tail)
}

fn to_base36_upper(mut n: i64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Check that a string looks like one of our codes. Fallback codes can
/// carry any base36 digit, so this accepts the full uppercase alphanumeric
/// range rather than just `CODE_ALPHABET`.
pub fn is_valid_code_format(code: &str) -> bool {
    code.len() == CODE_LEN
        && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Normalize user input: trim whitespace and uppercase.
pub fn normalize_code_input(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_code_uses_unambiguous_alphabet() {
        for _ in 0..100 {
            let code = generate_code(CODE_LEN);
            assert_eq!(code.len(), CODE_LEN);
            for b in code.bytes() {
                assert!(CODE_ALPHABET.contains(&b), "unexpected char in {}", code);
                assert!(!b"0O1I".contains(&b));
            }
        }
    }

    #[test]
    fn test_codes_are_random() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_code(CODE_LEN)).collect();
        // With a 32^8 space, 1000 draws colliding would indicate a broken RNG
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_fallback_code_has_standard_length() {
        let code = fallback_code(1_700_000_000);
        assert_eq!(code.len(), CODE_LEN);
    }

    #[test]
    fn test_normalize_and_validate() {
        assert_eq!(normalize_code_input("  ab23cdef\n"), "AB23CDEF");
        assert!(is_valid_code_format("ABCD2345"));
        assert!(!is_valid_code_format("ABC"));
        assert!(!is_valid_code_format("abcd2345"));
    }
}
