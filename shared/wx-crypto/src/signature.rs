//! Callback Signature Verification
//!
//! The platform signs every callback with `SHA1(sort([token, timestamp, nonce, payload]).join(""))`.
//! The payload is the `echostr` for URL verification and the `<Encrypt>` text for event delivery.

use sha1::{Digest, Sha1};

/// Compute the hex-encoded (lowercase) signature for the four callback inputs.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str, payload: &str) -> String {
    let mut parts = [token, timestamp, nonce, payload];
    // Byte-wise lexicographic order
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Verify a platform-supplied signature.
///
/// Any empty input counts as a failed verification.
pub fn verify(token: &str, timestamp: &str, nonce: &str, payload: &str, signature: &str) -> bool {
    if [token, timestamp, nonce, payload, signature]
        .iter()
        .any(|s| s.is_empty())
    {
        return false;
    }

    let expected = compute_signature(token, timestamp, nonce, payload);
    let provided = signature.to_ascii_lowercase();
    // Constant-time comparison
    expected.len() == provided.len()
        && expected
            .as_bytes()
            .iter()
            .zip(provided.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "QDG6eK";
    const TIMESTAMP: &str = "1409659813";
    const NONCE: &str = "1372623149";
    const PAYLOAD: &str = "RypEvHKD8QQKFhvQ6QleEB4J58tiPdvo+rtK1I9qca6aM/wvqnLSV5zEPeusUiX5L5X/0lWfrf0QADHHhGd3QczcdCUpj911L3vg3W/sYYvuJTs3TUUkSUXxaccAS0qhxchrRYt66wiSpGLYL42aM6A8dTT+6k4aSknmPj48kzJs8qLjvd4Xgpue06DOdnLxAUHzM6+kDZ+HMZfJYuR+LtwGc2hgf5gsijff0ekUNXZiqATP7PF5mZxZ3Izoun1s4zG4LUMnvw2r+KqCKIw+3IQH03v+BCA9nMELNqbSf6tiWSrXJB3LAVGUcallcrw8V2t9EL4EhzJWrQUax5wLVMNS0+rUPA3k22Ncx4XXZS9o0MBH27Bo6BpNelZpS";

    #[test]
    fn matches_fixed_vector() {
        assert_eq!(
            compute_signature(TOKEN, TIMESTAMP, NONCE, PAYLOAD),
            "2ecc5745cc405397f9c1ed24f09bdcc0a6c132ed"
        );
        assert!(verify(
            TOKEN,
            TIMESTAMP,
            NONCE,
            PAYLOAD,
            "2ecc5745cc405397f9c1ed24f09bdcc0a6c132ed"
        ));
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = compute_signature("b", "a", "d", "c");
        let b = compute_signature("a", "b", "c", "d");
        assert_eq!(a, b);
    }

    #[test]
    fn uppercase_signature_accepted() {
        let sig = compute_signature(TOKEN, TIMESTAMP, NONCE, "hello").to_uppercase();
        assert!(verify(TOKEN, TIMESTAMP, NONCE, "hello", &sig));
    }

    #[test]
    fn single_character_change_fails() {
        let sig = compute_signature(TOKEN, TIMESTAMP, NONCE, PAYLOAD);
        assert!(!verify("QDG6eL", TIMESTAMP, NONCE, PAYLOAD, &sig));
        assert!(!verify(TOKEN, "1409659814", NONCE, PAYLOAD, &sig));
        assert!(!verify(TOKEN, TIMESTAMP, "1372623148", PAYLOAD, &sig));
        assert!(!verify(TOKEN, TIMESTAMP, NONCE, &PAYLOAD.replacen('R', "S", 1), &sig));

        let mut tampered = sig.into_bytes();
        tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(!verify(TOKEN, TIMESTAMP, NONCE, PAYLOAD, &tampered));
    }

    #[test]
    fn empty_inputs_fail() {
        let sig = compute_signature(TOKEN, TIMESTAMP, NONCE, PAYLOAD);
        assert!(!verify("", TIMESTAMP, NONCE, PAYLOAD, &sig));
        assert!(!verify(TOKEN, "", NONCE, PAYLOAD, &sig));
        assert!(!verify(TOKEN, TIMESTAMP, "", PAYLOAD, &sig));
        assert!(!verify(TOKEN, TIMESTAMP, NONCE, "", &sig));
        assert!(!verify(TOKEN, TIMESTAMP, NONCE, PAYLOAD, ""));
    }

    #[test]
    fn garbage_signature_does_not_panic() {
        assert!(!verify(TOKEN, TIMESTAMP, NONCE, PAYLOAD, "not-a-signature"));
        assert!(!verify(TOKEN, TIMESTAMP, NONCE, PAYLOAD, "日本語"));
    }
}
