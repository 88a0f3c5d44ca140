//! Stable value checksums for change detection.
//!
//! Values are compared by checksum of their serialized form, never by native
//! equality: some producers return values whose native comparison is
//! unreliable (numeric options that round-trip as strings, for one). The
//! serialization is canonical because serde_json orders object keys, so the
//! same logical value always hashes the same.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Truncated hex length. 64 bits of SHA-256 is plenty for change detection
/// across a few dozen callables.
const CHECKSUM_HEX_LEN: usize = 16;

/// Short, stable hash of a serializable value.
pub fn stable_checksum(value: &Value) -> String {
    // Value serialization cannot fail; fall back to Display just in case.
    let canonical = serde_json::to_vec(value).unwrap_or_else(|_| value.to_string().into_bytes());
    let digest = Sha256::digest(&canonical);

    let mut hex = String::with_capacity(CHECKSUM_HEX_LEN);
    for byte in digest.iter().take(CHECKSUM_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_is_stable() {
        let value = json!({"url": "https://example.com", "port": 443});
        assert_eq!(stable_checksum(&value), stable_checksum(&value.clone()));
    }

    #[test]
    fn test_key_order_does_not_matter() {
        // serde_json sorts object keys, so logically-equal maps hash equal.
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(stable_checksum(&a), stable_checksum(&b));
    }

    #[test]
    fn test_different_values_differ() {
        assert_ne!(stable_checksum(&json!(1)), stable_checksum(&json!(2)));
        assert_ne!(stable_checksum(&json!("a")), stable_checksum(&json!("b")));
    }

    #[test]
    fn test_type_matters() {
        // "5" and 5 are different values; stability, not normalization.
        assert_ne!(stable_checksum(&json!("5")), stable_checksum(&json!(5)));
    }

    #[test]
    fn test_null_has_a_checksum() {
        let checksum = stable_checksum(&Value::Null);
        assert_eq!(checksum.len(), CHECKSUM_HEX_LEN);
        assert_ne!(checksum, stable_checksum(&json!(0)));
    }
}
