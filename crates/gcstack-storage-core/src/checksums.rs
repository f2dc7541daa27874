//! Checksum computation for object payloads.
//!
//! GCS encodes both of its object checksums in base64: `md5Hash` is the
//! base64 MD5 digest of the payload, `crc32c` is the base64 big-endian
//! CRC32C value. MD5 is the field the revision invariant validates; CRC32C
//! is informational and never overridden.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

/// Compute the base64-encoded MD5 digest of `data`, the `md5Hash` form.
///
/// # Examples
///
/// ```
/// use gcstack_storage_core::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    let hash = md5::Md5::digest(data);
    BASE64_STANDARD.encode(hash)
}

/// Compute the base64-encoded big-endian CRC32C of `data`, the `crc32c` form.
///
/// # Examples
///
/// ```
/// use gcstack_storage_core::checksums::compute_crc32c;
///
/// assert_eq!(compute_crc32c(b""), "AAAAAA==");
/// ```
#[must_use]
pub fn compute_crc32c(data: &[u8]) -> String {
    let value = crc32c::crc32c(data);
    BASE64_STANDARD.encode(value.to_be_bytes())
}

/// Deterministically corrupt a payload.
///
/// Used by the injected-corruption instruction header so clients can test
/// their download-integrity checks: the stored hashes describe the corrupted
/// payload, which no longer matches what the client uploaded.
#[must_use]
pub fn corrupt_payload(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return b"x".to_vec();
    }
    let mut corrupted = data.to_vec();
    corrupted[0] = if corrupted[0] == b'A' { b'B' } else { b'A' };
    corrupted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compute_md5_of_empty_payload() {
        assert_eq!(compute_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_should_compute_md5_of_payload() {
        // base64(md5("hello")) == XUFAKrxLKna5cZ2REBfFkg==
        assert_eq!(compute_md5(b"hello"), "XUFAKrxLKna5cZ2REBfFkg==");
    }

    #[test]
    fn test_should_compute_crc32c_of_payload() {
        let b64 = compute_crc32c(b"hello");
        assert!(!b64.is_empty());
        let decoded = base64::engine::general_purpose::STANDARD.decode(&b64);
        assert_eq!(decoded.map(|d| d.len()).ok(), Some(4));
    }

    #[test]
    fn test_should_corrupt_payload_without_changing_length() {
        let data = b"Attack at dawn";
        let corrupted = corrupt_payload(data);
        assert_eq!(corrupted.len(), data.len());
        assert_ne!(&corrupted[..], &data[..]);
        // Corruption flips only the leading byte.
        assert_eq!(&corrupted[1..], &data[1..]);
    }

    #[test]
    fn test_should_corrupt_empty_payload_to_non_empty() {
        assert!(!corrupt_payload(b"").is_empty());
    }

    #[test]
    fn test_should_corrupt_payload_even_when_first_byte_not_ascii_a() {
        let corrupted = corrupt_payload(b"hello");
        assert_ne!(corrupted, b"hello");
    }
}
