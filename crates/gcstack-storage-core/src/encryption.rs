//! Customer-supplied encryption key handling.
//!
//! The simulator does not encrypt anything; it captures the key headers on
//! write and enforces on every later read that the caller presents the same
//! key. Only the SHA-256 fingerprint of the key is persisted.
//!
//! Writes and reads use the `x-goog-encryption-*` headers. Copy and rewrite
//! validate the *source* object's key through the same functions with the
//! `x-goog-copy-source-encryption` prefix.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;
use gcstack_storage_model::{CustomerEncryption, StorageError, StorageRequest, StorageResult};

/// Header prefix for the object's own encryption key.
pub const ENCRYPTION_PREFIX: &str = "x-goog-encryption";

/// Header prefix for the source object's key on copy/rewrite requests.
pub const COPY_SOURCE_ENCRYPTION_PREFIX: &str = "x-goog-copy-source-encryption";

/// The one algorithm the key headers may name.
const CSEK_ALGORITHM: &str = "AES256";

/// The generic customer-supplied-encryption-key error.
fn csek_error() -> StorageError {
    StorageError::bad_request(
        "missing a SHA256 hash of the encryption key, or it is not base64 \
         encoded, or it does not match the encryption key",
    )
}

/// Validate a key/hash/algorithm header triple for internal consistency.
///
/// The algorithm must be `AES256`, the key must be the base64 encoding of 32
/// bytes, and the hash must be the base64 SHA-256 of the decoded key. Returns
/// the descriptor to persist.
pub fn validate_key_headers(
    key: Option<&str>,
    key_hash: Option<&str>,
    algorithm: Option<&str>,
) -> StorageResult<CustomerEncryption> {
    let algorithm = algorithm.ok_or_else(csek_error)?;
    if algorithm != CSEK_ALGORITHM {
        return Err(StorageError::bad_request(format!(
            "invalid algorithm {algorithm} for customer-supplied encryption key"
        )));
    }

    let key = key.ok_or_else(csek_error)?;
    let key_bytes = BASE64_STANDARD.decode(key).map_err(|_| csek_error())?;
    if key_bytes.len() != 32 {
        return Err(csek_error());
    }

    let key_hash = key_hash.ok_or_else(csek_error)?;
    let expected = BASE64_STANDARD.encode(sha2::Sha256::digest(&key_bytes));
    if expected != key_hash {
        return Err(csek_error());
    }

    Ok(CustomerEncryption {
        encryption_algorithm: algorithm.to_owned(),
        key_sha256: key_hash.to_owned(),
    })
}

/// Capture the customer-supplied encryption key from a write request.
///
/// Returns `None` when no key header is present. Otherwise the triple must
/// validate, and the descriptor to store on the revision is returned.
pub fn capture_customer_encryption(
    request: &StorageRequest,
) -> StorageResult<Option<CustomerEncryption>> {
    if request.header(&format!("{ENCRYPTION_PREFIX}-key")).is_none() {
        return Ok(None);
    }
    validate_key_headers(
        request.header(&format!("{ENCRYPTION_PREFIX}-key")),
        request.header(&format!("{ENCRYPTION_PREFIX}-key-sha256")),
        request.header(&format!("{ENCRYPTION_PREFIX}-algorithm")),
    )
    .map(Some)
}

/// Verify that a read request carries the key matching a revision's
/// descriptor.
///
/// `prefix` selects the header family: [`ENCRYPTION_PREFIX`] for plain reads,
/// [`COPY_SOURCE_ENCRYPTION_PREFIX`] when validating the source of a copy or
/// rewrite. An unencrypted revision rejects any supplied key; an encrypted
/// revision requires a consistent triple whose fingerprint equals the stored
/// one.
pub fn validate_encryption_for_read(
    request: &StorageRequest,
    descriptor: Option<&CustomerEncryption>,
    prefix: &str,
) -> StorageResult<()> {
    let key = request.header(&format!("{prefix}-key"));

    let Some(descriptor) = descriptor else {
        if key.is_none() {
            return Ok(());
        }
        // The payload is not encrypted; sending a key is an error.
        return Err(StorageError::bad_request(
            "encryption key sent for an object that is not encrypted",
        ));
    };

    let supplied = validate_key_headers(
        key,
        request.header(&format!("{prefix}-key-sha256")),
        request.header(&format!("{prefix}-algorithm")),
    )?;
    if supplied.key_sha256 != descriptor.key_sha256 {
        return Err(csek_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_BYTES: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    fn key_b64() -> String {
        BASE64_STANDARD.encode(KEY_BYTES)
    }

    fn key_hash_b64() -> String {
        BASE64_STANDARD.encode(sha2::Sha256::digest(KEY_BYTES))
    }

    fn encrypted_request(prefix: &str) -> StorageRequest {
        StorageRequest::new()
            .with_header(&format!("{prefix}-key"), &key_b64())
            .with_header(&format!("{prefix}-key-sha256"), &key_hash_b64())
            .with_header(&format!("{prefix}-algorithm"), "AES256")
    }

    #[test]
    fn test_should_validate_consistent_key_headers() {
        let descriptor = validate_key_headers(
            Some(&key_b64()),
            Some(&key_hash_b64()),
            Some("AES256"),
        )
        .expect("valid triple");
        assert_eq!(descriptor.encryption_algorithm, "AES256");
        assert_eq!(descriptor.key_sha256, key_hash_b64());
    }

    #[test]
    fn test_should_reject_unknown_algorithm() {
        let result = validate_key_headers(Some(&key_b64()), Some(&key_hash_b64()), Some("AES128"));
        assert!(result.is_err());
    }

    #[test]
    fn test_should_reject_missing_algorithm() {
        let result = validate_key_headers(Some(&key_b64()), Some(&key_hash_b64()), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_reject_key_that_is_not_base64() {
        let result = validate_key_headers(Some("!!!"), Some(&key_hash_b64()), Some("AES256"));
        assert!(result.is_err());
    }

    #[test]
    fn test_should_reject_key_of_wrong_length() {
        let short = BASE64_STANDARD.encode(b"short-key");
        let result = validate_key_headers(Some(&short), Some(&key_hash_b64()), Some("AES256"));
        assert!(result.is_err());
    }

    #[test]
    fn test_should_reject_mismatched_key_hash() {
        let wrong_hash = BASE64_STANDARD.encode(sha2::Sha256::digest(b"other"));
        let result = validate_key_headers(Some(&key_b64()), Some(&wrong_hash), Some("AES256"));
        assert!(result.is_err());
    }

    #[test]
    fn test_should_capture_nothing_without_key_header() {
        let request = StorageRequest::new();
        let captured = capture_customer_encryption(&request).expect("no-op capture");
        assert!(captured.is_none());
    }

    #[test]
    fn test_should_capture_descriptor_from_key_headers() {
        let request = encrypted_request(ENCRYPTION_PREFIX);
        let captured = capture_customer_encryption(&request).expect("capture");
        assert_eq!(
            captured.map(|d| d.key_sha256),
            Some(key_hash_b64()),
        );
    }

    #[test]
    fn test_should_allow_plain_read_of_unencrypted_object() {
        let request = StorageRequest::new();
        assert!(validate_encryption_for_read(&request, None, ENCRYPTION_PREFIX).is_ok());
    }

    #[test]
    fn test_should_reject_key_sent_for_unencrypted_object() {
        let request = encrypted_request(ENCRYPTION_PREFIX);
        let result = validate_encryption_for_read(&request, None, ENCRYPTION_PREFIX);
        assert!(matches!(result, Err(StorageError::BadRequest { .. })));
    }

    #[test]
    fn test_should_require_matching_key_for_encrypted_object() {
        let descriptor = CustomerEncryption {
            encryption_algorithm: "AES256".to_owned(),
            key_sha256: key_hash_b64(),
        };

        let request = encrypted_request(ENCRYPTION_PREFIX);
        assert!(
            validate_encryption_for_read(&request, Some(&descriptor), ENCRYPTION_PREFIX).is_ok()
        );

        // Reading with no key at all fails.
        let bare = StorageRequest::new();
        assert!(validate_encryption_for_read(&bare, Some(&descriptor), ENCRYPTION_PREFIX).is_err());

        // Reading with a different key fails.
        let other_key = BASE64_STANDARD.encode(b"ffffffffffffffffffffffffffffffff");
        let other_hash = BASE64_STANDARD.encode(sha2::Sha256::digest(
            b"ffffffffffffffffffffffffffffffff",
        ));
        let mismatched = StorageRequest::new()
            .with_header("x-goog-encryption-key", &other_key)
            .with_header("x-goog-encryption-key-sha256", &other_hash)
            .with_header("x-goog-encryption-algorithm", "AES256");
        assert!(
            validate_encryption_for_read(&mismatched, Some(&descriptor), ENCRYPTION_PREFIX)
                .is_err()
        );
    }

    #[test]
    fn test_should_validate_source_key_with_copy_prefix() {
        let descriptor = CustomerEncryption {
            encryption_algorithm: "AES256".to_owned(),
            key_sha256: key_hash_b64(),
        };

        let request = encrypted_request(COPY_SOURCE_ENCRYPTION_PREFIX);
        assert!(
            validate_encryption_for_read(
                &request,
                Some(&descriptor),
                COPY_SOURCE_ENCRYPTION_PREFIX
            )
            .is_ok()
        );

        // The plain-prefix headers are not consulted for the source check.
        let plain = encrypted_request(ENCRYPTION_PREFIX);
        assert!(
            validate_encryption_for_read(&plain, Some(&descriptor), COPY_SOURCE_ENCRYPTION_PREFIX)
                .is_err()
        );
    }
}
