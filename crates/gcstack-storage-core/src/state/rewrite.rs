//! Rewrite operation state.
//!
//! A rewrite is a chunked, resumable server-side copy. Each in-progress
//! operation is keyed by an opaque continuation token in the *destination*
//! object's table. The token reversibly encodes the operation id, the
//! destination path, the source generation, and the cumulative byte count,
//! so every progress step issues a distinct, non-replayable token.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use gcstack_storage_model::StorageRequest;

/// Bytes copied per rewrite call.
pub const REWRITE_CHUNK_BYTES: u64 = 1024 * 1024;

/// The request arguments that must not change between continuation calls of
/// one rewrite operation.
///
/// Values are kept as the raw query strings; `PartialEq` therefore compares
/// per named argument by value, with both-absent counting as equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteArguments {
    /// `destinationKmsKeyName`.
    pub destination_kms_key_name: Option<String>,
    /// `destinationPredefinedAcl`.
    pub destination_predefined_acl: Option<String>,
    /// `ifGenerationMatch`.
    pub if_generation_match: Option<String>,
    /// `ifGenerationNotMatch`.
    pub if_generation_not_match: Option<String>,
    /// `ifMetagenerationMatch`.
    pub if_metageneration_match: Option<String>,
    /// `ifMetagenerationNotMatch`.
    pub if_metageneration_not_match: Option<String>,
    /// `ifSourceGenerationMatch`.
    pub if_source_generation_match: Option<String>,
    /// `ifSourceGenerationNotMatch`.
    pub if_source_generation_not_match: Option<String>,
    /// `ifSourceMetagenerationMatch`.
    pub if_source_metageneration_match: Option<String>,
    /// `ifSourceMetagenerationNotMatch`.
    pub if_source_metageneration_not_match: Option<String>,
    /// `maxBytesRewrittenPerCall` (captured for drift detection only; the
    /// chunk size itself is fixed).
    pub max_bytes_rewritten_per_call: Option<String>,
    /// `projection`.
    pub projection: Option<String>,
    /// `sourceGeneration`.
    pub source_generation: Option<String>,
    /// `userProject`.
    pub user_project: Option<String>,
    /// The destination bucket the operation was started against.
    pub destination_bucket: String,
    /// The destination object the operation was started against.
    pub destination_object: String,
}

impl RewriteArguments {
    /// Capture the fixed arguments from a rewrite request.
    #[must_use]
    pub fn capture(
        request: &StorageRequest,
        destination_bucket: &str,
        destination_object: &str,
    ) -> Self {
        let arg = |name: &str| request.query(name).map(str::to_owned);
        Self {
            destination_kms_key_name: arg("destinationKmsKeyName"),
            destination_predefined_acl: arg("destinationPredefinedAcl"),
            if_generation_match: arg("ifGenerationMatch"),
            if_generation_not_match: arg("ifGenerationNotMatch"),
            if_metageneration_match: arg("ifMetagenerationMatch"),
            if_metageneration_not_match: arg("ifMetagenerationNotMatch"),
            if_source_generation_match: arg("ifSourceGenerationMatch"),
            if_source_generation_not_match: arg("ifSourceGenerationNotMatch"),
            if_source_metageneration_match: arg("ifSourceMetagenerationMatch"),
            if_source_metageneration_not_match: arg("ifSourceMetagenerationNotMatch"),
            max_bytes_rewritten_per_call: arg("maxBytesRewrittenPerCall"),
            projection: arg("projection"),
            source_generation: arg("sourceGeneration"),
            user_project: arg("userProject"),
            destination_bucket: destination_bucket.to_owned(),
            destination_object: destination_object.to_owned(),
        }
    }
}

/// One in-progress rewrite operation.
#[derive(Debug, Clone)]
pub struct RewriteOperation {
    /// Monotonically increasing id, scoped to the destination object.
    pub id: u64,
    /// The arguments captured from the initiating request.
    pub original_arguments: RewriteArguments,
    /// The source generation being read, resolved at start time.
    pub source_generation: i64,
    /// Cumulative bytes rewritten so far.
    pub bytes_rewritten: u64,
    /// The pending destination-metadata payload from the request body.
    pub destination_metadata: serde_json::Value,
}

/// The decoded fields of a rewrite token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteTokenParts {
    /// The operation id.
    pub id: u64,
    /// The destination bucket.
    pub destination_bucket: String,
    /// The destination object.
    pub destination_object: String,
    /// The source generation.
    pub source_generation: i64,
    /// Cumulative bytes rewritten when the token was issued.
    pub bytes_rewritten: u64,
}

/// Encode a rewrite continuation token.
///
/// The encoding is stable across a rewrite's lifetime and unique per
/// progress step; callers must treat the result as opaque.
#[must_use]
pub fn encode_rewrite_token(
    id: u64,
    destination_bucket: &str,
    destination_object: &str,
    source_generation: i64,
    bytes_rewritten: u64,
) -> String {
    BASE64_STANDARD.encode(format!(
        "{id}/{destination_bucket}/{destination_object}/{source_generation}/{bytes_rewritten}"
    ))
}

/// Decode a rewrite continuation token produced by [`encode_rewrite_token`].
///
/// Returns `None` for tokens this simulator did not issue. Object names may
/// themselves contain `/`, so the object field is everything between the
/// bucket and the two trailing numeric fields.
#[must_use]
pub fn decode_rewrite_token(token: &str) -> Option<RewriteTokenParts> {
    let decoded = BASE64_STANDARD.decode(token).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let fields: Vec<&str> = decoded.split('/').collect();
    if fields.len() < 5 {
        return None;
    }
    let id = fields[0].parse().ok()?;
    let bytes_rewritten = fields[fields.len() - 1].parse().ok()?;
    let source_generation = fields[fields.len() - 2].parse().ok()?;
    Some(RewriteTokenParts {
        id,
        destination_bucket: fields[1].to_owned(),
        destination_object: fields[2..fields.len() - 2].join("/"),
        source_generation,
        bytes_rewritten,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_roundtrip_rewrite_token() {
        let token = encode_rewrite_token(7, "dst-bkt", "dst-obj", 3, 2_097_152);
        let parts = decode_rewrite_token(&token).expect("decode");
        assert_eq!(
            parts,
            RewriteTokenParts {
                id: 7,
                destination_bucket: "dst-bkt".to_owned(),
                destination_object: "dst-obj".to_owned(),
                source_generation: 3,
                bytes_rewritten: 2_097_152,
            }
        );
    }

    #[test]
    fn test_should_roundtrip_token_with_slashes_in_object_name() {
        let token = encode_rewrite_token(1, "bkt", "a/b/c.txt", 2, 0);
        let parts = decode_rewrite_token(&token).expect("decode");
        assert_eq!(parts.destination_object, "a/b/c.txt");
        assert_eq!(parts.destination_bucket, "bkt");
    }

    #[test]
    fn test_should_issue_distinct_tokens_per_progress_step() {
        let a = encode_rewrite_token(1, "bkt", "obj", 1, 1_048_576);
        let b = encode_rewrite_token(1, "bkt", "obj", 1, 2_097_152);
        assert_ne!(a, b);
    }

    #[test]
    fn test_should_reject_foreign_tokens() {
        assert!(decode_rewrite_token("not-base64!").is_none());
        let garbage = BASE64_STANDARD.encode("only/three/fields");
        assert!(decode_rewrite_token(&garbage).is_none());
    }

    #[test]
    fn test_should_compare_arguments_by_value() {
        let request = StorageRequest::new()
            .with_query("ifGenerationMatch", "4")
            .with_query("projection", "full");
        let a = RewriteArguments::capture(&request, "bkt", "obj");
        let b = RewriteArguments::capture(&request, "bkt", "obj");
        assert_eq!(a, b);

        let drifted = StorageRequest::new()
            .with_query("ifGenerationMatch", "5")
            .with_query("projection", "full");
        let c = RewriteArguments::capture(&drifted, "bkt", "obj");
        assert_ne!(a, c);
    }

    #[test]
    fn test_should_treat_both_absent_arguments_as_equal() {
        let a = RewriteArguments::capture(&StorageRequest::new(), "bkt", "obj");
        let b = RewriteArguments::capture(&StorageRequest::new(), "bkt", "obj");
        assert_eq!(a, b);
        assert!(a.destination_kms_key_name.is_none());
    }
}
