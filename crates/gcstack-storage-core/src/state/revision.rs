//! A single object revision.
//!
//! A [`GcsObjectRevision`] is an immutable-once-created snapshot of one
//! generation: the payload bytes plus the metadata resource. The payload is
//! never mutated after construction; metadata mutations (update, patch, ACL
//! changes) bump the metageneration counter.

use bytes::Bytes;
use chrono::Utc;
use gcstack_storage_model::{
    AclRole, CustomerEncryption, ObjectAccessControl, ObjectMetadata, Owner, PredefinedAcl,
    StorageError, StorageRequest, StorageResult,
};
use serde_json::Value;
use tracing::debug;

use crate::acl;
use crate::checksums::{compute_crc32c, compute_md5, corrupt_payload};
use crate::config::StorageConfig;
use crate::encryption::capture_customer_encryption;
use crate::upload::{CALLER_MD5_KEY, UPLOAD_MARKER_KEY, UploadKind};

use super::bucket::GcsBucket;

/// Header a test client can set to make the simulator misbehave on purpose.
pub const INSTRUCTIONS_HEADER: &str = "x-gcstack-instructions";

/// Instruction value requesting corrupted payload data.
pub const INJECT_UPLOAD_DATA_ERROR: &str = "inject-upload-data-error";

/// The metadata keys a patch may touch. Anything else is not writable.
const WRITABLE_KEYS: [&str; 7] = [
    "acl",
    "cacheControl",
    "contentDisposition",
    "contentEncoding",
    "contentLanguage",
    "contentType",
    "metadata",
];

/// Current UTC time in the `%Y-%m-%dT%H:%M:%SZ` form the resource uses.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// One generation of an object: payload plus metadata.
#[derive(Debug, Clone)]
pub struct GcsObjectRevision {
    /// Base URL used when re-stamping `selfLink`.
    base_url: String,
    /// The payload bytes, fixed at construction.
    media: Bytes,
    /// The metadata resource.
    metadata: ObjectMetadata,
}

impl GcsObjectRevision {
    /// Construct a new revision.
    ///
    /// Stamps timestamps and checksums, applies the injected-corruption test
    /// hook if requested, resolves the content type from the request
    /// headers, captures any customer-supplied encryption key, and applies
    /// the predefined-ACL directives (`predefinedAcl` query parameter, then
    /// the `x-goog-acl` header, which wins when recognized).
    pub fn new(
        config: &StorageConfig,
        bucket: &GcsBucket,
        name: &str,
        generation: i64,
        request: &StorageRequest,
        media: Bytes,
    ) -> StorageResult<Self> {
        let media = if request.header(INSTRUCTIONS_HEADER) == Some(INJECT_UPLOAD_DATA_ERROR) {
            Bytes::from(corrupt_payload(&media))
        } else {
            media
        };

        let now = timestamp();
        let metadata = ObjectMetadata {
            bucket: bucket.name.clone(),
            name: name.to_owned(),
            generation,
            metageneration: 0,
            time_created: now.clone(),
            updated: now,
            location: config.default_location.clone(),
            storage_class: config.default_storage_class.clone(),
            size: media.len() as u64,
            etag: "XYZ=".to_owned(),
            project_number: config.project_number.clone(),
            owner: Owner {
                entity: config.project_owner_entity(),
                entity_id: String::new(),
            },
            md5_hash: compute_md5(&media),
            crc32c: compute_crc32c(&media),
            content_type: request.header("content-type").map(str::to_owned),
            ..ObjectMetadata::default()
        };

        let mut revision = Self {
            base_url: config.base_url.clone(),
            media,
            metadata,
        };
        // Stamp the derived fields (kind, id, selfLink, ...) and move the
        // metageneration to its initial value of 1.
        revision.update_from_metadata(&Value::Object(serde_json::Map::new()))?;

        revision.metadata.customer_encryption = capture_customer_encryption(request)?;

        let policy = match request.query("predefinedAcl") {
            None => PredefinedAcl::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e: <PredefinedAcl as std::str::FromStr>::Err| {
                    StorageError::bad_request(e.to_string())
                })?,
        };
        acl::apply_predefined_acl(&mut revision.metadata, bucket.owner_entity(), policy);

        if let Some(header) = request.header("x-goog-acl") {
            let policy = PredefinedAcl::from_header(header).ok_or_else(|| {
                StorageError::bad_request(format!("invalid predefinedAcl value {header}"))
            })?;
            acl::apply_predefined_acl(&mut revision.metadata, bucket.owner_entity(), policy);
        }

        Ok(revision)
    }

    /// The payload bytes.
    #[must_use]
    pub fn media(&self) -> &Bytes {
        &self.media
    }

    /// The metadata resource.
    #[must_use]
    pub fn metadata(&self) -> &ObjectMetadata {
        &self.metadata
    }

    /// The generation of this revision.
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.metadata.generation
    }

    /// The customer-encryption descriptor, if any.
    #[must_use]
    pub fn encryption(&self) -> Option<&CustomerEncryption> {
        self.metadata.customer_encryption.as_ref()
    }

    /// Apply a metadata resource on top of the existing metadata.
    ///
    /// Recognized resource fields (content headers, `md5Hash`,
    /// `storageClass`, `acl`, the custom `metadata` map) override the stored
    /// values; unrecognized fields are ignored. Protected fields (kind,
    /// bucket, name, id, selfLink, projectNumber, updated) are re-stamped
    /// afterwards so a resource can never change them, the metageneration is
    /// bumped, and the checksum invariant is re-validated.
    pub fn update_from_metadata(&mut self, resource: &Value) -> StorageResult<()> {
        let map = resource
            .as_object()
            .ok_or_else(|| StorageError::bad_request("metadata payload must be a JSON object"))?;

        // Stage the update on a copy so a failed validation leaves the
        // stored metadata untouched.
        let mut updated = self.metadata.clone();
        for (key, value) in map {
            match key.as_str() {
                "contentType" => updated.content_type = owned_string(value),
                "cacheControl" => updated.cache_control = owned_string(value),
                "contentDisposition" => updated.content_disposition = owned_string(value),
                "contentEncoding" => updated.content_encoding = owned_string(value),
                "contentLanguage" => updated.content_language = owned_string(value),
                "md5Hash" => {
                    if let Some(hash) = owned_string(value) {
                        updated.md5_hash = hash;
                    }
                }
                "storageClass" => {
                    if let Some(class) = owned_string(value) {
                        updated.storage_class = class;
                    }
                }
                "acl" => updated.acl = parse_acl_list(value)?,
                "metadata" => merge_custom_metadata(&mut updated, value)?,
                _ => {}
            }
        }

        // Some values cannot be changed via updates, so always re-stamp them.
        updated.kind = "storage#object".to_owned();
        updated.id = format!("{}/o/{}/{}", updated.bucket, updated.name, updated.generation);
        updated.self_link = format!("{}{}", self.base_url, updated.name);
        updated.updated = timestamp();
        updated.metageneration += 1;

        let expected = compute_md5(&self.media);
        if updated.md5_hash != expected {
            return Err(StorageError::ChecksumMismatch {
                expected,
                actual: updated.md5_hash,
            });
        }

        self.metadata = updated;
        Ok(())
    }

    /// Apply a restricted metadata patch.
    ///
    /// Only the writable keys may appear; any other key fails before
    /// anything is applied, so a bad patch never partially lands. `null`
    /// deletes a value, the custom `metadata` map is merged per key, and
    /// everything else is replaced wholesale. Bumps the metageneration.
    pub fn apply_patch(&mut self, patch: &Value) -> StorageResult<()> {
        let map = patch
            .as_object()
            .ok_or_else(|| StorageError::bad_request("patch payload must be a JSON object"))?;

        for key in map.keys() {
            if !WRITABLE_KEYS.contains(&key.as_str()) {
                return Err(StorageError::NotWritable { key: key.clone() });
            }
        }

        // Stage on a copy: a patch either fully applies or fully fails.
        let mut updated = self.metadata.clone();
        for (key, value) in map {
            match key.as_str() {
                "contentType" => updated.content_type = owned_string(value),
                "cacheControl" => updated.cache_control = owned_string(value),
                "contentDisposition" => updated.content_disposition = owned_string(value),
                "contentEncoding" => updated.content_encoding = owned_string(value),
                "contentLanguage" => updated.content_language = owned_string(value),
                "acl" => {
                    if value.is_null() {
                        updated.acl.clear();
                    } else {
                        updated.acl = parse_acl_list(value)?;
                    }
                }
                "metadata" => {
                    if value.is_null() {
                        updated.metadata.clear();
                    } else {
                        merge_custom_metadata(&mut updated, value)?;
                    }
                }
                _ => {}
            }
        }

        updated.metageneration += 1;
        self.metadata = updated;
        Ok(())
    }

    /// Validate the stored `md5Hash` against the payload.
    pub fn validate_hashes(&self) -> StorageResult<()> {
        let expected = compute_md5(&self.media);
        if self.metadata.md5_hash != expected {
            return Err(StorageError::ChecksumMismatch {
                expected,
                actual: self.metadata.md5_hash.clone(),
            });
        }
        Ok(())
    }

    /// Overwrite the stored `md5Hash` with a caller-declared digest.
    ///
    /// Used by the XML upload path, where the declared digest is
    /// authoritative and checksum validation is deliberately skipped.
    pub fn override_md5(&mut self, md5_hash: String) {
        debug!(object = %self.metadata.name, "overriding md5Hash with caller digest");
        self.metadata.md5_hash = md5_hash;
    }

    /// Record which decoder produced this revision, and the caller-declared
    /// digest when the path carries one.
    pub fn tag_upload(&mut self, kind: UploadKind, caller_md5: Option<&str>) {
        self.metadata
            .metadata
            .insert(UPLOAD_MARKER_KEY.to_owned(), kind.as_str().to_owned());
        if let Some(md5) = caller_md5 {
            self.metadata
                .metadata
                .insert(CALLER_MD5_KEY.to_owned(), md5.to_owned());
        }
    }

    /// Verify a read request against this revision's encryption descriptor.
    ///
    /// `prefix` is the header family to consult; see
    /// [`crate::encryption::validate_encryption_for_read`].
    pub fn validate_encryption_for_read(
        &self,
        request: &StorageRequest,
        prefix: &str,
    ) -> StorageResult<()> {
        crate::encryption::validate_encryption_for_read(request, self.encryption(), prefix)
    }

    // -- ACL delegation --------------------------------------------------

    /// Insert (or update) an access-control entry.
    pub fn insert_acl(&mut self, entity: &str, role: AclRole) -> ObjectAccessControl {
        acl::insert_acl(&mut self.metadata, entity, role)
    }

    /// Update an access-control entry.
    pub fn update_acl(&mut self, entity: &str, role: AclRole) -> ObjectAccessControl {
        acl::update_acl(&mut self.metadata, entity, role)
    }

    /// Get an access-control entry.
    pub fn get_acl(&self, entity: &str) -> StorageResult<&ObjectAccessControl> {
        acl::get_acl(&self.metadata, entity)
    }

    /// Delete an access-control entry.
    pub fn delete_acl(&mut self, entity: &str) -> StorageResult<()> {
        acl::delete_acl(&mut self.metadata, entity)
    }

    /// Patch an access-control entry.
    pub fn patch_acl(
        &mut self,
        entity: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectAccessControl> {
        acl::patch_acl(&mut self.metadata, entity, request)
    }

    /// Clear the ACL list and reapply a predefined policy.
    pub fn reset_predefined_acl(&mut self, bucket_owner_entity: &str, policy: PredefinedAcl) {
        acl::reset_predefined_acl(&mut self.metadata, bucket_owner_entity, policy);
    }
}

/// Read a JSON value as an owned string; `null` and non-strings read as
/// absent.
fn owned_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_owned)
}

/// Parse an ACL list from a resource or patch payload.
fn parse_acl_list(value: &Value) -> StorageResult<Vec<ObjectAccessControl>> {
    serde_json::from_value(value.clone())
        .map_err(|e| StorageError::bad_request(format!("malformed acl list: {e}")))
}

/// Merge a custom-metadata patch into the stored map, per key: `null`
/// deletes, anything else replaces.
fn merge_custom_metadata(metadata: &mut ObjectMetadata, value: &Value) -> StorageResult<()> {
    let map = value
        .as_object()
        .ok_or_else(|| StorageError::bad_request("metadata field must be a JSON object"))?;
    for (key, value) in map {
        if value.is_null() {
            metadata.metadata.remove(key);
        } else if let Some(s) = value.as_str() {
            metadata.metadata.insert(key.clone(), s.to_owned());
        } else {
            metadata.metadata.insert(key.clone(), value.to_string());
        }
    }
    Ok(())
}
