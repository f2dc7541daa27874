//! A named object and its generation history.
//!
//! [`GcsObject`] owns the full set of revisions of one `(bucket, name)`
//! pair, the current-generation pointer, and the table of in-progress
//! rewrite operations targeting it. Revisions are never handed out mutably
//! to callers outside this module's API, which keeps the pointer consistent
//! with map membership.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use gcstack_storage_model::{
    AclRole, ObjectAccessControl, StorageError, StorageRequest, StorageResult,
};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::StorageConfig;
use crate::encryption::ENCRYPTION_PREFIX;
use crate::preconditions::PreconditionSet;
use crate::upload::{self, UploadKind};

use super::bucket::GcsBucket;
use super::revision::GcsObjectRevision;
use super::rewrite::{RewriteArguments, RewriteOperation};

/// A named object: its revisions, current-generation pointer, and rewrite
/// operations.
#[derive(Debug)]
pub struct GcsObject {
    bucket_name: String,
    name: String,
    /// The current generation; doubles as the insert counter. Zero means no
    /// revision exists.
    generation: i64,
    revisions: BTreeMap<i64, GcsObjectRevision>,
    rewrite_id_generator: u64,
    rewrite_operations: HashMap<String, RewriteOperation>,
}

impl GcsObject {
    /// Create an empty object entry.
    #[must_use]
    pub fn new(bucket_name: &str, name: &str) -> Self {
        Self {
            bucket_name: bucket_name.to_owned(),
            name: name.to_owned(),
            generation: 0,
            revisions: BTreeMap::new(),
            rewrite_id_generator: 0,
            rewrite_operations: HashMap::new(),
        }
    }

    /// The object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The containing bucket's name.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// The current generation, or 0 when no revision exists.
    #[must_use]
    pub fn current_generation(&self) -> i64 {
        self.generation
    }

    /// The current revision's metageneration, or `None` when no revision
    /// exists.
    #[must_use]
    pub fn current_metageneration(&self) -> Option<i64> {
        self.revisions
            .get(&self.generation)
            .map(|r| r.metadata().metageneration)
    }

    /// Whether the object holds no revisions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// The revision the current-generation pointer refers to.
    #[must_use]
    pub fn get_latest(&self) -> Option<&GcsObjectRevision> {
        self.revisions.get(&self.generation)
    }

    /// A revision by generation number.
    #[must_use]
    pub fn revision_by_generation(&self, generation: i64) -> Option<&GcsObjectRevision> {
        self.revisions.get(&generation)
    }

    /// Resolve the revision a request addresses.
    ///
    /// `version_field_name` is the query parameter carrying the generation,
    /// typically `generation` but `sourceGeneration` for copy and rewrite.
    /// Without the parameter the current revision is returned.
    pub fn get_revision(
        &self,
        request: &StorageRequest,
        version_field_name: &str,
    ) -> StorageResult<&GcsObjectRevision> {
        match request.query_i64(version_field_name)? {
            None => self.get_latest().ok_or_else(|| {
                StorageError::not_found(format!("object {} has no revisions", self.name))
            }),
            Some(generation) => self.revisions.get(&generation).ok_or_else(|| {
                StorageError::not_found(format!(
                    "generation {generation} not found in object {}",
                    self.name
                ))
            }),
        }
    }

    /// Delete one revision.
    ///
    /// Without a `generation` parameter the current revision is deleted.
    /// Returns `true` when the last revision went away, so the owner can
    /// drop the object entry. Deleting the current revision retargets the
    /// pointer to the highest surviving generation.
    pub fn del_revision(&mut self, request: &StorageRequest) -> StorageResult<bool> {
        let generation = request.query_i64("generation")?.unwrap_or(self.generation);
        self.revisions.remove(&generation).ok_or_else(|| {
            StorageError::not_found(format!(
                "generation {generation} not found in object {}",
                self.name
            ))
        })?;
        debug!(
            bucket = %self.bucket_name,
            object = %self.name,
            generation,
            "deleted revision"
        );

        if self.revisions.is_empty() {
            self.generation = 0;
            return Ok(true);
        }
        if generation == self.generation {
            if let Some(&last) = self.revisions.keys().next_back() {
                self.generation = last;
            }
        }
        Ok(false)
    }

    /// Update a revision's metadata from the request's JSON body.
    pub fn update_revision(
        &mut self,
        request: &StorageRequest,
    ) -> StorageResult<&GcsObjectRevision> {
        let metadata = request.json_body()?;
        let revision = self.revision_mut_for(request)?;
        revision.update_from_metadata(&metadata)?;
        Ok(&*revision)
    }

    /// Apply a restricted metadata patch from the request's JSON body.
    pub fn patch_revision(
        &mut self,
        request: &StorageRequest,
    ) -> StorageResult<&GcsObjectRevision> {
        let patch = request.json_body()?;
        let revision = self.revision_mut_for(request)?;
        revision.apply_patch(&patch)?;
        Ok(&*revision)
    }

    fn revision_mut_for(
        &mut self,
        request: &StorageRequest,
    ) -> StorageResult<&mut GcsObjectRevision> {
        let generation = request.query_i64("generation")?.unwrap_or(self.generation);
        self.revisions.get_mut(&generation).ok_or_else(|| {
            StorageError::not_found(format!(
                "generation {generation} not found in object {}",
                self.name
            ))
        })
    }

    // -- per-revision ACL operations -------------------------------------

    /// Insert (or update) an ACL entry on the revision a request addresses.
    pub fn insert_acl(
        &mut self,
        request: &StorageRequest,
        entity: &str,
        role: AclRole,
    ) -> StorageResult<ObjectAccessControl> {
        Ok(self.revision_mut_for(request)?.insert_acl(entity, role))
    }

    /// Update an ACL entry on the revision a request addresses.
    pub fn update_acl(
        &mut self,
        request: &StorageRequest,
        entity: &str,
        role: AclRole,
    ) -> StorageResult<ObjectAccessControl> {
        Ok(self.revision_mut_for(request)?.update_acl(entity, role))
    }

    /// Get an ACL entry from the revision a request addresses.
    pub fn get_acl(
        &self,
        request: &StorageRequest,
        entity: &str,
    ) -> StorageResult<ObjectAccessControl> {
        Ok(self
            .get_revision(request, "generation")?
            .get_acl(entity)?
            .clone())
    }

    /// Delete an ACL entry from the revision a request addresses.
    pub fn delete_acl(&mut self, request: &StorageRequest, entity: &str) -> StorageResult<()> {
        self.revision_mut_for(request)?.delete_acl(entity)
    }

    /// Patch an ACL entry on the revision a request addresses.
    pub fn patch_acl(
        &mut self,
        request: &StorageRequest,
        entity: &str,
    ) -> StorageResult<ObjectAccessControl> {
        self.revision_mut_for(request)?.patch_acl(entity, request)
    }

    /// Verify the standard precondition parameters against current state.
    pub fn check_preconditions(&self, request: &StorageRequest) -> StorageResult<()> {
        PreconditionSet::standard(request)?.check(self.generation, self.current_metageneration())
    }

    /// Verify the source-object precondition parameters (used when this
    /// object is the source of a copy or rewrite).
    pub fn check_source_preconditions(&self, request: &StorageRequest) -> StorageResult<()> {
        PreconditionSet::source(request)?.check(self.generation, self.current_metageneration())
    }

    // -- inserts ---------------------------------------------------------

    /// Insert a new revision from a simple upload: the raw body is the
    /// payload, metadata comes solely from headers.
    pub fn insert(
        &mut self,
        config: &StorageConfig,
        bucket: &GcsBucket,
        request: &StorageRequest,
    ) -> StorageResult<&GcsObjectRevision> {
        let generation = self.generation + 1;
        let mut revision = GcsObjectRevision::new(
            config,
            bucket,
            &self.name,
            generation,
            request,
            request.body.clone(),
        )?;
        revision.tag_upload(UploadKind::Simple, None);
        Ok(self.install_revision(bucket.versioning_enabled(), generation, revision))
    }

    /// Insert a new revision from a `multipart/related` upload.
    ///
    /// The resource part's overrides apply after construction; a content
    /// type in the media part's own headers wins over the resource's value.
    pub fn insert_multipart(
        &mut self,
        config: &StorageConfig,
        bucket: &GcsBucket,
        request: &StorageRequest,
    ) -> StorageResult<&GcsObjectRevision> {
        let decoded = upload::parse_multipart_related(request)?;
        let generation = self.generation + 1;
        let mut revision = GcsObjectRevision::new(
            config,
            bucket,
            &self.name,
            generation,
            request,
            decoded.media,
        )?;
        let caller_md5 = decoded
            .resource
            .get("md5Hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        revision.tag_upload(UploadKind::Multipart, Some(&caller_md5));
        revision.update_from_metadata(&decoded.resource)?;
        if let Some(content_type) = decoded.media_content_type {
            revision.update_from_metadata(&json!({ "contentType": content_type }))?;
        }
        Ok(self.install_revision(bucket.versioning_enabled(), generation, revision))
    }

    /// Insert a new revision through the XML API: the raw body is the
    /// payload and a caller-declared `md5=` digest, when present, overrides
    /// the computed checksum.
    pub fn insert_xml(
        &mut self,
        config: &StorageConfig,
        bucket: &GcsBucket,
        request: &StorageRequest,
    ) -> StorageResult<&GcsObjectRevision> {
        let caller_md5 = upload::extract_xml_md5(request);
        let generation = self.generation + 1;
        let mut revision = GcsObjectRevision::new(
            config,
            bucket,
            &self.name,
            generation,
            request,
            request.body.clone(),
        )?;
        revision.tag_upload(UploadKind::Xml, caller_md5.as_deref());
        if let Some(md5_hash) = caller_md5 {
            revision.override_md5(md5_hash);
        }
        Ok(self.install_revision(bucket.versioning_enabled(), generation, revision))
    }

    /// Insert a new revision by copying a source revision's payload.
    ///
    /// The caller's right to read the source is validated first; the
    /// destination ACL is reset from `destinationPredefinedAcl` and the
    /// request body supplies destination metadata overrides.
    pub fn copy_from(
        &mut self,
        config: &StorageConfig,
        bucket: &GcsBucket,
        request: &StorageRequest,
        source: &GcsObjectRevision,
    ) -> StorageResult<&GcsObjectRevision> {
        source.validate_encryption_for_read(request, ENCRYPTION_PREFIX)?;
        let generation = self.generation + 1;
        let mut revision = GcsObjectRevision::new(
            config,
            bucket,
            &self.name,
            generation,
            request,
            source.media().clone(),
        )?;
        revision.reset_predefined_acl(
            bucket.owner_entity(),
            destination_predefined_acl(request)?,
        );
        let metadata = request.json_body_or_default()?;
        revision.update_from_metadata(&metadata)?;
        Ok(self.install_revision(bucket.versioning_enabled(), generation, revision))
    }

    /// Insert a new revision from a collaborator-assembled composite
    /// payload. Destination metadata comes from the request's `destination`
    /// field when present.
    pub fn compose_from(
        &mut self,
        config: &StorageConfig,
        bucket: &GcsBucket,
        request: &StorageRequest,
        composed: Bytes,
    ) -> StorageResult<&GcsObjectRevision> {
        let generation = self.generation + 1;
        let mut revision =
            GcsObjectRevision::new(config, bucket, &self.name, generation, request, composed)?;
        revision.reset_predefined_acl(
            bucket.owner_entity(),
            destination_predefined_acl(request)?,
        );
        let payload = request.json_body_or_default()?;
        if let Some(destination) = payload.get("destination") {
            revision.update_from_metadata(destination)?;
        }
        Ok(self.install_revision(bucket.versioning_enabled(), generation, revision))
    }

    /// Finalize a rewrite into this object: checks the destination
    /// preconditions, then materializes the source payload with the pending
    /// destination-metadata overrides.
    pub fn rewrite_finish(
        &mut self,
        config: &StorageConfig,
        bucket: &GcsBucket,
        request: &StorageRequest,
        destination_metadata: &Value,
        payload: Bytes,
    ) -> StorageResult<&GcsObjectRevision> {
        self.check_preconditions(request)?;
        let generation = self.generation + 1;
        let mut revision =
            GcsObjectRevision::new(config, bucket, &self.name, generation, request, payload)?;
        revision.update_from_metadata(destination_metadata)?;
        Ok(self.install_revision(bucket.versioning_enabled(), generation, revision))
    }

    /// Install a constructed revision under `generation`.
    ///
    /// With versioning disabled the whole history is replaced; otherwise the
    /// history grows. The current-generation pointer is committed here, so a
    /// construction failure earlier in the operation leaves the object
    /// untouched.
    fn install_revision(
        &mut self,
        versioning_enabled: bool,
        generation: i64,
        revision: GcsObjectRevision,
    ) -> &GcsObjectRevision {
        if !versioning_enabled {
            self.revisions.clear();
        }
        self.generation = generation;
        debug!(
            bucket = %self.bucket_name,
            object = %self.name,
            generation,
            versioned = versioning_enabled,
            "installed revision"
        );
        self.revisions.entry(generation).or_insert(revision)
    }

    // -- rewrite operations ----------------------------------------------

    /// Start a new rewrite operation targeting this object.
    ///
    /// Captures the fixed argument set and the request's destination
    /// metadata; the operation is returned un-stored, matching the
    /// pop-then-possibly-reinsert lifecycle of continuation tokens.
    pub fn begin_rewrite(
        &mut self,
        request: &StorageRequest,
        destination_bucket: &str,
        destination_object: &str,
        source_generation: i64,
    ) -> StorageResult<RewriteOperation> {
        self.rewrite_id_generator += 1;
        Ok(RewriteOperation {
            id: self.rewrite_id_generator,
            original_arguments: RewriteArguments::capture(
                request,
                destination_bucket,
                destination_object,
            ),
            source_generation,
            bytes_rewritten: 0,
            destination_metadata: request.json_body_or_default()?,
        })
    }

    /// Remove and return the operation a continuation token refers to.
    ///
    /// The operation is removed, not just looked up: if this call fails or
    /// completes the rewrite, no stale entry survives. An unknown or
    /// already-consumed token is `Gone`.
    pub fn take_rewrite_operation(&mut self, token: &str) -> StorageResult<RewriteOperation> {
        self.rewrite_operations
            .remove(token)
            .ok_or_else(|| StorageError::Gone {
                token: token.to_owned(),
            })
    }

    /// Persist an in-progress operation under a freshly derived token.
    pub fn store_rewrite_operation(&mut self, token: String, operation: RewriteOperation) {
        self.rewrite_operations.insert(token, operation);
    }

    /// Number of in-progress rewrite operations targeting this object.
    #[must_use]
    pub fn pending_rewrites(&self) -> usize {
        self.rewrite_operations.len()
    }
}

/// Parse the `destinationPredefinedAcl` parameter, defaulting to the
/// project-private policy.
fn destination_predefined_acl(
    request: &StorageRequest,
) -> StorageResult<gcstack_storage_model::PredefinedAcl> {
    match request.query("destinationPredefinedAcl") {
        None => Ok(gcstack_storage_model::PredefinedAcl::default()),
        Some(raw) => raw
            .parse()
            .map_err(|e: gcstack_storage_model::types::ParsePredefinedAclError| {
                StorageError::bad_request(e.to_string())
            }),
    }
}
