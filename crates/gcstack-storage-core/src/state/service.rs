//! Top-level simulator state.
//!
//! [`StorageServiceState`] owns the bucket registry and provides the
//! operation surface the dispatch layer calls: per-object CRUD plus the
//! cross-object orchestration (copy, rewrite) that needs to resolve both a
//! source and a destination. The registry is passed into object operations
//! explicitly; nothing reaches for ambient state.
//!
//! Locks are never held across the cross-bucket stages of copy/rewrite —
//! source data is cloned out between stages — so a failure at any stage
//! leaves every entity in its pre-call state.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use gcstack_storage_model::{
    ObjectMetadata, RewriteResponse, StorageError, StorageRequest, StorageResult,
};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::encryption::COPY_SOURCE_ENCRYPTION_PREFIX;
use crate::upload::UploadKind;

use super::bucket::GcsBucket;
use super::object::GcsObject;
use super::rewrite::{REWRITE_CHUNK_BYTES, RewriteArguments, encode_rewrite_token};

/// The simulator's top-level state: configuration plus the bucket registry.
pub struct StorageServiceState {
    config: StorageConfig,
    buckets: DashMap<String, GcsBucket>,
}

impl std::fmt::Debug for StorageServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageServiceState")
            .field("bucket_count", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl Default for StorageServiceState {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

impl StorageServiceState {
    /// Create an empty simulator with the given configuration.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// The simulator configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Create a bucket owned by the configured project.
    pub fn create_bucket(&self, name: &str) -> StorageResult<()> {
        if self.buckets.contains_key(name) {
            return Err(StorageError::bad_request(format!(
                "bucket {name} already exists"
            )));
        }
        let owner = self.config.project_owner_entity();
        self.buckets
            .insert(name.to_owned(), GcsBucket::new(name.to_owned(), owner));
        info!(bucket = %name, "bucket created");
        Ok(())
    }

    /// Look up a bucket.
    pub fn get_bucket(&self, name: &str) -> StorageResult<Ref<'_, String, GcsBucket>> {
        self.buckets
            .get(name)
            .ok_or_else(|| StorageError::not_found(format!("bucket {name} not found")))
    }

    /// Delete an empty bucket.
    pub fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let bucket = self.get_bucket(name)?;
        if !bucket.is_empty() {
            return Err(StorageError::bad_request(format!(
                "bucket {name} is not empty"
            )));
        }
        drop(bucket);
        self.buckets.remove(name);
        info!(bucket = %name, "bucket deleted");
        Ok(())
    }

    // -- object operations ------------------------------------------------

    /// Insert an object revision from a simple upload.
    pub fn insert_object(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectMetadata> {
        self.insert_object_kind(bucket_name, object_name, request, UploadKind::Simple)
    }

    /// Insert an object revision from a `multipart/related` upload.
    pub fn insert_object_multipart(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectMetadata> {
        self.insert_object_kind(bucket_name, object_name, request, UploadKind::Multipart)
    }

    /// Insert an object revision through the XML API.
    pub fn insert_object_xml(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectMetadata> {
        self.insert_object_kind(bucket_name, object_name, request, UploadKind::Xml)
    }

    fn insert_object_kind(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
        kind: UploadKind,
    ) -> StorageResult<ObjectMetadata> {
        let bucket = self.get_bucket(bucket_name)?;
        let mut objects = bucket.objects.write();
        let result = {
            let object = objects
                .entry(object_name.to_owned())
                .or_insert_with(|| GcsObject::new(bucket_name, object_name));
            object.check_preconditions(request).and_then(|()| {
                let revision = match kind {
                    UploadKind::Simple => object.insert(&self.config, &bucket, request),
                    UploadKind::Multipart => object.insert_multipart(&self.config, &bucket, request),
                    UploadKind::Xml => object.insert_xml(&self.config, &bucket, request),
                }?;
                Ok(revision.metadata().clone())
            })
        };
        if result.is_err() {
            remove_if_vacant(&mut objects, object_name);
        }
        result
    }

    /// Fetch an object revision's metadata.
    pub fn get_object_metadata(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectMetadata> {
        let bucket = self.get_bucket(bucket_name)?;
        let objects = bucket.objects.read();
        let object = lookup(&objects, object_name)?;
        object.check_preconditions(request)?;
        Ok(object.get_revision(request, "generation")?.metadata().clone())
    }

    /// Read an object revision's payload, enforcing read-time encryption.
    pub fn read_object(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<(Bytes, ObjectMetadata)> {
        let bucket = self.get_bucket(bucket_name)?;
        let objects = bucket.objects.read();
        let object = lookup(&objects, object_name)?;
        object.check_preconditions(request)?;
        let revision = object.get_revision(request, "generation")?;
        revision.validate_encryption_for_read(request, crate::encryption::ENCRYPTION_PREFIX)?;
        Ok((revision.media().clone(), revision.metadata().clone()))
    }

    /// Delete an object revision; the object entry itself goes away with its
    /// last revision.
    pub fn delete_object(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<()> {
        let bucket = self.get_bucket(bucket_name)?;
        let mut objects = bucket.objects.write();
        let object = objects.get_mut(object_name).ok_or_else(|| {
            StorageError::not_found(format!("object {object_name} not found"))
        })?;
        object.check_preconditions(request)?;
        let now_empty = object.del_revision(request)?;
        if now_empty {
            objects.remove(object_name);
            debug!(bucket = %bucket_name, object = %object_name, "object removed");
        }
        Ok(())
    }

    /// Update an object revision's metadata from the request body.
    pub fn update_object(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectMetadata> {
        let bucket = self.get_bucket(bucket_name)?;
        let mut objects = bucket.objects.write();
        let object = objects.get_mut(object_name).ok_or_else(|| {
            StorageError::not_found(format!("object {object_name} not found"))
        })?;
        object.check_preconditions(request)?;
        Ok(object.update_revision(request)?.metadata().clone())
    }

    /// Patch an object revision's metadata from the request body.
    pub fn patch_object(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
    ) -> StorageResult<ObjectMetadata> {
        let bucket = self.get_bucket(bucket_name)?;
        let mut objects = bucket.objects.write();
        let object = objects.get_mut(object_name).ok_or_else(|| {
            StorageError::not_found(format!("object {object_name} not found"))
        })?;
        object.check_preconditions(request)?;
        Ok(object.patch_revision(request)?.metadata().clone())
    }

    /// Copy a source revision into a destination object.
    pub fn copy_object(
        &self,
        request: &StorageRequest,
        source_bucket: &str,
        source_object: &str,
        destination_bucket: &str,
        destination_object: &str,
    ) -> StorageResult<ObjectMetadata> {
        // Resolve and validate the source, cloning the revision out so no
        // lock is held across the destination stage.
        let source_revision = {
            let bucket = self.get_bucket(source_bucket)?;
            let objects = bucket.objects.read();
            let object = lookup(&objects, source_object)?;
            object.check_source_preconditions(request)?;
            object.get_revision(request, "sourceGeneration")?.clone()
        };

        let bucket = self.get_bucket(destination_bucket)?;
        let mut objects = bucket.objects.write();
        let result = {
            let object = objects
                .entry(destination_object.to_owned())
                .or_insert_with(|| GcsObject::new(destination_bucket, destination_object));
            object.check_preconditions(request).and_then(|()| {
                let revision = object.copy_from(&self.config, &bucket, request, &source_revision)?;
                Ok(revision.metadata().clone())
            })
        };
        if result.is_err() {
            remove_if_vacant(&mut objects, destination_object);
        }
        result
    }

    /// Compose a collaborator-assembled payload into a destination object.
    pub fn compose_object(
        &self,
        bucket_name: &str,
        object_name: &str,
        request: &StorageRequest,
        composed: Bytes,
    ) -> StorageResult<ObjectMetadata> {
        let bucket = self.get_bucket(bucket_name)?;
        let mut objects = bucket.objects.write();
        let result = {
            let object = objects
                .entry(object_name.to_owned())
                .or_insert_with(|| GcsObject::new(bucket_name, object_name));
            object.check_preconditions(request).and_then(|()| {
                let revision = object.compose_from(&self.config, &bucket, request, composed)?;
                Ok(revision.metadata().clone())
            })
        };
        if result.is_err() {
            remove_if_vacant(&mut objects, object_name);
        }
        result
    }

    /// Execute one step of a rewrite.
    ///
    /// A call without a token starts a new operation; a call with a token
    /// consumes it, verifies that the fixed arguments did not drift,
    /// re-validates the source key, and advances by the fixed chunk size.
    /// Completion materializes the destination revision and issues an empty
    /// token; otherwise the operation is re-inserted under a fresh token.
    pub fn rewrite_object(
        &self,
        request: &StorageRequest,
        source_bucket: &str,
        source_object: &str,
        destination_bucket: &str,
        destination_object: &str,
    ) -> StorageResult<RewriteResponse> {
        // The source must exist and meet its preconditions on every call,
        // before the operation table is touched.
        {
            let bucket = self.get_bucket(source_bucket)?;
            let objects = bucket.objects.read();
            let object = lookup(&objects, source_object)?;
            object.check_source_preconditions(request)?;
        }

        let result = self.rewrite_step(
            request,
            source_bucket,
            source_object,
            destination_bucket,
            destination_object,
        );
        if result.is_err() {
            // A failed step must not leave an empty destination placeholder.
            if let Ok(bucket) = self.get_bucket(destination_bucket) {
                remove_if_vacant(&mut bucket.objects.write(), destination_object);
            }
        }
        result
    }

    fn rewrite_step(
        &self,
        request: &StorageRequest,
        source_bucket: &str,
        source_object: &str,
        destination_bucket: &str,
        destination_object: &str,
    ) -> StorageResult<RewriteResponse> {
        let token = request
            .query("rewriteToken")
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        let mut operation = match token {
            Some(token) => {
                let bucket = self.get_bucket(destination_bucket)?;
                let mut objects = bucket.objects.write();
                let object = objects
                    .get_mut(destination_object)
                    .ok_or_else(|| StorageError::Gone {
                        token: token.clone(),
                    })?;
                object.take_rewrite_operation(&token)?
            }
            None => {
                let source_generation = match request.query_i64("sourceGeneration")? {
                    Some(generation) => generation,
                    None => {
                        let bucket = self.get_bucket(source_bucket)?;
                        let objects = bucket.objects.read();
                        lookup(&objects, source_object)?.current_generation()
                    }
                };
                let bucket = self.get_bucket(destination_bucket)?;
                let mut objects = bucket.objects.write();
                let object = objects
                    .entry(destination_object.to_owned())
                    .or_insert_with(|| GcsObject::new(destination_bucket, destination_object));
                object.begin_rewrite(
                    request,
                    destination_bucket,
                    destination_object,
                    source_generation,
                )?
            }
        };

        // The fixed arguments must not change between continuation calls.
        let current_arguments =
            RewriteArguments::capture(request, destination_bucket, destination_object);
        if current_arguments != operation.original_arguments {
            return Err(StorageError::precondition_failed(
                "mismatched arguments to rewrite",
            ));
        }

        // Re-resolve the source revision: it may have been deleted while the
        // operation was in progress. The source key is re-validated on every
        // step.
        let payload = {
            let bucket = self.get_bucket(source_bucket)?;
            let objects = bucket.objects.read();
            let object = lookup(&objects, source_object)?;
            let revision = object
                .revision_by_generation(operation.source_generation)
                .ok_or_else(|| {
                    StorageError::not_found(format!(
                        "source generation {} not found in object {source_object}",
                        operation.source_generation
                    ))
                })?;
            revision.validate_encryption_for_read(request, COPY_SOURCE_ENCRYPTION_PREFIX)?;
            revision.media().clone()
        };
        let object_size = payload.len() as u64;

        operation.bytes_rewritten = operation.bytes_rewritten.saturating_add(REWRITE_CHUNK_BYTES);
        if operation.bytes_rewritten >= object_size {
            operation.bytes_rewritten = object_size;

            let bucket = self.get_bucket(destination_bucket)?;
            let mut objects = bucket.objects.write();
            let destination_metadata = operation.destination_metadata.clone();
            let object = objects
                .entry(destination_object.to_owned())
                .or_insert_with(|| GcsObject::new(destination_bucket, destination_object));
            let resource = object
                .rewrite_finish(
                    &self.config,
                    &bucket,
                    request,
                    &destination_metadata,
                    payload,
                )
                .map(|revision| revision.metadata().clone())?;
            debug!(
                source = %source_object,
                destination = %destination_object,
                bytes = object_size,
                "rewrite completed"
            );
            // The operation fully consumed itself: no further continuation.
            Ok(RewriteResponse {
                kind: "storage#rewriteResponse".to_owned(),
                total_bytes_rewritten: object_size,
                object_size,
                done: true,
                rewrite_token: String::new(),
                resource: Some(resource),
            })
        } else {
            let token = encode_rewrite_token(
                operation.id,
                destination_bucket,
                destination_object,
                operation.source_generation,
                operation.bytes_rewritten,
            );
            let bytes_rewritten = operation.bytes_rewritten;

            let bucket = self.get_bucket(destination_bucket)?;
            let mut objects = bucket.objects.write();
            let object = objects
                .entry(destination_object.to_owned())
                .or_insert_with(|| GcsObject::new(destination_bucket, destination_object));
            object.store_rewrite_operation(token.clone(), operation);
            debug!(
                source = %source_object,
                destination = %destination_object,
                bytes = bytes_rewritten,
                "rewrite progressed"
            );
            Ok(RewriteResponse {
                kind: "storage#rewriteResponse".to_owned(),
                total_bytes_rewritten: bytes_rewritten,
                object_size,
                done: false,
                rewrite_token: token,
                resource: None,
            })
        }
    }
}

/// Look up an object in a bucket's table.
fn lookup<'a>(
    objects: &'a std::collections::BTreeMap<String, GcsObject>,
    name: &str,
) -> StorageResult<&'a GcsObject> {
    objects
        .get(name)
        .ok_or_else(|| StorageError::not_found(format!("object {name} not found")))
}

/// Drop an object entry that holds neither revisions nor in-progress
/// rewrites, so a failed operation leaves no empty placeholder behind.
fn remove_if_vacant(objects: &mut std::collections::BTreeMap<String, GcsObject>, name: &str) {
    if objects
        .get(name)
        .is_some_and(|o| o.is_empty() && o.pending_rewrites() == 0)
    {
        objects.remove(name);
    }
}
