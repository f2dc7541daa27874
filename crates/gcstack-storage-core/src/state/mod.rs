//! Simulator state management.
//!
//! This module provides the in-memory state of the simulator:
//!
//! - [`StorageServiceState`] -- top-level registry owning all buckets
//! - [`GcsBucket`] -- per-bucket state (owner, versioning flag, objects)
//! - [`GcsObject`] -- one named object's generation history and rewrite table
//! - [`GcsObjectRevision`] -- one immutable generation (payload + metadata)
//! - [`RewriteOperation`] / rewrite tokens -- the resumable-copy state machine
//!
//! # Thread Safety
//!
//! The bucket registry is a `DashMap`; each bucket guards its object table
//! with a `parking_lot::RwLock`, which serializes mutations the way the
//! request model requires (at most one in-flight mutation per object).

pub(crate) mod bucket;
pub(crate) mod object;
pub(crate) mod revision;
pub(crate) mod rewrite;
pub(crate) mod service;

pub use bucket::GcsBucket;
pub use object::GcsObject;
pub use revision::{GcsObjectRevision, INJECT_UPLOAD_DATA_ERROR, INSTRUCTIONS_HEADER};
pub use rewrite::{
    REWRITE_CHUNK_BYTES, RewriteArguments, RewriteOperation, RewriteTokenParts,
    decode_rewrite_token, encode_rewrite_token,
};
pub use service::StorageServiceState;
