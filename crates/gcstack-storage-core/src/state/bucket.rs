//! The bucket entry of the registry.
//!
//! Bucket-level metadata and listing are out of scope; the simulator core
//! only needs the pieces object operations consult: the owner entity (ACL
//! seeding), the versioning flag (revision installation), and the object
//! table itself.
//!
//! Interior mutability uses `parking_lot::RwLock` so callers get the
//! object-scoped mutual exclusion the request model assumes: one in-flight
//! mutation per bucket's object table at a time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::object::GcsObject;

/// A bucket: the owner of a set of named objects.
pub struct GcsBucket {
    /// Bucket name.
    pub name: String,
    /// When the bucket was created.
    pub creation_date: DateTime<Utc>,
    /// The entity owning the bucket, used to seed bucket-owner ACL grants.
    owner_entity: String,
    /// Whether object versioning is enabled.
    versioning: RwLock<bool>,
    /// The object table, keyed by object name.
    pub objects: RwLock<BTreeMap<String, GcsObject>>,
}

impl std::fmt::Debug for GcsBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBucket")
            .field("name", &self.name)
            .field("owner_entity", &self.owner_entity)
            .field("versioning", &*self.versioning.read())
            .field("object_count", &self.objects.read().len())
            .finish_non_exhaustive()
    }
}

impl GcsBucket {
    /// Create a new bucket with versioning disabled.
    #[must_use]
    pub fn new(name: String, owner_entity: String) -> Self {
        Self {
            name,
            creation_date: Utc::now(),
            owner_entity,
            versioning: RwLock::new(false),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// The entity owning the bucket.
    #[must_use]
    pub fn owner_entity(&self) -> &str {
        &self.owner_entity
    }

    /// Whether object versioning is currently enabled.
    #[must_use]
    pub fn versioning_enabled(&self) -> bool {
        *self.versioning.read()
    }

    /// Enable or disable object versioning.
    ///
    /// Existing revisions are untouched; the flag only changes how future
    /// inserts install their revision (additive vs. whole-history replace).
    pub fn set_versioning(&self, enabled: bool) {
        debug!(bucket = %self.name, enabled, "setting versioning");
        *self.versioning.write() = enabled;
    }

    /// Whether the bucket contains zero objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_bucket_with_versioning_disabled() {
        let bucket = GcsBucket::new("bkt".to_owned(), "project-owners-123456789".to_owned());
        assert_eq!(bucket.name, "bkt");
        assert_eq!(bucket.owner_entity(), "project-owners-123456789");
        assert!(!bucket.versioning_enabled());
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_should_toggle_versioning() {
        let bucket = GcsBucket::new("bkt".to_owned(), "project-owners-123456789".to_owned());
        bucket.set_versioning(true);
        assert!(bucket.versioning_enabled());
        bucket.set_versioning(false);
        assert!(!bucket.versioning_enabled());
    }

    #[test]
    fn test_should_debug_format_bucket() {
        let bucket = GcsBucket::new("debug-bkt".to_owned(), "owner".to_owned());
        let debug_str = format!("{bucket:?}");
        assert!(debug_str.contains("debug-bkt"));
        assert!(debug_str.contains("GcsBucket"));
    }
}
