//! Object resource representations.
//!
//! This module defines the metadata types the simulator exposes to the
//! dispatch layer: the object resource ([`ObjectMetadata`]), access-control
//! entries, predefined ACL policies, the customer-encryption descriptor, and
//! the rewrite-progress record. All wire-facing structs serialize with
//! camelCase field names, matching the JSON API resource shapes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// The owner of an object revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// The owning entity, e.g. `project-owners-123456789`.
    pub entity: String,
    /// The ID of the owning entity (always empty in the simulator).
    #[serde(default)]
    pub entity_id: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            entity: "project-owners-123456789".to_owned(),
            entity_id: String::new(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity)
    }
}

// ---------------------------------------------------------------------------
// AclRole
// ---------------------------------------------------------------------------

/// The role granted by an access-control entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclRole {
    /// Read access to the object payload and metadata (default grant).
    #[default]
    #[serde(rename = "READER")]
    Reader,
    /// Full control over the object.
    #[serde(rename = "OWNER")]
    Owner,
}

impl AclRole {
    /// Return the wire representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "READER",
            Self::Owner => "OWNER",
        }
    }
}

impl fmt::Display for AclRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`AclRole`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown ACL role: {0}")]
pub struct ParseAclRoleError(String);

impl FromStr for AclRole {
    type Err = ParseAclRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READER" => Ok(Self::Reader),
            "OWNER" => Ok(Self::Owner),
            _ => Err(ParseAclRoleError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectAccessControl
// ---------------------------------------------------------------------------

/// One access-control entry attached to an object revision.
///
/// Entries are unique by canonical entity within a revision; re-granting an
/// entity replaces its entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectAccessControl {
    /// Always `storage#objectAccessControl`.
    pub kind: String,
    /// Entry id: `{object id}/{entity}`.
    pub id: String,
    /// Link to this entry: `{object selfLink}/acl/{entity}`.
    pub self_link: String,
    /// The bucket containing the object.
    pub bucket: String,
    /// The object name.
    pub object: String,
    /// The generation this entry is attached to.
    pub generation: i64,
    /// The canonical entity holding the grant.
    pub entity: String,
    /// The ID of the entity (always empty in the simulator).
    pub entity_id: String,
    /// The entity's email, derived when the entity denotes a user.
    pub email: String,
    /// The etag of the entry.
    pub etag: String,
    /// The granted role.
    pub role: AclRole,
}

// ---------------------------------------------------------------------------
// PredefinedAcl
// ---------------------------------------------------------------------------

/// A named bundle of ACL grants applied as a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredefinedAcl {
    /// Project team members get access according to their roles (default).
    #[default]
    ProjectPrivate,
    /// All users get `READER` access.
    PublicRead,
    /// The object owner gets `OWNER` access.
    Private,
    /// The bucket owner gets `READER` access.
    BucketOwnerRead,
    /// The bucket owner gets `OWNER` access.
    BucketOwnerFullControl,
    /// All authenticated users get `READER` access.
    AuthenticatedRead,
}

impl PredefinedAcl {
    /// Return the JSON API spelling of the policy name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectPrivate => "projectPrivate",
            Self::PublicRead => "publicRead",
            Self::Private => "private",
            Self::BucketOwnerRead => "bucketOwnerRead",
            Self::BucketOwnerFullControl => "bucketOwnerFullControl",
            Self::AuthenticatedRead => "authenticatedRead",
        }
    }

    /// Parse the dashed spelling used by the `x-goog-acl` header in the XML
    /// API, e.g. `public-read`.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "project-private" => Some(Self::ProjectPrivate),
            "public-read" => Some(Self::PublicRead),
            "private" => Some(Self::Private),
            "bucket-owner-read" => Some(Self::BucketOwnerRead),
            "bucket-owner-full-control" => Some(Self::BucketOwnerFullControl),
            "authenticated-read" => Some(Self::AuthenticatedRead),
            _ => None,
        }
    }
}

impl fmt::Display for PredefinedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`PredefinedAcl`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid predefinedAcl value: {0}")]
pub struct ParsePredefinedAclError(String);

impl FromStr for PredefinedAcl {
    type Err = ParsePredefinedAclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "projectPrivate" => Ok(Self::ProjectPrivate),
            "publicRead" => Ok(Self::PublicRead),
            "private" => Ok(Self::Private),
            "bucketOwnerRead" => Ok(Self::BucketOwnerRead),
            "bucketOwnerFullControl" => Ok(Self::BucketOwnerFullControl),
            "authenticatedRead" => Ok(Self::AuthenticatedRead),
            _ => Err(ParsePredefinedAclError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// CustomerEncryption
// ---------------------------------------------------------------------------

/// The customer-supplied encryption descriptor attached to a revision.
///
/// Only the algorithm and the SHA-256 fingerprint of the key are persisted;
/// the key itself never is. Once set, every read of the revision's payload
/// must present a key with a matching fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEncryption {
    /// The encryption algorithm, e.g. `AES256`.
    pub encryption_algorithm: String,
    /// Base64-encoded SHA-256 fingerprint of the key.
    pub key_sha256: String,
}

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// The metadata of one object revision.
///
/// The typed fields cover the resource attributes the simulator manages;
/// caller-defined key/value pairs live in the free-form `metadata` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMetadata {
    /// Always `storage#object`.
    pub kind: String,
    /// The object id: `{bucket}/o/{name}/{generation}`.
    pub id: String,
    /// Link to this revision.
    pub self_link: String,
    /// The bucket containing the object.
    pub bucket: String,
    /// The object name.
    pub name: String,
    /// The generation of this revision.
    pub generation: i64,
    /// Counter incremented on every metadata mutation of this generation.
    pub metageneration: i64,
    /// Creation timestamp, RFC 3339.
    pub time_created: String,
    /// Last-update timestamp, RFC 3339.
    pub updated: String,
    /// The location the revision reports, e.g. `US`.
    pub location: String,
    /// The storage class, e.g. `STANDARD`.
    pub storage_class: String,
    /// Payload size in bytes.
    pub size: u64,
    /// The entity tag of this revision.
    pub etag: String,
    /// The owning project number.
    pub project_number: String,
    /// The revision owner.
    pub owner: Owner,
    /// Base64-encoded MD5 of the payload.
    pub md5_hash: String,
    /// Base64-encoded big-endian CRC32C of the payload.
    pub crc32c: String,
    /// The MIME type of the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Cache control directives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Content disposition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// Content encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Content language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Caller-defined key/value metadata.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// The access-control list, unique by canonical entity.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<ObjectAccessControl>,
    /// The customer-supplied encryption descriptor, if the revision was
    /// written with an encryption key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_encryption: Option<CustomerEncryption>,
}

// ---------------------------------------------------------------------------
// RewriteResponse
// ---------------------------------------------------------------------------

/// The progress record returned by every rewrite call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteResponse {
    /// Always `storage#rewriteResponse`.
    pub kind: String,
    /// Cumulative bytes copied so far.
    pub total_bytes_rewritten: u64,
    /// The total size of the source payload.
    pub object_size: u64,
    /// Whether the rewrite has completed.
    pub done: bool,
    /// The continuation token for the next call; empty once `done`.
    pub rewrite_token: String,
    /// The finalized destination resource, present only when `done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ObjectMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_roundtrip_acl_role_from_str() {
        for (s, expected) in [("READER", AclRole::Reader), ("OWNER", AclRole::Owner)] {
            let parsed: AclRole = s.parse().unwrap_or_else(|_| panic!("failed to parse {s}"));
            assert_eq!(parsed, expected);
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn test_should_reject_unknown_acl_role() {
        assert!("WRITER".parse::<AclRole>().is_err());
    }

    #[test]
    fn test_should_parse_predefined_acl_json_names() {
        let cases = [
            ("projectPrivate", PredefinedAcl::ProjectPrivate),
            ("publicRead", PredefinedAcl::PublicRead),
            ("private", PredefinedAcl::Private),
            ("bucketOwnerRead", PredefinedAcl::BucketOwnerRead),
            ("bucketOwnerFullControl", PredefinedAcl::BucketOwnerFullControl),
            ("authenticatedRead", PredefinedAcl::AuthenticatedRead),
        ];
        for (s, expected) in cases {
            let parsed: PredefinedAcl =
                s.parse().unwrap_or_else(|_| panic!("failed to parse {s}"));
            assert_eq!(parsed, expected);
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn test_should_parse_predefined_acl_header_names() {
        assert_eq!(
            PredefinedAcl::from_header("public-read"),
            Some(PredefinedAcl::PublicRead)
        );
        assert_eq!(
            PredefinedAcl::from_header("bucket-owner-full-control"),
            Some(PredefinedAcl::BucketOwnerFullControl)
        );
        assert_eq!(PredefinedAcl::from_header("no-such-acl"), None);
    }

    #[test]
    fn test_should_reject_unknown_predefined_acl() {
        assert!("public-read".parse::<PredefinedAcl>().is_err());
    }

    #[test]
    fn test_should_default_owner_to_project_owners() {
        let owner = Owner::default();
        assert!(owner.entity.starts_with("project-owners-"));
        assert!(owner.entity_id.is_empty());
    }

    #[test]
    fn test_should_serialize_metadata_in_camel_case() {
        let meta = ObjectMetadata {
            kind: "storage#object".to_owned(),
            self_link: "http://localhost/o".to_owned(),
            md5_hash: "abc=".to_owned(),
            storage_class: "STANDARD".to_owned(),
            ..ObjectMetadata::default()
        };
        let json = serde_json::to_string(&meta).expect("test serialization");
        assert!(json.contains("selfLink"));
        assert!(json.contains("md5Hash"));
        assert!(json.contains("storageClass"));
        // Empty optional sections stay off the wire.
        assert!(!json.contains("customerEncryption"));
        assert!(!json.contains("\"acl\""));
    }

    #[test]
    fn test_should_serialize_acl_entry_role_as_wire_string() {
        let entry = ObjectAccessControl {
            entity: "allUsers".to_owned(),
            role: AclRole::Reader,
            ..ObjectAccessControl::default()
        };
        let json = serde_json::to_string(&entry).expect("test serialization");
        assert!(json.contains("\"role\":\"READER\""));
        assert!(json.contains("entityId"));
    }

    #[test]
    fn test_should_serialize_rewrite_response() {
        let response = RewriteResponse {
            kind: "storage#rewriteResponse".to_owned(),
            total_bytes_rewritten: 1_048_576,
            object_size: 3_145_728,
            done: false,
            rewrite_token: "token-1".to_owned(),
            resource: None,
        };
        let json = serde_json::to_string(&response).expect("test serialization");
        assert!(json.contains("totalBytesRewritten"));
        assert!(json.contains("objectSize"));
        assert!(!json.contains("resource"));
    }
}
