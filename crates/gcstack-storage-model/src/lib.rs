//! Wire-facing types for the gcstack storage simulator.
//!
//! This crate defines the types shared between the simulator core and the
//! HTTP dispatch layer in front of it: the request abstraction
//! ([`StorageRequest`]), the domain error type ([`StorageError`]), and the
//! object resource representations (metadata, ACL entries, encryption
//! descriptor, rewrite progress).

pub mod error;
pub mod request;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use request::StorageRequest;
pub use types::{
    AclRole, CustomerEncryption, ObjectAccessControl, ObjectMetadata, Owner, PredefinedAcl,
    RewriteResponse,
};
