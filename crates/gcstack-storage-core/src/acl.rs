//! The access-control index of an object revision.
//!
//! ACL entries live in the revision's metadata and are unique by canonical
//! entity: re-granting an entity replaces its entry. Predefined policies are
//! fixed tables of grants seeded with the project teams and the bucket
//! owner.

use std::str::FromStr;

use gcstack_storage_model::{
    AclRole, ObjectAccessControl, ObjectMetadata, PredefinedAcl, StorageError, StorageRequest,
    StorageResult,
};
use tracing::debug;

/// Canonicalize an entity name.
///
/// Project-team entities are normalized onto the configured project number
/// and the result is lowercased, so `project-owners-0xdeadbeef` and
/// `Project-Owners-123456789` index the same entry.
#[must_use]
pub fn canonical_entity_name(project_number: &str, entity: &str) -> String {
    for team in ["owners", "editors", "viewers"] {
        let prefix = format!("project-{team}");
        if entity == prefix || entity.starts_with(&format!("{prefix}-")) {
            return format!("{prefix}-{project_number}");
        }
    }
    entity.to_lowercase()
}

/// Insert (or update) an access-control entry, returning the stored entry.
///
/// The entity is canonicalized first; an email is derived when the entity
/// denotes an individual user.
pub fn insert_acl(meta: &mut ObjectMetadata, entity: &str, role: AclRole) -> ObjectAccessControl {
    let entity = canonical_entity_name(&meta.project_number, entity);
    let email = if entity.starts_with("user-") {
        entity.clone()
    } else {
        String::new()
    };
    let entry = ObjectAccessControl {
        kind: "storage#objectAccessControl".to_owned(),
        id: format!("{}/{entity}", meta.id),
        self_link: format!("{}/acl/{entity}", meta.self_link),
        bucket: meta.bucket.clone(),
        object: meta.name.clone(),
        generation: meta.generation,
        entity: entity.clone(),
        entity_id: String::new(),
        email,
        etag: meta.etag.clone(),
        role,
    };

    // Replace or insert, keyed by canonical entity.
    if let Some(existing) = meta.acl.iter_mut().find(|e| e.entity == entity) {
        *existing = entry.clone();
    } else {
        meta.acl.push(entry.clone());
    }
    entry
}

/// Update an access-control entry. Identical to [`insert_acl`]: the entry is
/// replaced wholesale.
pub fn update_acl(meta: &mut ObjectMetadata, entity: &str, role: AclRole) -> ObjectAccessControl {
    insert_acl(meta, entity, role)
}

/// Get an access-control entry by entity.
pub fn get_acl<'a>(
    meta: &'a ObjectMetadata,
    entity: &str,
) -> StorageResult<&'a ObjectAccessControl> {
    let entity = canonical_entity_name(&meta.project_number, entity);
    meta.acl.iter().find(|e| e.entity == entity).ok_or_else(|| {
        StorageError::not_found(format!("entity {entity} not found in object {}", meta.name))
    })
}

/// Delete an access-control entry by entity.
pub fn delete_acl(meta: &mut ObjectMetadata, entity: &str) -> StorageResult<()> {
    let entity = canonical_entity_name(&meta.project_number, entity);
    let index = meta
        .acl
        .iter()
        .position(|e| e.entity == entity)
        .ok_or_else(|| {
            StorageError::not_found(format!("entity {entity} not found in object {}", meta.name))
        })?;
    meta.acl.remove(index);
    Ok(())
}

/// Patch an access-control entry.
///
/// Re-reads the existing entry, validates the optional entity field and the
/// optional `if-match`/`if-none-match` etag conditions, requires a `role`
/// field in the payload, and delegates to [`insert_acl`].
pub fn patch_acl(
    meta: &mut ObjectMetadata,
    entity: &str,
    request: &StorageRequest,
) -> StorageResult<ObjectAccessControl> {
    let canonical = canonical_entity_name(&meta.project_number, entity);
    let existing_etag = get_acl(meta, entity)?.etag.clone();

    let payload = request.json_body()?;
    if let Some(request_entity) = payload.get("entity").and_then(|v| v.as_str()) {
        if canonical_entity_name(&meta.project_number, request_entity) != canonical {
            return Err(StorageError::precondition_failed(format!(
                "entity mismatch in access-control patch, expected={canonical}, got={request_entity}"
            )));
        }
    }
    if let Some(etag) = request.header("if-match") {
        if etag != existing_etag {
            return Err(StorageError::precondition_failed("etag does not match"));
        }
    }
    if let Some(etag) = request.header("if-none-match") {
        if etag == existing_etag {
            return Err(StorageError::precondition_failed("etag matches"));
        }
    }

    let role = payload
        .get("role")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StorageError::bad_request("missing role value"))?;
    let role = AclRole::from_str(role)
        .map_err(|e| StorageError::bad_request(e.to_string()))?;

    Ok(insert_acl(meta, entity, role))
}

/// Apply a predefined ACL policy on top of the existing list.
///
/// Every policy first grants the project-owners team `OWNER`;
/// `bucket_owner_entity` seeds the bucket-owner grants.
pub fn apply_predefined_acl(
    meta: &mut ObjectMetadata,
    bucket_owner_entity: &str,
    policy: PredefinedAcl,
) {
    debug!(object = %meta.name, policy = %policy, "applying predefined ACL");
    let project_number = meta.project_number.clone();
    insert_acl(meta, &format!("project-owners-{project_number}"), AclRole::Owner);
    match policy {
        PredefinedAcl::AuthenticatedRead => {
            insert_acl(meta, "allAuthenticatedUsers", AclRole::Reader);
        }
        PredefinedAcl::BucketOwnerFullControl => {
            insert_acl(meta, bucket_owner_entity, AclRole::Owner);
        }
        PredefinedAcl::BucketOwnerRead => {
            insert_acl(meta, bucket_owner_entity, AclRole::Reader);
        }
        PredefinedAcl::Private => {
            insert_acl(meta, &format!("project-owners-{project_number}"), AclRole::Owner);
        }
        PredefinedAcl::ProjectPrivate => {
            insert_acl(meta, &format!("project-editors-{project_number}"), AclRole::Owner);
            insert_acl(meta, &format!("project-viewers-{project_number}"), AclRole::Reader);
        }
        PredefinedAcl::PublicRead => {
            insert_acl(meta, "allUsers", AclRole::Reader);
        }
    }
}

/// Clear the ACL list, then apply a predefined policy.
pub fn reset_predefined_acl(
    meta: &mut ObjectMetadata,
    bucket_owner_entity: &str,
    policy: PredefinedAcl,
) {
    meta.acl.clear();
    apply_predefined_acl(meta, bucket_owner_entity, policy);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_metadata() -> ObjectMetadata {
        ObjectMetadata {
            kind: "storage#object".to_owned(),
            id: "bkt/o/obj/1".to_owned(),
            self_link: "http://localhost:9000/storage/v1/obj".to_owned(),
            bucket: "bkt".to_owned(),
            name: "obj".to_owned(),
            generation: 1,
            etag: "XYZ=".to_owned(),
            project_number: "123456789".to_owned(),
            ..ObjectMetadata::default()
        }
    }

    #[test]
    fn test_should_canonicalize_project_team_entities() {
        assert_eq!(
            canonical_entity_name("123456789", "project-owners-0xdeadbeef"),
            "project-owners-123456789"
        );
        assert_eq!(
            canonical_entity_name("123456789", "project-editors"),
            "project-editors-123456789"
        );
        assert_eq!(canonical_entity_name("123456789", "allUsers"), "allusers");
        assert_eq!(
            canonical_entity_name("123456789", "user-someone@example.com"),
            "user-someone@example.com"
        );
    }

    #[test]
    fn test_should_insert_and_get_acl_entry() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);

        let entry = get_acl(&meta, "allUsers").expect("entry");
        assert_eq!(entry.role, AclRole::Reader);
        assert_eq!(entry.entity, "allusers");
        assert_eq!(entry.bucket, "bkt");
        assert_eq!(entry.object, "obj");
        assert_eq!(entry.generation, 1);
        assert_eq!(entry.id, "bkt/o/obj/1/allusers");
        assert!(entry.self_link.ends_with("/acl/allusers"));
    }

    #[test]
    fn test_should_replace_entry_on_reinsert() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);
        insert_acl(&mut meta, "allUsers", AclRole::Owner);

        assert_eq!(meta.acl.len(), 1);
        let entry = get_acl(&meta, "allUsers").expect("entry");
        assert_eq!(entry.role, AclRole::Owner);
    }

    #[test]
    fn test_should_derive_email_for_user_entities() {
        let mut meta = make_metadata();
        let entry = insert_acl(&mut meta, "user-someone@example.com", AclRole::Reader);
        assert_eq!(entry.email, "user-someone@example.com");

        let entry = insert_acl(&mut meta, "allUsers", AclRole::Reader);
        assert!(entry.email.is_empty());
    }

    #[test]
    fn test_should_delete_acl_entry() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);
        delete_acl(&mut meta, "allUsers").expect("delete");
        assert!(meta.acl.is_empty());

        let result = delete_acl(&mut meta, "allUsers");
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_should_fail_get_for_unknown_entity() {
        let meta = make_metadata();
        assert!(matches!(
            get_acl(&meta, "allUsers"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_should_patch_acl_role() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);

        let request = StorageRequest::new().with_body(&br#"{"role": "OWNER"}"#[..]);
        let entry = patch_acl(&mut meta, "allUsers", &request).expect("patch");
        assert_eq!(entry.role, AclRole::Owner);
    }

    #[test]
    fn test_should_require_role_in_patch() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);

        let request = StorageRequest::new().with_body(&br#"{"entity": "allUsers"}"#[..]);
        let result = patch_acl(&mut meta, "allUsers", &request);
        assert!(matches!(result, Err(StorageError::BadRequest { .. })));
    }

    #[test]
    fn test_should_reject_patch_with_entity_mismatch() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);

        let request = StorageRequest::new()
            .with_body(&br#"{"entity": "allAuthenticatedUsers", "role": "OWNER"}"#[..]);
        let result = patch_acl(&mut meta, "allUsers", &request);
        assert!(matches!(result, Err(StorageError::PreconditionFailed { .. })));
    }

    #[test]
    fn test_should_check_etag_conditions_on_patch() {
        let mut meta = make_metadata();
        insert_acl(&mut meta, "allUsers", AclRole::Reader);

        let matching = StorageRequest::new()
            .with_header("if-match", "XYZ=")
            .with_body(&br#"{"role": "OWNER"}"#[..]);
        assert!(patch_acl(&mut meta, "allUsers", &matching).is_ok());

        let stale = StorageRequest::new()
            .with_header("if-match", "ABC=")
            .with_body(&br#"{"role": "OWNER"}"#[..]);
        assert!(matches!(
            patch_acl(&mut meta, "allUsers", &stale),
            Err(StorageError::PreconditionFailed { .. })
        ));

        let none_match_same = StorageRequest::new()
            .with_header("if-none-match", "XYZ=")
            .with_body(&br#"{"role": "OWNER"}"#[..]);
        assert!(matches!(
            patch_acl(&mut meta, "allUsers", &none_match_same),
            Err(StorageError::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn test_should_seed_project_owners_for_every_policy() {
        for policy in [
            PredefinedAcl::ProjectPrivate,
            PredefinedAcl::PublicRead,
            PredefinedAcl::Private,
            PredefinedAcl::BucketOwnerRead,
            PredefinedAcl::BucketOwnerFullControl,
            PredefinedAcl::AuthenticatedRead,
        ] {
            let mut meta = make_metadata();
            apply_predefined_acl(&mut meta, "user-owner@example.com", policy);
            let owners = get_acl(&meta, "project-owners-123456789").expect("owners entry");
            assert_eq!(owners.role, AclRole::Owner, "policy {policy}");
        }
    }

    #[test]
    fn test_should_apply_project_private_grants() {
        let mut meta = make_metadata();
        apply_predefined_acl(&mut meta, "user-owner@example.com", PredefinedAcl::ProjectPrivate);

        let editors = get_acl(&meta, "project-editors-123456789").expect("editors");
        assert_eq!(editors.role, AclRole::Owner);
        let viewers = get_acl(&meta, "project-viewers-123456789").expect("viewers");
        assert_eq!(viewers.role, AclRole::Reader);
    }

    #[test]
    fn test_should_apply_public_read_grant() {
        let mut meta = make_metadata();
        apply_predefined_acl(&mut meta, "user-owner@example.com", PredefinedAcl::PublicRead);
        let entry = get_acl(&meta, "allUsers").expect("allUsers");
        assert_eq!(entry.role, AclRole::Reader);
    }

    #[test]
    fn test_should_seed_bucket_owner_grants() {
        let mut meta = make_metadata();
        apply_predefined_acl(
            &mut meta,
            "user-owner@example.com",
            PredefinedAcl::BucketOwnerRead,
        );
        let entry = get_acl(&meta, "user-owner@example.com").expect("bucket owner");
        assert_eq!(entry.role, AclRole::Reader);

        let mut meta = make_metadata();
        apply_predefined_acl(
            &mut meta,
            "user-owner@example.com",
            PredefinedAcl::BucketOwnerFullControl,
        );
        let entry = get_acl(&meta, "user-owner@example.com").expect("bucket owner");
        assert_eq!(entry.role, AclRole::Owner);
    }

    #[test]
    fn test_should_reset_acl_before_reapplying() {
        let mut meta = make_metadata();
        apply_predefined_acl(&mut meta, "user-owner@example.com", PredefinedAcl::PublicRead);
        assert!(get_acl(&meta, "allUsers").is_ok());

        reset_predefined_acl(&mut meta, "user-owner@example.com", PredefinedAcl::Private);
        assert!(get_acl(&meta, "allUsers").is_err());
        assert!(get_acl(&meta, "project-owners-123456789").is_ok());
    }
}
