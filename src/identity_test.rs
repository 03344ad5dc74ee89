use serde_json::json;
use time::macros::datetime;

use super::*;

fn identity(external_id: &str, email: &str) -> ExternalIdentity {
    ExternalIdentity {
        external_id: external_id.into(),
        email: email.into(),
        email_verified: true,
        created_at: datetime!(2026-03-01 12:00 UTC),
    }
}

fn user_with_fields(email: &str, fields: Value) -> ApplicationUser {
    let Value::Object(fields) = fields else { panic!("fields must be an object") };
    ApplicationUser { id: Uuid::new_v4(), email: email.into(), fields }
}

// =============================================================================
// ExternalIdentity serde
// =============================================================================

#[test]
fn external_identity_deserializes_camel_case() {
    let raw = json!({
        "externalId": "ext-1",
        "email": "a@x.com",
        "emailVerified": true,
        "createdAt": "2026-03-01T12:00:00Z"
    });
    let parsed: ExternalIdentity = serde_json::from_value(raw).unwrap();
    assert_eq!(parsed, identity("ext-1", "a@x.com"));
}

#[test]
fn external_identity_email_verified_defaults_false() {
    let raw = json!({"externalId": "ext-1", "email": "a@x.com", "createdAt": "2026-03-01T12:00:00Z"});
    let parsed: ExternalIdentity = serde_json::from_value(raw).unwrap();
    assert!(!parsed.email_verified);
}

// =============================================================================
// IdentityEvent
// =============================================================================

#[test]
fn identity_event_tagged_by_type() {
    let raw = json!({
        "type": "updated",
        "old": {"externalId": "ext-9", "email": "a@x.com", "createdAt": "2026-03-01T12:00:00Z"},
        "new": {"externalId": "ext-9", "email": "b@x.com", "createdAt": "2026-03-01T12:00:00Z"}
    });
    let event: IdentityEvent = serde_json::from_value(raw).unwrap();
    assert_eq!(event.kind(), "updated");
    assert_eq!(event.external_id(), "ext-9");
    let IdentityEvent::Updated { old, new } = event else { panic!("expected update") };
    assert_eq!(old.email, "a@x.com");
    assert_eq!(new.email, "b@x.com");
}

#[test]
fn identity_event_unknown_type_rejected() {
    let raw = json!({"type": "renamed", "identity": {"externalId": "x", "email": "e", "createdAt": "2026-03-01T12:00:00Z"}});
    assert!(serde_json::from_value::<IdentityEvent>(raw).is_err());
}

#[test]
fn identity_event_kinds() {
    let id = identity("ext-2", "c@x.com");
    assert_eq!(IdentityEvent::Created { identity: id.clone() }.kind(), "created");
    assert_eq!(IdentityEvent::Deleted { identity: id }.kind(), "deleted");
}

// =============================================================================
// MergedUserView::merge
// =============================================================================

#[test]
fn merge_without_user_has_identity_fields_only() {
    let view = MergedUserView::merge(&identity("ext-1", "a@x.com"), None);
    assert_eq!(view.email, "a@x.com");
    assert!(view.user_id.is_none());
    assert!(view.fields.is_empty());
    assert!(!view.has_application_user());
}

#[test]
fn merge_identity_email_wins_over_stale_user_email() {
    let user = user_with_fields("old@x.com", json!({"role": "admin"}));
    let view = MergedUserView::merge(&identity("ext-1", "new@x.com"), Some(&user));
    assert_eq!(view.email, "new@x.com");
    assert_eq!(view.user_id, Some(user.id));
    assert_eq!(view.fields.get("role"), Some(&json!("admin")));
}

#[test]
fn merge_drops_application_fields_shadowing_identity_keys() {
    let user = user_with_fields("a@x.com", json!({"email": "spoof@x.com", "userId": "nope", "theme": "dark"}));
    let view = MergedUserView::merge(&identity("ext-1", "a@x.com"), Some(&user));
    assert!(!view.fields.contains_key("email"));
    assert!(!view.fields.contains_key("userId"));
    assert_eq!(view.fields.get("theme"), Some(&json!("dark")));
}

#[test]
fn merged_view_serializes_flat() {
    let user = user_with_fields("a@x.com", json!({"role": "member"}));
    let view = MergedUserView::merge(&identity("ext-1", "a@x.com"), Some(&user));
    let out = serde_json::to_value(&view).unwrap();
    assert_eq!(out["externalId"], "ext-1");
    assert_eq!(out["email"], "a@x.com");
    assert_eq!(out["emailVerified"], true);
    assert_eq!(out["createdAt"], "2026-03-01T12:00:00Z");
    assert_eq!(out["userId"], user.id.to_string());
    assert_eq!(out["role"], "member");
}

#[test]
fn merged_view_without_user_omits_user_id() {
    let view = MergedUserView::merge(&identity("ext-1", "a@x.com"), None);
    let out = serde_json::to_value(&view).unwrap();
    assert!(out.get("userId").is_none());
}

// =============================================================================
// validate_field_patch
// =============================================================================

#[test]
fn field_patch_accepts_plain_object() {
    let patch = json!({"theme": "dark", "prefs": {"digest": false}});
    let map = validate_field_patch(&patch).unwrap();
    assert_eq!(map.len(), 2);
}

#[test]
fn field_patch_rejects_reserved_key() {
    let patch = json!({"email": "x@y.com"});
    assert_eq!(validate_field_patch(&patch), Err(FieldPatchError::ReservedKey("email".into())));
}

#[test]
fn field_patch_rejects_non_object() {
    assert_eq!(validate_field_patch(&json!([1, 2])), Err(FieldPatchError::NotAnObject));
    assert_eq!(validate_field_patch(&json!("role")), Err(FieldPatchError::NotAnObject));
}
