//! Pure access-control predicates shared by every backend engine.
//!
//! Permission-based and ownership-based access are evaluated independently
//! and OR-ed: a non-privileged user can always act on their own records,
//! privileged roles bypass ownership entirely.

use crate::domain::contract::{AuthInput, AuthPolicy, ManagedFields};
use serde_json::Value as JsonValue;

/// True when the caller is authorized by the policy alone, ignoring
/// ownership. Boolean policies always pass (an open contract has nothing to
/// enforce); role policies require a token intersection. The `createdBy`
/// marker is not a role token and never satisfies this check by itself.
pub fn authorized_by_permission(policy: &AuthPolicy, auth: &AuthInput) -> bool {
    match policy {
        AuthPolicy::Open | AuthPolicy::Authenticated => true,
        AuthPolicy::Roles { roles, .. } => {
            roles.iter().any(|role| auth.permissions.iter().any(|p| p == role))
        }
    }
}

/// The record fields that identify an owner, derived from `manageFields`.
pub fn owner_fields(fields: &ManagedFields) -> Vec<&'static str> {
    if fields.created_by {
        vec!["createdBy"]
    } else {
        Vec::new()
    }
}

fn owns(record: &JsonValue, auth: &AuthInput, fields: &ManagedFields) -> bool {
    let Some(sub) = auth.sub.as_deref() else {
        return false;
    };
    owner_fields(fields)
        .iter()
        .any(|field| record.get(field).and_then(JsonValue::as_str) == Some(sub))
}

/// The single gate for every read/write/delete targeting a specific record:
/// permission-authorized OR owner of the record.
pub fn can_access(
    record: &JsonValue,
    policy: &AuthPolicy,
    auth: &AuthInput,
    fields: &ManagedFields,
) -> bool {
    authorized_by_permission(policy, auth) || owns(record, auth, fields)
}

/// Restricts a candidate set to what the caller may see. Globally authorized
/// callers keep everything; everyone else keeps only their own records.
pub fn filter_to_access(
    records: Vec<JsonValue>,
    policy: &AuthPolicy,
    auth: &AuthInput,
    fields: &ManagedFields,
) -> Vec<JsonValue> {
    if authorized_by_permission(policy, auth) {
        return records;
    }
    records.into_iter().filter(|r| owns(r, auth, fields)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owned_fields() -> ManagedFields {
        ManagedFields { id: true, created_by: true }
    }

    #[test]
    fn boolean_policies_always_authorize() {
        let anon = AuthInput::anonymous();
        assert!(authorized_by_permission(&AuthPolicy::Open, &anon));
        assert!(authorized_by_permission(&AuthPolicy::Authenticated, &anon));
    }

    #[test]
    fn role_policy_requires_token_intersection() {
        let policy = AuthPolicy::roles_or_owner(&["admin"]);
        let admin = AuthInput::with_permissions("a", &["admin"]);
        let user = AuthInput::with_permissions("u", &["editor"]);
        assert!(authorized_by_permission(&policy, &admin));
        // The createdBy marker alone never satisfies the permission check.
        assert!(!authorized_by_permission(&policy, &user));
    }

    #[test]
    fn owner_can_access_without_elevated_permission() {
        let policy = AuthPolicy::roles_or_owner(&["admin"]);
        let record = json!({"id": "1", "createdBy": "u"});
        assert!(can_access(&record, &policy, &AuthInput::user("u"), &owned_fields()));
        assert!(!can_access(&record, &policy, &AuthInput::user("v"), &owned_fields()));
        assert!(can_access(
            &record,
            &policy,
            &AuthInput::with_permissions("v", &["admin"]),
            &owned_fields()
        ));
    }

    #[test]
    fn filter_keeps_only_owned_records_for_plain_users() {
        let policy = AuthPolicy::roles_or_owner(&["admin"]);
        let records = vec![
            json!({"id": "1", "createdBy": "u"}),
            json!({"id": "2", "createdBy": "v"}),
        ];
        let mine = filter_to_access(records.clone(), &policy, &AuthInput::user("u"), &owned_fields());
        assert_eq!(mine, vec![json!({"id": "1", "createdBy": "u"})]);

        let all = filter_to_access(
            records,
            &policy,
            &AuthInput::with_permissions("x", &["admin"]),
            &owned_fields(),
        );
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn no_owner_fields_means_no_ownership_fallback() {
        let policy = AuthPolicy::roles(&["admin"]);
        let record = json!({"id": "1", "createdBy": "u"});
        let fields = ManagedFields { id: true, created_by: false };
        assert!(!can_access(&record, &policy, &AuthInput::user("u"), &fields));
    }
}
