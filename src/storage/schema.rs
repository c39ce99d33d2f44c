//! Per-kind document rules applied before anything reaches a collection.

use serde_json::Value;

use super::collection::{Document, MANAGED_FIELDS};
use super::ResourceKind;
use crate::error::{AppError, AppResult};
use crate::security::{self, AccessBlock, AccessLevel};

/// Fields never returned to clients.
const USER_SECRET_FIELDS: [&str; 2] = ["password", "salt"];

pub fn unique_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::User => &["username", "email"],
        _ => &[],
    }
}

fn as_object(kind: ResourceKind, data: &Value) -> AppResult<Document> {
    match data {
        Value::Object(m) => {
            let mut doc = m.clone();
            for f in MANAGED_FIELDS { let _ = doc.remove(f); }
            Ok(doc)
        }
        _ => Err(AppError::user("invalid_document".to_string(), format!("{kind} payload must be an object"))),
    }
}

fn required_str(doc: &Document, field: &str) -> AppResult<String> {
    match doc.get(field).and_then(|v| v.as_str()).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(AppError::user(format!("missing_{field}"), format!("'{field}' is required"))),
    }
}

fn optional_str(doc: &Document, field: &str) -> AppResult<()> {
    match doc.get(field) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(AppError::user(format!("invalid_{field}"), format!("'{field}' must be a string"))),
    }
}

fn hash_into(doc: &mut Document, password: &str) -> AppResult<()> {
    let phc = security::hash_password(password).map_err(AppError::from)?;
    let _ = doc.insert("password".into(), Value::String(phc));
    let _ = doc.remove("salt");
    Ok(())
}

fn normalize_user(doc: &mut Document, creating: bool) -> AppResult<()> {
    if creating || doc.contains_key("username") {
        let username = required_str(doc, "username")?;
        let _ = doc.insert("username".into(), Value::String(username));
    }
    if creating || doc.contains_key("email") {
        let email = required_str(doc, "email")?.to_lowercase();
        if !email.contains('@') {
            return Err(AppError::user("invalid_email", "'email' must be an email address"));
        }
        let _ = doc.insert("email".into(), Value::String(email));
    }
    optional_str(doc, "name")?;
    if creating || doc.contains_key("password") {
        let password = match doc.get("password").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(AppError::user("missing_password", "'password' is required")),
        };
        hash_into(doc, &password)?;
    }
    Ok(())
}

/// Parse and validate an access block; `edit` and `control` may not be public.
pub fn parse_access(value: &Value) -> AppResult<AccessBlock> {
    let block: AccessBlock = serde_json::from_value(value.clone())
        .map_err(|e| AppError::user("invalid_access".to_string(), format!("invalid access block: {e}")))?;
    if block.edit.level == AccessLevel::Public {
        return Err(AppError::user("invalid_access", "edit access cannot be public"));
    }
    if block.control.level == AccessLevel::Public {
        return Err(AppError::user("invalid_access", "control access cannot be public"));
    }
    Ok(block)
}

/// Access block stored on a document, or the defaults when absent.
pub fn access_of(doc: &Document) -> AccessBlock {
    doc.get("access")
        .and_then(|v| serde_json::from_value::<AccessBlock>(v.clone()).ok())
        .unwrap_or_default()
}

fn access_to_value(block: &AccessBlock) -> AppResult<Value> {
    serde_json::to_value(block).map_err(|e| AppError::internal("serialize_access".to_string(), e.to_string()))
}

fn normalize_system(doc: &mut Document, creator: Option<&str>) -> AppResult<()> {
    optional_str(doc, "name")?;
    optional_str(doc, "description")?;
    let mut block = match doc.get("access") {
        Some(v) => parse_access(v)?,
        None => AccessBlock::default(),
    };
    // creator always owns what they create
    if let Some(c) = creator { block.admin = Some(c.to_string()); }
    let _ = doc.insert("access".into(), access_to_value(&block)?);
    Ok(())
}

/// Validate client input for a new document of `kind`. `subject` is the creating user, if any.
pub fn prepare_create(kind: ResourceKind, data: &Value, subject: Option<&str>) -> AppResult<Document> {
    let mut doc = as_object(kind, data)?;
    match kind {
        ResourceKind::User => normalize_user(&mut doc, true)?,
        ResourceKind::System => normalize_system(&mut doc, subject)?,
        ResourceKind::Converter | ResourceKind::Device => {}
    }
    Ok(doc)
}

/// Validate a patch against the stored document. Returns the fields to merge.
pub fn prepare_update(kind: ResourceKind, existing: &Document, data: &Value) -> AppResult<Document> {
    let mut patch = as_object(kind, data)?;
    match kind {
        ResourceKind::User => normalize_user(&mut patch, false)?,
        ResourceKind::System => {
            optional_str(&patch, "name")?;
            optional_str(&patch, "description")?;
            if let Some(Value::Object(incoming)) = patch.get("access") {
                let mut merged = match existing.get("access") {
                    Some(Value::Object(m)) => m.clone(),
                    _ => Document::new(),
                };
                for (k, v) in incoming { let _ = merged.insert(k.clone(), v.clone()); }
                let block = parse_access(&Value::Object(merged))?;
                let _ = patch.insert("access".into(), access_to_value(&block)?);
            } else if patch.contains_key("access") {
                return Err(AppError::user("invalid_access", "access must be an object"));
            }
        }
        ResourceKind::Converter | ResourceKind::Device => {}
    }
    Ok(patch)
}

/// Client-facing form of a stored document.
pub fn public_view(kind: ResourceKind, doc: &Document) -> Value {
    let mut out = doc.clone();
    if kind == ResourceKind::User {
        for f in USER_SECRET_FIELDS { let _ = out.remove(f); }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_create_hashes_and_lowercases() {
        let doc = prepare_create(ResourceKind::User, &json!({"username": " ada ", "email": "Ada@Example.COM", "password": "pw"}), None).unwrap();
        assert_eq!(doc["username"], "ada");
        assert_eq!(doc["email"], "ada@example.com");
        let phc = doc["password"].as_str().unwrap();
        assert!(security::verify_password(phc, "pw"));
        let public = public_view(ResourceKind::User, &doc);
        assert!(public.get("password").is_none());
    }

    #[test]
    fn user_create_requires_fields() {
        let err = prepare_create(ResourceKind::User, &json!({"email": "a@b", "password": "pw"}), None).unwrap_err();
        assert_eq!(err.code_str(), "missing_username");
        let err = prepare_create(ResourceKind::User, &json!({"username": "a", "email": "a@b"}), None).unwrap_err();
        assert_eq!(err.code_str(), "missing_password");
        let err = prepare_create(ResourceKind::User, &json!({"username": "a", "email": "nope", "password": "x"}), None).unwrap_err();
        assert_eq!(err.code_str(), "invalid_email");
        let err = prepare_create(ResourceKind::User, &json!([1, 2]), None).unwrap_err();
        assert_eq!(err.code_str(), "invalid_document");
    }

    #[test]
    fn user_update_only_touches_given_fields() {
        let existing = Document::new();
        let patch = prepare_update(ResourceKind::User, &existing, &json!({"name": "Ada L."})).unwrap();
        assert_eq!(patch.len(), 1);
        let patch = prepare_update(ResourceKind::User, &existing, &json!({"password": "new"})).unwrap();
        assert!(security::verify_password(patch["password"].as_str().unwrap(), "new"));
    }

    #[test]
    fn system_defaults_and_owner() {
        let doc = prepare_create(ResourceKind::System, &json!({"name": "greenhouse", "access": {"admin": "someone-else"}}), Some("u1")).unwrap();
        let block = access_of(&doc);
        assert_eq!(block.admin.as_deref(), Some("u1"));
        assert_eq!(block.edit.level, AccessLevel::Private);
        assert_eq!(block.view.level, AccessLevel::Whitelist);
    }

    #[test]
    fn system_access_levels_are_validated() {
        let err = prepare_create(ResourceKind::System, &json!({"access": {"edit": {"level": "public"}}}), Some("u1")).unwrap_err();
        assert_eq!(err.code_str(), "invalid_access");
        let err = prepare_create(ResourceKind::System, &json!({"access": {"view": {"level": "everyone"}}}), Some("u1")).unwrap_err();
        assert_eq!(err.code_str(), "invalid_access");
        let err = prepare_create(ResourceKind::System, &json!({"name": 5}), Some("u1")).unwrap_err();
        assert_eq!(err.code_str(), "invalid_name");
    }

    #[test]
    fn system_update_merges_access() {
        let existing = prepare_create(ResourceKind::System, &json!({"name": "s"}), Some("u1")).unwrap();
        let patch = prepare_update(ResourceKind::System, &existing, &json!({"access": {"view": {"level": "public"}}})).unwrap();
        let mut merged = existing.clone();
        for (k, v) in patch { let _ = merged.insert(k, v); }
        let block = access_of(&merged);
        assert_eq!(block.view.level, AccessLevel::Public);
        assert_eq!(block.admin.as_deref(), Some("u1"));
        assert!(prepare_update(ResourceKind::System, &existing, &json!({"access": "open"})).is_err());
    }

    #[test]
    fn free_form_kinds_pass_through() {
        let doc = prepare_create(ResourceKind::Device, &json!({"name": "valve", "pins": [1, 2], "id": "x"}), None).unwrap();
        assert_eq!(doc["pins"], json!([1, 2]));
        assert!(!doc.contains_key("id"));
        assert!(unique_fields(ResourceKind::Device).is_empty());
        assert_eq!(unique_fields(ResourceKind::User), &["username", "email"]);
    }
}
