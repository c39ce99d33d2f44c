use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names owned by the session itself; claims may not shadow them.
pub const RESERVED_FIELDS: [&str; 3] = ["subject", "timestamp", "remember"];

/// Authentication state carried inside the encrypted token.
///
/// A session is never mutated after creation. Every response re-seals the same
/// logical content under a fresh nonce, so the token text changes while the
/// fields do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque user identifier (the user document id).
    pub subject: String,
    /// Creation instant in epoch milliseconds.
    pub timestamp: i64,
    /// Extended lifetime flag ("remember me").
    #[serde(default)]
    pub remember: bool,
    /// Extra handler-supplied claims, only ever added through [`Session::with_claim`].
    #[serde(default, flatten)]
    claims: Map<String, Value>,
}

impl Session {
    pub fn new(subject: impl Into<String>, timestamp: i64, remember: bool) -> Self {
        Self { subject: subject.into(), timestamp, remember, claims: Map::new() }
    }

    /// Attach a claim. Names that collide with the core fields are ignored.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        if !RESERVED_FIELDS.contains(&name) {
            let _ = self.claims.insert(name.to_string(), value);
        }
        self
    }

    pub fn claims(&self) -> &Map<String, Value> { &self.claims }

    /// Summary returned to clients by `refresh-session`: the core fields plus any claims.
    pub fn describe(&self) -> Value {
        let mut out = self.claims.clone();
        let _ = out.insert("subject".into(), Value::from(self.subject.as_str()));
        let _ = out.insert("timestamp".into(), Value::from(self.timestamp));
        let _ = out.insert("remember".into(), Value::from(self.remember));
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claims_flatten_next_to_core_fields() {
        let s = Session::new("u1", 1_000, true).with_claim("name", json!("Ada"));
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v, json!({"subject": "u1", "timestamp": 1000, "remember": true, "name": "Ada"}));
        let back: Session = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn reserved_claims_are_ignored() {
        let s = Session::new("u1", 5, false).with_claim("subject", json!("intruder"));
        assert_eq!(s.subject, "u1");
        assert!(s.claims().is_empty());
    }

    #[test]
    fn describe_includes_claims() {
        let s = Session::new("u1", 5, false).with_claim("username", json!("ada"));
        assert_eq!(s.describe(), json!({"subject": "u1", "timestamp": 5, "remember": false, "username": "ada"}));
    }

    #[test]
    fn remember_defaults_to_false() {
        let s: Session = serde_json::from_value(json!({"subject": "u2", "timestamp": 7})).unwrap();
        assert!(!s.remember);
        assert!(s.claims().is_empty());
    }
}
