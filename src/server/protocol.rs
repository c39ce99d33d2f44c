//! Wire frames exchanged over `/ws` and the request/response envelopes they carry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Client -> server. `id` present means the client waits for an acknowledgement.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Ack {
        id: u64,
        error: Option<Value>,
        response: Option<Value>,
    },
    Event {
        event: String,
        data: Value,
    },
}

impl OutboundFrame {
    pub fn error_event(err: &AppError) -> Self {
        OutboundFrame::Event { event: "error".into(), data: err.to_wire() }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize outbound frame");
            String::new()
        })
    }
}

/// `{ data, <key_field>? }` as received.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub data: Value,
    /// `None` when the token field is absent or null. An empty string is still a token.
    pub token: Option<String>,
}

impl RequestEnvelope {
    pub fn from_wire(payload: Option<&Value>, key_field: &str) -> Self {
        let Some(Value::Object(map)) = payload else {
            return Self { data: Value::Object(Map::new()), token: None };
        };
        let data = match map.get("data") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(v) => v.clone(),
        };
        let token = match map.get(key_field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            // a non-string token can never decode; keep it so dispatch rejects it
            Some(other) => Some(other.to_string()),
        };
        Self { data, token }
    }

    pub fn to_wire(&self, key_field: &str) -> Value {
        let mut map = Map::new();
        let _ = map.insert("data".into(), self.data.clone());
        if let Some(t) = &self.token {
            let _ = map.insert(key_field.to_string(), Value::String(t.clone()));
        }
        Value::Object(map)
    }
}

/// `{ data, <key_field> }` as sent. The token is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub data: Value,
    pub token: String,
}

impl ResponseEnvelope {
    pub fn to_wire(&self, key_field: &str) -> Value {
        let mut map = Map::new();
        let _ = map.insert("data".into(), self.data.clone());
        let _ = map.insert(key_field.to_string(), Value::String(self.token.clone()));
        Value::Object(map)
    }

    pub fn from_wire(value: &Value, key_field: &str) -> Option<Self> {
        let map = value.as_object()?;
        let token = map.get(key_field)?.as_str()?.to_string();
        let data = map.get("data").cloned().unwrap_or(Value::Null);
        Some(Self { data, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_payload_and_data_default_to_empty_object() {
        let env = RequestEnvelope::from_wire(None, "sessionToken");
        assert_eq!(env.data, json!({}));
        assert_eq!(env.token, None);

        let env = RequestEnvelope::from_wire(Some(&json!({"data": null, "sessionToken": null})), "sessionToken");
        assert_eq!(env.data, json!({}));
        assert_eq!(env.token, None);

        let env = RequestEnvelope::from_wire(Some(&json!("not an object")), "sessionToken");
        assert_eq!(env.data, json!({}));
    }

    #[test]
    fn token_uses_configured_field() {
        let payload = json!({"data": {"id": "x"}, "tok": "abc", "sessionToken": "ignored"});
        let env = RequestEnvelope::from_wire(Some(&payload), "tok");
        assert_eq!(env.token.as_deref(), Some("abc"));
        assert_eq!(env.data, json!({"id": "x"}));

        let env = RequestEnvelope::from_wire(Some(&json!({"tok": ""})), "tok");
        assert_eq!(env.token.as_deref(), Some(""));
        let env = RequestEnvelope::from_wire(Some(&json!({"tok": 17})), "tok");
        assert_eq!(env.token.as_deref(), Some("17"));
    }

    #[test]
    fn response_always_carries_token_field() {
        let resp = ResponseEnvelope { data: json!({}), token: String::new() };
        assert_eq!(resp.to_wire("sessionToken"), json!({"data": {}, "sessionToken": ""}));
        let back = ResponseEnvelope::from_wire(&resp.to_wire("sessionToken"), "sessionToken").unwrap();
        assert_eq!(back, resp);
        assert!(ResponseEnvelope::from_wire(&json!({"data": {}}), "sessionToken").is_none());
    }

    #[test]
    fn frame_shapes() {
        let ack = OutboundFrame::Ack { id: 3, error: None, response: Some(json!({"data": {}})) };
        let v: Value = serde_json::from_str(&ack.to_text()).unwrap();
        assert_eq!(v["type"], "ack");
        assert_eq!(v["id"], 3);
        assert!(v["error"].is_null());

        let ev = OutboundFrame::error_event(&AppError::bad_request());
        let v: Value = serde_json::from_str(&ev.to_text()).unwrap();
        assert_eq!(v, json!({"type": "event", "event": "error", "data": {"type": "bad_request", "code": "BAD_REQUEST", "message": "session token could not be decoded"}}));

        let inbound: InboundFrame = serde_json::from_str(r#"{"op":"get-devices"}"#).unwrap();
        assert_eq!(inbound.id, None);
        assert!(inbound.payload.is_none());
    }
}
