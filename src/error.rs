//! Unified application error model.
//! Dispatch rejections, handler failures and store validation errors all travel as
//! `AppError`; the wire form is the serde representation (`type`, `code`, `message`).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Token present on a request but undecodable.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// Decoded session is past its allowed lifetime.
pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
/// Operation name not present in the operation table.
pub const UNKNOWN_OPERATION: &str = "UNKNOWN_OPERATION";
pub const SESSION_REQUIRED: &str = "SESSION_REQUIRED";
pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
pub const FORBIDDEN: &str = "FORBIDDEN";
pub const NOT_FOUND: &str = "NOT_FOUND";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    BadRequest { code: String, message: String },
    SessionExpired { code: String, message: String },
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::BadRequest { code, .. }
            | AppError::SessionExpired { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest { message, .. }
            | AppError::SessionExpired { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn bad_request() -> Self { AppError::BadRequest { code: BAD_REQUEST.into(), message: "session token could not be decoded".into() } }
    pub fn session_expired() -> Self { AppError::SessionExpired { code: SESSION_EXPIRED.into(), message: "session has expired".into() } }
    pub fn malformed_frame(detail: &str) -> Self { AppError::BadRequest { code: BAD_REQUEST.into(), message: format!("malformed frame: {detail}") } }
    pub fn unknown_operation(op: &str) -> Self { AppError::BadRequest { code: UNKNOWN_OPERATION.into(), message: format!("unknown operation '{op}'") } }
    pub fn session_required() -> Self { AppError::Auth { code: SESSION_REQUIRED.into(), message: "this operation requires a session".into() } }
    pub fn invalid_credentials() -> Self { AppError::Auth { code: INVALID_CREDENTIALS.into(), message: "invalid credentials".into() } }
    pub fn forbidden<S: Into<String>>(msg: S) -> Self { AppError::Forbidden { code: FORBIDDEN.into(), message: msg.into() } }
    pub fn missing<S: Into<String>>(msg: S) -> Self { AppError::NotFound { code: NOT_FOUND.into(), message: msg.into() } }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// JSON value carried in acknowledgements and `error` events.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "code": self.code_str(), "message": self.message() }))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}
