use serde_json::Value;

use super::session::Session;
use crate::error::{AppError, AppResult};
use crate::storage::doc_id;
use crate::storage::schema::public_view;
use crate::storage::{ResourceKind, SharedStore};
use crate::tprintln;

#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    /// Username or email.
    pub identifier: String,
    pub password: String,
    pub remember: bool,
}

impl LoginRequest {
    /// Read `username` (or `email`), `password` and `remember` from a request payload.
    pub fn from_data(data: &Value) -> AppResult<Self> {
        let identifier = data
            .get("username")
            .or_else(|| data.get("email"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::user("missing_username", "'username' or 'email' is required"))?;
        let password = data
            .get("password")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::user("missing_password", "'password' is required"))?
            .to_string();
        let remember = data.get("remember").and_then(|v| v.as_bool()).unwrap_or(false);
        Ok(Self { identifier, password, remember })
    }
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
    /// Public form of the authenticated user.
    pub user: Value,
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest, now_ms: i64) -> AppResult<LoginResponse>;
}

/// Verifies credentials against the in-memory user collection (Argon2 PHC hashes).
pub struct LocalAuthProvider {
    pub store: SharedStore,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore) -> Self { Self { store } }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest, now_ms: i64) -> AppResult<LoginResponse> {
        let Some(user) = self.store.find_user(&req.identifier) else {
            return Err(AppError::invalid_credentials());
        };
        let hash = user.get("password").and_then(|v| v.as_str()).unwrap_or("");
        if !crate::security::verify_password(hash, &req.password) {
            return Err(AppError::invalid_credentials());
        }
        let Some(subject) = doc_id(&user) else {
            return Err(AppError::internal("corrupt_user", "stored user has no id"));
        };
        let mut session = Session::new(subject, now_ms, req.remember);
        if let Some(name) = user.get("username").cloned() {
            session = session.with_claim("username", name);
        }
        tprintln!("auth.login user={} remember={}", req.identifier, req.remember);
        Ok(LoginResponse { session, user: public_view(ResourceKind::User, &user) })
    }
}
