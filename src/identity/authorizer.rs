//! Handler-side checks against the resolved session and stored access blocks.
//! The dispatcher only establishes who is asking; these helpers decide what they may touch.

use super::session::Session;
use crate::error::{AppError, AppResult};
use crate::security::{AccessBlock, Scope};

/// The session's subject, or `SESSION_REQUIRED`.
pub fn require_subject(session: Option<&Session>) -> AppResult<&str> {
    session.map(|s| s.subject.as_str()).ok_or_else(AppError::session_required)
}

pub fn check_access(block: &AccessBlock, scope: Scope, session: Option<&Session>) -> AppResult<()> {
    let subject = session.map(|s| s.subject.as_str());
    if block.permits(scope, subject) {
        return Ok(());
    }
    if subject.is_none() && scope != Scope::View {
        return Err(AppError::session_required());
    }
    let what = match scope {
        Scope::Admin => "administer",
        Scope::Edit => "edit",
        Scope::View => "view",
        Scope::Control => "control",
    };
    Err(AppError::forbidden(format!("not allowed to {what} this resource")))
}
