use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::error::AppResult;
use super::blocking;
use crate::identity::{require_subject, AuthProvider, LocalAuthProvider, LoginRequest};
use crate::server::registry::{HandlerContext, OperationHandler, Reply, SessionChange};
use crate::storage::schema::public_view;
use crate::storage::ResourceKind;

/// `create-session`: verify credentials and install a fresh session on the connection.
pub struct CreateSession;

#[async_trait]
impl OperationHandler for CreateSession {
    async fn handle(&self, data: Value, ctx: &HandlerContext) -> AppResult<Reply> {
        let req = LoginRequest::from_data(&data)?;
        let remember = req.remember;
        let (store, now_ms) = (ctx.store.clone(), ctx.now_ms);
        let resp = blocking(move || LocalAuthProvider::new(store).login(&req, now_ms)).await?;
        info!(connection = %ctx.connection_id, subject = %resp.session.subject, remember, "session created");
        let body = json!({ "session": resp.session.describe(), "user": resp.user });
        Ok(Reply::data(body).with_session(SessionChange::Install(resp.session)))
    }
}

/// `destroy-session`: always succeeds, clearing whatever the connection held.
pub struct DestroySession;

#[async_trait]
impl OperationHandler for DestroySession {
    async fn handle(&self, _data: Value, ctx: &HandlerContext) -> AppResult<Reply> {
        if let Some(subject) = ctx.subject() {
            info!(connection = %ctx.connection_id, subject, "session destroyed");
        }
        Ok(Reply::empty().with_session(SessionChange::Clear))
    }
}

/// `refresh-session`: report the current session; the dispatcher re-seals the token.
pub struct RefreshSession;

#[async_trait]
impl OperationHandler for RefreshSession {
    async fn handle(&self, _data: Value, ctx: &HandlerContext) -> AppResult<Reply> {
        let subject = require_subject(ctx.session())?;
        let user = ctx
            .store
            .users()
            .get(subject)
            .map(|u| public_view(ResourceKind::User, &u))
            .unwrap_or(Value::Null);
        let session = ctx.session().map(|s| s.describe()).unwrap_or(Value::Null);
        Ok(Reply::data(json!({ "session": session, "user": user })))
    }
}
