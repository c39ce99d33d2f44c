//!
//! Session-aware request dispatch
//! ------------------------------
//! Every inbound operation passes through [`Dispatcher::dispatch`]:
//!
//! 1. resolve the session: the connection's cached one, otherwise the token on the
//!    request (installed into the connection on success, `BAD_REQUEST` on failure);
//! 2. reject expired sessions with `SESSION_EXPIRED`;
//! 3. run the handler;
//! 4. apply the handler's session change and answer with a freshly sealed token.
//!
//! `destroy-session` skips the rejection in step 1 and all of step 2, so a client can always log out.
//!
//! The socket loop splits this in two: [`Dispatcher::accept_frame`] runs steps 1 and 2 in
//! frame order, and [`Dispatcher::complete`] runs the rest on a spawned task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::connection::Connection;
use super::protocol::{InboundFrame, OutboundFrame, RequestEnvelope, ResponseEnvelope};
use super::registry::{HandlerContext, OperationHandler, OperationTable, SessionChange};
use crate::config::Config;
use crate::error::AppError;
use crate::identity::{Clock, SessionCodec, SessionPolicy, SystemClock};
use crate::storage::SharedStore;

pub const DESTROY_SESSION: &str = "destroy-session";

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The handler ran. `error` is its failure, if any; the response is sent either way.
    Completed { error: Option<AppError>, response: ResponseEnvelope },
    /// Stopped before the handler: bad token, expired session or unknown operation.
    Rejected(AppError),
}

impl DispatchOutcome {
    pub fn error(&self) -> Option<&AppError> {
        match self {
            DispatchOutcome::Completed { error, .. } => error.as_ref(),
            DispatchOutcome::Rejected(e) => Some(e),
        }
    }

    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            DispatchOutcome::Completed { response, .. } => Some(response),
            DispatchOutcome::Rejected(_) => None,
        }
    }

    fn into_ack(self, id: u64, key_field: &str) -> OutboundFrame {
        match self {
            DispatchOutcome::Completed { error, response } => OutboundFrame::Ack {
                id,
                error: error.map(|e| e.to_wire()),
                response: Some(response.to_wire(key_field)),
            },
            DispatchOutcome::Rejected(e) => OutboundFrame::Ack { id, error: Some(e.to_wire()), response: None },
        }
    }
}

pub struct Dispatcher {
    table: OperationTable,
    codec: SessionCodec,
    policy: SessionPolicy,
    store: SharedStore,
    clock: Arc<dyn Clock>,
    key_field: String,
}

impl Dispatcher {
    pub fn new(
        table: OperationTable,
        codec: SessionCodec,
        policy: SessionPolicy,
        store: SharedStore,
        clock: Arc<dyn Clock>,
        key_field: impl Into<String>,
    ) -> Self {
        Self { table, codec, policy, store, clock, key_field: key_field.into() }
    }

    pub fn from_config(cfg: &Config, table: OperationTable, store: SharedStore) -> Self {
        Self::new(
            table,
            SessionCodec::new(&cfg.session_secret),
            SessionPolicy::from_config(cfg),
            store,
            Arc::new(SystemClock),
            cfg.session_key_field.clone(),
        )
    }

    pub fn key_field(&self) -> &str { &self.key_field }

    pub fn table(&self) -> &OperationTable { &self.table }

    pub fn codec(&self) -> &SessionCodec { &self.codec }

    fn reject(conn: &Connection, op: &str, err: AppError) -> DispatchOutcome {
        warn!(connection = %conn.id(), op, code = err.code_str(), "request rejected");
        conn.emit_error(&err);
        DispatchOutcome::Rejected(err)
    }

    /// Steps 1 and 2: settle the connection's session for `op`. Never awaits, so callers
    /// that resolve frames in arrival order see each session install before the next frame.
    fn resolve(&self, conn: &Connection, op: &str, request: RequestEnvelope) -> Result<Resolved, DispatchOutcome> {
        let Some(entry) = self.table.get(op) else {
            return Err(Self::reject(conn, op, AppError::unknown_operation(op)));
        };
        let exempt = op == DESTROY_SESSION;

        let mut session = conn.current_session();
        if session.is_none() {
            if let Some(token) = request.token.as_deref() {
                match self.codec.decode(token) {
                    Some(decoded) => session = Some(conn.install_if_absent(decoded)),
                    None if exempt => {}
                    None => return Err(Self::reject(conn, op, AppError::bad_request())),
                }
            }
        }

        let now_ms = self.clock.now_ms();
        if !exempt {
            if let Some(s) = session.as_deref() {
                if self.policy.is_expired(s, now_ms) {
                    debug!(connection = %conn.id(), subject = %s.subject, expired_at = self.policy.expires_at(s), now_ms, "session expired");
                    return Err(Self::reject(conn, op, AppError::session_expired()));
                }
            }
        }

        let ctx = HandlerContext { connection_id: conn.id(), store: self.store.clone(), now_ms, session };
        Ok(Resolved { op: op.to_string(), handler: entry.handler.clone(), ctx, data: request.data })
    }

    /// Steps 3 and 4: run the handler, apply its session change and reseal.
    async fn invoke(&self, conn: &Connection, resolved: Resolved) -> DispatchOutcome {
        let Resolved { op, handler, ctx, data } = resolved;
        let op = op.as_str();
        debug!(connection = %conn.id(), op, subject = ctx.subject().unwrap_or("-"), "dispatching");

        let result = AssertUnwindSafe(handler.handle(data, &ctx)).catch_unwind().await;
        let (data, mut failure) = match result {
            Ok(Ok(reply)) => {
                match reply.session {
                    SessionChange::Keep => {}
                    SessionChange::Install(s) => conn.replace_session(Some(s)),
                    SessionChange::Clear => conn.replace_session(None),
                }
                (reply.data, None)
            }
            Ok(Err(e)) => (None, Some(e)),
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                          else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                          else { "panic" };
                error!(target: "panic", "handler for '{}' panicked: {}", op, msg);
                (None, Some(AppError::internal("internal_panic", "internal server error")))
            }
        };

        let token = match self.codec.encode(conn.current_session().as_deref()) {
            Ok(t) => t,
            Err(e) => {
                error!(connection = %conn.id(), op, "failed to seal session: {}", e);
                let _ = failure.get_or_insert_with(|| AppError::internal("seal_failed", "could not seal session"));
                String::new()
            }
        };

        if let Some(e) = &failure {
            error!(connection = %conn.id(), op, code = e.code_str(), "operation failed: {}", e.message());
            conn.emit_error(e);
        }

        DispatchOutcome::Completed {
            error: failure,
            response: ResponseEnvelope { data: data.unwrap_or_else(|| json!({})), token },
        }
    }

    pub async fn dispatch(&self, conn: &Connection, op: &str, request: RequestEnvelope) -> DispatchOutcome {
        match self.resolve(conn, op, request) {
            Ok(resolved) => self.invoke(conn, resolved).await,
            Err(outcome) => outcome,
        }
    }

    fn acknowledge(&self, conn: &Connection, id: Option<u64>, outcome: DispatchOutcome) {
        let Some(id) = id else { return; };
        if !conn.send(outcome.into_ack(id, &self.key_field)) {
            debug!(connection = %conn.id(), id, "client went away before the ack");
        }
    }

    /// Parse a text frame and resolve its session. Rejections are acknowledged here;
    /// anything returned still has its handler to run via [`Dispatcher::complete`].
    pub fn accept_frame(&self, conn: &Connection, text: &str) -> Option<PendingRequest> {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(connection = %conn.id(), "invalid frame received");
                conn.emit_error(&AppError::malformed_frame(&e.to_string()));
                return None;
            }
        };
        let request = RequestEnvelope::from_wire(frame.payload.as_ref(), &self.key_field);
        match self.resolve(conn, &frame.op, request) {
            Ok(resolved) => Some(PendingRequest { id: frame.id, resolved }),
            Err(outcome) => {
                self.acknowledge(conn, frame.id, outcome);
                None
            }
        }
    }

    pub async fn complete(&self, conn: &Connection, pending: PendingRequest) {
        let outcome = self.invoke(conn, pending.resolved).await;
        self.acknowledge(conn, pending.id, outcome);
    }

    /// `accept_frame` and `complete` back to back.
    pub async fn handle_frame(&self, conn: &Connection, text: &str) {
        if let Some(pending) = self.accept_frame(conn, text) {
            self.complete(conn, pending).await;
        }
    }
}

struct Resolved {
    op: String,
    handler: Arc<dyn OperationHandler>,
    ctx: HandlerContext,
    data: Value,
}

/// A frame whose session has been settled and whose handler has not run yet.
pub struct PendingRequest {
    id: Option<u64>,
    resolved: Resolved,
}

impl PendingRequest {
    pub fn op(&self) -> &str { &self.resolved.op }
}
