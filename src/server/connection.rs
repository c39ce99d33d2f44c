//! Live connections and their sticky session slot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use super::protocol::OutboundFrame;
use crate::error::AppError;
use crate::identity::Session;

/// One client channel. Holds at most one session, never shared with another connection.
pub struct Connection {
    id: Uuid,
    session: RwLock<Option<Arc<Session>>>,
    outbound: UnboundedSender<OutboundFrame>,
}

impl Connection {
    pub fn new(outbound: UnboundedSender<OutboundFrame>) -> Self {
        Self { id: Uuid::new_v4(), session: RwLock::new(None), outbound }
    }

    pub fn id(&self) -> Uuid { self.id }

    pub fn current_session(&self) -> Option<Arc<Session>> { self.session.read().clone() }

    /// Install `session` only if the slot is still empty. Returns whatever the slot holds afterwards.
    pub fn install_if_absent(&self, session: Session) -> Arc<Session> {
        let mut slot = self.session.write();
        match slot.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                let s = Arc::new(session);
                *slot = Some(s.clone());
                s
            }
        }
    }

    pub fn replace_session(&self, session: Option<Session>) {
        *self.session.write() = session.map(Arc::new);
    }

    /// Queue a frame for the writer task. False once the client is gone.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn emit_error(&self, err: &AppError) {
        if !self.send(OutboundFrame::error_event(err)) {
            debug!(connection = %self.id, code = err.code_str(), "dropped error event for closed connection");
        }
    }
}

/// Connection id -> connection for every open socket.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(&self, conn: Arc<Connection>) {
        let _ = self.inner.write().insert(conn.id(), conn);
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Connection>> { self.inner.write().remove(id) }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Connection>> { self.inner.read().get(id).cloned() }

    pub fn len(&self) -> usize { self.inner.read().len() }

    pub fn is_empty(&self) -> bool { self.inner.read().is_empty() }

    pub fn ids(&self) -> Vec<Uuid> { self.inner.read().keys().copied().collect() }
}
