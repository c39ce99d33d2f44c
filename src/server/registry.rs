//! Operation table: operation names mapped to typed async handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::identity::Session;
use crate::storage::{ResourceKind, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Index,
    Show,
    Create,
    Update,
    Destroy,
    Refresh,
}

impl Verb {
    pub const CRUD: [Verb; 5] = [Verb::Index, Verb::Show, Verb::Create, Verb::Update, Verb::Destroy];
}

/// What an operation acts on. `kind == None` marks the session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationTag {
    pub kind: Option<ResourceKind>,
    pub verb: Verb,
}

impl OperationTag {
    pub fn resource(kind: ResourceKind, verb: Verb) -> Self { Self { kind: Some(kind), verb } }

    pub fn session(verb: Verb) -> Self { Self { kind: None, verb } }

    /// Wire name, e.g. `get-devices`, `update-system`, `destroy-session`.
    pub fn name(&self) -> String {
        let Some(kind) = self.kind else {
            let verb = match self.verb {
                Verb::Create => "create",
                Verb::Destroy => "destroy",
                Verb::Refresh | Verb::Index | Verb::Show | Verb::Update => "refresh",
            };
            return format!("{verb}-session");
        };
        match self.verb {
            Verb::Index => format!("get-{}", kind.plural()),
            Verb::Show => format!("get-{}", kind.singular()),
            Verb::Create => format!("create-{}", kind.singular()),
            Verb::Update => format!("update-{}", kind.singular()),
            Verb::Destroy => format!("destroy-{}", kind.singular()),
            Verb::Refresh => format!("refresh-{}", kind.singular()),
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.name()) }
}

/// Requested change to the connection's session slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionChange {
    #[default]
    Keep,
    Install(Session),
    Clear,
}

/// Successful handler outcome.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    /// `None` is sent as `{}`.
    pub data: Option<Value>,
    pub session: SessionChange,
}

impl Reply {
    pub fn data(data: Value) -> Self { Self { data: Some(data), session: SessionChange::Keep } }

    pub fn empty() -> Self { Self::default() }

    pub fn with_session(mut self, change: SessionChange) -> Self {
        self.session = change;
        self
    }
}

/// Per-request view handed to handlers once the session has been resolved and checked.
#[derive(Clone)]
pub struct HandlerContext {
    pub connection_id: Uuid,
    pub store: SharedStore,
    pub now_ms: i64,
    pub session: Option<Arc<Session>>,
}

impl HandlerContext {
    pub fn session(&self) -> Option<&Session> { self.session.as_deref() }

    pub fn subject(&self) -> Option<&str> { self.session().map(|s| s.subject.as_str()) }
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, data: Value, ctx: &HandlerContext) -> AppResult<Reply>;
}

pub struct Registered {
    pub tag: OperationTag,
    pub handler: Arc<dyn OperationHandler>,
}

#[derive(Default)]
pub struct OperationTable {
    handlers: HashMap<String, Registered>,
}

impl OperationTable {
    pub fn new() -> Self { Self::default() }

    /// Register under the tag's wire name, replacing any earlier handler for it.
    pub fn register(&mut self, tag: OperationTag, handler: impl OperationHandler + 'static) {
        let _ = self.handlers.insert(tag.name(), Registered { tag, handler: Arc::new(handler) });
    }

    pub fn get(&self, op: &str) -> Option<&Registered> { self.handlers.get(op) }

    pub fn has_operation(&self, op: &str) -> bool { self.handlers.contains_key(op) }

    /// All operation names, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize { self.handlers.len() }

    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }
}
