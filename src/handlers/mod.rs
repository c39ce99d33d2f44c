//! Operation handlers and the table wiring them to wire names.

mod resource;
mod session;

pub use resource::ResourceHandler;
pub use session::{CreateSession, DestroySession, RefreshSession};

use crate::error::{AppError, AppResult};
use crate::server::registry::{OperationTable, OperationTag, Verb};
use crate::storage::ResourceKind;

/// Run CPU-heavy work (Argon2 hashing and verification) on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("blocking_task_failed".to_string(), e.to_string()))?
}

/// Every operation the hub serves. Users cannot be destroyed over the wire.
pub fn build_operation_table() -> OperationTable {
    let mut table = OperationTable::new();
    for kind in ResourceKind::ALL {
        for verb in Verb::CRUD {
            if kind == ResourceKind::User && verb == Verb::Destroy { continue; }
            table.register(OperationTag::resource(kind, verb), ResourceHandler::new(kind, verb));
        }
    }
    table.register(OperationTag::session(Verb::Create), CreateSession);
    table.register(OperationTag::session(Verb::Destroy), DestroySession);
    table.register(OperationTag::session(Verb::Refresh), RefreshSession);
    table
}
