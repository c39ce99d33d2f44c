//!
//! devicehub storage module
//! ------------------------
//! In-memory document store backing the resource handlers. Each resource kind has its
//! own `Collection` of JSON documents keyed by a generated id. Documents always carry
//! `id`, `created` and `updated`; kind-specific rules (required fields, uniqueness,
//! password hashing, access defaults) live in `schema`.
//!
//! The store is usually handled through `SharedStore` (`Arc<Store>`), which is cheap to
//! clone into every handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

mod collection;
pub mod schema;

pub use collection::{doc_id, Collection, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Converter,
    Device,
    System,
    User,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [ResourceKind::Converter, ResourceKind::Device, ResourceKind::System, ResourceKind::User];

    pub fn singular(&self) -> &'static str {
        match self {
            ResourceKind::Converter => "converter",
            ResourceKind::Device => "device",
            ResourceKind::System => "system",
            ResourceKind::User => "user",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Converter => "converters",
            ResourceKind::Device => "devices",
            ResourceKind::System => "systems",
            ResourceKind::User => "users",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.singular()) }
}

/// One collection per resource kind.
pub struct Store {
    collections: HashMap<ResourceKind, Collection>,
}

impl Store {
    pub fn new() -> Self {
        let collections = ResourceKind::ALL.iter().map(|k| (*k, Collection::new(*k))).collect();
        Self { collections }
    }

    pub fn collection(&self, kind: ResourceKind) -> &Collection {
        // every kind is inserted in `new`
        &self.collections[&kind]
    }
}

impl Default for Store {
    fn default() -> Self { Self::new() }
}

#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Store>);

impl SharedStore {
    pub fn new() -> Self { Self(Arc::new(Store::new())) }

    pub fn collection(&self, kind: ResourceKind) -> &Collection { self.0.collection(kind) }

    pub fn users(&self) -> &Collection { self.collection(ResourceKind::User) }

    /// Look a user up by username, falling back to (lowercased) email.
    pub fn find_user(&self, identifier: &str) -> Option<Document> {
        let users = self.users();
        users
            .find_by("username", identifier)
            .or_else(|| users.find_by("email", &identifier.trim().to_lowercase()))
    }

    /// Create the bootstrap user if it does not exist yet. Returns true when a user was created.
    pub fn ensure_user(&self, username: &str, password: &str) -> Result<bool> {
        if self.users().find_by("username", username).is_some() { return Ok(false); }
        let data = serde_json::json!({
            "username": username,
            "name": username,
            "email": format!("{username}@localhost"),
            "password": password,
        });
        let doc = schema::prepare_create(ResourceKind::User, &data, None)?;
        let created = self.users().insert(doc, schema::unique_fields(ResourceKind::User))?;
        info!(target: "startup", "created bootstrap user '{}' (id={})", username, doc_id(&created).unwrap_or_default());
        Ok(true)
    }
}
