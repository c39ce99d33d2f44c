use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::ResourceKind;
use crate::error::{AppError, AppResult};

/// A stored resource: a JSON object with at least `id`, `created` and `updated`.
pub type Document = Map<String, Value>;

/// Fields maintained by the store; never taken from client input.
pub const MANAGED_FIELDS: [&str; 3] = ["id", "created", "updated"];

pub fn doc_id(doc: &Document) -> Option<&str> { doc.get("id").and_then(|v| v.as_str()) }

fn now_stamp() -> String { chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true) }

/// In-memory collection of documents of one resource kind.
#[derive(Clone)]
pub struct Collection {
    kind: ResourceKind,
    map: Arc<parking_lot::RwLock<StdHashMap<String, Document>>>,
}

impl Collection {
    pub(crate) fn new(kind: ResourceKind) -> Self {
        Self { kind, map: Arc::new(parking_lot::RwLock::new(StdHashMap::new())) }
    }

    pub fn kind(&self) -> ResourceKind { self.kind }
    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
    pub fn get(&self, id: &str) -> Option<Document> { self.map.read().get(id).cloned() }

    /// All documents ordered by creation time, then id.
    pub fn list(&self) -> Vec<Document> {
        let mut out: Vec<Document> = self.map.read().values().cloned().collect();
        out.sort_by(|a, b| {
            let ka = (a.get("created").and_then(|v| v.as_str()), doc_id(a));
            let kb = (b.get("created").and_then(|v| v.as_str()), doc_id(b));
            ka.cmp(&kb)
        });
        out
    }

    /// First document whose string field equals `value`.
    pub fn find_by(&self, field: &str, value: &str) -> Option<Document> {
        self.map.read().values().find(|d| d.get(field).and_then(|v| v.as_str()) == Some(value)).cloned()
    }

    fn check_unique(map: &StdHashMap<String, Document>, doc: &Document, unique: &[&str], skip_id: Option<&str>) -> AppResult<()> {
        for field in unique {
            let Some(wanted) = doc.get(*field).and_then(|v| v.as_str()) else { continue; };
            let clash = map.iter().any(|(id, other)| {
                Some(id.as_str()) != skip_id && other.get(*field).and_then(|v| v.as_str()) == Some(wanted)
            });
            if clash {
                return Err(AppError::conflict(format!("duplicate_{field}"), format!("{field} '{wanted}' is already taken")));
            }
        }
        Ok(())
    }

    /// Insert a new document, assigning id and timestamps. Uniqueness is checked under the same lock.
    pub fn insert(&self, mut doc: Document, unique: &[&str]) -> AppResult<Document> {
        for f in MANAGED_FIELDS { let _ = doc.remove(f); }
        let id = uuid::Uuid::new_v4().simple().to_string();
        let stamp = now_stamp();
        let _ = doc.insert("id".into(), Value::String(id.clone()));
        let _ = doc.insert("created".into(), Value::String(stamp.clone()));
        let _ = doc.insert("updated".into(), Value::String(stamp));

        let mut w = self.map.write();
        Self::check_unique(&w, &doc, unique, None)?;
        let _ = w.insert(id, doc.clone());
        Ok(doc)
    }

    /// Shallow-merge `patch` into the stored document. Managed fields are left alone; `updated` is bumped.
    pub fn update(&self, id: &str, patch: Document, unique: &[&str]) -> AppResult<Document> {
        let mut w = self.map.write();
        let Some(current) = w.get(id) else {
            return Err(AppError::missing(format!("{} '{}' not found", self.kind, id)));
        };
        let mut merged = current.clone();
        for (k, v) in patch {
            if MANAGED_FIELDS.contains(&k.as_str()) { continue; }
            let _ = merged.insert(k, v);
        }
        let _ = merged.insert("updated".into(), Value::String(now_stamp()));
        Self::check_unique(&w, &merged, unique, Some(id))?;
        let _ = w.insert(id.to_string(), merged.clone());
        Ok(merged)
    }

    pub fn remove(&self, id: &str) -> AppResult<Document> {
        self.map
            .write()
            .remove(id)
            .ok_or_else(|| AppError::missing(format!("{} '{}' not found", self.kind, id)))
    }
}
