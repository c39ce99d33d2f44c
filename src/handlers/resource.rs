use async_trait::async_trait;
use serde_json::Value;

use super::blocking;
use crate::error::{AppError, AppResult};
use crate::identity::{check_access, require_subject};
use crate::security::Scope;
use crate::server::registry::{HandlerContext, OperationHandler, Reply, Verb};
use crate::storage::schema::{self, access_of, public_view};
use crate::storage::{Document, ResourceKind};

/// CRUD over one resource kind.
#[derive(Debug, Clone, Copy)]
pub struct ResourceHandler {
    pub kind: ResourceKind,
    pub verb: Verb,
}

impl ResourceHandler {
    pub fn new(kind: ResourceKind, verb: Verb) -> Self { Self { kind, verb } }

    fn target_id(&self, data: &Value) -> AppResult<String> {
        match data.get("id").and_then(|v| v.as_str()).map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(AppError::user(format!("missing_{}_id", self.kind), format!("'id' of the {} is required", self.kind))),
        }
    }

    fn load(&self, ctx: &HandlerContext, id: &str) -> AppResult<Document> {
        ctx.store
            .collection(self.kind)
            .get(id)
            .ok_or_else(|| AppError::missing(format!("{} '{}' not found", self.kind, id)))
    }

    fn index(&self, ctx: &HandlerContext) -> AppResult<Reply> {
        let docs = ctx.store.collection(self.kind).list();
        let visible = docs
            .iter()
            .filter(|d| self.kind != ResourceKind::System || access_of(d).permits(Scope::View, ctx.subject()))
            .map(|d| public_view(self.kind, d))
            .collect();
        Ok(Reply::data(Value::Array(visible)))
    }

    fn show(&self, data: &Value, ctx: &HandlerContext) -> AppResult<Reply> {
        let id = self.target_id(data)?;
        let doc = self.load(ctx, &id)?;
        if self.kind == ResourceKind::System {
            check_access(&access_of(&doc), Scope::View, ctx.session())?;
        }
        Ok(Reply::data(public_view(self.kind, &doc)))
    }

    fn create(&self, data: &Value, ctx: &HandlerContext) -> AppResult<Reply> {
        // signup is open; everything else needs an owner
        let subject = match self.kind {
            ResourceKind::User => ctx.subject(),
            _ => Some(require_subject(ctx.session())?),
        };
        let doc = schema::prepare_create(self.kind, data, subject)?;
        let created = ctx.store.collection(self.kind).insert(doc, schema::unique_fields(self.kind))?;
        Ok(Reply::data(public_view(self.kind, &created)))
    }

    fn update(&self, data: &Value, ctx: &HandlerContext) -> AppResult<Reply> {
        let subject = require_subject(ctx.session())?;
        let id = self.target_id(data)?;
        let existing = self.load(ctx, &id)?;
        match self.kind {
            ResourceKind::System => check_access(&access_of(&existing), Scope::Edit, ctx.session())?,
            ResourceKind::User if id != subject => return Err(AppError::forbidden("users may only update themselves")),
            _ => {}
        }
        // an access block may only be rewritten by the system's admin
        if self.kind == ResourceKind::System && data.get("access").is_some() {
            check_access(&access_of(&existing), Scope::Admin, ctx.session())?;
        }
        let patch = schema::prepare_update(self.kind, &existing, data)?;
        let updated = ctx.store.collection(self.kind).update(&id, patch, schema::unique_fields(self.kind))?;
        Ok(Reply::data(public_view(self.kind, &updated)))
    }

    fn destroy(&self, data: &Value, ctx: &HandlerContext) -> AppResult<Reply> {
        let _ = require_subject(ctx.session())?;
        let id = self.target_id(data)?;
        let existing = self.load(ctx, &id)?;
        if self.kind == ResourceKind::System {
            check_access(&access_of(&existing), Scope::Admin, ctx.session())?;
        }
        let removed = ctx.store.collection(self.kind).remove(&id)?;
        Ok(Reply::data(public_view(self.kind, &removed)))
    }

    fn run(&self, data: &Value, ctx: &HandlerContext) -> AppResult<Reply> {
        match self.verb {
            Verb::Index => self.index(ctx),
            Verb::Show => self.show(data, ctx),
            Verb::Create => self.create(data, ctx),
            Verb::Update => self.update(data, ctx),
            Verb::Destroy => self.destroy(data, ctx),
            Verb::Refresh => Err(AppError::internal("unsupported_verb".to_string(), format!("{} has no refresh", self.kind))),
        }
    }

    /// User writes hash passwords.
    fn hashes_passwords(&self) -> bool {
        self.kind == ResourceKind::User && matches!(self.verb, Verb::Create | Verb::Update)
    }
}

#[async_trait]
impl OperationHandler for ResourceHandler {
    async fn handle(&self, data: Value, ctx: &HandlerContext) -> AppResult<Reply> {
        if !self.hashes_passwords() {
            return self.run(&data, ctx);
        }
        let (this, ctx) = (*self, ctx.clone());
        blocking(move || this.run(&data, &ctx)).await
    }
}
