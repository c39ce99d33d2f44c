//! Password hashing and resource access descriptors.
//!
//! Access blocks are plain data stored on resources. The dispatcher never looks at
//! them; resource handlers call [`AccessBlock::permits`] when they need to.

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Private,
    #[serde(alias = "custom")]
    Whitelist,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope { Admin, Edit, View, Control }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub level: AccessLevel,
    /// Authorized user ids; ignored when the level is public.
    #[serde(default)]
    pub users: Vec<String>,
}

impl AccessScope {
    pub fn with_level(level: AccessLevel) -> Self { Self { level, users: Vec::new() } }

    fn admits(&self, subject: Option<&str>) -> bool {
        match self.level {
            AccessLevel::Public => true,
            AccessLevel::Whitelist => subject.map(|s| self.users.iter().any(|u| u == s)).unwrap_or(false),
            AccessLevel::Private => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessBlock {
    /// Owning user id; always passes every scope.
    #[serde(default)]
    pub admin: Option<String>,
    #[serde(default = "AccessBlock::default_edit")]
    pub edit: AccessScope,
    #[serde(default = "AccessBlock::default_view")]
    pub view: AccessScope,
    #[serde(default = "AccessBlock::default_control")]
    pub control: AccessScope,
}

impl AccessBlock {
    fn default_edit() -> AccessScope { AccessScope::with_level(AccessLevel::Private) }
    fn default_view() -> AccessScope { AccessScope::with_level(AccessLevel::Whitelist) }
    fn default_control() -> AccessScope { AccessScope::with_level(AccessLevel::Private) }

    pub fn owned_by(admin: impl Into<String>) -> Self {
        Self { admin: Some(admin.into()), edit: Self::default_edit(), view: Self::default_view(), control: Self::default_control() }
    }

    pub fn is_admin(&self, subject: Option<&str>) -> bool {
        matches!((self.admin.as_deref(), subject), (Some(a), Some(s)) if a == s)
    }

    pub fn permits(&self, scope: Scope, subject: Option<&str>) -> bool {
        if self.is_admin(subject) { return true; }
        match scope {
            Scope::Admin => false,
            Scope::Edit => self.edit.admits(subject),
            Scope::View => self.view.admits(subject) || self.edit.admits(subject),
            Scope::Control => self.control.admits(subject),
        }
    }
}

impl Default for AccessBlock {
    fn default() -> Self {
        Self { admin: None, edit: Self::default_edit(), view: Self::default_view(), control: Self::default_control() }
    }
}
