//!
//! devicehub configuration
//! -----------------------
//! Settings are read from `DEVICEHUB_*` environment variables and may be overridden by
//! command-line flags. The session secret only ever comes from the environment.

use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::Engine;

pub const DEFAULT_PORT: u16 = 7878;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_SESSION_KEY_FIELD: &str = "sessionToken";
pub const DEFAULT_MAX_SESSION_LENGTH: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_EXTENDED_SESSION_LENGTH: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub const USAGE: &str = "devicehub\n\nUSAGE:\n  devicehub [--bind ADDR] [--port N] [--session-key-field NAME] [--max-session-length SECS] [--max-extended-session-length SECS]\n\nOPTIONS:\n  --bind ADDR                          Listen address (env: DEVICEHUB_BIND, default 0.0.0.0)\n  --port N                             Listen port (env: DEVICEHUB_PORT, default 7878)\n  --session-key-field NAME             Envelope field carrying the session token (env: DEVICEHUB_SESSION_KEY_FIELD, default sessionToken)\n  --max-session-length SECS            Lifetime of a normal session (env: DEVICEHUB_MAX_SESSION_LENGTH_SEC, default 86400)\n  --max-extended-session-length SECS   Lifetime of a remembered session (env: DEVICEHUB_MAX_EXTENDED_SESSION_LENGTH_SEC, default 2592000)\n\nThe session secret is read from DEVICEHUB_SESSION_SECRET. DEVICEHUB_ADMIN_USER and\nDEVICEHUB_ADMIN_PASSWORD seed an initial user on startup.\n";

#[derive(Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Name of the envelope field carrying the session token, both directions.
    pub session_key_field: String,
    pub max_session_length: Duration,
    pub max_extended_session_length: Duration,
    /// Symmetric secret the session codec derives its key from. Never logged.
    pub session_secret: String,
    /// True when no secret was configured and one was generated for this process.
    pub generated_secret: bool,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("session_key_field", &self.session_key_field)
            .field("max_session_length", &self.max_session_length)
            .field("max_extended_session_length", &self.max_extended_session_length)
            .field("session_secret", &"<redacted>")
            .field("generated_secret", &self.generated_secret)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            session_key_field: DEFAULT_SESSION_KEY_FIELD.to_string(),
            max_session_length: DEFAULT_MAX_SESSION_LENGTH,
            max_extended_session_length: DEFAULT_MAX_EXTENDED_SESSION_LENGTH,
            session_secret: String::new(),
            generated_secret: false,
            admin_user: None,
            admin_password: None,
        }
    }
}

fn parse_u64_env(name: &str) -> Option<u64> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<u64>().ok(),
        Err(_) => None,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn random_secret() -> Result<String> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl Config {
    /// Environment first, then CLI flags on top, then validation.
    pub fn load(args: &[String]) -> Result<Self> {
        let mut cfg = Self::from_env()?;
        cfg.apply_args(args)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        if let Some(b) = non_empty_env("DEVICEHUB_BIND") { cfg.bind = b; }
        if let Some(p) = env::var("DEVICEHUB_PORT").ok().and_then(|v| v.trim().parse::<u16>().ok()) { cfg.port = p; }
        if let Some(f) = non_empty_env("DEVICEHUB_SESSION_KEY_FIELD") { cfg.session_key_field = f; }
        if let Some(s) = parse_u64_env("DEVICEHUB_MAX_SESSION_LENGTH_SEC") { cfg.max_session_length = Duration::from_secs(s); }
        if let Some(s) = parse_u64_env("DEVICEHUB_MAX_EXTENDED_SESSION_LENGTH_SEC") { cfg.max_extended_session_length = Duration::from_secs(s); }
        cfg.admin_user = non_empty_env("DEVICEHUB_ADMIN_USER");
        cfg.admin_password = non_empty_env("DEVICEHUB_ADMIN_PASSWORD");
        match non_empty_env("DEVICEHUB_SESSION_SECRET") {
            Some(secret) => cfg.session_secret = secret,
            None => {
                cfg.session_secret = random_secret()?;
                cfg.generated_secret = true;
            }
        }
        Ok(cfg)
    }

    pub fn apply_args(&mut self, args: &[String]) -> Result<()> {
        if let Some(b) = arg_value(args, "--bind") { self.bind = b.to_string(); }
        if let Some(p) = arg_value(args, "--port") {
            self.port = p.parse::<u16>().map_err(|_| anyhow!("invalid --port value: {p}"))?;
        }
        if let Some(f) = arg_value(args, "--session-key-field") { self.session_key_field = f.to_string(); }
        if let Some(s) = arg_value(args, "--max-session-length") {
            let secs = s.parse::<u64>().map_err(|_| anyhow!("invalid --max-session-length value: {s}"))?;
            self.max_session_length = Duration::from_secs(secs);
        }
        if let Some(s) = arg_value(args, "--max-extended-session-length") {
            let secs = s.parse::<u64>().map_err(|_| anyhow!("invalid --max-extended-session-length value: {s}"))?;
            self.max_extended_session_length = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_key_field.trim().is_empty() {
            return Err(anyhow!("session key field must not be empty"));
        }
        if self.session_key_field == "data" {
            return Err(anyhow!("session key field must not collide with the 'data' envelope field"));
        }
        if self.max_session_length.is_zero() || self.max_extended_session_length.is_zero() {
            return Err(anyhow!("session lengths must be greater than zero"));
        }
        if self.max_extended_session_length < self.max_session_length {
            return Err(anyhow!("extended session length must not be shorter than the normal session length"));
        }
        if self.session_secret.is_empty() {
            return Err(anyhow!("session secret must not be empty"));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String { format!("{}:{}", self.bind, self.port) }
}
