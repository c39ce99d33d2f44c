//! Session lifetime rules and the clock they are evaluated against.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use super::session::Session;
use crate::config::Config;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 { chrono::Utc::now().timestamp_millis() }
}

/// Settable clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self { Self(AtomicI64::new(now_ms)) }
    pub fn set(&self, now_ms: i64) { self.0.store(now_ms, Ordering::SeqCst); }
    pub fn advance(&self, by: Duration) { self.0.fetch_add(duration_ms(by), Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 { self.0.load(Ordering::SeqCst) }
}

fn duration_ms(d: Duration) -> i64 { i64::try_from(d.as_millis()).unwrap_or(i64::MAX) }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_session_length: Duration,
    pub max_extended_session_length: Duration,
}

impl SessionPolicy {
    pub fn new(max_session_length: Duration, max_extended_session_length: Duration) -> Self {
        Self { max_session_length, max_extended_session_length }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.max_session_length, cfg.max_extended_session_length)
    }

    pub fn max_length_for(&self, session: &Session) -> Duration {
        if session.remember { self.max_extended_session_length } else { self.max_session_length }
    }

    /// Elapsed time strictly greater than the allowed length; the boundary itself is still valid.
    pub fn is_expired(&self, session: &Session, now_ms: i64) -> bool {
        let elapsed = now_ms.saturating_sub(session.timestamp);
        elapsed > duration_ms(self.max_length_for(session))
    }

    /// Epoch millisecond instant after which the session counts as expired.
    pub fn expires_at(&self, session: &Session) -> i64 {
        session.timestamp.saturating_add(duration_ms(self.max_length_for(session)))
    }
}

pub fn is_well_formed(session: &Session) -> bool {
    !session.subject.trim().is_empty() && session.timestamp >= 0
}
