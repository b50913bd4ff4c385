//! Session configuration consumed, not produced, by the core.
//!
//! Deadlines come in pairs: the short TTL bounds fast-lookup usability
//! (and the cache entry's TTL), the refresh TTL bounds overall existence
//! and drives eviction ordering.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A short/refresh deadline pair, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPair {
    pub ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl TtlPair {
    pub const fn new(ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs as i64)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_secs as i64)
    }
}

/// Which configured deadline pair to issue a session under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLifetime {
    Short,
    #[default]
    Standard,
    Long,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cap on live sessions per (user, role) pair; exceeding it evicts
    /// the oldest session rather than rejecting the new one.
    pub max_sessions_per_role: u32,
    pub short: TtlPair,
    pub standard: TtlPair,
    pub long: TtlPair,
}

impl SessionConfig {
    pub fn ttls(&self, lifetime: SessionLifetime) -> TtlPair {
        match lifetime {
            SessionLifetime::Short => self.short,
            SessionLifetime::Standard => self.standard,
            SessionLifetime::Long => self.long,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_role: 5,
            // 15m / 24h
            short: TtlPair::new(15 * 60, 24 * 60 * 60),
            // 1h / 7d
            standard: TtlPair::new(60 * 60, 7 * 24 * 60 * 60),
            // 24h / 1y
            long: TtlPair::new(24 * 60 * 60, 8766 * 60 * 60),
        }
    }
}
