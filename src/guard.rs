//! Per-IP admission control: a fixed-window request counter plus a lockout
//! after repeated authentication failures.
//!
//! State lives in the `rate_limits` table so it survives restarts. Each
//! check is a single redb write transaction, which serializes concurrent
//! requests from the same address.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::storage::models::RateLimitEntry;
use crate::storage::Database;

#[derive(Debug, Clone)]
pub struct GuardPolicy {
    pub window: Duration,
    /// Requests admitted per window
    pub max_requests: u32,
    /// Consecutive auth failures that trigger a block
    pub max_failures: u32,
    pub block_duration: Duration,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            window: Duration::seconds(60),
            max_requests: 300,
            max_failures: 10,
            block_duration: Duration::minutes(5),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitGuard {
    db: Database,
    policy: GuardPolicy,
}

impl RateLimitGuard {
    pub fn new(db: Database, policy: GuardPolicy) -> Self {
        Self { db, policy }
    }

    /// Admit or reject one request from `ip`.
    pub fn check(&self, ip: &str) -> Result<()> {
        self.check_at(ip, Utc::now())
    }

    pub fn check_at(&self, ip: &str, now: DateTime<Utc>) -> Result<()> {
        let policy = &self.policy;

        self.db.update_rate_limit(ip, |current| {
            let Some(mut entry) = current else {
                let mut entry = RateLimitEntry::new(ip, now);
                entry.request_count = 1;
                return (Some(entry), Ok(()));
            };

            if let Some(until) = entry.blocked_until {
                if now < until {
                    return (None, Err(Error::LockedOut));
                }
                // block has lapsed, start over
                entry.blocked_until = None;
                entry.failed_attempts = 0;
            }

            if now - entry.window_start > policy.window {
                entry.window_start = now;
                entry.request_count = 1;
                return (Some(entry), Ok(()));
            }

            if entry.request_count >= policy.max_requests {
                return (Some(entry), Err(Error::RateLimited));
            }

            entry.request_count += 1;
            (Some(entry), Ok(()))
        })?
    }

    /// Count an authentication failure. Returns the failure count after
    /// this one.
    pub fn record_failure(&self, ip: &str) -> Result<u32> {
        self.record_failure_at(ip, Utc::now())
    }

    pub fn record_failure_at(&self, ip: &str, now: DateTime<Utc>) -> Result<u32> {
        let policy = &self.policy;

        let attempts = self.db.update_rate_limit(ip, |current| {
            let mut entry = current.unwrap_or_else(|| RateLimitEntry::new(ip, now));
            entry.failed_attempts += 1;
            if entry.failed_attempts >= policy.max_failures {
                entry.blocked_until = Some(now + policy.block_duration);
            }
            let attempts = entry.failed_attempts;
            (Some(entry), attempts)
        })?;

        if attempts >= policy.max_failures {
            tracing::warn!(ip = %ip, attempts, "Blocking address after repeated failures");
        } else {
            tracing::debug!(ip = %ip, attempts, "Recorded failed attempt");
        }
        Ok(attempts)
    }

    /// Drop entries idle for longer than `ttl`. Entries with failures or a
    /// block are kept so a restart of the window cannot erase them.
    pub fn prune_at(&self, now: DateTime<Utc>, ttl: Duration) -> Result<u64> {
        let removed = self.db.prune_rate_limits(|entry| {
            entry.failed_attempts == 0
                && entry.blocked_until.map_or(true, |until| until <= now)
                && now - entry.window_start > ttl
        })?;
        Ok(removed)
    }
}

/// Client address for rate limiting: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
