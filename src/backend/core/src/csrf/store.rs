//! Token storage.
//!
//! This module provides the [`TokenStore`] contract and its in-process
//! implementation:
//! - **MemoryStore**: sharded concurrent map with lazy expiry and periodic sweeps
//!
//! The distributed implementation lives in [`super::redis_store`].

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ErrorCode, Result, TollgateError};

/// Default interval between opportunistic sweeps of the memory store.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Key-value record of which tokens are currently valid.
///
/// Implementations must be safe under arbitrary concurrent use.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Record `token` as valid for `ttl`, replacing any previous entry.
    async fn set(&self, token: &str, ttl: Duration) -> Result<()>;

    /// Whether `token` is present and unexpired.
    async fn contains(&self, token: &str) -> Result<bool>;

    /// Remove `token`. Removing an absent token is not an error.
    async fn delete(&self, token: &str) -> Result<()>;

    /// Backend name used in logs and metrics.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    async fn set(&self, token: &str, ttl: Duration) -> Result<()> {
        (**self).set(token, ttl).await
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        (**self).contains(token).await
    }

    async fn delete(&self, token: &str) -> Result<()> {
        (**self).delete(token).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Memory Store
// ═══════════════════════════════════════════════════════════════════════════════

/// In-process token store.
///
/// Expired entries are invisible to [`TokenStore::contains`] immediately and
/// are physically removed on read, by a sweep that `set` triggers at most
/// once per `gc_interval`, or by [`MemoryStore::start_cleanup_task`].
#[derive(Debug)]
pub struct MemoryStore {
    tokens: DashMap<String, Instant>,
    gc_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_gc_interval(DEFAULT_GC_INTERVAL)
    }

    pub fn with_gc_interval(gc_interval: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            gc_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, deadline| *deadline > now);
        let removed = before.saturating_sub(self.tokens.len());

        *self.last_sweep.lock() = now;

        if removed > 0 {
            debug!(removed, remaining = self.tokens.len(), "Swept expired CSRF tokens");
            counter!("csrf_store_swept_total", "backend" => "memory").increment(removed as u64);
        }
        removed
    }

    /// Spawn a task that sweeps the store every `gc_interval`.
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.gc_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.cleanup_expired();
            }
        })
    }

    fn maybe_sweep(&self) {
        let due = {
            let last = self.last_sweep.lock();
            last.elapsed() >= self.gc_interval
        };
        if due {
            self.cleanup_expired();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn set(&self, token: &str, ttl: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(ttl).ok_or_else(|| {
            TollgateError::with_internal(
                ErrorCode::InvalidConfiguration,
                "Token lifetime is out of range",
                format!("ttl of {:?} overflows the clock", ttl),
            )
        })?;

        self.maybe_sweep();
        self.tokens.insert(token.to_owned(), deadline);
        counter!("csrf_store_operations_total", "backend" => "memory", "op" => "set").increment(1);
        Ok(())
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        counter!("csrf_store_operations_total", "backend" => "memory", "op" => "contains")
            .increment(1);

        let live = match self.tokens.get(token) {
            Some(deadline) => *deadline > Instant::now(),
            None => return Ok(false),
        };

        if !live {
            // Re-check under the shard lock so a concurrent `set` is not lost
            self.tokens
                .remove_if(token, |_, deadline| *deadline <= Instant::now());
        }
        Ok(live)
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.tokens.remove(token);
        counter!("csrf_store_operations_total", "backend" => "memory", "op" => "delete")
            .increment(1);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
