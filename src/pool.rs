//! Bounded connection pool for one upstream API.
//!
//! `reqwest` keeps persistent connections internally but does not bound the
//! number of concurrent requests nor report socket counts. `ConnectionPool`
//! puts a semaphore in front of the client so at most `max_open` requests are
//! in flight, and keeps the counters needed for introspection:
//!
//! - `in_use`: leases currently held
//! - `idle`: keep-alive connections retained since the last eviction, capped
//!   at `max_idle` and dropped once `idle_timeout` passes without activity
//! - `pending`: callers waiting for a lease
//!
//! Shutdown waits for every lease to be returned, then closes the gate.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::error::{ErrorContext, LookoutError};

/// Socket limits and timeouts for one client instance.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrent requests (open sockets).
    pub max_open: usize,
    /// Maximum idle keep-alive sockets retained.
    pub max_idle: usize,
    /// How long an idle socket is kept before it is closed.
    pub idle_timeout: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Whether sockets are kept alive between requests.
    pub keep_alive: bool,
    /// TCP keep-alive probe interval.
    pub keep_alive_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 50,
            max_idle: 10,
            idle_timeout: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            keep_alive: true,
            keep_alive_interval: Duration::from_secs(1),
        }
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Pool name, for logs and tool output.
    pub name: String,
    /// Sockets believed open (in use plus idle).
    pub open: usize,
    /// Leases currently held.
    pub in_use: usize,
    /// Idle keep-alive sockets.
    pub idle: usize,
    /// Callers waiting for a lease.
    pub pending: usize,
    /// Configured ceiling on open sockets.
    pub max_open: usize,
    /// Configured ceiling on idle sockets.
    pub max_idle: usize,
    /// True once the pool has been shut down.
    pub closed: bool,
}

/// A held slot in the pool. Dropping it returns the slot.
pub struct PoolLease<'a> {
    _permit: SemaphorePermit<'a>,
    pool: &'a ConnectionPool,
    client: Client,
}

impl PoolLease<'_> {
    /// The HTTP client to send this request with.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Drop for PoolLease<'_> {
    fn drop(&mut self) {
        self.pool.touch();
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Semaphore-gated HTTP client with usage counters.
pub struct ConnectionPool {
    name: String,
    config: PoolConfig,
    client: RwLock<Client>,
    permits: Semaphore,
    pending: AtomicUsize,
    warm: AtomicUsize,
    created: Instant,
    last_activity_ms: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Creates a pool and its underlying HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `LookoutError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, LookoutError> {
        let max_open = config.max_open.max(1);
        let client = Self::build_client(&config)?;
        Ok(Self {
            name: name.into(),
            config: PoolConfig { max_open, ..config },
            client: RwLock::new(client),
            permits: Semaphore::new(max_open),
            pending: AtomicUsize::new(0),
            warm: AtomicUsize::new(0),
            created: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn build_client(config: &PoolConfig) -> Result<Client, LookoutError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(config.idle_timeout);

        builder = if config.keep_alive {
            builder
                .pool_max_idle_per_host(config.max_idle)
                .tcp_keepalive(config.keep_alive_interval)
        } else {
            builder.pool_max_idle_per_host(0)
        };

        builder.build().map_err(LookoutError::HttpClient)
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Waits for a free slot and returns a lease on it.
    ///
    /// # Errors
    ///
    /// Fails with a non-transient upstream error once the pool is shut down.
    pub async fn acquire(&self, context: &ErrorContext) -> Result<PoolLease<'_>, LookoutError> {
        let permit = {
            self.pending.fetch_add(1, Ordering::SeqCst);
            let _pending = PendingGuard(&self.pending);
            self.permits.acquire().await
        };

        let permit = permit.map_err(|_| LookoutError::Upstream {
            message: format!("connection pool '{}' is shut down", self.name),
            status: None,
            transient: false,
            context: context.clone(),
        })?;

        let in_use = self.in_use();
        self.warm.fetch_max(in_use, Ordering::SeqCst);
        self.touch();

        let client = self
            .client
            .read()
            .map(|c| c.clone())
            .map_err(|_| LookoutError::Upstream {
                message: format!("connection pool '{}' is unavailable", self.name),
                status: None,
                transient: true,
                context: context.clone(),
            })?;

        Ok(PoolLease {
            _permit: permit,
            pool: self,
            client,
        })
    }

    fn in_use(&self) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        self.config
            .max_open
            .saturating_sub(self.permits.available_permits())
    }

    fn touch(&self) {
        let elapsed = self.created.elapsed().as_millis() as u64;
        self.last_activity_ms.store(elapsed, Ordering::SeqCst);
    }

    fn idle(&self, in_use: usize) -> usize {
        if !self.config.keep_alive || self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let now_ms = self.created.elapsed().as_millis() as u64;
        let quiet_for = now_ms.saturating_sub(self.last_activity_ms.load(Ordering::SeqCst));
        if in_use == 0 && Duration::from_millis(quiet_for) >= self.config.idle_timeout {
            return 0;
        }
        self.warm
            .load(Ordering::SeqCst)
            .saturating_sub(in_use)
            .min(self.config.max_idle)
    }

    /// Reports open, idle and pending counts.
    pub fn status(&self) -> PoolStatus {
        let in_use = self.in_use();
        let idle = self.idle(in_use);
        PoolStatus {
            name: self.name.clone(),
            open: in_use + idle,
            in_use,
            idle,
            pending: self.pending.load(Ordering::SeqCst),
            max_open: self.config.max_open,
            max_idle: self.config.max_idle,
            closed: self.closed.load(Ordering::SeqCst),
        }
    }

    /// Closes idle connections by replacing the underlying client.
    ///
    /// Leases already handed out keep the old client until they are dropped.
    /// Returns the number of idle connections released.
    pub fn evict_idle(&self) -> usize {
        let in_use = self.in_use();
        let released = self.idle(in_use);

        match Self::build_client(&self.config) {
            Ok(fresh) => {
                if let Ok(mut client) = self.client.write() {
                    *client = fresh;
                }
            }
            Err(e) => {
                tracing::warn!(pool = %self.name, error = %e, "Failed to rebuild HTTP client");
                return 0;
            }
        }

        self.warm.store(in_use, Ordering::SeqCst);
        tracing::debug!(pool = %self.name, released = released, "Evicted idle connections");
        released
    }

    /// Waits for all in-flight requests, then refuses new ones.
    pub async fn shutdown(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        tracing::info!(pool = %self.name, in_use = self.in_use(), "Draining connection pool");
        match self.permits.acquire_many(self.config.max_open as u32).await {
            Ok(all) => {
                self.permits.close();
                drop(all);
            }
            Err(_) => self.permits.close(),
        }

        self.evict_idle();
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!(pool = %self.name, "Connection pool closed");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has completed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
