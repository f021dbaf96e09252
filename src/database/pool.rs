use super::CacheCounters;
use super::CacheStats;
use super::Connection;
use super::ConnectionState;
use crate::Error;
use crate::Result;
use crate::config::StorageSettings;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

/// pool sizing and upkeep knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub acquire_timeout: Duration,
    pub idle_evict_after: Duration,
    pub health_check_interval: Duration,
    pub health_check_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
            idle_evict_after: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(30),
            health_check_enabled: true,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_connections == 0 {
            return Err(Error::invalid_parameter("pool needs at least one connection"));
        }
        if self.max_connections < self.min_connections {
            return Err(Error::invalid_parameter(format!(
                "max_connections {} below min_connections {}",
                self.max_connections, self.min_connections
            )));
        }
        Ok(())
    }
}

/// point-in-time pool accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub total: usize,
    pub created: u64,
    pub discarded: u64,
    pub timeouts: u64,
}

struct PoolState {
    idle: Vec<Connection>,
    active: usize,
    total: usize,
    shutdown: bool,
}

struct Shared {
    target: String,
    storage: StorageSettings,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    reaper: Condvar,
    counters: Arc<CacheCounters>,
    created: AtomicU64,
    discarded: AtomicU64,
    timeouts: AtomicU64,
}

impl Shared {
    fn locked(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn connect(&self) -> Result<Connection> {
        let connection = Connection::open(&self.target, &self.storage, self.counters.clone())?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(connection)
    }

    /// hand a borrowed connection back; errored handles are discarded
    fn release(&self, connection: Connection) {
        let healthy = connection.state() == ConnectionState::Connected;
        let mut discard = None;
        let mut state = self.locked();
        state.active = state.active.saturating_sub(1);
        if healthy && !state.shutdown {
            state.idle.push(connection);
        } else {
            state.total = state.total.saturating_sub(1);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            discard = Some(connection);
        }
        drop(state);
        drop(discard);
        self.available.notify_one();
    }
}

/// thread-safe bounded pool over one database target
///
/// a single mutex guards the idle list and counters; the engine is
/// never called while it is held. waiting acquirers park on a condvar
/// bounded by their own deadline. the health worker pings idle
/// connections, retires stale ones above `min`, and rebuilds toward it.
pub struct ConnectionPool {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    pub fn open(target: &str, storage: StorageSettings, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            target: target.to_string(),
            storage,
            config: config.clone(),
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.max_connections),
                active: 0,
                total: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            reaper: Condvar::new(),
            counters: Arc::new(CacheCounters::default()),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        });

        for _ in 0..config.min_connections {
            let connection = shared.connect()?;
            let mut state = shared.locked();
            state.idle.push(connection);
            state.total += 1;
        }
        log::info!(
            "pool open on {} ({}..{} connections)",
            target,
            config.min_connections,
            config.max_connections,
        );

        let worker = if config.health_check_enabled {
            let shared = shared.clone();
            Some(
                std::thread::Builder::new()
                    .name("pool-health".to_string())
                    .spawn(move || Self::worker_loop(shared))
                    .map_err(|e| Error::internal(format!("cannot spawn health worker: {}", e)))?,
            )
        } else {
            None
        };

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    /// first healthy idle connection, else grow, else wait.
    /// `None` on timeout, with no side effect.
    pub fn acquire(&self, timeout: Duration) -> Option<PooledConnection> {
        match self.try_acquire(timeout) {
            Ok(connection) => Some(connection),
            Err(Error::Timeout(_)) => None,
            Err(error) => {
                log::warn!("acquire failed: {}", error);
                None
            }
        }
    }

    /// error-reporting variant of acquire
    pub fn try_acquire(&self, timeout: Duration) -> Result<PooledConnection> {
        let deadline = Instant::now() + timeout;
        let mut corpses: Vec<Connection> = Vec::new();
        let mut state = self.shared.locked();
        loop {
            if state.shutdown {
                return Err(Error::invalid_state("pool is shut down"));
            }
            while let Some(connection) = state.idle.pop() {
                if connection.state() == ConnectionState::Connected {
                    state.active += 1;
                    drop(state);
                    return Ok(PooledConnection::new(connection, self.shared.clone()));
                }
                state.total = state.total.saturating_sub(1);
                self.shared.discarded.fetch_add(1, Ordering::Relaxed);
                corpses.push(connection);
            }
            if state.total < self.shared.config.max_connections {
                state.total += 1;
                drop(state);
                corpses.clear();
                return match self.shared.connect() {
                    Ok(connection) => {
                        let mut state = self.shared.locked();
                        state.active += 1;
                        drop(state);
                        Ok(PooledConnection::new(connection, self.shared.clone()))
                    }
                    Err(error) => {
                        let mut state = self.shared.locked();
                        state.total = state.total.saturating_sub(1);
                        drop(state);
                        self.shared.available.notify_one();
                        Err(error)
                    }
                };
            }
            if !corpses.is_empty() {
                // close dead handles outside the lock before parking
                drop(state);
                corpses.clear();
                state = self.shared.locked();
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                self.shared.timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Timeout(format!(
                    "no connection available within {:?}",
                    timeout
                )));
            }
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.locked();
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
            total: state.total,
            created: self.shared.created.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            timeouts: self.shared.timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.counters.snapshot()
    }

    pub(crate) fn cache_counters(&self) -> Arc<CacheCounters> {
        self.shared.counters.clone()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.locked().shutdown
    }

    /// drain idle connections and stop the worker; idempotent.
    /// handles still out keep working and are discarded on release.
    pub fn shutdown(&self) {
        let drained = {
            let mut state = self.shared.locked();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            let drained = std::mem::take(&mut state.idle);
            state.total = state.total.saturating_sub(drained.len());
            drained
        };
        self.shared.available.notify_all();
        self.shared.reaper.notify_all();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = worker {
            let _ = handle.join();
        }
        for mut connection in drained {
            connection.close();
        }
        log::info!("pool shut down");
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let guard = shared.locked();
            if guard.shutdown {
                break;
            }
            let (guard, _) = shared
                .reaper
                .wait_timeout(guard, shared.config.health_check_interval)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if guard.shutdown {
                break;
            }
            drop(guard);
            Self::health_pass(&shared);
        }
        log::debug!("health worker stopped");
    }

    /// ping idle connections, retire failures and stale extras,
    /// rebuild toward min
    fn health_pass(shared: &Arc<Shared>) {
        let mut taken = {
            let mut state = shared.locked();
            std::mem::take(&mut state.idle)
        };

        let mut healthy = Vec::with_capacity(taken.len());
        let mut failed = 0usize;
        for mut connection in taken.drain(..) {
            if connection.ping() {
                healthy.push(connection);
            } else {
                log::warn!("health check failed on connection {}", connection.id());
                failed += 1;
            }
        }

        let mut stale = Vec::new();
        let deficit = {
            let mut state = shared.locked();
            state.total = state.total.saturating_sub(failed);
            shared.discarded.fetch_add(failed as u64, Ordering::Relaxed);
            for connection in healthy.drain(..) {
                if state.total > shared.config.min_connections
                    && connection.idle_time() >= shared.config.idle_evict_after
                {
                    state.total -= 1;
                    shared.discarded.fetch_add(1, Ordering::Relaxed);
                    stale.push(connection);
                } else {
                    state.idle.push(connection);
                }
            }
            let deficit = shared.config.min_connections.saturating_sub(state.total);
            state.total += deficit;
            deficit
        };
        drop(stale);
        shared.available.notify_all();

        for _ in 0..deficit {
            match shared.connect() {
                Ok(connection) => {
                    let mut state = shared.locked();
                    state.idle.push(connection);
                    drop(state);
                    shared.available.notify_one();
                }
                Err(error) => {
                    let mut state = shared.locked();
                    state.total = state.total.saturating_sub(1);
                    drop(state);
                    log::warn!("pool rebuild failed: {}", error);
                }
            }
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// scoped borrow of a pooled connection; returns home on drop
pub struct PooledConnection {
    connection: Option<Connection>,
    shared: Arc<Shared>,
}

impl PooledConnection {
    fn new(connection: Connection, shared: Arc<Shared>) -> Self {
        Self {
            connection: Some(connection),
            shared,
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection held until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("connection held until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if connection.in_transaction() {
                log::warn!("connection {} dropped mid-transaction", connection.id());
                if connection.rollback().is_err() {
                    connection.poison();
                }
            }
            self.shared.release(connection);
        }
    }
}
