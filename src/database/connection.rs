use super::CacheCounters;
use super::PreparedStatement;
use super::Row;
use super::RowFlow;
use super::StatementCache;
use crate::Error;
use crate::Result;
use crate::STATEMENT_CACHE_CAPACITY;
use crate::config::StorageSettings;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

/// in-memory sentinel accepted anywhere a database target is
pub const MEMORY: &str = ":memory:";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Error,
}

/// one owned handle to the embedded engine
///
/// the pool owns every Connection; a borrower holds exclusive access
/// for the scope of its handle. engine rejections surface as
/// QueryFailed; handshake-level failures flip the state to Error so
/// the pool discards the handle instead of re-issuing it.
#[derive(Debug)]
pub struct Connection {
    raw: Option<rusqlite::Connection>,
    id: u64,
    state: ConnectionState,
    last_error: Option<String>,
    last_used: Instant,
    in_transaction: bool,
    cache: StatementCache,
}

impl Connection {
    /// open the target and apply the per-connection pragmas
    pub fn open(target: &str, storage: &StorageSettings, counters: Arc<CacheCounters>) -> Result<Self> {
        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let raw = rusqlite::Connection::open_with_flags(target, flags).map_err(|e| {
            Error::ConnectionFailed {
                message: format!("cannot open {}: {}", target, e),
                code: None,
            }
        })?;
        raw.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);

        // page_size must land before the journal mode pins it
        let pragmas = format!(
            "PRAGMA page_size = {};\
             PRAGMA journal_mode = {};\
             PRAGMA synchronous = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = {};",
            storage.page_size, storage.journal_mode, storage.synchronous, storage.cache_size,
        );
        raw.execute_batch(&pragmas).map_err(|e| Error::ConnectionFailed {
            message: format!("pragma handshake failed: {}", e),
            code: None,
        })?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("opened connection {} to {}", id, target);
        Ok(Self {
            raw: Some(raw),
            id,
            state: ConnectionState::Connected,
            last_error: None,
            last_used: Instant::now(),
            in_transaction: false,
            cache: StatementCache::new(STATEMENT_CACHE_CAPACITY, counters)?,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// monotonic time since the last non-trivial call
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// engine errors that mean the handle itself is gone flip to Error
    fn digest(&mut self, e: rusqlite::Error) -> Error {
        let error = Error::from(e);
        if matches!(error, Error::ConnectionFailed { .. }) {
            self.state = ConnectionState::Error;
            self.last_error = Some(error.to_string());
        }
        error
    }

    pub(crate) fn poison(&mut self) {
        self.state = ConnectionState::Error;
    }

    /// run one or more statements with no result iteration;
    /// returns rows affected by the last write
    pub fn execute(&mut self, sql: &str) -> Result<usize> {
        let Some(raw) = self.raw.as_ref() else {
            return Err(Error::invalid_state("connection is closed"));
        };
        match raw.execute_batch(sql) {
            Ok(()) => {
                let affected = raw.changes() as usize;
                self.touch();
                Ok(affected)
            }
            Err(e) => Err(self.digest(e)),
        }
    }

    /// compile once through the statement cache
    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        if let Some(statement) = self.cache.lookup(sql) {
            self.touch();
            return Ok(statement);
        }
        let Some(raw) = self.raw.as_ref() else {
            return Err(Error::invalid_state("connection is closed"));
        };
        let prepare_result = raw.prepare(sql);
        if prepare_result.is_err() {
            let e = prepare_result.err().unwrap();
            return Err(self.digest(e));
        }
        let parameter_count = prepare_result.ok().unwrap().parameter_count();
        let statement = PreparedStatement::new(sql.to_string(), self.id, parameter_count);
        self.cache.insert(statement.clone());
        self.touch();
        Ok(statement)
    }

    /// step a statement with no interest in its rows
    pub fn execute_prepared(&mut self, statement: &PreparedStatement) -> Result<usize> {
        let Some(raw) = self.raw.as_ref() else {
            return Err(Error::invalid_state("connection is closed"));
        };
        let prepare_result = raw.prepare_cached(statement.sql());
        if prepare_result.is_err() {
            let e = prepare_result.err().unwrap();
            return Err(self.digest(e));
        }
        let mut compiled = prepare_result.ok().unwrap();
        for (index, value) in statement.bindings().iter().enumerate() {
            if let Err(e) = compiled.raw_bind_parameter(index + 1, value) {
                drop(compiled);
                return Err(self.digest(e));
            }
        }
        match compiled.raw_execute() {
            Ok(affected) => {
                drop(compiled);
                self.touch();
                Ok(affected)
            }
            Err(e) => {
                drop(compiled);
                Err(self.digest(e))
            }
        }
    }

    /// step a statement, handing each row to the callback; the
    /// callback's Stop verdict halts the walk. returns rows visited.
    pub fn query<F>(&mut self, statement: &PreparedStatement, mut f: F) -> Result<usize>
    where
        F: FnMut(&Row<'_>) -> Result<RowFlow>,
    {
        let Some(raw) = self.raw.as_ref() else {
            return Err(Error::invalid_state("connection is closed"));
        };
        let prepare_result = raw.prepare_cached(statement.sql());
        if prepare_result.is_err() {
            let e = prepare_result.err().unwrap();
            return Err(self.digest(e));
        }
        let mut compiled = prepare_result.ok().unwrap();
        for (index, value) in statement.bindings().iter().enumerate() {
            if let Err(e) = compiled.raw_bind_parameter(index + 1, value) {
                drop(compiled);
                return Err(self.digest(e));
            }
        }
        let mut rows = compiled.raw_query();
        let mut visited = 0;
        let outcome = loop {
            match rows.next() {
                Ok(Some(row)) => {
                    visited += 1;
                    match f(&Row::new(row)) {
                        Ok(RowFlow::Continue) => {}
                        Ok(RowFlow::Stop) => break Ok(()),
                        Err(e) => break Err(OutcomeError::Caller(e)),
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(OutcomeError::Engine(e)),
            }
        };
        drop(rows);
        drop(compiled);
        match outcome {
            Ok(()) => {
                self.touch();
                Ok(visited)
            }
            Err(OutcomeError::Caller(e)) => Err(e),
            Err(OutcomeError::Engine(e)) => Err(self.digest(e)),
        }
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::invalid_state("transaction already open"));
        }
        self.execute("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::invalid_state("no open transaction"));
        }
        let result = self.execute("COMMIT");
        self.resync_transaction_flag();
        result.map(|_| ())
    }

    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::invalid_state("no open transaction"));
        }
        let result = self.execute("ROLLBACK");
        self.resync_transaction_flag();
        result.map(|_| ())
    }

    /// the engine knows whether a transaction really survived
    fn resync_transaction_flag(&mut self) {
        self.in_transaction = self
            .raw
            .as_ref()
            .map(|raw| !raw.is_autocommit())
            .unwrap_or(false);
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.raw.as_ref().map(|raw| raw.last_insert_rowid()).unwrap_or(0)
    }

    pub fn changes(&self) -> usize {
        self.raw.as_ref().map(|raw| raw.changes() as usize).unwrap_or(0)
    }

    /// cheap liveness probe used by the pool's health worker
    pub fn ping(&mut self) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        self.execute("SELECT 1").is_ok()
    }

    pub fn statement_cache(&self) -> &StatementCache {
        &self.cache
    }

    pub fn clear_statement_cache(&mut self) {
        self.cache.clear();
        if let Some(raw) = self.raw.as_ref() {
            raw.flush_prepared_statement_cache();
        }
    }

    pub fn close(&mut self) {
        if self.in_transaction {
            let _ = self.rollback();
        }
        self.cache.clear();
        if let Some(raw) = self.raw.take() {
            drop(raw);
            log::debug!("closed connection {}", self.id);
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

enum OutcomeError {
    Caller(Error),
    Engine(rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open(MEMORY, &StorageSettings::default(), Arc::default()).unwrap()
    }

    #[test]
    fn open_execute_and_side_effects() {
        let mut conn = memory();
        assert!(conn.is_open());
        assert_eq!(conn.state(), ConnectionState::Connected);
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
        let affected = conn.execute("INSERT INTO t (v) VALUES ('x')").unwrap();
        assert_eq!(affected, 1);
        assert_eq!(conn.last_insert_rowid(), 1);
        assert_eq!(conn.changes(), 1);
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.execute("SELECT 1").is_err());
    }

    #[test]
    fn prepare_bind_and_step() {
        let mut conn = memory();
        conn.execute("CREATE TABLE t (a INTEGER, b TEXT)").unwrap();
        let mut insert = conn.prepare("INSERT INTO t (a, b) VALUES (?1, ?2)").unwrap();
        insert.bind(1, 7i64).unwrap();
        insert.bind(2, "seven").unwrap();
        assert_eq!(conn.execute_prepared(&insert).unwrap(), 1);

        let select = conn.prepare("SELECT a, b FROM t").unwrap();
        let mut seen = Vec::new();
        conn.query(&select, |row| {
            seen.push((row.i64(0)?, row.text(1)?));
            Ok(RowFlow::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec![(7, "seven".to_string())]);
    }

    #[test]
    fn query_short_circuits_on_stop() {
        let mut conn = memory();
        conn.execute("CREATE TABLE n (v INTEGER)").unwrap();
        for i in 0..10 {
            conn.execute(&format!("INSERT INTO n (v) VALUES ({})", i))
                .unwrap();
        }
        let select = conn.prepare("SELECT v FROM n ORDER BY v").unwrap();
        let mut count = 0;
        let visited = conn
            .query(&select, |_| {
                count += 1;
                Ok(if count == 3 { RowFlow::Stop } else { RowFlow::Continue })
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(visited, 3);
    }

    #[test]
    fn nested_begin_is_invalid_state() {
        let mut conn = memory();
        conn.begin().unwrap();
        assert!(matches!(conn.begin(), Err(Error::InvalidState(_))));
        conn.rollback().unwrap();
        assert!(matches!(conn.commit(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn rollback_discards_writes() {
        let mut conn = memory();
        conn.execute("CREATE TABLE t (v INTEGER)").unwrap();
        conn.begin().unwrap();
        conn.execute("INSERT INTO t (v) VALUES (1)").unwrap();
        conn.rollback().unwrap();
        let select = conn.prepare("SELECT COUNT(*) FROM t").unwrap();
        let mut count = -1;
        conn.query(&select, |row| {
            count = row.i64(0)?;
            Ok(RowFlow::Continue)
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn bad_sql_is_query_failed() {
        let mut conn = memory();
        let error = conn.execute("NOT EVEN SQL").unwrap_err();
        assert!(matches!(error, Error::QueryFailed { .. }));
        // statement-level failure does not poison the connection
        assert!(conn.is_open());
    }

    #[test]
    fn statement_cache_round_trips() {
        let mut conn = memory();
        conn.execute("CREATE TABLE t (v INTEGER)").unwrap();
        let a = conn.prepare("SELECT v FROM t").unwrap();
        let b = conn.prepare("SELECT v FROM t").unwrap();
        assert_eq!(a.sql(), b.sql());
        let stats = conn.statement_cache().stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(conn.statement_cache().len(), 1);
        conn.clear_statement_cache();
        assert_eq!(conn.statement_cache().len(), 0);
    }

    #[test]
    fn idle_time_resets_on_use() {
        let mut conn = memory();
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.idle_time() >= Duration::from_millis(10));
        conn.execute("SELECT 1").unwrap();
        assert!(conn.idle_time() < Duration::from_millis(10));
    }
}
