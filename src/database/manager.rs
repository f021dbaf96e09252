use super::CacheStats;
use super::Connection;
use super::ConnectionPool;
use super::PoolConfig;
use super::PoolStats;
use super::PooledConnection;
use super::PreparedStatement;
use super::Row;
use super::RowFlow;
use super::SqlValue;
use crate::Error;
use crate::Result;
use crate::config::StorageSettings;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// façade over the pool: execute / prepare / transaction semantics on
/// a pool-borrowed connection
///
/// non-transactional calls borrow a connection for exactly one call.
/// `with_transaction` borrows one connection for the whole block and
/// never reaches for another; the borrowed handle cannot cross the
/// block boundary. a manual `begin` pins a connection in the manager
/// until the matching `commit` / `rollback`.
pub struct DatabaseManager {
    pool: ConnectionPool,
    target: String,
    path: Option<PathBuf>,
    pinned: Mutex<Option<PooledConnection>>,
}

impl DatabaseManager {
    pub fn open(target: &str, storage: StorageSettings, config: PoolConfig) -> Result<Self> {
        let pool = ConnectionPool::open(target, storage, config)?;
        Ok(Self {
            pool,
            target: target.to_string(),
            path: Self::file_path(target),
            pinned: Mutex::new(None),
        })
    }

    /// filesystem path behind the target, None for memory databases
    fn file_path(target: &str) -> Option<PathBuf> {
        if target == super::MEMORY {
            return None;
        }
        if let Some(rest) = target.strip_prefix("file:") {
            let path = rest.split('?').next().unwrap_or(rest);
            let query = rest.strip_prefix(path).unwrap_or("");
            if query.contains("mode=memory") {
                return None;
            }
            return Some(PathBuf::from(path));
        }
        Some(PathBuf::from(target))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn pinned_slot(&self) -> MutexGuard<'_, Option<PooledConnection>> {
        self.pinned.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checkout(&self) -> Result<PooledConnection> {
        self.pool.try_acquire(self.pool.config().acquire_timeout)
    }

    pub fn execute(&self, sql: &str) -> Result<usize> {
        let mut slot = self.pinned_slot();
        if let Some(connection) = slot.as_mut() {
            return connection.execute(sql);
        }
        drop(slot);
        self.checkout()?.execute(sql)
    }

    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        let mut slot = self.pinned_slot();
        if let Some(connection) = slot.as_mut() {
            return connection.prepare(sql);
        }
        drop(slot);
        self.checkout()?.prepare(sql)
    }

    pub fn execute_prepared(&self, statement: &PreparedStatement) -> Result<usize> {
        let mut slot = self.pinned_slot();
        if let Some(connection) = slot.as_mut() {
            return connection.execute_prepared(statement);
        }
        drop(slot);
        self.checkout()?.execute_prepared(statement)
    }

    /// step rows through the callback; Stop halts the walk early
    pub fn execute_prepared_with<F>(&self, statement: &PreparedStatement, f: F) -> Result<usize>
    where
        F: FnMut(&Row<'_>) -> Result<RowFlow>,
    {
        let mut slot = self.pinned_slot();
        if let Some(connection) = slot.as_mut() {
            return connection.query(statement, f);
        }
        drop(slot);
        self.checkout()?.query(statement, f)
    }

    /// drain every row regardless of what the callback learns
    pub fn walk_all<F>(&self, statement: &PreparedStatement, mut f: F) -> Result<usize>
    where
        F: FnMut(&Row<'_>) -> Result<()>,
    {
        self.execute_prepared_with(statement, |row| {
            f(row)?;
            Ok(RowFlow::Continue)
        })
    }

    /// first row of an ad-hoc query, fully materialized
    pub fn query_row(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Vec<SqlValue>>> {
        let mut statement = self.prepare(sql)?;
        statement.bind_all(params.iter().cloned())?;
        let mut captured = None;
        self.execute_prepared_with(&statement, |row| {
            let mut values = Vec::with_capacity(row.column_count());
            for index in 0..row.column_count() {
                values.push(row.value(index)?);
            }
            captured = Some(values);
            Ok(RowFlow::Stop)
        })?;
        Ok(captured)
    }

    /// first column of the first row
    pub fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>> {
        Ok(self
            .query_row(sql, params)?
            .and_then(|row| row.into_iter().next()))
    }

    /// open a manual transaction, pinning one connection in the
    /// manager until commit or rollback
    pub fn begin(&self) -> Result<()> {
        let mut connection = self.checkout()?;
        connection.begin()?;
        let mut slot = self.pinned_slot();
        if slot.is_some() {
            drop(slot);
            let _ = connection.rollback();
            return Err(Error::invalid_state("transaction already open"));
        }
        *slot = Some(connection);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        let Some(mut connection) = self.pinned_slot().take() else {
            return Err(Error::invalid_state("no open transaction"));
        };
        connection.commit()
    }

    pub fn rollback(&self) -> Result<()> {
        let Some(mut connection) = self.pinned_slot().take() else {
            return Err(Error::invalid_state("no open transaction"));
        };
        connection.rollback()
    }

    /// run `f` inside one transaction on one borrowed connection:
    /// commit on Ok, roll back on Err or unwind, propagate the error
    /// unchanged
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxHandle<'_>) -> Result<T>,
    {
        let mut pooled = self.checkout()?;
        pooled.begin()?;
        let outcome = {
            let mut tx = TxHandle {
                connection: &mut *pooled,
            };
            f(&mut tx)
        };
        match outcome {
            Ok(value) => {
                pooled.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = pooled.rollback() {
                    log::warn!("rollback failed: {}", rollback_error);
                    pooled.poison();
                }
                Err(error)
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.pool.cache_stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn shutdown(&self) {
        if let Some(mut connection) = self.pinned_slot().take() {
            let _ = connection.rollback();
        }
        self.pool.shutdown();
    }
}

/// the borrowed-connection view handed to a `with_transaction` block
///
/// re-entrant `with_transaction` reuses the open transaction; there is
/// no nesting.
pub struct TxHandle<'a> {
    connection: &'a mut Connection,
}

impl TxHandle<'_> {
    pub fn execute(&mut self, sql: &str) -> Result<usize> {
        self.connection.execute(sql)
    }

    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.connection.prepare(sql)
    }

    pub fn execute_prepared(&mut self, statement: &PreparedStatement) -> Result<usize> {
        self.connection.execute_prepared(statement)
    }

    pub fn query<F>(&mut self, statement: &PreparedStatement, f: F) -> Result<usize>
    where
        F: FnMut(&Row<'_>) -> Result<RowFlow>,
    {
        self.connection.query(statement, f)
    }

    pub fn query_row(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Vec<SqlValue>>> {
        let mut statement = self.prepare(sql)?;
        statement.bind_all(params.iter().cloned())?;
        let mut captured = None;
        self.query(&statement, |row| {
            let mut values = Vec::with_capacity(row.column_count());
            for index in 0..row.column_count() {
                values.push(row.value(index)?);
            }
            captured = Some(values);
            Ok(RowFlow::Stop)
        })?;
        Ok(captured)
    }

    pub fn query_scalar(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>> {
        Ok(self
            .query_row(sql, params)?
            .and_then(|row| row.into_iter().next()))
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.connection.last_insert_rowid()
    }

    pub fn changes(&self) -> usize {
        self.connection.changes()
    }

    /// re-entrant: the open transaction is reused, never nested
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxHandle<'_>) -> Result<T>,
    {
        let mut inner = TxHandle {
            connection: &mut *self.connection,
        };
        f(&mut inner)
    }
}
