use super::Migration;
use super::metadata_checksum;
use super::parse_migration_filename;
use crate::Error;
use crate::Result;
use crate::database::DatabaseManager;
use crate::database::SqlValue;
use crate::database::TxHandle;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// one applied row of the version table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVersion {
    pub id: String,
    pub version: i64,
    pub description: String,
    pub checksum: String,
    pub applied_at: chrono::NaiveDateTime,
    pub execution_time_ms: Option<i64>,
}

const VERSION_TABLE_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        id TEXT PRIMARY KEY,
        version INTEGER UNIQUE NOT NULL,
        description TEXT NOT NULL,
        checksum TEXT NOT NULL,
        applied_at TIMESTAMP NOT NULL,
        execution_time_ms INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_schema_version ON schema_version(version);
";

/// ordered migrations over the `schema_version` table
///
/// forward runs and rollbacks each execute inside a single
/// transaction, so a partial failure leaves the schema untouched.
pub struct SchemaManager {
    db: Arc<DatabaseManager>,
    migrations: Vec<Migration>,
}

impl SchemaManager {
    pub fn new(db: Arc<DatabaseManager>) -> Result<Self> {
        db.execute(VERSION_TABLE_DDL)?;
        Ok(Self {
            db,
            migrations: Vec::new(),
        })
    }

    pub fn registered(&self) -> &[Migration] {
        &self.migrations
    }

    /// keep the registry ordered; duplicate versions are rejected
    pub fn register(&mut self, migration: Migration) -> Result<()> {
        if self
            .migrations
            .iter()
            .any(|m| m.version() == migration.version())
        {
            return Err(Error::invalid_parameter(format!(
                "migration {} already registered",
                migration.version()
            )));
        }
        let at = self
            .migrations
            .partition_point(|m| m.version() < migration.version());
        self.migrations.insert(at, migration);
        Ok(())
    }

    /// load `V<digits>__<description>.<up|down>.sql` pairs; an up file
    /// is required, a lone down file is skipped. returns count loaded.
    pub fn load_directory(&mut self, directory: impl AsRef<Path>) -> Result<usize> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(Error::invalid_parameter(format!(
                "migration directory does not exist: {}",
                directory.display()
            )));
        }
        struct Pair {
            description: String,
            up: Option<PathBuf>,
            down: Option<PathBuf>,
        }
        let mut pairs: BTreeMap<i64, Pair> = BTreeMap::new();
        for entry in std::fs::read_dir(directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((version, description, is_up)) = parse_migration_filename(name) else {
                continue;
            };
            let pair = pairs.entry(version).or_insert_with(|| Pair {
                description: description.clone(),
                up: None,
                down: None,
            });
            if is_up {
                pair.description = description;
                pair.up = Some(entry.path());
            } else {
                pair.down = Some(entry.path());
            }
        }
        let mut loaded = 0;
        for (version, pair) in pairs {
            let Some(up) = pair.up else {
                log::warn!("migration {} has a down file but no up file", version);
                continue;
            };
            if self.migrations.iter().any(|m| m.version() == version) {
                log::debug!("migration {} already registered, skipping", version);
                continue;
            }
            self.register(Migration::from_files(
                version,
                pair.description,
                &up,
                pair.down.as_deref(),
            )?)?;
            loaded += 1;
        }
        log::info!("loaded {} migrations from {}", loaded, directory.display());
        Ok(loaded)
    }

    /// MAX(version) of the table; 0 when nothing has been applied
    pub fn current_version(&self) -> Result<i64> {
        match self
            .db
            .query_scalar("SELECT MAX(version) FROM schema_version", &[])?
        {
            Some(SqlValue::Integer(version)) => Ok(version),
            _ => Ok(0),
        }
    }

    pub fn is_applied(&self, version: i64) -> Result<bool> {
        Ok(self
            .db
            .query_row(
                "SELECT 1 FROM schema_version WHERE version = ?1",
                &[SqlValue::Integer(version)],
            )?
            .is_some())
    }

    /// applied rows in version order
    pub fn applied(&self) -> Result<Vec<SchemaVersion>> {
        let statement = self.db.prepare(
            "SELECT id, version, description, checksum, applied_at, execution_time_ms
             FROM schema_version ORDER BY version",
        )?;
        let mut rows = Vec::new();
        self.db.walk_all(&statement, |row| {
            let applied_at = row.text(4)?;
            let applied_at = chrono::NaiveDateTime::parse_from_str(&applied_at, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| Error::internal(format!("bad applied_at timestamp: {}", e)))?;
            rows.push(SchemaVersion {
                id: row.text(0)?,
                version: row.i64(1)?,
                description: row.text(2)?,
                checksum: row.text(3)?,
                applied_at,
                execution_time_ms: match row.is_null(5)? {
                    true => None,
                    false => Some(row.i64(5)?),
                },
            });
            Ok(())
        })?;
        Ok(rows)
    }

    /// registered versions above the current one
    pub fn pending(&self) -> Result<Vec<i64>> {
        let current = self.current_version()?;
        Ok(self
            .migrations
            .iter()
            .map(Migration::version)
            .filter(|v| *v > current)
            .collect())
    }

    /// registered versions must be dense from 1; applied rows must
    /// match their registered checksums
    pub fn validate(&self) -> Result<()> {
        let mut expected = 1;
        for migration in self.migrations.iter() {
            if migration.version() != expected {
                return Err(Error::invalid_parameter(format!("gap at {}", expected)));
            }
            expected += 1;
        }
        for row in self.applied()? {
            let Some(registered) = self
                .migrations
                .iter()
                .find(|m| m.version() == row.version)
            else {
                continue;
            };
            if registered.checksum() != row.checksum {
                return Err(Error::invalid_parameter(format!(
                    "checksum mismatch for migration {}",
                    row.version
                )));
            }
        }
        Ok(())
    }

    /// apply forward to `target` (None = highest registered) in one
    /// transaction; a lower target delegates to rollback
    pub fn migrate_to(&self, target: Option<i64>) -> Result<()> {
        let current = self.current_version()?;
        let target = match target {
            Some(version) => version,
            None => match self.migrations.last() {
                Some(migration) => migration.version(),
                None => return Ok(()),
            },
        };
        if target < current {
            return self.rollback_to(target);
        }
        if target == current {
            return Ok(());
        }
        let climbing = self
            .migrations
            .iter()
            .filter(|m| m.version() > current && m.version() <= target)
            .collect::<Vec<&Migration>>();
        self.db.with_transaction(|tx| {
            for migration in climbing {
                let already = tx
                    .query_row(
                        "SELECT 1 FROM schema_version WHERE version = ?1",
                        &[SqlValue::Integer(migration.version())],
                    )?
                    .is_some();
                if already {
                    continue;
                }
                log::info!(
                    "applying migration {}: {}",
                    migration.version(),
                    migration.description(),
                );
                let started = Instant::now();
                migration.apply(tx)?;
                let elapsed = started.elapsed().as_millis() as i64;
                Self::record(tx, migration, elapsed)?;
                log::info!("migration {} applied in {}ms", migration.version(), elapsed);
            }
            Ok(())
        })
    }

    /// roll back every reversible migration above `target`, newest
    /// first, in one transaction. any irreversible migration in the
    /// way fails the whole request before work starts.
    pub fn rollback_to(&self, target: i64) -> Result<()> {
        if target < 0 {
            return Err(Error::invalid_parameter(format!(
                "rollback target must be >= 0, got {}",
                target
            )));
        }
        let current = self.current_version()?;
        if target >= current {
            return Ok(());
        }
        let descending = self
            .migrations
            .iter()
            .rev()
            .filter(|m| m.version() > target && m.version() <= current)
            .collect::<Vec<&Migration>>();
        if let Some(stuck) = descending.iter().find(|m| !m.is_reversible()) {
            return Err(Error::Irreversible(format!(
                "migration {} has no down path",
                stuck.version()
            )));
        }
        self.db.with_transaction(|tx| {
            for migration in descending {
                log::info!("rolling back migration {}", migration.version());
                migration.revert(tx)?;
                let mut delete =
                    tx.prepare("DELETE FROM schema_version WHERE version = ?1")?;
                delete.bind(1, migration.version())?;
                tx.execute_prepared(&delete)?;
            }
            Ok(())
        })
    }

    /// adopt a pre-existing database by recording a version without
    /// running anything
    pub fn baseline(&self, version: i64, description: &str) -> Result<()> {
        if version < 1 {
            return Err(Error::invalid_parameter(format!(
                "baseline version must be >= 1, got {}",
                version
            )));
        }
        let current = self.current_version()?;
        if current >= version {
            return Err(Error::invalid_state(format!(
                "cannot baseline at {}: schema already at {}",
                version, current
            )));
        }
        let checksum = metadata_checksum(version, description);
        let mut insert = self.db.prepare(
            "INSERT INTO schema_version (id, version, description, checksum, applied_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        )?;
        insert.bind(1, Self::row_id(version, &checksum))?;
        insert.bind(2, version)?;
        insert.bind(3, description)?;
        insert.bind(4, checksum.as_str())?;
        self.db.execute_prepared(&insert)?;
        log::info!("baselined schema at version {}", version);
        Ok(())
    }

    fn row_id(version: i64, checksum: &str) -> String {
        format!("{:04}-{}", version, &checksum[..checksum.len().min(12)])
    }

    fn record(tx: &mut TxHandle<'_>, migration: &Migration, elapsed_ms: i64) -> Result<()> {
        let mut insert = tx.prepare(
            "INSERT INTO schema_version
                 (id, version, description, checksum, applied_at, execution_time_ms)
             VALUES (?1, ?2, ?3, ?4, datetime('now'), ?5)",
        )?;
        insert.bind(1, Self::row_id(migration.version(), migration.checksum()))?;
        insert.bind(2, migration.version())?;
        insert.bind(3, migration.description())?;
        insert.bind(4, migration.checksum())?;
        insert.bind(5, elapsed_ms)?;
        tx.execute_prepared(&insert)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::database::PoolConfig;
    use std::time::Duration;

    fn fixture() -> (tempfile::TempDir, Arc<DatabaseManager>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.db");
        let config = PoolConfig {
            min_connections: 1,
            max_connections: 2,
            acquire_timeout: Duration::from_millis(500),
            health_check_enabled: false,
            ..PoolConfig::default()
        };
        let db = Arc::new(
            DatabaseManager::open(path.to_str().unwrap(), StorageSettings::default(), config)
                .unwrap(),
        );
        (dir, db)
    }

    fn dump_schema(db: &DatabaseManager) -> Vec<String> {
        let statement = db
            .prepare("SELECT sql FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let mut sql = Vec::new();
        db.walk_all(&statement, |row| {
            sql.push(row.text(0)?);
            Ok(())
        })
        .unwrap();
        sql
    }

    fn table_exists(db: &DatabaseManager, name: &str) -> bool {
        db.query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[name.into()],
        )
        .unwrap()
        .is_some()
    }

    fn two_reversible(manager: &mut SchemaManager) {
        manager
            .register(
                Migration::sql(1, "create_t1", "CREATE TABLE t1 (id INTEGER)", Some("DROP TABLE t1"))
                    .unwrap(),
            )
            .unwrap();
        manager
            .register(
                Migration::sql(2, "create_t2", "CREATE TABLE t2 (id INTEGER)", Some("DROP TABLE t2"))
                    .unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn forward_then_back_then_forward() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        two_reversible(&mut manager);

        manager.migrate_to(None).unwrap();
        assert_eq!(manager.current_version().unwrap(), 2);
        assert!(table_exists(&db, "t1"));
        assert!(table_exists(&db, "t2"));
        let schema_before = dump_schema(&db);

        manager.rollback_to(1).unwrap();
        assert_eq!(manager.current_version().unwrap(), 1);
        assert!(table_exists(&db, "t1"));
        assert!(!table_exists(&db, "t2"));

        // re-applying lands on the identical schema
        manager.migrate_to(None).unwrap();
        assert_eq!(manager.current_version().unwrap(), 2);
        assert_eq!(dump_schema(&db), schema_before);
        let applied = manager.applied().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].version, 2);
        assert_eq!(applied[1].description, "create_t2");
    }

    #[test]
    fn migrate_to_lower_delegates_to_rollback() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        two_reversible(&mut manager);
        manager.migrate_to(None).unwrap();
        manager.migrate_to(Some(0)).unwrap();
        assert_eq!(manager.current_version().unwrap(), 0);
        assert!(!table_exists(&db, "t1"));
    }

    #[test]
    fn irreversible_rollback_is_refused_wholesale() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        manager
            .register(
                Migration::sql(1, "base", "CREATE TABLE base (id INTEGER)", Some("DROP TABLE base"))
                    .unwrap(),
            )
            .unwrap();
        manager
            .register(Migration::sql(2, "one_way", "CREATE TABLE ow (id INTEGER)", None).unwrap())
            .unwrap();
        manager.migrate_to(None).unwrap();
        let error = manager.rollback_to(0).unwrap_err();
        assert!(matches!(error, Error::Irreversible(_)));
        // nothing was rolled back
        assert_eq!(manager.current_version().unwrap(), 2);
        assert!(table_exists(&db, "base"));
    }

    #[test]
    fn failed_migration_leaves_schema_unchanged() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        manager
            .register(Migration::sql(1, "good", "CREATE TABLE good (id INTEGER)", None).unwrap())
            .unwrap();
        manager
            .register(Migration::sql(2, "broken", "CREATE BROKEN SYNTAX", None).unwrap())
            .unwrap();
        assert!(manager.migrate_to(None).is_err());
        assert_eq!(manager.current_version().unwrap(), 0);
        assert!(!table_exists(&db, "good"));
    }

    #[test]
    fn validation_flags_gaps_and_drift() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        manager
            .register(Migration::sql(1, "one", "CREATE TABLE a (id INTEGER)", None).unwrap())
            .unwrap();
        manager
            .register(Migration::sql(3, "three", "CREATE TABLE c (id INTEGER)", None).unwrap())
            .unwrap();
        let error = manager.validate().unwrap_err();
        assert_eq!(error.to_string(), "invalid parameter: gap at 2");
    }

    #[test]
    fn checksum_drift_fails_validation() {
        let (_dir, db) = fixture();
        {
            let mut manager = SchemaManager::new(db.clone()).unwrap();
            manager
                .register(Migration::sql(1, "v1", "CREATE TABLE a (id INTEGER)", None).unwrap())
                .unwrap();
            manager.migrate_to(None).unwrap();
        }
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        manager
            .register(Migration::sql(1, "v1", "CREATE TABLE a (id INTEGER, extra TEXT)", None).unwrap())
            .unwrap();
        let error = manager.validate().unwrap_err();
        assert!(error.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db).unwrap();
        manager
            .register(Migration::sql(1, "a", "SELECT 1", None).unwrap())
            .unwrap();
        assert!(manager
            .register(Migration::sql(1, "b", "SELECT 2", None).unwrap())
            .is_err());
    }

    #[test]
    fn baseline_adopts_without_running() {
        let (_dir, db) = fixture();
        let manager = SchemaManager::new(db.clone()).unwrap();
        manager.baseline(5, "imported").unwrap();
        assert_eq!(manager.current_version().unwrap(), 5);
        assert!(manager.baseline(3, "late").is_err());
        let rows = manager.applied().unwrap();
        assert_eq!(rows[0].description, "imported");
        assert_eq!(rows[0].execution_time_ms, None);
    }

    #[test]
    fn function_migrations_run_in_transaction() {
        let (_dir, db) = fixture();
        let mut manager = SchemaManager::new(db.clone()).unwrap();
        manager
            .register(
                Migration::func_reversible(
                    1,
                    "seed_flags",
                    |tx| {
                        tx.execute("CREATE TABLE flags (k TEXT PRIMARY KEY, v INTEGER)")?;
                        tx.execute("INSERT INTO flags VALUES ('ready', 1)")?;
                        Ok(())
                    },
                    |tx| tx.execute("DROP TABLE flags").map(|_| ()),
                )
                .unwrap(),
            )
            .unwrap();
        manager.migrate_to(None).unwrap();
        assert!(table_exists(&db, "flags"));
        manager.rollback_to(0).unwrap();
        assert!(!table_exists(&db, "flags"));
    }

    #[test]
    fn directory_loading_pairs_files() {
        let (_dir, db) = fixture();
        let migrations = tempfile::tempdir().unwrap();
        std::fs::write(
            migrations.path().join("V1__players.up.sql"),
            "CREATE TABLE players (id INTEGER PRIMARY KEY, name TEXT)",
        )
        .unwrap();
        std::fs::write(
            migrations.path().join("V1__players.down.sql"),
            "DROP TABLE players",
        )
        .unwrap();
        std::fs::write(
            migrations.path().join("V2__scores.up.sql"),
            "CREATE TABLE scores (player_id INTEGER, value INTEGER)",
        )
        .unwrap();
        std::fs::write(migrations.path().join("notes.txt"), "ignored").unwrap();

        let mut manager = SchemaManager::new(db.clone()).unwrap();
        let loaded = manager.load_directory(migrations.path()).unwrap();
        assert_eq!(loaded, 2);
        assert!(manager.validate().is_ok());
        manager.migrate_to(None).unwrap();
        assert!(table_exists(&db, "players"));
        assert!(table_exists(&db, "scores"));
        assert!(manager.registered()[0].is_reversible());
        assert!(!manager.registered()[1].is_reversible());

        let missing = manager.load_directory(migrations.path().join("absent"));
        assert!(matches!(missing, Err(Error::InvalidParameter(_))));
    }
}
