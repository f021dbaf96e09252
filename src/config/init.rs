use super::InitConfig;
use super::apply_seed;
use super::load_seed_file;
use crate::Error;
use crate::Result;
use crate::database::DatabaseManager;
use crate::database::SqlValue;
use crate::schema::SchemaManager;
use std::path::Path;
use std::sync::Arc;

/// the platform's long-lived tables. `game_history.state` holds the
/// packed 32-bit player state word.
const GAME_SCHEMA: &[(&str, &str)] = &[
    (
        "players",
        "CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT (datetime('now')),
            games_played INTEGER NOT NULL DEFAULT 0,
            games_won INTEGER NOT NULL DEFAULT 0,
            total_points INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "games",
        "CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TIMESTAMP NOT NULL DEFAULT (datetime('now')),
            finished_at TIMESTAMP,
            winner_id INTEGER REFERENCES players(id),
            rounds INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "game_players",
        "CREATE TABLE IF NOT EXISTS game_players (
            game_id INTEGER NOT NULL REFERENCES games(id),
            player_id INTEGER NOT NULL REFERENCES players(id),
            seat INTEGER NOT NULL,
            final_points INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (game_id, player_id)
        )",
    ),
    (
        "game_history",
        "CREATE TABLE IF NOT EXISTS game_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL REFERENCES games(id),
            player_id INTEGER NOT NULL REFERENCES players(id),
            round INTEGER NOT NULL,
            state INTEGER NOT NULL,
            recorded_at TIMESTAMP NOT NULL DEFAULT (datetime('now'))
        )",
    ),
    (
        "achievements",
        "CREATE TABLE IF NOT EXISTS achievements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            category TEXT NOT NULL DEFAULT 'milestone'
        )",
    ),
    (
        "player_achievements",
        "CREATE TABLE IF NOT EXISTS player_achievements (
            player_id INTEGER NOT NULL REFERENCES players(id),
            achievement_id INTEGER NOT NULL REFERENCES achievements(id),
            earned_at TIMESTAMP NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (player_id, achievement_id)
        )",
    ),
    (
        "settings",
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ),
];

const DEFAULT_ACHIEVEMENTS: &[(&str, &str, &str, i64)] = &[
    ("first_win", "First Victory", "Win your first game", 10),
    ("win_streak_5", "Hot Streak", "Win 5 games in a row", 50),
    (
        "perfect_game",
        "Flawless Victory",
        "Win without losing a single point",
        100,
    ),
];

const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("starting_dice", "5"),
    ("starting_points", "5"),
    ("history_capacity", "100"),
];

/// drives a fresh (or adopted) database through pragmas, schema,
/// migrations, defaults and seed data, per the init document
pub struct DatabaseInitializer {
    db: Arc<DatabaseManager>,
    schema: SchemaManager,
}

impl DatabaseInitializer {
    pub fn new(db: Arc<DatabaseManager>) -> Result<Self> {
        let schema = SchemaManager::new(db.clone())?;
        Ok(Self { db, schema })
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    pub fn run(&mut self, config: &InitConfig) -> Result<()> {
        log::info!("starting database initialization");
        self.check_requirements(config)?;
        self.apply_pragmas(config);

        if config.create_schema {
            self.create_game_schema()?;
        }

        if config.run_migrations && !config.migration_directory.is_empty() {
            let loaded = self.schema.load_directory(&config.migration_directory)?;
            log::info!("loaded {} migrations", loaded);
            self.schema.migrate_to(None)?;
        }

        if config.create_schema {
            self.seed_defaults()?;
        }

        if config.seed_data && !config.seed_data_file.is_empty() {
            let entries = load_seed_file(&config.seed_data_file)?;
            let affected = apply_seed(&self.db, &entries)?;
            log::info!("applied {} seed entries ({} rows)", entries.len(), affected);
        }

        if config.validate_schema {
            self.check_required_tables(&config.required_tables)?;
        }

        log::info!("database initialization complete");
        Ok(())
    }

    fn check_requirements(&self, config: &InitConfig) -> Result<()> {
        if config.run_migrations
            && !config.migration_directory.is_empty()
            && !Path::new(&config.migration_directory).is_dir()
        {
            return Err(Error::invalid_parameter(format!(
                "migration directory does not exist: {}",
                config.migration_directory
            )));
        }
        if config.seed_data
            && !config.seed_data_file.is_empty()
            && !Path::new(&config.seed_data_file).is_file()
        {
            return Err(Error::invalid_parameter(format!(
                "seed data file does not exist: {}",
                config.seed_data_file
            )));
        }
        Ok(())
    }

    /// session-level settings; journal mode and page size also persist
    /// into the file itself. individual failures are logged, not fatal.
    fn apply_pragmas(&self, config: &InitConfig) {
        let pragmas = [
            format!("PRAGMA cache_size = {}", config.performance.cache_size),
            format!("PRAGMA page_size = {}", config.performance.page_size),
            format!("PRAGMA journal_mode = {}", config.performance.journal_mode),
            format!("PRAGMA synchronous = {}", config.performance.synchronous),
            format!(
                "PRAGMA foreign_keys = {}",
                if config.features.enable_foreign_keys { "ON" } else { "OFF" }
            ),
            format!(
                "PRAGMA recursive_triggers = {}",
                if config.features.enable_triggers { "ON" } else { "OFF" }
            ),
        ];
        for pragma in pragmas {
            match self.db.execute(&pragma) {
                Ok(_) => log::debug!("{}", pragma),
                Err(error) => log::warn!("{} failed: {}", pragma, error),
            }
        }
    }

    fn create_game_schema(&self) -> Result<()> {
        for (name, ddl) in GAME_SCHEMA {
            self.db.execute(ddl)?;
            log::debug!("ensured table {}", name);
        }
        Ok(())
    }

    fn seed_defaults(&self) -> Result<()> {
        self.db.with_transaction(|tx| {
            for (code, name, description, points) in DEFAULT_ACHIEVEMENTS {
                let mut insert = tx.prepare(
                    "INSERT OR IGNORE INTO achievements (code, name, description, points, category)
                     VALUES (?1, ?2, ?3, ?4, 'milestone')",
                )?;
                insert.bind(1, *code)?;
                insert.bind(2, *name)?;
                insert.bind(3, *description)?;
                insert.bind(4, *points)?;
                tx.execute_prepared(&insert)?;
            }
            for (key, value) in DEFAULT_SETTINGS {
                let mut insert = tx.prepare(
                    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                )?;
                insert.bind(1, *key)?;
                insert.bind(2, *value)?;
                tx.execute_prepared(&insert)?;
            }
            Ok(())
        })
    }

    fn check_required_tables(&self, required: &[String]) -> Result<()> {
        for table in required {
            let present = self
                .db
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    &[SqlValue::from(table.as_str())],
                )?
                .is_some();
            if !present {
                return Err(Error::invalid_parameter(format!(
                    "required table missing: {}",
                    table
                )));
            }
        }
        log::info!("validated {} required tables", required.len());
        Ok(())
    }

    /// write a starter configuration document
    pub fn write_template(path: impl AsRef<Path>, format: &str) -> Result<()> {
        let config = InitConfig {
            migration_directory: "./migrations".to_string(),
            seed_data_file: "./seed_data.json".to_string(),
            required_tables: vec![
                "players".to_string(),
                "game_history".to_string(),
                "achievements".to_string(),
            ],
            ..InitConfig::default()
        };
        let text = match format.to_ascii_lowercase().as_str() {
            "json" => config.to_json()?,
            other => {
                return Err(Error::invalid_parameter(format!(
                    "unsupported template format: {}",
                    other
                )));
            }
        };
        std::fs::write(path.as_ref(), text)?;
        log::info!("wrote configuration template to {}", path.as_ref().display());
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
        let path = dir.path().join("init.db");
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

    fn table_exists(db: &DatabaseManager, name: &str) -> bool {
        db.query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[name.into()],
        )
        .unwrap()
        .is_some()
    }

    #[test]
    fn full_run_creates_schema_and_defaults() {
        let (_dir, db) = fixture();
        let mut initializer = DatabaseInitializer::new(db.clone()).unwrap();
        let config = InitConfig {
            validate_schema: true,
            required_tables: vec!["players".to_string(), "achievements".to_string()],
            ..InitConfig::default()
        };
        initializer.run(&config).unwrap();
        for table in ["players", "games", "game_history", "achievements", "settings"] {
            assert!(table_exists(&db, table), "{} missing", table);
        }
        let achievements = db
            .query_scalar("SELECT COUNT(*) FROM achievements", &[])
            .unwrap()
            .unwrap();
        assert_eq!(achievements.as_i64().unwrap(), 3);
        let dice = db
            .query_scalar("SELECT value FROM settings WHERE key = 'starting_dice'", &[])
            .unwrap()
            .unwrap();
        assert_eq!(dice.as_text().unwrap(), "5");
    }

    #[test]
    fn run_is_idempotent() {
        let (_dir, db) = fixture();
        let mut initializer = DatabaseInitializer::new(db.clone()).unwrap();
        initializer.run(&InitConfig::default()).unwrap();
        initializer.run(&InitConfig::default()).unwrap();
        let achievements = db
            .query_scalar("SELECT COUNT(*) FROM achievements", &[])
            .unwrap()
            .unwrap();
        assert_eq!(achievements.as_i64().unwrap(), 3);
    }

    #[test]
    fn migrations_and_seed_run_from_files() {
        let (dir, db) = fixture();
        let migrations = dir.path().join("migrations");
        std::fs::create_dir_all(&migrations).unwrap();
        std::fs::write(
            migrations.join("V1__lobbies.up.sql"),
            "CREATE TABLE lobbies (id INTEGER PRIMARY KEY, name TEXT UNIQUE)",
        )
        .unwrap();
        let seed = dir.path().join("seed.json");
        std::fs::write(
            &seed,
            r#"{"seed_data": [{"table": "lobbies", "values": {"name": "main"}}]}"#,
        )
        .unwrap();

        let mut initializer = DatabaseInitializer::new(db.clone()).unwrap();
        let config = InitConfig {
            migration_directory: migrations.to_str().unwrap().to_string(),
            seed_data_file: seed.to_str().unwrap().to_string(),
            ..InitConfig::default()
        };
        initializer.run(&config).unwrap();
        assert!(table_exists(&db, "lobbies"));
        assert_eq!(initializer.schema().current_version().unwrap(), 1);
        let lobbies = db
            .query_scalar("SELECT COUNT(*) FROM lobbies", &[])
            .unwrap()
            .unwrap();
        assert_eq!(lobbies.as_i64().unwrap(), 1);

        // a second run re-applies nothing
        initializer.run(&config).unwrap();
        let lobbies = db
            .query_scalar("SELECT COUNT(*) FROM lobbies", &[])
            .unwrap()
            .unwrap();
        assert_eq!(lobbies.as_i64().unwrap(), 1);
    }

    #[test]
    fn missing_migration_directory_is_rejected() {
        let (_dir, db) = fixture();
        let mut initializer = DatabaseInitializer::new(db).unwrap();
        let config = InitConfig {
            migration_directory: "/definitely/not/here".to_string(),
            ..InitConfig::default()
        };
        assert!(matches!(
            initializer.run(&config),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn validation_catches_missing_tables() {
        let (_dir, db) = fixture();
        let mut initializer = DatabaseInitializer::new(db).unwrap();
        let config = InitConfig {
            create_schema: false,
            validate_schema: true,
            required_tables: vec!["players".to_string()],
            ..InitConfig::default()
        };
        let error = initializer.run(&config).unwrap_err();
        assert!(error.to_string().contains("required table missing"));
    }

    #[test]
    fn template_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        DatabaseInitializer::write_template(&path, "json").unwrap();
        let config = InitConfig::from_json_file(&path).unwrap();
        assert_eq!(config.migration_directory, "./migrations");
        assert_eq!(config.required_tables.len(), 3);
        assert!(DatabaseInitializer::write_template(&path, "yaml").is_err());
    }
}
