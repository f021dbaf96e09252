use crate::Error;
use crate::Result;
use crate::database::DatabaseManager;
use std::path::Path;

/// one row of seed data: insert-or-ignore by default, update when
/// `is_update` is set (optionally guarded by a condition)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedEntry {
    pub table: String,
    pub values: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub is_update: bool,
    #[serde(default)]
    pub condition: String,
}

#[derive(Debug, serde::Deserialize)]
struct SeedFile {
    seed_data: Vec<SeedEntry>,
}

pub fn load_seed_file(path: impl AsRef<Path>) -> Result<Vec<SeedEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::invalid_parameter(format!(
            "seed data file not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let file: SeedFile = serde_json::from_str(&text)
        .map_err(|e| Error::internal(format!("failed to parse seed data: {}", e)))?;
    Ok(file.seed_data)
}

fn check_identifier(name: &str) -> Result<&str> {
    let legal = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if legal {
        Ok(name)
    } else {
        Err(Error::invalid_parameter(format!(
            "illegal identifier in seed data: {:?}",
            name
        )))
    }
}

fn literal(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::Null => Ok("NULL".to_string()),
        serde_json::Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        other => Err(Error::invalid_parameter(format!(
            "seed value must be a scalar, got {}",
            other
        ))),
    }
}

/// render one entry to its SQL statement
pub(crate) fn render_sql(entry: &SeedEntry) -> Result<String> {
    if entry.values.is_empty() {
        return Err(Error::invalid_parameter(format!(
            "seed entry for {} has no values",
            entry.table
        )));
    }
    let table = check_identifier(&entry.table)?;
    if entry.is_update {
        let assignments = entry
            .values
            .iter()
            .map(|(column, value)| Ok(format!("{} = {}", check_identifier(column)?, literal(value)?)))
            .collect::<Result<Vec<String>>>()?
            .join(", ");
        let mut sql = format!("UPDATE {} SET {}", table, assignments);
        if !entry.condition.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&entry.condition);
        }
        Ok(sql)
    } else {
        let columns = entry
            .values
            .keys()
            .map(|column| check_identifier(column).map(str::to_string))
            .collect::<Result<Vec<String>>>()?
            .join(", ");
        let values = entry
            .values
            .values()
            .map(literal)
            .collect::<Result<Vec<String>>>()?
            .join(", ");
        Ok(format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            table, columns, values
        ))
    }
}

/// apply a whole batch inside one transaction; returns rows affected
pub fn apply_seed(db: &DatabaseManager, entries: &[SeedEntry]) -> Result<usize> {
    db.with_transaction(|tx| {
        let mut affected = 0;
        for entry in entries {
            let sql = render_sql(entry)?;
            affected += tx.execute(&sql)?;
        }
        Ok(affected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::database::PoolConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn entry(json: &str) -> SeedEntry {
        serde_json::from_str(json).unwrap()
    }

    fn fixture() -> (tempfile::TempDir, Arc<DatabaseManager>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.db");
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
        db.execute(
            "CREATE TABLE achievements (
                code TEXT PRIMARY KEY,
                name TEXT,
                points INTEGER,
                hidden INTEGER
            )",
        )
        .unwrap();
        (dir, db)
    }

    #[test]
    fn renders_insert_or_ignore() {
        let e = entry(
            r#"{"table": "achievements",
                "values": {"code": "first_win", "name": "First Victory", "points": 10}}"#,
        );
        let sql = render_sql(&e).unwrap();
        assert_eq!(
            sql,
            "INSERT OR IGNORE INTO achievements (code, name, points) \
             VALUES ('first_win', 'First Victory', 10)"
        );
    }

    #[test]
    fn renders_update_with_condition() {
        let e = entry(
            r#"{"table": "achievements",
                "values": {"points": 20},
                "is_update": true,
                "condition": "code = 'first_win'"}"#,
        );
        assert_eq!(
            render_sql(&e).unwrap(),
            "UPDATE achievements SET points = 20 WHERE code = 'first_win'"
        );
    }

    #[test]
    fn escapes_quotes_and_rejects_bad_identifiers() {
        let e = entry(r#"{"table": "t", "values": {"name": "o'brien"}}"#);
        assert!(render_sql(&e).unwrap().contains("'o''brien'"));
        let bad = entry(r#"{"table": "t; DROP TABLE x", "values": {"a": 1}}"#);
        assert!(render_sql(&bad).is_err());
        let empty = entry(r#"{"table": "t", "values": {}}"#);
        assert!(render_sql(&empty).is_err());
    }

    #[test]
    fn applying_twice_is_idempotent_for_inserts() {
        let (_dir, db) = fixture();
        let entries = vec![
            entry(
                r#"{"table": "achievements",
                    "values": {"code": "first_win", "name": "First Victory", "points": 10}}"#,
            ),
            entry(
                r#"{"table": "achievements",
                    "values": {"code": "streak", "name": "Hot Streak", "points": 50}}"#,
            ),
        ];
        assert_eq!(apply_seed(&db, &entries).unwrap(), 2);
        assert_eq!(apply_seed(&db, &entries).unwrap(), 0);
        let count = db
            .query_scalar("SELECT COUNT(*) FROM achievements", &[])
            .unwrap()
            .unwrap();
        assert_eq!(count.as_i64().unwrap(), 2);
    }

    #[test]
    fn updates_respect_condition() {
        let (_dir, db) = fixture();
        db.execute("INSERT INTO achievements (code, points) VALUES ('a', 1), ('b', 1)")
            .unwrap();
        let update = entry(
            r#"{"table": "achievements",
                "values": {"points": 99},
                "is_update": true,
                "condition": "code = 'a'"}"#,
        );
        assert_eq!(apply_seed(&db, &[update]).unwrap(), 1);
        let points = db
            .query_scalar("SELECT points FROM achievements WHERE code = 'b'", &[])
            .unwrap()
            .unwrap();
        assert_eq!(points.as_i64().unwrap(), 1);
    }

    #[test]
    fn batch_is_transactional() {
        let (_dir, db) = fixture();
        let entries = vec![
            entry(r#"{"table": "achievements", "values": {"code": "ok", "points": 1}}"#),
            entry(r#"{"table": "missing_table", "values": {"code": "boom"}}"#),
        ];
        assert!(apply_seed(&db, &entries).is_err());
        let count = db
            .query_scalar("SELECT COUNT(*) FROM achievements", &[])
            .unwrap()
            .unwrap();
        assert_eq!(count.as_i64().unwrap(), 0);
    }

    #[test]
    fn seed_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{"seed_data": [
                {"table": "settings", "values": {"key": "starting_dice", "value": "5"}},
                {"table": "settings", "values": {"key": "starting_points", "value": "5"},
                 "is_update": false}
            ]}"#,
        )
        .unwrap();
        let entries = load_seed_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].table, "settings");
        assert!(!entries[1].is_update);
        assert!(load_seed_file(dir.path().join("nope.json")).is_err());
    }
}
