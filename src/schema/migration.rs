use crate::Error;
use crate::Result;
use crate::database::TxHandle;
use sha2::Digest;
use std::path::Path;

/// a caller-supplied migration body runs against the open transaction
pub type MigrationFn = Box<dyn Fn(&mut TxHandle<'_>) -> Result<()> + Send + Sync>;

enum Body {
    Sql { up: String, down: Option<String> },
    Func { up: MigrationFn, down: Option<MigrationFn> },
}

/// one ordered, checksummed unit of schema change
///
/// SQL bodies hash their up and down text; function bodies hash
/// version and description only, so two different functions with the
/// same metadata compare equal — callers who care pick distinct
/// descriptions.
pub struct Migration {
    version: i64,
    description: String,
    checksum: String,
    body: Body,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("checksum", &self.checksum)
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

fn hex_digest(parts: &[&[u8]]) -> String {
    let mut hasher = sha2::Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// stable hash for bodies without hashable content
pub(crate) fn metadata_checksum(version: i64, description: &str) -> String {
    hex_digest(&[version.to_string().as_bytes(), description.as_bytes()])
}

impl Migration {
    fn check_version(version: i64) -> Result<()> {
        if version < 1 {
            return Err(Error::invalid_parameter(format!(
                "migration version must be >= 1, got {}",
                version
            )));
        }
        Ok(())
    }

    /// SQL migration; pass a down script to make it reversible
    pub fn sql(
        version: i64,
        description: impl Into<String>,
        up: impl Into<String>,
        down: Option<&str>,
    ) -> Result<Self> {
        Self::check_version(version)?;
        let up = up.into();
        let down = down.map(str::to_string);
        let checksum = hex_digest(&[
            up.as_bytes(),
            down.as_deref().unwrap_or_default().as_bytes(),
        ]);
        Ok(Self {
            version,
            description: description.into(),
            checksum,
            body: Body::Sql { up, down },
        })
    }

    /// irreversible function migration
    pub fn func<F>(version: i64, description: impl Into<String>, up: F) -> Result<Self>
    where
        F: Fn(&mut TxHandle<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::check_version(version)?;
        let description = description.into();
        Ok(Self {
            version,
            checksum: metadata_checksum(version, &description),
            description,
            body: Body::Func {
                up: Box::new(up),
                down: None,
            },
        })
    }

    /// reversible function migration
    pub fn func_reversible<F, G>(
        version: i64,
        description: impl Into<String>,
        up: F,
        down: G,
    ) -> Result<Self>
    where
        F: Fn(&mut TxHandle<'_>) -> Result<()> + Send + Sync + 'static,
        G: Fn(&mut TxHandle<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::check_version(version)?;
        let description = description.into();
        Ok(Self {
            version,
            checksum: metadata_checksum(version, &description),
            description,
            body: Body::Func {
                up: Box::new(up),
                down: Some(Box::new(down)),
            },
        })
    }

    /// paired .up.sql / .down.sql files
    pub fn from_files(
        version: i64,
        description: impl Into<String>,
        up_path: &Path,
        down_path: Option<&Path>,
    ) -> Result<Self> {
        let up = std::fs::read_to_string(up_path).map_err(|e| {
            Error::invalid_parameter(format!(
                "cannot read migration file {}: {}",
                up_path.display(),
                e
            ))
        })?;
        let down = match down_path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                Error::invalid_parameter(format!(
                    "cannot read migration file {}: {}",
                    path.display(),
                    e
                ))
            })?),
            None => None,
        };
        Self::sql(version, description, up, down.as_deref())
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn is_reversible(&self) -> bool {
        match &self.body {
            Body::Sql { down, .. } => down.is_some(),
            Body::Func { down, .. } => down.is_some(),
        }
    }

    pub(crate) fn apply(&self, tx: &mut TxHandle<'_>) -> Result<()> {
        match &self.body {
            Body::Sql { up, .. } => tx.execute(up).map(|_| ()),
            Body::Func { up, .. } => up(tx),
        }
    }

    pub(crate) fn revert(&self, tx: &mut TxHandle<'_>) -> Result<()> {
        match &self.body {
            Body::Sql { down: Some(down), .. } => tx.execute(down).map(|_| ()),
            Body::Func { down: Some(down), .. } => down(tx),
            _ => Err(Error::Irreversible(format!(
                "migration {} has no down path",
                self.version
            ))),
        }
    }
}

/// parse `V<digits>__<description>.<up|down>.sql`; None when the name
/// does not match
pub(crate) fn parse_migration_filename(name: &str) -> Option<(i64, String, bool)> {
    let rest = name.strip_prefix('V')?;
    let (digits, rest) = rest.split_once("__")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = digits.parse::<i64>().ok()?;
    let (description, is_up) = if let Some(stem) = rest.strip_suffix(".up.sql") {
        (stem, true)
    } else if let Some(stem) = rest.strip_suffix(".down.sql") {
        (stem, false)
    } else {
        return None;
    };
    if description.is_empty() {
        return None;
    }
    Some((version, description.to_string(), is_up))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_checksum_covers_both_directions() {
        let a = Migration::sql(1, "t1", "CREATE TABLE t1 (id)", None).unwrap();
        let b = Migration::sql(1, "t1", "CREATE TABLE t1 (id)", Some("DROP TABLE t1")).unwrap();
        assert_ne!(a.checksum(), b.checksum());
        assert!(!a.is_reversible());
        assert!(b.is_reversible());
        assert_eq!(a.checksum().len(), 64);
    }

    #[test]
    fn func_checksum_hashes_metadata_only() {
        let a = Migration::func(2, "backfill", |_| Ok(())).unwrap();
        let b = Migration::func(2, "backfill", |tx| tx.execute("SELECT 1").map(|_| ())).unwrap();
        assert_eq!(a.checksum(), b.checksum());
        let c = Migration::func(2, "other", |_| Ok(())).unwrap();
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn version_floor() {
        assert!(Migration::sql(0, "bad", "SELECT 1", None).is_err());
        assert!(Migration::sql(-3, "bad", "SELECT 1", None).is_err());
    }

    #[test]
    fn filename_grammar() {
        assert_eq!(
            parse_migration_filename("V001__create_players.up.sql"),
            Some((1, "create_players".to_string(), true))
        );
        assert_eq!(
            parse_migration_filename("V12__drop_scores.down.sql"),
            Some((12, "drop_scores".to_string(), false))
        );
        assert_eq!(parse_migration_filename("V__x.up.sql"), None);
        assert_eq!(parse_migration_filename("Vx1__x.up.sql"), None);
        assert_eq!(parse_migration_filename("V1_x.up.sql"), None);
        assert_eq!(parse_migration_filename("V1__x.sql"), None);
        assert_eq!(parse_migration_filename("readme.md"), None);
    }
}
