use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

const DAY: u64 = 24 * 60 * 60;

/// backup tier; the tier picks the filename pattern and how long the
/// file is allowed to live
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackupKind {
    Manual,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl BackupKind {
    pub const ALL: [BackupKind; 5] = [
        Self::Manual,
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
        Self::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// tier from the scheduled filename prefix
    pub fn from_filename(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| name.starts_with(&format!("backup_{}_", kind.as_str())))
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// tiered retention windows, size budgets and filename patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub daily_keep: Duration,
    pub weekly_keep: Duration,
    pub monthly_keep: Duration,
    pub yearly_keep: Duration,
    pub max_backup_size: u64,
    pub max_directory_size: u64,
    pub daily_pattern: String,
    pub weekly_pattern: String,
    pub monthly_pattern: String,
    pub yearly_pattern: String,
    pub manual_pattern: String,
    pub compress: bool,
    pub compression_suffix: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily_keep: Duration::from_secs(7 * DAY),
            weekly_keep: Duration::from_secs(28 * DAY),
            monthly_keep: Duration::from_secs(180 * DAY),
            yearly_keep: Duration::from_secs(730 * DAY),
            max_backup_size: 1 << 30,
            max_directory_size: 10 << 30,
            daily_pattern: "backup_daily_%Y%m%d_%H%M%S.db".to_string(),
            weekly_pattern: "backup_weekly_%Y_W%W.db".to_string(),
            monthly_pattern: "backup_monthly_%Y_%m.db".to_string(),
            yearly_pattern: "backup_yearly_%Y.db".to_string(),
            manual_pattern: "backup_manual_%Y%m%d_%H%M%S.db".to_string(),
            compress: false,
            compression_suffix: ".gz".to_string(),
        }
    }
}

impl RetentionPolicy {
    pub fn pattern(&self, kind: BackupKind) -> &str {
        match kind {
            BackupKind::Manual => &self.manual_pattern,
            BackupKind::Daily => &self.daily_pattern,
            BackupKind::Weekly => &self.weekly_pattern,
            BackupKind::Monthly => &self.monthly_pattern,
            BackupKind::Yearly => &self.yearly_pattern,
        }
    }

    /// manual backups age out on the daily window
    pub fn retention(&self, kind: BackupKind) -> Duration {
        match kind {
            BackupKind::Manual | BackupKind::Daily => self.daily_keep,
            BackupKind::Weekly => self.weekly_keep,
            BackupKind::Monthly => self.monthly_keep,
            BackupKind::Yearly => self.yearly_keep,
        }
    }

    /// strftime-render a tier's filename for the current wall clock
    pub fn render_filename(&self, kind: BackupKind) -> String {
        chrono::Local::now().format(self.pattern(kind)).to_string()
    }
}

/// what the manager records about one produced backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub created_at: SystemTime,
    pub size: u64,
    pub kind: BackupKind,
    pub compressed: bool,
    pub checksum: String,
}

impl BackupInfo {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or(Duration::ZERO)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// per-tier counts and byte totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub total_backups: usize,
    pub total_bytes: u64,
    pub per_kind: std::collections::BTreeMap<BackupKind, usize>,
}

pub(crate) fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_from_filename_prefix() {
        assert_eq!(
            BackupKind::from_filename("backup_daily_20250101_120000.db"),
            Some(BackupKind::Daily)
        );
        assert_eq!(
            BackupKind::from_filename("backup_weekly_2025_W01.db.gz"),
            Some(BackupKind::Weekly)
        );
        assert_eq!(
            BackupKind::from_filename("backup_manual_20250101_120000.db"),
            Some(BackupKind::Manual)
        );
        assert_eq!(BackupKind::from_filename("liarsdice.db"), None);
    }

    #[test]
    fn manual_ages_on_daily_window() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.retention(BackupKind::Manual), policy.daily_keep);
        assert!(policy.retention(BackupKind::Yearly) > policy.retention(BackupKind::Monthly));
    }

    #[test]
    fn rendered_names_parse_back_to_their_tier() {
        let policy = RetentionPolicy::default();
        for kind in BackupKind::ALL {
            let name = policy.render_filename(kind);
            assert_eq!(BackupKind::from_filename(&name), Some(kind), "{}", name);
            assert!(name.ends_with(".db"));
        }
    }
}
