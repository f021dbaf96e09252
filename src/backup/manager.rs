use super::BackupInfo;
use super::BackupKind;
use super::RetentionPolicy;
use super::StorageStats;
use super::file_size;
use crate::Error;
use crate::Result;
use crate::database::DatabaseManager;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;

/// file-level snapshots of the live database with tiered retention
///
/// restore rewrites the backing file; callers arrange quiescence by
/// shutting the pool down first. checksums are CRC-32 over the final
/// on-disk bytes (compressed when compression is on).
pub struct BackupManager {
    db: Arc<DatabaseManager>,
    directory: PathBuf,
    policy: RetentionPolicy,
    records: Mutex<HashMap<PathBuf, String>>,
}

impl BackupManager {
    pub fn new(db: Arc<DatabaseManager>, directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            db,
            directory,
            policy: RetentionPolicy::default(),
            records: Mutex::new(HashMap::new()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: RetentionPolicy) {
        log::info!(
            "retention policy: daily {}d, weekly {}d, monthly {}d, yearly {}d, compress {}",
            policy.daily_keep.as_secs() / 86_400,
            policy.weekly_keep.as_secs() / 86_400,
            policy.monthly_keep.as_secs() / 86_400,
            policy.yearly_keep.as_secs() / 86_400,
            policy.compress,
        );
        self.policy = policy;
    }

    fn live_path(&self) -> Result<PathBuf> {
        self.db
            .database_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::invalid_state("in-memory database has no file to back up"))
    }

    fn remember(&self, path: &Path, checksum: &str) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf(), checksum.to_string());
    }

    fn recorded(&self, path: &Path) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }

    fn forget(&self, path: &Path) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path);
    }

    /// snapshot the live file; an explicit name wins over the manual
    /// pattern
    pub fn create_backup(&self, name: Option<&str>) -> Result<BackupInfo> {
        let filename = match name {
            Some(name) => format!("{}.db", name),
            None => self.policy.render_filename(BackupKind::Manual),
        };
        self.snapshot_to(&filename, BackupKind::Manual)
    }

    /// tiered snapshot; an existing file for the resolved name is
    /// returned as-is instead of re-copying
    pub fn create_scheduled(&self, kind: BackupKind) -> Result<BackupInfo> {
        let filename = self.policy.render_filename(kind);
        let existing = if self.policy.compress {
            self.directory
                .join(format!("{}{}", filename, self.policy.compression_suffix))
        } else {
            self.directory.join(&filename)
        };
        if existing.exists() {
            log::info!("scheduled backup already exists: {}", existing.display());
            return self.describe(&existing, kind);
        }
        self.snapshot_to(&filename, kind)
    }

    fn snapshot_to(&self, filename: &str, kind: BackupKind) -> Result<BackupInfo> {
        let source = self.live_path()?;
        if !source.exists() {
            return Err(Error::invalid_parameter(format!(
                "source database file not found: {}",
                source.display()
            )));
        }
        // fold the WAL into the main file so the copy is complete
        if let Err(e) = self.db.execute("PRAGMA wal_checkpoint(TRUNCATE);") {
            log::warn!("wal checkpoint before backup failed: {}", e);
        }

        let mut destination = self.directory.join(filename);
        std::fs::copy(&source, &destination)?;
        if self.policy.compress {
            let compressed = self.compress(&destination)?;
            std::fs::remove_file(&destination)?;
            destination = compressed;
        }

        let size = file_size(&destination);
        if size > self.policy.max_backup_size {
            std::fs::remove_file(&destination)?;
            return Err(Error::invalid_parameter(format!(
                "backup exceeds size limit ({} > {} bytes)",
                size, self.policy.max_backup_size
            )));
        }
        if self.directory_size()? > self.policy.max_directory_size {
            std::fs::remove_file(&destination)?;
            return Err(Error::invalid_state("backup directory is over its size budget"));
        }

        let checksum = checksum_file(&destination)?;
        self.remember(&destination, &checksum);
        let info = BackupInfo {
            created_at: SystemTime::now(),
            size,
            kind,
            compressed: self.policy.compress,
            checksum,
            path: destination,
        };
        log::info!(
            "created {} backup {} ({} bytes)",
            kind,
            info.path.display(),
            info.size,
        );
        Ok(info)
    }

    fn describe(&self, path: &Path, kind: BackupKind) -> Result<BackupInfo> {
        let metadata = std::fs::metadata(path)?;
        let checksum = checksum_file(path)?;
        self.remember(path, &checksum);
        Ok(BackupInfo {
            path: path.to_path_buf(),
            created_at: metadata.modified().unwrap_or_else(|_| SystemTime::now()),
            size: metadata.len(),
            kind,
            compressed: path
                .to_str()
                .map(|p| p.ends_with(&self.policy.compression_suffix))
                .unwrap_or(false),
            checksum,
        })
    }

    /// overwrite the live database from a backup; the previous live
    /// file rides along as a side-copy and comes back on any failure
    pub fn restore(&self, backup: impl AsRef<Path>) -> Result<()> {
        let backup = backup.as_ref();
        if !backup.exists() {
            return Err(Error::invalid_parameter(format!(
                "backup file not found: {}",
                backup.display()
            )));
        }
        let checksum = checksum_file(backup)?;
        if let Some(expected) = self.recorded(backup) {
            if expected != checksum {
                return Err(Error::internal(format!(
                    "backup checksum mismatch for {}",
                    backup.display()
                )));
            }
        }

        let live = self.live_path()?;
        let compressed = backup
            .to_str()
            .map(|p| p.ends_with(&self.policy.compression_suffix))
            .unwrap_or(false);
        let staged = if compressed {
            let staged = backup.with_extension("staged");
            self.decompress(backup, &staged)?;
            Some(staged)
        } else {
            None
        };
        let source = staged.as_deref().unwrap_or(backup);

        let side_copy = PathBuf::from(format!("{}.restore_backup", live.display()));
        if live.exists() {
            std::fs::copy(&live, &side_copy)?;
        }

        let outcome = std::fs::copy(source, &live);
        if let Some(staged) = staged {
            let _ = std::fs::remove_file(staged);
        }
        match outcome {
            Ok(_) => {
                let _ = std::fs::remove_file(&side_copy);
                log::info!("restored database from {}", backup.display());
                Ok(())
            }
            Err(error) => {
                if side_copy.exists() {
                    let _ = std::fs::copy(&side_copy, &live);
                    let _ = std::fs::remove_file(&side_copy);
                }
                Err(Error::internal(format!("restore aborted: {}", error)))
            }
        }
    }

    /// recompute the file's CRC-32; false when it drifts from the
    /// recorded value
    pub fn verify(&self, backup: impl AsRef<Path>) -> Result<bool> {
        let backup = backup.as_ref();
        if !backup.exists() {
            return Err(Error::invalid_parameter(format!(
                "backup file not found: {}",
                backup.display()
            )));
        }
        let checksum = checksum_file(backup)?;
        Ok(match self.recorded(backup) {
            Some(expected) => expected == checksum,
            None => !checksum.is_empty(),
        })
    }

    /// every backup in the directory, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(kind) = BackupKind::from_filename(name) else {
                continue;
            };
            backups.push(self.describe(&entry.path(), kind)?);
        }
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// delete every backup older than its tier's window; idempotent.
    /// returns the number deleted.
    pub fn apply_retention(&self) -> Result<usize> {
        let mut deleted = 0;
        for backup in self.list_backups()? {
            if backup.age() > self.policy.retention(backup.kind) {
                log::info!(
                    "retention expired {} backup {}",
                    backup.kind,
                    backup.path.display(),
                );
                std::fs::remove_file(&backup.path)?;
                self.forget(&backup.path);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn storage_stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for backup in self.list_backups()? {
            stats.total_backups += 1;
            stats.total_bytes += backup.size;
            *stats.per_kind.entry(backup.kind).or_insert(0) += 1;
        }
        Ok(stats)
    }

    fn directory_size(&self) -> Result<u64> {
        let mut total = 0;
        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }

    fn compress(&self, path: &Path) -> Result<PathBuf> {
        let compressed_path = PathBuf::from(format!(
            "{}{}",
            path.display(),
            self.policy.compression_suffix
        ));
        let mut input = std::fs::File::open(path)?;
        let output = std::fs::File::create(&compressed_path)?;
        let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
        std::io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;
        log::debug!(
            "compressed {} -> {}",
            path.display(),
            compressed_path.display(),
        );
        Ok(compressed_path)
    }

    fn decompress(&self, path: &Path, destination: &Path) -> Result<()> {
        let input = std::fs::File::open(path)?;
        let mut decoder = flate2::read::GzDecoder::new(input);
        let mut output = std::fs::File::create(destination)?;
        std::io::copy(&mut decoder, &mut output)?;
        Ok(())
    }
}

/// CRC-32 of a file's bytes, hex-rendered
pub fn checksum_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:08x}", hasher.finalize()))
}
