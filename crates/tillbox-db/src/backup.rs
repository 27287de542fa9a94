//! # Backup Service
//!
//! Versioned snapshot files of the whole local store, and destructive restore.
//!
//! ## Backup Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       create_backup()                                   │
//! │                                                                         │
//! │  LocalStore.snapshot()                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BackupSnapshot { date, timestamp, version: "1.0", data }              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  write  backup_2026-10-17_1792224000000.json.tmp                       │
//! │  rename backup_2026-10-17_1792224000000.json                           │
//! │       │                                                                 │
//! │       ├── any failure ──► BackupFailed, recovery queue untouched       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  RecoveryQueue.clear()   (the file now holds every recovered sale)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Restore Is Destructive
//! `restore_from_backup` deletes every current table before repopulating.
//! A failure after deletion can leave the store empty; restore again from a
//! known-good file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::persister::StorePersister;
use crate::recovery::RecoveryQueue;
use crate::store::{tables, LocalStore, Table};

/// Snapshot format version written and accepted by this build.
pub const BACKUP_VERSION: &str = "1.0";

const FILE_PREFIX: &str = "backup_";
const FILE_SUFFIX: &str = ".json";

// =============================================================================
// Snapshot
// =============================================================================

/// On-disk backup document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// `YYYY-MM-DD` of the backup.
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// table → row id → row
    pub data: BTreeMap<String, Table>,
}

impl BackupSnapshot {
    /// Captures every table. Known tables are present even when empty.
    pub fn capture(store: &LocalStore, at: DateTime<Utc>) -> Self {
        let mut data = store.snapshot();
        for name in tables::ALL {
            data.entry(name.to_string()).or_default();
        }

        BackupSnapshot {
            date: at.format("%Y-%m-%d").to_string(),
            timestamp: at,
            version: BACKUP_VERSION.to_string(),
            data,
        }
    }

    pub fn table_counts(&self) -> BTreeMap<String, usize> {
        self.data
            .iter()
            .map(|(name, rows)| (name.clone(), rows.len()))
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.data.values().map(|rows| rows.len()).sum()
    }
}

/// Metadata about one backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub file_name: String,
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub size_bytes: u64,
    pub table_counts: BTreeMap<String, usize>,
}

/// A backup file found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub file_name: String,
    /// Epoch milliseconds encoded in the file name.
    pub created_at_millis: i64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub file_name: String,
    pub tables: usize,
    pub rows: usize,
}

// =============================================================================
// File Names
// =============================================================================

/// Builds `backup_<YYYY-MM-DD>_<epochMillis>.json`.
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}{}",
        FILE_PREFIX,
        at.format("%Y-%m-%d"),
        at.timestamp_millis(),
        FILE_SUFFIX
    )
}

/// Returns the epoch millis of a well-formed backup file name.
///
/// Anything that could escape the backup directory is rejected.
pub fn parse_backup_file_name(file_name: &str) -> DbResult<i64> {
    let invalid = || DbError::InvalidBackupName(file_name.to_string());

    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(invalid());
    }

    let stem = file_name
        .strip_prefix(FILE_PREFIX)
        .and_then(|s| s.strip_suffix(FILE_SUFFIX))
        .ok_or_else(invalid)?;
    let (date, millis) = stem.rsplit_once('_').ok_or_else(invalid)?;

    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
    millis.parse::<i64>().map_err(|_| invalid())
}

// =============================================================================
// Backup Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct BackupService {
    store: LocalStore,
    recovery: RecoveryQueue,
    persister: StorePersister,
    backup_dir: PathBuf,
}

impl BackupService {
    pub fn new(
        store: LocalStore,
        recovery: RecoveryQueue,
        persister: StorePersister,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        BackupService {
            store,
            recovery,
            persister,
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Writes a snapshot file, then clears the recovery entries it captured.
    ///
    /// ## Errors
    /// `BackupFailed` if the file could not be written. The recovery queue is
    /// left untouched in that case.
    pub async fn create_backup(&self) -> DbResult<BackupInfo> {
        // A sale's rows reach the store before its recovery entry, so every
        // id read here is already in the snapshot.
        let captured = self.recovery.sale_ids().await;
        let snapshot = BackupSnapshot::capture(&self.store, Utc::now());
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| DbError::BackupFailed(e.to_string()))?;

        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| DbError::BackupFailed(format!("{}: {}", self.backup_dir.display(), e)))?;

        // Two backups in the same millisecond must not overwrite each other.
        let mut at = snapshot.timestamp;
        let mut file_name = backup_file_name(at);
        while fs::try_exists(self.backup_dir.join(&file_name))
            .await
            .unwrap_or(false)
        {
            at += chrono::Duration::milliseconds(1);
            file_name = backup_file_name(at);
        }

        let final_path = self.backup_dir.join(&file_name);
        let tmp_path = self.backup_dir.join(format!("{}.tmp", file_name));

        if let Err(e) = fs::write(&tmp_path, &json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DbError::BackupFailed(e.to_string()));
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DbError::BackupFailed(e.to_string()));
        }

        info!(
            file = %file_name,
            rows = snapshot.total_rows(),
            bytes = json.len(),
            "Backup written"
        );

        if let Err(e) = self.recovery.clear_captured(&captured).await {
            // The sales are in the file; a stale queue only causes replays
            // that recover() skips.
            warn!(error = %e, "Backup written but recovery queue not cleared");
        }

        Ok(BackupInfo {
            file_name,
            date: snapshot.date.clone(),
            timestamp: snapshot.timestamp,
            version: snapshot.version.clone(),
            size_bytes: json.len() as u64,
            table_counts: snapshot.table_counts(),
        })
    }

    /// Replaces the whole store with a snapshot file. Destructive.
    ///
    /// ## Steps
    /// 1. Read, parse and version-check the file (store untouched on failure)
    /// 2. Delete every current table
    /// 3. Re-populate row by row
    /// 4. Persist the store to device storage
    pub async fn restore_from_backup(&self, file_name: &str) -> DbResult<RestoreSummary> {
        let snapshot = self.read_snapshot(file_name).await.map_err(|e| match e {
            DbError::InvalidBackupName(_) | DbError::NotFound { .. } => e,
            other => DbError::RestoreFailed(other.to_string()),
        })?;

        if snapshot.version != BACKUP_VERSION {
            return Err(DbError::RestoreFailed(format!(
                "unsupported backup version {}",
                snapshot.version
            )));
        }

        warn!(file = %file_name, "Restoring backup; current tables will be deleted");

        for table in self.store.table_names() {
            self.store.del_table(&table);
        }

        let mut rows = 0usize;
        let mut table_count = 0usize;
        for (table, table_rows) in snapshot.data {
            if !table_rows.is_empty() {
                table_count += 1;
            }
            for (row_id, row) in table_rows {
                self.store.set_row(&table, &row_id, row);
                rows += 1;
            }
        }

        self.persister
            .save()
            .await
            .map_err(|e| DbError::RestoreFailed(format!("restored but not persisted: {}", e)))?;

        info!(file = %file_name, tables = table_count, rows, "Backup restored");

        Ok(RestoreSummary {
            file_name: file_name.to_string(),
            tables: table_count,
            rows,
        })
    }

    /// Backup files in the directory, newest first.
    pub async fn list_backups(&self) -> DbResult<Vec<BackupFile>> {
        let mut entries = match fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbError::Internal(e.to_string())),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
        {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(created_at_millis) = parse_backup_file_name(&file_name) else {
                continue;
            };
            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);

            files.push(BackupFile {
                file_name,
                created_at_millis,
                size_bytes,
            });
        }

        files.sort_by(|a, b| {
            b.created_at_millis
                .cmp(&a.created_at_millis)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(files)
    }

    /// Metadata and per-table row counts of one backup file.
    pub async fn get_backup_info(&self, file_name: &str) -> DbResult<BackupInfo> {
        let snapshot = self.read_snapshot(file_name).await?;
        let size_bytes = fs::metadata(self.backup_dir.join(file_name))
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(BackupInfo {
            file_name: file_name.to_string(),
            date: snapshot.date.clone(),
            timestamp: snapshot.timestamp,
            version: snapshot.version.clone(),
            size_bytes,
            table_counts: snapshot.table_counts(),
        })
    }

    pub async fn delete_backup(&self, file_name: &str) -> DbResult<()> {
        parse_backup_file_name(file_name)?;

        match fs::remove_file(self.backup_dir.join(file_name)).await {
            Ok(()) => {
                info!(file = %file_name, "Backup deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DbError::not_found("Backup", file_name)),
            Err(e) => Err(DbError::Internal(e.to_string())),
        }
    }

    /// Deletes all but the newest `keep` backups. Returns how many were removed.
    pub async fn prune_backups(&self, keep: usize) -> DbResult<usize> {
        let files = self.list_backups().await?;
        let mut removed = 0;
        for file in files.iter().skip(keep) {
            self.delete_backup(&file.file_name).await?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, keep, "Old backups pruned");
        }
        Ok(removed)
    }

    async fn read_snapshot(&self, file_name: &str) -> DbResult<BackupSnapshot> {
        parse_backup_file_name(file_name)?;

        let bytes = match fs::read(self.backup_dir.join(file_name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DbError::not_found("Backup", file_name))
            }
            Err(e) => return Err(DbError::Internal(e.to_string())),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| DbError::Serialization(format!("{}: {}", file_name, e)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
