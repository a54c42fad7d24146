//! Durable storage for the case collection.
//!
//! The whole collection is stored as one serialized snapshot. Two media:
//!
//! - **Primary** (`SqliteMedium`): SQLite database, one row in the `cases`
//!   table under key `data`. Capacity is bounded only by disk, or by
//!   `max_db_bytes` when configured.
//! - **Legacy** (`LegacyFileMedium`): a flat key/value JSON file with a
//!   small byte quota, holding the snapshot under `servicedesk-cases`.
//!
//! ## Layout
//!
//! ```text
//! <data_dir>/
//!   servicedesk.db        primary: cases(key, value), key = "data"
//!   local-storage.json    legacy:  { "servicedesk-cases": "<snapshot>" }
//! ```
//!
//! The legacy medium is only read for the one-time migration, or when the
//! primary medium cannot be opened at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::config::ServiceDeskConfig;
use crate::errors::{StoreError, StoreResult};
use crate::schema::is_case_array;

/// Row key holding the snapshot in the primary medium.
pub const DB_DATA_KEY: &str = "data";

/// Key holding the snapshot in the legacy medium.
pub const LEGACY_STORAGE_KEY: &str = "servicedesk-cases";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cases (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Persistence seam consumed by the repository.
pub trait CaseStore: Send + Sync {
    /// Last stored snapshot, or `None` when nothing has been stored.
    fn load(&self) -> StoreResult<Option<String>>;

    /// Replace the stored snapshot.
    fn save(&self, payload: &str) -> StoreResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Primary medium
// ─────────────────────────────────────────────────────────────────────────────

pub struct SqliteMedium {
    conn: Mutex<Connection>,
}

impl SqliteMedium {
    /// Open (creating if needed) the database at `path`.
    ///
    /// `max_bytes` caps the file size; writes past it fail with `SQLITE_FULL`.
    pub fn open(path: &Path, max_bytes: Option<u64>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let medium = Self::init(conn, max_bytes)?;
        tracing::debug!(path = %path.display(), "primary store opened");
        Ok(medium)
    }

    /// In-memory database (for testing).
    pub fn open_in_memory(max_bytes: Option<u64>) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, max_bytes)
    }

    fn init(conn: Connection, max_bytes: Option<u64>) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;

        if let Some(max_bytes) = max_bytes {
            let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
            let pages = (max_bytes as i64 / page_size.max(1)).max(1);
            let applied: i64 =
                conn.pragma_update_and_check(None, "max_page_count", pages, |row| row.get(0))?;
            tracing::debug!(max_bytes, pages = applied, "primary store size cap applied");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::unavailable("primary store connection lock poisoned"))?;
        f(&conn)
    }

    pub fn read(&self) -> StoreResult<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM cases WHERE key = ?1",
                    params![DB_DATA_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn write(&self, payload: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO cases (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
                params![DB_DATA_KEY, payload],
            )?;
            Ok(())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy medium
// ─────────────────────────────────────────────────────────────────────────────

/// Quota-limited string key/value file.
pub struct LegacyFileMedium {
    path: PathBuf,
    key: String,
    quota_bytes: u64,
    /// Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl LegacyFileMedium {
    pub fn new(path: PathBuf, quota_bytes: u64) -> Self {
        Self {
            path,
            key: LEGACY_STORAGE_KEY.to_string(),
            quota_bytes,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> StoreResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    /// Atomically write all entries via a `.tmp` sibling.
    fn write_entries(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn guard(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| StoreError::unavailable("legacy store lock poisoned"))
    }

    pub fn read(&self) -> StoreResult<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_entries()?.remove(&self.key))
    }

    pub fn write(&self, payload: &str) -> StoreResult<()> {
        let _guard = self.guard()?;
        let mut entries = self.read_entries().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "legacy store unreadable, overwriting");
            BTreeMap::new()
        });
        entries.insert(self.key.clone(), payload.to_string());

        let used: u64 = entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum();
        if used > self.quota_bytes {
            return Err(StoreError::quota_exceeded(format!(
                "legacy store needs {used} bytes, quota is {}",
                self.quota_bytes
            )));
        }

        self.write_entries(&entries)
    }

    /// Move an unparseable file to a `.corrupt` sibling so it is not read
    /// again. Returns the new location.
    pub fn set_aside(&self) -> StoreResult<PathBuf> {
        let _guard = self.guard()?;
        let target = self.path.with_extension("corrupt");
        std::fs::rename(&self.path, &target)?;
        Ok(target)
    }

    pub fn clear(&self) -> StoreResult<()> {
        let _guard = self.guard()?;
        let mut entries = self.read_entries()?;
        if entries.remove(&self.key).is_none() {
            return Ok(());
        }
        if entries.is_empty() {
            std::fs::remove_file(&self.path)?;
            Ok(())
        } else {
            self.write_entries(&entries)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Durable store
// ─────────────────────────────────────────────────────────────────────────────

/// Primary medium with legacy migration and fallback.
pub struct DurableStore {
    primary: Option<SqliteMedium>,
    legacy: LegacyFileMedium,
}

impl DurableStore {
    /// Open both media under the configured data directory.
    ///
    /// A primary medium that cannot be opened is not an error: the store
    /// falls back to the legacy medium for every operation.
    pub fn open(config: &ServiceDeskConfig) -> Self {
        let legacy = LegacyFileMedium::new(config.legacy_path(), config.storage.legacy_quota_bytes);
        let primary = match SqliteMedium::open(&config.db_path(), config.storage.max_db_bytes) {
            Ok(primary) => Some(primary),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    legacy = %legacy.path().display(),
                    "primary store unavailable, falling back to legacy store"
                );
                None
            }
        };
        Self { primary, legacy }
    }

    pub fn new(primary: Option<SqliteMedium>, legacy: LegacyFileMedium) -> Self {
        Self { primary, legacy }
    }

    pub fn primary_available(&self) -> bool {
        self.primary.is_some()
    }

    /// Read the legacy medium. A file that is not a key/value map is set
    /// aside and reads as empty.
    fn read_legacy(&self) -> StoreResult<Option<String>> {
        match self.legacy.read() {
            Err(StoreError::Serde(e)) => {
                match self.legacy.set_aside() {
                    Ok(moved) => tracing::warn!(
                        error = %e,
                        moved_to = %moved.display(),
                        "legacy store unparseable, set aside"
                    ),
                    Err(move_err) => tracing::warn!(
                        error = %e,
                        move_error = %move_err,
                        "legacy store unparseable and could not be set aside"
                    ),
                }
                Ok(None)
            }
            other => other,
        }
    }

    /// Adopt the legacy snapshot into the primary medium.
    ///
    /// Corrupt legacy data is discarded. If the primary write fails the
    /// legacy copy is kept so the migration is retried on the next load.
    fn migrate_legacy(&self, primary: &SqliteMedium) -> Option<String> {
        let payload = match self.read_legacy() {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "legacy store unreadable, skipping migration");
                return None;
            }
        };

        if !is_case_array(&payload) {
            tracing::warn!(
                bytes = payload.len(),
                "discarding corrupt legacy snapshot"
            );
            if let Err(e) = self.legacy.clear() {
                tracing::warn!(error = %e, "failed to clear corrupt legacy snapshot");
            }
            return None;
        }

        match primary.write(&payload) {
            Ok(()) => {
                if let Err(e) = self.legacy.clear() {
                    tracing::warn!(error = %e, "migrated snapshot but failed to clear legacy copy");
                }
                tracing::info!(bytes = payload.len(), "migrated cases from legacy store");
            }
            Err(e) => {
                tracing::warn!(error = %e, "migration write failed, keeping legacy copy");
            }
        }

        Some(payload)
    }
}

impl CaseStore for DurableStore {
    fn load(&self) -> StoreResult<Option<String>> {
        let Some(primary) = &self.primary else {
            return self.read_legacy();
        };

        if let Some(payload) = primary.read()? {
            return Ok(Some(payload));
        }
        Ok(self.migrate_legacy(primary))
    }

    fn save(&self, payload: &str) -> StoreResult<()> {
        match &self.primary {
            Some(primary) => primary.write(payload),
            None => self.legacy.write(payload),
        }
    }
}
