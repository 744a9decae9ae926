use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

mod schema;

pub const BOARD_KEY: &str = "todlex-board";
pub const HISTORY_KEY: &str = "todlex-history";
pub const ANALYTICS_KEY: &str = "todlex-analytics-log";
pub const CARD_GROUPS_KEY: &str = "todlex-card-groups";
pub const SESSION_KEY: &str = "todlex-session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Current,
    /// A known obsolete schema; reset rather than migrated field by field.
    Legacy(&'static str),
    Invalid(String),
}

pub type Validator = fn(&Value) -> Shape;

/// Durable string-keyed store backed by SQLite with an in-memory mirror of
/// every row. Reads are served from the mirror only.
#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
    mirror: Arc<Mutex<HashMap<String, String>>>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn read_raw(&self, key: &str) -> Option<String> {
        self.mirror.lock().get(key).cloned()
    }

    pub fn used_bytes(&self) -> usize {
        self.mirror
            .lock()
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }

    pub fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        let mut mirror = self.mirror.lock();
        let others: usize = mirror
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(existing, stored)| existing.len() + stored.len())
            .sum();
        let needed = others + key.len() + value.len();
        if needed > self.options.quota_bytes {
            bail!(
                "storage quota exceeded writing '{key}' ({needed} of {} bytes)",
                self.options.quota_bytes
            );
        }
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key '{key}'"))?;
            Ok(())
        })?;
        mirror.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut mirror = self.mirror.lock();
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("removing key '{key}'"))?;
            Ok(())
        })?;
        mirror.remove(key);
        Ok(())
    }

    pub fn load<T>(&self, key: &str, default: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_validated(key, default, None)
    }

    /// Reads `key`, falling back to `default` (and overwriting the stored
    /// record with it) when the record is absent, unparseable, rejected by
    /// `validate`, or of a legacy shape.
    pub fn load_validated<T>(&self, key: &str, default: T, validate: Option<Validator>) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        let Some(raw) = self.read_raw(key) else {
            self.save(key, &default);
            return default;
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "stored record is not valid JSON, resetting");
                self.save(key, &default);
                return default;
            }
        };

        match validate.map(|check| check(&value)).unwrap_or(Shape::Current) {
            Shape::Current => {}
            Shape::Legacy(name) => {
                tracing::warn!(key, schema = name, "legacy record shape detected, resetting");
                self.save(key, &default);
                return default;
            }
            Shape::Invalid(reason) => {
                tracing::warn!(key, %reason, "stored record has unexpected shape, resetting");
                self.save(key, &default);
                return default;
            }
        }

        match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(key, error = %err, "stored record failed to deserialize, resetting");
                self.save(key, &default);
                default
            }
        }
    }

    pub fn try_save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("serializing record '{key}'"))?;
        self.write_raw(key, &raw)
    }

    /// Best-effort write: failures are logged and never reach the caller.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.try_save(key, value) {
            let message = format!("{err:#}");
            tracing::error!(key, error = %message, "failed to persist record");
        }
    }
}

pub struct Record<T> {
    storage: StorageHandle,
    key: &'static str,
    validator: Option<Validator>,
    value: Option<T>,
    subscribers: Vec<Sender<T>>,
}

impl<T> Record<T>
where
    T: Clone + Default + Serialize + DeserializeOwned,
{
    pub fn new(storage: StorageHandle, key: &'static str) -> Self {
        Self {
            storage,
            key,
            validator: None,
            value: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn init(&mut self) -> &T {
        self.ensure()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn snapshot(&mut self) -> T {
        self.ensure().clone()
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(self.ensure());
        self.commit();
        out
    }

    /// Persists only when `f` returns `Some`.
    pub fn try_update<R>(&mut self, f: impl FnOnce(&mut T) -> Option<R>) -> Option<R> {
        let out = f(self.ensure())?;
        self.commit();
        Some(out)
    }

    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn ensure(&mut self) -> &mut T {
        let storage = &self.storage;
        let key = self.key;
        let validator = self.validator;
        self.value
            .get_or_insert_with(|| storage.load_validated(key, T::default(), validator))
    }

    fn commit(&mut self) {
        let Some(value) = self.value.as_ref() else {
            return;
        };
        self.storage.save(self.key, value);
        let snapshot = value.clone();
        self.subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    let mirror = load_mirror(&conn)?;
    tracing::debug!(keys = mirror.len(), path = %db_path.display(), "storage opened");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
        mirror: Arc::new(Mutex::new(mirror)),
    })
}

fn load_mirror(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM kv")
        .context("preparing mirror load")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    rows.collect::<Result<HashMap<_, _>, _>>()
        .context("loading stored records")
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    pub fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        init_storage_with(StorageOptions::default())
    }

    pub fn init_storage_with(
        mut options: StorageOptions,
    ) -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        options.database_path = paths.database_path.clone();
        let storage = init(&paths, &options)?;
        Ok((temp, storage))
    }

    pub fn reopen(temp: &TempDir) -> anyhow::Result<StorageHandle> {
        let paths = ConfigPaths::rooted_at(temp.path());
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        init(&paths, &options)
    }
}
