use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::models::{DISPLAY_NAME_FALLBACK, Identity};

/// Storage key holding the serialized identity record.
pub const IDENTITY_KEY: &str = "ashaUser";

// --- Key-value store trait ---

/// The client's equivalent of browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

// --- SQLite store ---

pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::Config(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM storage WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.conn.execute(
            "INSERT INTO storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM storage WHERE key = ?1", [key])?;
        Ok(())
    }
}

// --- In-memory store ---

/// Volatile store; `unavailable` makes every call fail like a blocked
/// storage backend would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    pub unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            values: HashMap::new(),
            unavailable: true,
        }
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            Err(ClientError::Config("storage unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.check()?;
        self.values.remove(key);
        Ok(())
    }
}

// --- Identity record ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRecord {
    user_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

impl IdentityRecord {
    fn into_identity(self) -> Option<Identity> {
        if self.user_id.trim().is_empty() {
            return None;
        }
        let name = self.name.trim();
        Some(Identity {
            user_id: self.user_id,
            display_name: if name.is_empty() {
                DISPLAY_NAME_FALLBACK.to_string()
            } else {
                name.to_string()
            },
            email: self.email,
        })
    }
}

/// The process-wide identity: in-memory copy plus its persisted record.
///
/// Every mutation updates both copies in the same call; a failed write to
/// storage is logged and never blocks the in-memory update.
pub struct IdentityStore {
    current: Option<Identity>,
    storage: Box<dyn KeyValueStore>,
}

impl IdentityStore {
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self {
            current: None,
            storage,
        }
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    /// Reads the persisted record; unreadable or malformed records count as absent.
    pub fn load_persisted(&self) -> Option<Identity> {
        let raw = match self.storage.get(IDENTITY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "identity storage unreadable");
                return None;
            }
        };
        match serde_json::from_str::<IdentityRecord>(&raw) {
            Ok(record) => {
                let identity = record.into_identity();
                if identity.is_none() {
                    warn!("persisted identity has no user id, ignoring");
                }
                identity
            }
            Err(e) => {
                warn!(error = %e, "persisted identity is malformed, ignoring");
                None
            }
        }
    }

    /// Adopts an identity that already came from storage (no write back).
    pub fn adopt(&mut self, identity: Identity) {
        self.current = Some(identity);
    }

    pub fn set(&mut self, identity: Identity) {
        let record = IdentityRecord {
            user_id: identity.user_id.clone(),
            name: identity.display_name.clone(),
            email: identity.email.clone(),
        };
        self.current = Some(identity);
        match serde_json::to_string(&record) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(IDENTITY_KEY, &raw) {
                    warn!(error = %e, "could not persist identity");
                } else {
                    debug!(user_id = %record.user_id, "identity persisted");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize identity"),
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
        if let Err(e) = self.storage.remove(IDENTITY_KEY) {
            warn!(error = %e, "could not remove persisted identity");
        }
    }

    pub fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }

    #[cfg(test)]
    pub fn storage_mut(&mut self) -> &mut dyn KeyValueStore {
        self.storage.as_mut()
    }
}
