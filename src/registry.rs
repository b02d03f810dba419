//! User Registry
//!
//! Durable `user_id -> handle` mapping backed by a pretty-printed JSON file.
//! The whole file is rewritten on every new registration.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Stored when the sender has no Telegram username
pub const UNKNOWN_HANDLE: &str = "неизвестно";

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub handle: String,
}

/// Registry of users who sent `/start`
pub struct UserRegistry {
    path: PathBuf,
    users: Mutex<IndexMap<String, String>>,
}

impl UserRegistry {
    /// Load the registry. A missing file means nobody has registered yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();

        let users: IndexMap<String, String> = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data)?
        } else {
            debug!("No registry at {}, starting empty", path.display());
            IndexMap::new()
        };

        info!("User registry loaded: {} ({} users)", path.display(), users.len());

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a user. Returns `false` if the ID was already known.
    ///
    /// On a failed write the insert is undone so memory and disk agree.
    pub fn register(&self, user_id: i64, handle: Option<&str>) -> Result<bool, RegistryError> {
        let key = user_id.to_string();
        let mut users = self.users.lock();

        if users.contains_key(&key) {
            return Ok(false);
        }

        let handle = handle.unwrap_or(UNKNOWN_HANDLE).to_string();
        users.insert(key.clone(), handle);

        if let Err(e) = self.persist(&users) {
            users.shift_remove(&key);
            return Err(e);
        }

        info!("Registered user {} ({} total)", key, users.len());
        Ok(true)
    }

    /// All records in registration order (file order for loaded entries)
    pub fn list(&self) -> Vec<UserRecord> {
        self.users
            .lock()
            .iter()
            .map(|(user_id, handle)| UserRecord {
                user_id: user_id.clone(),
                handle: handle.clone(),
            })
            .collect()
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.users.lock().contains_key(&user_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    /// Write-then-rename so a crash mid-write never truncates the registry
    fn persist(&self, users: &IndexMap<String, String>) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(users)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Registry written: {}", self.path.display());
        Ok(())
    }
}
