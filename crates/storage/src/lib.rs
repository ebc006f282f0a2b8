//! Key-value persistence for the handful of values that outlive a session:
//! the highscore, the saved profile fields and the active-session marker.

use {
    bevy::prelude::*,
    std::{collections::BTreeMap, fs, io, path::PathBuf},
    thiserror::Error,
};

pub const KEY_HIGHSCORE: &str = "highscore";
pub const KEY_ACTIVE_SESSION: &str = "active_session";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Minimal string-to-string store, mirroring the cloud-key backends this
/// slots in front of. Values are opaque to the store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// World handle to whichever backend the binary wired up.
#[derive(Resource)]
pub struct Persistence(pub Box<dyn KeyValueStore + Send + Sync>);

impl Persistence {
    pub fn json_file(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Ok(Self(Box::new(JsonFileStore::open(path)?)))
    }

    pub fn in_memory() -> Self {
        Self(Box::new(MemoryStore::default()))
    }
}

/// Write-through store over a single JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    cache: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let cache = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, cache })
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.cache)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.cache.insert(key.to_owned(), value.to_owned());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.cache.remove(key);
        self.flush()
    }
}

/// Backend for tests and for running without a writable disk.
#[derive(Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}
