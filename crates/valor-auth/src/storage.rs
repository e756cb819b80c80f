use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use thiserror::Error;

/// Key/value storage area mirroring the browser's Web Storage surface.
///
/// Two areas back the auth core: a session-scoped area the host clears when
/// the browsing session ends (vault key, in-flight PKCE artifacts) and a
/// persistent area that survives restarts (session tokens, user profile).
pub trait StorageArea: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Errors raised by storage area implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unable to determine storage directory for valor")]
    MissingProjectDirs,
    #[error("failed to create storage directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Volatile in-memory storage. Stands in for session storage on native hosts
/// and doubles as the storage fixture in tests.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Filesystem-backed storage rooted in the user data directory, one file per
/// key. Values are written with user-only permissions.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Locate (and create if needed) the per-user storage directory.
    pub fn in_user_data_dir() -> Result<Self, StorageError> {
        let dirs =
            ProjectDirs::from("app", "valor", "valor").ok_or(StorageError::MissingProjectDirs)?;
        let data_dir = dirs.data_dir();
        fs::create_dir_all(data_dir).map_err(StorageError::CreateDir)?;
        set_user_only_permissions(data_dir)?;
        Ok(Self::new(data_dir.to_path_buf()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.dat"))
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl StorageArea for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::write_file(&self.entry_path(key), value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), StorageError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.get("missing").unwrap().is_none());
        storage.set("slot", "value").unwrap();
        assert_eq!(storage.get("slot").unwrap().as_deref(), Some("value"));
        storage.remove("slot").unwrap();
        assert!(storage.get("slot").unwrap().is_none());
    }

    #[test]
    fn memory_overwrites_existing_value() {
        let storage = MemoryStorage::new();
        storage.set("slot", "first").unwrap();
        storage.set("slot", "second").unwrap();
        assert_eq!(storage.get("slot").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        storage.set("valor.auth.tokens", "payload").unwrap();
        assert_eq!(
            storage.get("valor.auth.tokens").unwrap().as_deref(),
            Some("payload")
        );
        storage.remove("valor.auth.tokens").unwrap();
        assert!(storage.get("valor.auth.tokens").unwrap().is_none());
    }

    #[test]
    fn file_remove_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        storage.remove("missing").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_values_are_user_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        storage.set("slot", "secret").unwrap();
        let mode = fs::metadata(temp_dir.path().join("slot.dat"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
