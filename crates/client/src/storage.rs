//! Persistent key/value storage for client state such as the auth token.
//!
//! Values are JSON files in the platform config directory:
//!   - Linux: `~/.config/pawtalk/`
//!   - macOS: `~/Library/Application Support/pawtalk/`
//!   - Windows: `%APPDATA%\pawtalk\`
//!
//! The free functions use that default location; [`FileStorage`] can be
//! pointed at any directory.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

const APP_DIR: &str = "pawtalk";

/// JSON-file storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage in the platform config directory, if one exists.
    pub fn default_location() -> Option<Self> {
        Some(Self::new(dirs::config_dir()?.join(APP_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save a value. Returns `true` if the write succeeded.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.save_raw(key, &json),
            Err(_) => false,
        }
    }

    /// Load a value; `None` if the key is missing or does not deserialize.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.load_raw(key)?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        if let Some(path) = self.file_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.load_raw(key).is_some()
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).ok()?;
        }
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Some(self.root.join(format!("{}.json", safe_key)))
    }

    fn save_raw(&self, key: &str, value: &str) -> bool {
        let Some(path) = self.file_path(key) else {
            return false;
        };
        std::fs::write(path, value).is_ok()
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        let path = self.file_path(key)?;
        std::fs::read_to_string(path).ok()
    }
}

/// Save a value to the default storage location.
pub fn save<T: Serialize>(key: &str, value: &T) -> bool {
    FileStorage::default_location().is_some_and(|s| s.save(key, value))
}

/// Load a value from the default storage location.
pub fn load<T: DeserializeOwned>(key: &str) -> Option<T> {
    FileStorage::default_location()?.load(key)
}

/// Remove a value from the default storage location.
pub fn remove(key: &str) {
    if let Some(storage) = FileStorage::default_location() {
        storage.remove(key);
    }
}

/// Check if a key exists in the default storage location.
pub fn exists(key: &str) -> bool {
    FileStorage::default_location().is_some_and(|s| s.exists(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> FileStorage {
        FileStorage::new(std::env::temp_dir().join(format!("pawtalk-{}", uuid::Uuid::new_v4())))
    }

    #[test]
    fn save_load_remove() {
        let storage = scratch();
        assert!(!storage.exists("userToken"));

        assert!(storage.save("userToken", &"abc123".to_string()));
        assert_eq!(storage.load::<String>("userToken").as_deref(), Some("abc123"));

        storage.remove("userToken");
        assert!(storage.load::<String>("userToken").is_none());
        let _ = std::fs::remove_dir_all(storage.root());
    }

    #[test]
    fn keys_are_sanitized() {
        let storage = scratch();
        assert!(storage.save("a/b:c", &1u32));
        assert!(storage.root().join("a_b_c.json").exists());
        let _ = std::fs::remove_dir_all(storage.root());
    }
}
