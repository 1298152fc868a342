use super::KvBackend;
use crate::error::AppError;
use crate::safe_lock;
use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

fn load(path: &Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Legacy store {} is corrupt, starting empty: {e}", path.display());
            BTreeMap::new()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => {
            warn!("Failed to read legacy store {}: {e}", path.display());
            BTreeMap::new()
        }
    }
}

/// The legacy flat store: one JSON object mapping keys to string values,
/// rewritten in full on every change.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store. A missing file is empty; an unreadable one is logged
    /// and treated as empty.
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            values: Mutex::new(load(path)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        safe_lock(&self.values, "JsonFileStore")
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvBackend for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock().get(key).cloned())
    }

    // Writes start from the file on disk so another process's keys survive.
    fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut values = self.lock();
        *values = load(&self.path);
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut values = self.lock();
        *values = load(&self.path);
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");

        let store = JsonFileStore::open(&path);
        store.write("a", "1").unwrap();
        store.write("b", "2").unwrap();
        store.delete("a").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.read("a").unwrap(), None);
        assert_eq!(reopened.read("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_two_handles_keep_each_others_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        let first = JsonFileStore::open(&path);
        let second = JsonFileStore::open(&path);

        first.write("a", "1").unwrap();
        second.write("b", "2").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.read("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.read("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert_eq!(store.read("a").unwrap(), None);
        store.write("a", "1").unwrap();
        assert_eq!(JsonFileStore::open(&path).read("a").unwrap().as_deref(), Some("1"));
    }
}
