//! Durable key/value storage for client-side state.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// Synchronous string key/value store, the shape of a browser's local storage.
pub trait LocalStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Keeps each key in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}.json")) }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(tmp, path)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> { Ok(self.entries().get(key).cloned()) }
    fn set(&self, key: &str, value: &str) -> io::Result<()> { self.entries().insert(key.to_string(), value.to_string()); Ok(()) }
    fn remove(&self, key: &str) -> io::Result<()> { self.entries().remove(key); Ok(()) }
}

impl<T: LocalStorage + ?Sized> LocalStorage for &T {
    fn get(&self, key: &str) -> io::Result<Option<String>> { (**self).get(key) }
    fn set(&self, key: &str, value: &str) -> io::Result<()> { (**self).set(key, value) }
    fn remove(&self, key: &str) -> io::Result<()> { (**self).remove(key) }
}
