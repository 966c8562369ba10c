//! File-backed key-value store.
//!
//! All entries live in one JSON object on disk, the device analogue of a
//! shared preferences file. Mutations run under an in-process mutex plus an
//! exclusive file lock, re-read the file, apply the change and publish it with
//! a temp-file + fsync + rename sequence so readers never observe a torn file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::error::{StoreError, StoreResult};

use super::lock::StoreLock;
use super::KeyValueStore;

type Entries = BTreeMap<String, String>;

/// Durable store persisted as a JSON map at a fixed path.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: StoreLock,
    writer: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`. The file is created on the first write.
    ///
    /// A sibling `<name>.lock` file is created immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let lock = StoreLock::open(&lock_path(&path))?;
        Ok(Self {
            path,
            lock,
            writer: Mutex::new(()),
        })
    }

    /// Path of the backing JSON file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<Entries> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(err) => {
                return Err(StoreError::Read(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_str(&contents).map_err(|err| {
            StoreError::Corrupted(format!("{}: {err}", self.path.display()))
        })
    }

    fn persist(&self, entries: &Entries) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| write_err(parent, &err))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|err| StoreError::Write(err.to_string()))?;

        let temp_path = self.path.with_file_name(format!(
            "{}.tmp.{}",
            file_name(&self.path),
            std::process::id()
        ));

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|err| write_err(&temp_path, &err))?;
            file.write_all(json.as_bytes())
                .map_err(|err| write_err(&temp_path, &err))?;
            file.sync_all().map_err(|err| write_err(&temp_path, &err))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|err| {
            let _ = fs::remove_file(&temp_path);
            write_err(&self.path, &err)
        })
    }

    /// Runs `f` against the current entries while holding both locks and
    /// persists the entries if `f` reports a change.
    fn mutate<R>(&self, f: impl FnOnce(&mut Entries) -> (R, bool)) -> StoreResult<R> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self.lock.lock()?;
        let mut entries = self.load()?;
        let (result, changed) = f(&mut entries);
        if changed {
            self.persist(&entries)?;
            debug!("persisted {} store entries", entries.len());
        }
        Ok(result)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || "store".to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}.lock", file_name(path)))
}

fn write_err(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::Write(format!("{}: {err}", path.display()))
}

impl KeyValueStore for FileStore {
    fn read(&self, key: String) -> StoreResult<Option<String>> {
        Ok(self.load()?.remove(&key))
    }

    fn write(&self, key: String, value: String) -> StoreResult<()> {
        self.mutate(|entries| {
            entries.insert(key, value);
            ((), true)
        })
    }

    fn contains(&self, key: String) -> StoreResult<bool> {
        Ok(self.load()?.contains_key(&key))
    }

    fn insert_if_absent(&self, key: String, value: String) -> StoreResult<String> {
        self.mutate(|entries| match entries.get(&key) {
            Some(existing) => (existing.clone(), false),
            None => {
                entries.insert(key, value.clone());
                (value, true)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path().join("identities.json")).expect("open");
        assert_eq!(store.read("user_alice".to_string()).expect("read"), None);
        assert!(!store.contains("user_alice".to_string()).expect("contains"));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identities.json");
        {
            let store = FileStore::open(&path).expect("open");
            store
                .write("user_alice".to_string(), "blob".to_string())
                .expect("write");
        }

        let reopened = FileStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.read("user_alice".to_string()).expect("read"),
            Some("blob".to_string())
        );
        assert!(reopened.contains("user_alice".to_string()).expect("contains"));
    }

    #[test]
    fn test_insert_if_absent_persists_first_value_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identities.json");
        let store = FileStore::open(&path).expect("open");

        let first = store
            .insert_if_absent("slot".to_string(), "first".to_string())
            .expect("insert");
        let second = FileStore::open(&path)
            .expect("open second handle")
            .insert_if_absent("slot".to_string(), "second".to_string())
            .expect("insert");

        assert_eq!(first, "first");
        assert_eq!(second, "first");
    }

    #[test]
    fn test_concurrent_handles_agree_on_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identities.json");
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let store = FileStore::open(&path).expect("open");
                    barrier.wait();
                    store
                        .insert_if_absent("slot".to_string(), format!("value-{i}"))
                        .expect("insert")
                })
            })
            .collect();

        let results: Vec<String> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread join"))
            .collect();
        assert!(results.iter().all(|value| value == &results[0]));
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identities.json");
        fs::write(&path, "{not json").expect("seed corrupted file");

        let store = FileStore::open(&path).expect("open");
        match store.read("user_alice".to_string()) {
            Err(StoreError::Corrupted(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }
}
