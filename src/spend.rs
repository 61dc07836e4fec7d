//! Double-spend database
//!
//! A flat text file of `key value` lines. Keys are tokens, which may contain
//! spaces, so each line splits at its last space. Every mutation takes an
//! exclusive lock on a sibling `.lock` file, re-reads the database, and
//! rewrites the whole file through a temporary file and a rename, so
//! concurrent handles never drop each other's entries.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SpendError {
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Malformed database line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("Keys and values must be single-line; value must not contain spaces")]
    InvalidEntry,
}

/// Open key/value database backed by a flat file
#[derive(Debug)]
pub struct SpendDb {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl SpendDb {
    /// Open `path`, creating it (and its directory) if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SpendError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut db = Self {
            path,
            entries: Vec::new(),
        };
        let _lock = db.lock()?;
        OpenOptions::new().create(true).append(true).open(&db.path)?;
        db.reload()?;

        debug!(path = %db.path.display(), entries = db.entries.len(), "opened database");
        Ok(db)
    }

    /// Hold the writer lock until the guard drops
    fn lock(&self) -> Result<LockGuard, SpendError> {
        let mut lock_path = OsString::from(self.path.as_os_str());
        lock_path.push(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(PathBuf::from(lock_path))?;
        file.lock_exclusive()?;
        Ok(LockGuard(file))
    }

    /// Replace the in-memory entries with what is on disk
    fn reload(&mut self) -> Result<(), SpendError> {
        let content = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.rsplit_once(' ').ok_or_else(|| SpendError::Malformed {
                line: i + 1,
                content: line.to_string(),
            })?;
            entries.push((key.to_string(), value.to_string()));
        }
        self.entries = entries;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert or replace `key`.
    pub fn put(&mut self, key: &str, value: &str) -> Result<(), SpendError> {
        check_entry(key, value)?;
        let _lock = self.lock()?;
        self.reload()?;
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
        self.persist()
    }

    /// Remove every entry matching `predicate`; returns how many went.
    pub fn delete_where(
        &mut self,
        mut predicate: impl FnMut(&str, &str) -> bool,
    ) -> Result<usize, SpendError> {
        let _lock = self.lock()?;
        self.reload()?;
        let before = self.entries.len();
        self.entries.retain(|(k, v)| !predicate(k.as_str(), v.as_str()));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Replace the value of every entry matching `predicate`.
    pub fn update_where(
        &mut self,
        mut predicate: impl FnMut(&str, &str) -> bool,
        mut transform: impl FnMut(&str, &str) -> String,
    ) -> Result<usize, SpendError> {
        let _lock = self.lock()?;
        self.reload()?;
        let mut updated = Vec::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if predicate(k.as_str(), v.as_str()) {
                let value = transform(k.as_str(), v.as_str());
                check_entry(k, &value)?;
                updated.push((i, value));
            }
        }
        let count = updated.len();
        for (i, value) in updated {
            self.entries[i].1 = value;
        }
        if count > 0 {
            self.persist()?;
        }
        Ok(count)
    }

    fn persist(&self) -> Result<(), SpendError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            for (k, v) in &self.entries {
                writeln!(file, "{} {}", k, v)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Whether `token` was already recorded
    pub fn is_spent(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    /// Record `token` as spent until `expires` (seconds since the epoch),
    /// or forever when `None`.
    pub fn mark_spent(&mut self, token: &str, expires: Option<i64>) -> Result<(), SpendError> {
        self.put(token, &expiry_value(expires))
    }

    /// Record `token` unless some handle already did. Returns `false` when
    /// it was spent before; the test and the insert happen under one lock.
    pub fn spend(&mut self, token: &str, expires: Option<i64>) -> Result<bool, SpendError> {
        let value = expiry_value(expires);
        check_entry(token, &value)?;
        let _lock = self.lock()?;
        self.reload()?;
        if self.get(token).is_some() {
            return Ok(false);
        }
        self.entries.push((token.to_string(), value));
        self.persist()?;
        Ok(true)
    }

    /// Drop spent tokens whose expiry is before `now`. Entries recorded
    /// forever, or with an unreadable expiry, are kept.
    pub fn purge(&mut self, now: i64) -> Result<usize, SpendError> {
        let removed = self.delete_where(|_, expires| {
            expires
                .parse::<i64>()
                .is_ok_and(|t| t != 0 && t < now)
        })?;
        debug!(removed, "purged expired tokens");
        Ok(removed)
    }
}

/// Exclusive lock released on drop
struct LockGuard(File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

fn check_entry(key: &str, value: &str) -> Result<(), SpendError> {
    if key.contains('\n') || value.contains(['\n', ' ']) || value.is_empty() {
        return Err(SpendError::InvalidEntry);
    }
    Ok(())
}

fn expiry_value(expires: Option<i64>) -> String {
    expires.unwrap_or(0).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SpendDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = SpendDb::open(dir.path().join("db").join("spent.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_open_creates_empty_file() {
        let (_dir, db) = open_temp();
        assert!(db.path().exists());
        assert!(db.is_empty());
    }

    #[test]
    fn test_put_get_and_reopen() {
        let (_dir, mut db) = open_temp();
        db.put("0:040404:foo:abc", "100").unwrap();
        db.put("0:040404:bar:a b", "200").unwrap();
        db.put("0:040404:foo:abc", "150").unwrap();

        let reopened = SpendDb::open(db.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("0:040404:foo:abc"), Some("150"));
        assert_eq!(reopened.get("0:040404:bar:a b"), Some("200"));
        assert_eq!(reopened.get("missing"), None);
        let keys: Vec<&str> = reopened.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["0:040404:foo:abc", "0:040404:bar:a b"]);
    }

    #[test]
    fn test_rejects_unstorable_entries() {
        let (_dir, mut db) = open_temp();
        assert!(matches!(db.put("a\nb", "1"), Err(SpendError::InvalidEntry)));
        assert!(matches!(db.put("a", "1 2"), Err(SpendError::InvalidEntry)));
        assert!(matches!(db.put("a", ""), Err(SpendError::InvalidEntry)));
    }

    #[test]
    fn test_delete_and_update_where() {
        let (_dir, mut db) = open_temp();
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
            db.put(k, v).unwrap();
        }

        let updated = db
            .update_where(|k, _| k != "a", |_, v| format!("{}0", v))
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(db.get("c"), Some("30"));

        let removed = db.delete_where(|_, v| v.ends_with('0')).unwrap();
        assert_eq!(removed, 2);

        let reopened = SpendDb::open(db.path()).unwrap();
        assert_eq!(reopened.iter().collect::<Vec<_>>(), [("a", "1")]);
    }

    #[test]
    fn test_spent_tokens_and_purge() {
        let (_dir, mut db) = open_temp();
        db.mark_spent("old", Some(1_000)).unwrap();
        db.mark_spent("fresh", Some(5_000)).unwrap();
        db.mark_spent("forever", None).unwrap();

        assert!(db.is_spent("old"));
        assert!(!db.is_spent("unseen"));

        assert_eq!(db.purge(2_000).unwrap(), 1);
        assert!(!db.is_spent("old"));
        assert!(db.is_spent("fresh"));
        assert!(db.is_spent("forever"));
    }

    #[test]
    fn test_two_handles_keep_both_tokens() {
        let (_dir, mut a) = open_temp();
        let mut b = SpendDb::open(a.path()).unwrap();

        a.mark_spent("0:040404:a:1", None).unwrap();
        b.mark_spent("0:040404:b:1", None).unwrap();

        let reopened = SpendDb::open(a.path()).unwrap();
        assert!(reopened.is_spent("0:040404:a:1"));
        assert!(reopened.is_spent("0:040404:b:1"));
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_spend_is_once_across_handles() {
        let (_dir, mut a) = open_temp();
        let mut b = SpendDb::open(a.path()).unwrap();

        assert!(a.spend("0:040404:foo:abc", Some(5_000)).unwrap());
        assert!(!b.spend("0:040404:foo:abc", Some(5_000)).unwrap());
        assert!(b.is_spent("0:040404:foo:abc"));
        assert_eq!(b.get("0:040404:foo:abc"), Some("5000"));
    }

    #[test]
    fn test_concurrent_writers() {
        let (_dir, db) = open_temp();
        let path = db.path().to_path_buf();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut db = SpendDb::open(&path).unwrap();
                    for i in 0..20 {
                        db.mark_spent(&format!("0:040404:t{}:{}", t, i), None).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(SpendDb::open(&path).unwrap().len(), 80);
    }

    #[test]
    fn test_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spent.db");
        fs::write(&path, "ok 1\nnospace\n").unwrap();
        assert!(matches!(
            SpendDb::open(&path),
            Err(SpendError::Malformed { line: 2, .. })
        ));
    }
}
