use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::Mutex;

/// Read access to the note corpus. Keys are stable, path-like identifiers.
pub trait CorpusReader {
    fn list_notes(&self) -> io::Result<Vec<String>>;
    fn read_note(&self, key: &str) -> io::Result<String>;
}

/// Write access to the note corpus. There is no multi-note transaction.
pub trait CorpusWriter {
    fn write_note(&self, key: &str, content: &str) -> io::Result<()>;
}

/// In-memory corpus with failure injection, used to exercise partial-write
/// handling without touching the disk.
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    notes: Mutex<BTreeMap<String, String>>,
    failing_reads: Mutex<HashSet<String>>,
    /// Remaining successful writes per key before writes start failing.
    write_budget: Mutex<HashMap<String, usize>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes<I, K, V>(notes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let corpus = Self::new();
        {
            let mut map = lock(&corpus.notes);
            for (key, content) in notes {
                map.insert(key.into(), content.into());
            }
        }
        corpus
    }

    pub fn insert(&self, key: &str, content: &str) {
        lock(&self.notes).insert(key.to_string(), content.to_string());
    }

    pub fn content(&self, key: &str) -> Option<String> {
        lock(&self.notes).get(key).cloned()
    }

    /// Makes every read of `key` fail.
    pub fn fail_reads(&self, key: &str) {
        lock(&self.failing_reads).insert(key.to_string());
    }

    /// Lets the next `successes` writes to `key` through, then fails the rest.
    pub fn fail_writes_after(&self, key: &str, successes: usize) {
        lock(&self.write_budget).insert(key.to_string(), successes);
    }
}

impl CorpusReader for MemoryCorpus {
    fn list_notes(&self) -> io::Result<Vec<String>> {
        Ok(lock(&self.notes).keys().cloned().collect())
    }

    fn read_note(&self, key: &str) -> io::Result<String> {
        if lock(&self.failing_reads).contains(key) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read of {} refused", key),
            ));
        }
        lock(&self.notes)
            .get(key)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Note does not exist"))
    }
}

impl CorpusWriter for MemoryCorpus {
    fn write_note(&self, key: &str, content: &str) -> io::Result<()> {
        if let Some(remaining) = lock(&self.write_budget).get_mut(key) {
            if *remaining == 0 {
                return Err(io::Error::other(format!("write of {} refused", key)));
            }
            *remaining -= 1;
        }
        lock(&self.notes).insert(key.to_string(), content.to_string());
        Ok(())
    }
}

// Poisoned locks are recovered; the maps hold plain data.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
