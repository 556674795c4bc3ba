use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::corpus::{CorpusReader, CorpusWriter};

/// Directory-backed note corpus.
///
/// Every file under the root whose extension is in `extensions` is a note, keyed
/// by its `/`-separated path relative to the root.
#[derive(Debug)]
pub struct NoteFilesystem {
    root_path: PathBuf,
    extensions: Vec<String>,
}

impl NoteFilesystem {
    pub fn new<P: AsRef<Path>>(root_path: P, extensions: Vec<String>) -> io::Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root_path)?;
        Ok(Self {
            root_path,
            extensions,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn read_note(&self, key: &str) -> io::Result<String> {
        let fs_path = self.note_to_fs_path(key)?;
        fs::read_to_string(fs_path)
    }

    pub fn write_note(&self, key: &str, content: &str) -> io::Result<()> {
        let fs_path = self.note_to_fs_path(key)?;
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(fs_path, content)
    }

    pub fn note_exists(&self, key: &str) -> bool {
        self.note_to_fs_path(key).is_ok_and(|p| p.is_file())
    }

    /// Returns every note key under the root, sorted.
    ///
    /// Only a failure to list the root itself is an error. Subdirectories and
    /// entries that cannot be read are logged and skipped.
    pub fn scan_all(&self) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.root_path)?;
        self.scan_entries(entries, "", &mut keys);
        keys.sort();
        Ok(keys)
    }

    /// Maps an absolute filesystem path back to a note key. Returns `None` for
    /// paths outside the root, hidden entries and files that are not notes.
    pub fn key_for_path(&self, fs_path: &Path) -> Option<String> {
        let relative = fs_path.strip_prefix(&self.root_path).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            let Component::Normal(part) = component else {
                return None;
            };
            let part = part.to_str()?;
            if is_skipped_name(part) {
                return None;
            }
            parts.push(part);
        }
        let key = parts.join("/");
        self.is_note_file(&key).then_some(key)
    }

    /// Whether `fs_path` lies strictly under the root and outside hidden and
    /// backup entries. Unlike [`key_for_path`](Self::key_for_path) this holds
    /// for directories and for paths that no longer exist.
    pub fn is_tracked_path(&self, fs_path: &Path) -> bool {
        let Ok(relative) = fs_path.strip_prefix(&self.root_path) else {
            return false;
        };
        let mut components = relative.components().peekable();
        components.peek().is_some()
            && components.all(|c| match c {
                Component::Normal(part) => part.to_str().is_some_and(|p| !is_skipped_name(p)),
                _ => false,
            })
    }

    fn is_note_file(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn note_to_fs_path(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid note key: {:?}", key),
            ));
        }
        Ok(self.root_path.join(relative))
    }

    fn scan_entries(&self, entries: fs::ReadDir, prefix: &str, keys: &mut Vec<String>) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {:?}: {}", prefix, e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip hidden entries and backups
            if is_skipped_name(&name) {
                continue;
            }

            let key = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    log::warn!("Skipping {}: {}", key, e);
                    continue;
                }
            };
            if file_type.is_dir() {
                match fs::read_dir(entry.path()) {
                    Ok(children) => self.scan_entries(children, &key, keys),
                    Err(e) => log::warn!("Skipping unreadable directory {}: {}", key, e),
                }
            } else if file_type.is_file() && self.is_note_file(&key) {
                keys.push(key);
            }
        }
    }
}

fn is_skipped_name(name: &str) -> bool {
    name.starts_with('.') || name == "_backups"
}

impl CorpusReader for NoteFilesystem {
    fn list_notes(&self) -> io::Result<Vec<String>> {
        self.scan_all()
    }

    fn read_note(&self, key: &str) -> io::Result<String> {
        NoteFilesystem::read_note(self, key)
    }
}

impl CorpusWriter for NoteFilesystem {
    fn write_note(&self, key: &str, content: &str) -> io::Result<()> {
        NoteFilesystem::write_note(self, key, content)
    }
}
