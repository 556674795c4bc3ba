use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{CONFIG_FILE_NAME, TagConfig};
use crate::error::{Error, Result};
use crate::filesystem::NoteFilesystem;
use crate::index::{SkippedNote, SortOrder, TagIndex};
use crate::mutation::{MutationReport, TagMutator};
use crate::query::{SubstringSearch, evaluate, parse_query, suggest_tags};
use crate::tags::{Tag, extract_tags};

/// Owns the tag index for one notes directory.
///
/// Queries borrow the index read-only. Only the mutation methods and the
/// incremental sync path write to it.
pub struct TagService {
    fs: NoteFilesystem,
    index: TagIndex,
    config: TagConfig,
    filter: BTreeSet<Tag>,
    /// Flag to indicate when the service is writing notes (suppresses watcher)
    pub(crate) operation_in_progress: Arc<AtomicBool>,
}

/// RAII guard that sets operation_in_progress flag on creation and clears it on drop
struct OperationGuard {
    flag: Arc<AtomicBool>,
}

impl OperationGuard {
    fn new(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl TagService {
    /// Creates a service for the notes directory at `notes_root`.
    ///
    /// Settings are read from `.notetag.json` in the root if present. The index
    /// starts empty; call [`startup_sync`](Self::startup_sync) to populate it.
    pub fn new<P: AsRef<Path>>(notes_root: P) -> Result<Self> {
        let config = TagConfig::load(notes_root.as_ref().join(CONFIG_FILE_NAME))?;
        Self::with_config(notes_root, config)
    }

    pub fn with_config<P: AsRef<Path>>(notes_root: P, config: TagConfig) -> Result<Self> {
        let fs = NoteFilesystem::new(&notes_root, config.extensions.clone())?;

        Ok(Self {
            fs,
            index: TagIndex::new(),
            config,
            filter: BTreeSet::new(),
            operation_in_progress: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Creates a service using the platform default notes directory.
    ///
    /// # Example
    /// ```no_run
    /// use notetag_core::TagService;
    ///
    /// let debug = cfg!(debug_assertions);
    /// let mut service = TagService::with_default_path(debug)?;
    /// service.startup_sync()?;
    /// # Ok::<(), notetag_core::Error>(())
    /// ```
    pub fn with_default_path(debug: bool) -> Result<Self> {
        let notes_root = crate::default_paths::get_default_notes_path(debug).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine default notes path (home directory not found)",
            ))
        })?;

        Self::new(notes_root)
    }

    /// Returns a reference to the operation_in_progress flag for use by the watcher.
    pub fn operation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.operation_in_progress)
    }

    pub fn notes_root(&self) -> &Path {
        self.fs.root_path()
    }

    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    pub(crate) fn filesystem(&self) -> &NoteFilesystem {
        &self.fs
    }

    /// Read-only view of the live index.
    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    /// Builds the index on open. Same as [`rescan`](Self::rescan).
    pub fn startup_sync(&mut self) -> Result<Vec<SkippedNote>> {
        self.rescan()
    }

    /// Rebuilds the index from the filesystem.
    ///
    /// The new index is built separately and replaces the old one in a single
    /// assignment. Returns the notes that could not be read.
    pub fn rescan(&mut self) -> Result<Vec<SkippedNote>> {
        let build = TagIndex::build(&self.fs)?;
        self.index = build.index;
        Ok(build.skipped)
    }

    /// Re-reads one note and updates its index entry. A missing file is treated
    /// as a deletion.
    ///
    /// Returns `true` if the note's tag set changed or the note appeared or
    /// disappeared.
    pub fn sync_note(&mut self, key: &str) -> Result<bool> {
        match self.fs.read_note(key) {
            Ok(content) => {
                let tags = extract_tags(&content);
                let changed =
                    !self.index.contains_note(key) || self.index.tags_for_note(key) != tags;
                if changed {
                    log::debug!("Tags changed in {}", key);
                }
                self.index.update(key, tags);
                Ok(changed)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let known = self.index.contains_note(key);
                self.index.remove(key);
                Ok(known)
            }
            Err(e) => Err(Error::read(key, e)),
        }
    }

    /// Drops a deleted note from the index.
    pub fn remove_note(&mut self, key: &str) {
        self.index.remove(key);
    }

    // Queries

    /// Every known tag, in the configured order.
    pub fn all_tags(&self) -> Vec<(Tag, usize)> {
        self.index.all_tags(self.config.sort_order)
    }

    pub fn all_tags_by(&self, order: SortOrder) -> Vec<(Tag, usize)> {
        self.index.all_tags(order)
    }

    pub fn notes_with_tag(&self, tag: &str) -> BTreeSet<String> {
        self.index.notes_with_tag(tag)
    }

    pub fn notes_with_tags<I, S>(&self, tags: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.index.notes_with_tags(tags)
    }

    pub fn tags_for_note(&self, key: &str) -> BTreeSet<Tag> {
        self.index.tags_for_note(key)
    }

    /// Evaluates a `tag:x free text` query against the live index.
    pub fn search(&self, raw: &str) -> BTreeSet<String> {
        evaluate(&parse_query(raw), &self.index, &self.fs, &SubstringSearch)
    }

    /// Autocomplete candidates for a partially typed tag.
    pub fn suggest_tags(&self, partial: &str) -> Vec<Tag> {
        suggest_tags(partial, &self.index, self.config.suggestion_limit)
    }

    // Filter state

    /// Replaces the active filter. Rejects the whole set if any name is invalid.
    pub fn set_filter<I, S>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = BTreeSet::new();
        for name in tags {
            let name = name.as_ref();
            let tag = Tag::parse(name).ok_or_else(|| Error::Validation(name.to_string()))?;
            filter.insert(tag);
        }
        self.filter = filter;
        Ok(())
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
    }

    pub fn active_filter(&self) -> &BTreeSet<Tag> {
        &self.filter
    }

    /// Notes carrying every tag in the active filter; all notes if none is set.
    pub fn filtered_notes(&self) -> BTreeSet<String> {
        self.index.notes_with_tags(&self.filter)
    }

    // Mutations

    /// Renames a tag across all notes. See [`TagMutator::rename_tag`].
    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<MutationReport> {
        let _guard = OperationGuard::new(Arc::clone(&self.operation_in_progress));

        let report = TagMutator::new(&mut self.index, &self.fs).rename_tag(old, new)?;
        if report.is_complete() {
            self.retarget_filter(&[old], Some(new));
        }
        Ok(report)
    }

    /// Merges several tags into one across all notes.
    pub fn merge_tags<S: AsRef<str>>(&mut self, sources: &[S], target: &str) -> Result<MutationReport> {
        let _guard = OperationGuard::new(Arc::clone(&self.operation_in_progress));

        let report = TagMutator::new(&mut self.index, &self.fs).merge_tags(sources, target)?;
        if report.is_complete() {
            self.retarget_filter(sources, Some(target));
        }
        Ok(report)
    }

    /// Removes a tag from every note.
    pub fn delete_tag(&mut self, tag: &str) -> MutationReport {
        let _guard = OperationGuard::new(Arc::clone(&self.operation_in_progress));

        let report = TagMutator::new(&mut self.index, &self.fs).delete_tag(tag);
        if report.is_complete() {
            self.retarget_filter(&[tag], None);
        }
        report
    }

    pub fn add_tag_to_note(&mut self, key: &str, tag: &str) -> Result<bool> {
        let _guard = OperationGuard::new(Arc::clone(&self.operation_in_progress));
        TagMutator::new(&mut self.index, &self.fs).add_tag_to_note(key, tag)
    }

    pub fn remove_tag_from_note(&mut self, key: &str, tag: &str) -> Result<bool> {
        let _guard = OperationGuard::new(Arc::clone(&self.operation_in_progress));
        TagMutator::new(&mut self.index, &self.fs).remove_tag_from_note(key, tag)
    }

    /// Keeps the active filter pointing at tags that still exist after a
    /// rename, merge or delete.
    fn retarget_filter<S: AsRef<str>>(&mut self, sources: &[S], target: Option<&str>) {
        let before = self.filter.len();
        self.filter.retain(|tag| {
            !sources
                .iter()
                .any(|s| s.as_ref().eq_ignore_ascii_case(tag.as_str()))
        });
        if self.filter.len() != before
            && let Some(tag) = target.and_then(Tag::parse)
        {
            self.filter.insert(tag);
        }
    }
}
