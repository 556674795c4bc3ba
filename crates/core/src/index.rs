use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::corpus::CorpusReader;
use crate::tags::{Tag, extract_tags};

/// Ordering for [`TagIndex::all_tags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Alphabetical by tag name
    Lexicographic,
    /// Most-used first, ties broken alphabetically
    #[default]
    CountDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEntry {
    notes: HashSet<String>,
}

impl TagEntry {
    /// Number of distinct notes carrying the tag.
    pub fn count(&self) -> usize {
        self.notes.len()
    }
}

/// A note that could not be read while building the index.
#[derive(Debug)]
pub struct SkippedNote {
    pub key: String,
    pub error: io::Error,
}

/// Result of [`TagIndex::build`].
#[derive(Debug)]
pub struct IndexBuild {
    pub index: TagIndex,
    pub skipped: Vec<SkippedNote>,
}

/// In-memory mapping between tags and notes.
///
/// The forward map (tag -> notes) and the reverse map (note -> tags) always
/// agree. Notes without tags are still present in the reverse map so that an
/// empty AND filter can return the whole corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    tags: HashMap<Tag, TagEntry>,
    notes: HashMap<String, BTreeSet<Tag>>,
}

impl TagIndex {
    /// An index that knows no notes and no tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every note in the corpus and indexes its tags.
    ///
    /// Unreadable notes are reported in [`IndexBuild::skipped`] and left out.
    /// Only a failure to list the corpus aborts the build.
    pub fn build<R: CorpusReader + ?Sized>(corpus: &R) -> io::Result<IndexBuild> {
        let started = Instant::now();
        let keys = corpus.list_notes()?;

        let mut index = TagIndex::new();
        let mut skipped = Vec::new();

        for key in keys {
            match corpus.read_note(&key) {
                Ok(content) => {
                    let tags = extract_tags(&content);
                    index.update(&key, tags);
                }
                Err(error) => {
                    log::warn!("Skipping unreadable note {}: {}", key, error);
                    skipped.push(SkippedNote { key, error });
                }
            }
        }

        log::info!(
            "Indexed {} notes with {} tags in {:?} ({} skipped)",
            index.note_count(),
            index.tag_count(),
            started.elapsed(),
            skipped.len()
        );

        Ok(IndexBuild { index, skipped })
    }

    /// Replaces the tag set of one note, touching only the tags that changed.
    pub fn update(&mut self, key: &str, new_tags: BTreeSet<Tag>) {
        let previous = self.notes.remove(key).unwrap_or_default();

        for tag in previous.difference(&new_tags) {
            if let Some(entry) = self.tags.get_mut(tag) {
                entry.notes.remove(key);
                if entry.notes.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }

        for tag in new_tags.difference(&previous) {
            self.tags
                .entry(tag.clone())
                .or_default()
                .notes
                .insert(key.to_string());
        }

        self.notes.insert(key.to_string(), new_tags);
    }

    /// Drops a deleted note from the index.
    pub fn remove(&mut self, key: &str) {
        self.update(key, BTreeSet::new());
        self.notes.remove(key);
    }

    /// Every known tag with its note count.
    pub fn all_tags(&self, order: SortOrder) -> Vec<(Tag, usize)> {
        let mut tags: Vec<(Tag, usize)> = self
            .tags
            .iter()
            .map(|(tag, entry)| (tag.clone(), entry.count()))
            .collect();

        match order {
            SortOrder::Lexicographic => tags.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::CountDesc => tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))),
        }

        tags
    }

    /// Notes carrying `tag`. Unknown tags yield an empty set.
    pub fn notes_with_tag(&self, tag: &str) -> BTreeSet<String> {
        self.entry(tag)
            .map(|entry| entry.notes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Notes carrying every tag in `tags`. An empty input matches every note.
    pub fn notes_with_tags<I, S>(&self, tags: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for tag in tags {
            match self.entry(tag.as_ref()) {
                Some(entry) => entries.push(entry),
                None => return BTreeSet::new(),
            }
        }

        if entries.is_empty() {
            return self.notes.keys().cloned().collect();
        }

        // Start from the rarest tag
        entries.sort_by_key(|entry| entry.count());
        let (smallest, rest) = entries.split_at(1);

        smallest[0]
            .notes
            .iter()
            .filter(|key| rest.iter().all(|entry| entry.notes.contains(*key)))
            .cloned()
            .collect()
    }

    /// Tags of one note. Unknown notes yield an empty set.
    pub fn tags_for_note(&self, key: &str) -> BTreeSet<Tag> {
        self.notes.get(key).cloned().unwrap_or_default()
    }

    pub fn entry(&self, tag: &str) -> Option<&TagEntry> {
        match self.tags.get(tag) {
            Some(entry) => Some(entry),
            None => self.tags.get(tag.to_ascii_lowercase().as_str()),
        }
    }

    pub fn contains_note(&self, key: &str) -> bool {
        self.notes.contains_key(key)
    }

    pub fn note_keys(&self) -> BTreeSet<String> {
        self.notes.keys().cloned().collect()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
