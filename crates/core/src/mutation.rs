use std::collections::BTreeSet;

use crate::corpus::{CorpusReader, CorpusWriter};
use crate::error::{Error, Result};
use crate::index::TagIndex;
use crate::tags::{Tag, TagEdit, extract_tags, rewrite_tags};

/// Outcome of a multi-note tag mutation.
///
/// Batch operations never fail outright once validation has passed; instead
/// the report says which notes were rewritten and, if anything went wrong,
/// what state the rest of the batch was left in.
#[derive(Debug, Default)]
pub struct MutationReport {
    /// Notes rewritten and re-indexed.
    pub updated: Vec<String>,
    pub partial_failure: Option<PartialFailure>,
}

impl MutationReport {
    pub fn success_count(&self) -> usize {
        self.updated.len()
    }

    pub fn is_complete(&self) -> bool {
        self.partial_failure.is_none()
    }
}

/// Details of a batch that hit a read or write failure.
///
/// The batch stops at the first failure and every note already rewritten is
/// written back with its original content. Notes that could not be restored
/// keep the new content and are indexed accordingly.
#[derive(Debug, Default)]
pub struct PartialFailure {
    /// The failure that stopped the batch (`Error::Read` or `Error::Write`).
    /// The note it names was not modified.
    pub failed: Vec<Error>,
    /// Notes restored to their pre-operation content.
    pub reverted: Vec<String>,
    /// Revert writes that failed. These notes are left in the new state.
    pub not_reverted: Vec<Error>,
    /// Notes never attempted because the batch stopped early.
    pub untouched: Vec<String>,
}

impl PartialFailure {
    pub fn failed_keys(&self) -> Vec<&str> {
        self.failed.iter().filter_map(Error::note_key).collect()
    }

    pub fn not_reverted_keys(&self) -> Vec<&str> {
        self.not_reverted.iter().filter_map(Error::note_key).collect()
    }
}

struct Written {
    key: String,
    original: String,
    new_tags: BTreeSet<Tag>,
}

/// Applies tag renames, merges and deletions to the corpus and keeps the index
/// in step with what actually reached storage.
pub struct TagMutator<'a, C: ?Sized> {
    index: &'a mut TagIndex,
    corpus: &'a C,
}

impl<'a, C> TagMutator<'a, C>
where
    C: CorpusReader + CorpusWriter + ?Sized,
{
    pub fn new(index: &'a mut TagIndex, corpus: &'a C) -> Self {
        Self { index, corpus }
    }

    /// Replaces `old` with `new` in every note carrying `old`. A note that
    /// already has `new` ends up with a single copy of it.
    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<MutationReport> {
        let new = validated(new)?;
        let Some(old) = Tag::parse(old) else {
            return Ok(MutationReport::default());
        };
        if old == new {
            return Ok(MutationReport::default());
        }

        let affected = self.index.notes_with_tag(old.as_str());
        Ok(self.apply_batch(affected, &TagEdit::rename(old, new)))
    }

    /// Replaces every tag in `sources` with `target`. Each affected note is
    /// rewritten once, however many sources it carries.
    pub fn merge_tags<I, S>(&mut self, sources: I, target: &str) -> Result<MutationReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let target = validated(target)?;
        let sources: BTreeSet<Tag> = sources
            .into_iter()
            .filter_map(|s| Tag::parse(s.as_ref()))
            .collect();
        let edit = TagEdit::merge(sources, target);

        let affected: BTreeSet<String> = edit
            .remove
            .iter()
            .flat_map(|tag| self.index.notes_with_tag(tag.as_str()))
            .collect();
        Ok(self.apply_batch(affected, &edit))
    }

    /// Removes `tag` from every note. Tag lines left empty are dropped.
    pub fn delete_tag(&mut self, tag: &str) -> MutationReport {
        let Some(tag) = Tag::parse(tag) else {
            return MutationReport::default();
        };
        let affected = self.index.notes_with_tag(tag.as_str());
        self.apply_batch(affected, &TagEdit::delete(tag))
    }

    /// Adds `tag` to one note, creating its tag line if needed. Returns whether
    /// the note's content changed.
    pub fn add_tag_to_note(&mut self, key: &str, tag: &str) -> Result<bool> {
        let tag = validated(tag)?;
        self.apply_single(key, &TagEdit::insert(tag))
    }

    /// Removes `tag` from one note. Returns whether the note's content changed.
    pub fn remove_tag_from_note(&mut self, key: &str, tag: &str) -> Result<bool> {
        let tag = validated(tag)?;
        self.apply_single(key, &TagEdit::delete(tag))
    }

    fn apply_single(&mut self, key: &str, edit: &TagEdit) -> Result<bool> {
        let original = self
            .corpus
            .read_note(key)
            .map_err(|e| Error::read(key, e))?;
        let rewritten = rewrite_tags(&original, edit);
        let changed = rewritten != original;

        if changed {
            self.corpus
                .write_note(key, &rewritten)
                .map_err(|e| Error::write(key, e))?;
        }
        self.index.update(key, extract_tags(&rewritten));

        Ok(changed)
    }

    fn apply_batch(&mut self, affected: BTreeSet<String>, edit: &TagEdit) -> MutationReport {
        let mut written: Vec<Written> = Vec::new();
        let mut failure = None;
        let mut keys = affected.into_iter();

        for key in keys.by_ref() {
            let original = match self.corpus.read_note(&key) {
                Ok(content) => content,
                Err(e) => {
                    failure = Some(Error::read(&key, e));
                    break;
                }
            };

            let rewritten = rewrite_tags(&original, edit);
            let new_tags = extract_tags(&rewritten);

            if rewritten == original {
                // The index was stale for this note; resync it from the file.
                self.index.update(&key, new_tags);
                continue;
            }

            if let Err(e) = self.corpus.write_note(&key, &rewritten) {
                failure = Some(Error::write(&key, e));
                break;
            }
            written.push(Written {
                key,
                original,
                new_tags,
            });
        }

        let Some(failure) = failure else {
            let mut report = MutationReport::default();
            for note in written {
                self.index.update(&note.key, note.new_tags);
                report.updated.push(note.key);
            }
            log::debug!("Rewrote tags in {} notes", report.updated.len());
            return report;
        };

        log::warn!("Tag mutation stopped: {}; reverting {} notes", failure, written.len());

        let mut partial = PartialFailure {
            failed: vec![failure],
            untouched: keys.collect(),
            ..Default::default()
        };

        for note in written.into_iter().rev() {
            match self.corpus.write_note(&note.key, &note.original) {
                Ok(()) => partial.reverted.push(note.key),
                Err(e) => {
                    log::error!("Could not revert {}: {}", note.key, e);
                    self.index.update(&note.key, note.new_tags);
                    partial.not_reverted.push(Error::write(&note.key, e));
                }
            }
        }

        MutationReport {
            updated: Vec::new(),
            partial_failure: Some(partial),
        }
    }
}

fn validated(name: &str) -> Result<Tag> {
    Tag::parse(name).ok_or_else(|| Error::Validation(name.to_string()))
}
