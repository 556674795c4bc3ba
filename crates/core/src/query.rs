use std::collections::BTreeSet;

use crate::corpus::CorpusReader;
use crate::index::{SortOrder, TagIndex};
use crate::tags::{TAG_SIGIL, Tag};

const TAG_PREFIX: &str = "tag:";

/// A parsed `tag:x tag:y free text` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    pub tags: BTreeSet<Tag>,
    /// Remaining tokens, space-joined in their original order and case.
    pub text: String,
}

/// Decides whether note content matches the free-text part of a query.
pub trait ContentSearch {
    fn contains_substring(&self, content: &str, needle: &str, case_insensitive: bool) -> bool;
}

/// Plain substring search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringSearch;

impl ContentSearch for SubstringSearch {
    fn contains_substring(&self, content: &str, needle: &str, case_insensitive: bool) -> bool {
        if case_insensitive {
            content.to_lowercase().contains(&needle.to_lowercase())
        } else {
            content.contains(needle)
        }
    }
}

/// Splits a raw query into tag predicates and free text. Never fails: a
/// malformed `tag:` token is kept as text.
pub fn parse_query(raw: &str) -> TagQuery {
    let mut tags = BTreeSet::new();
    let mut words = Vec::new();

    for token in raw.split_whitespace() {
        match tag_predicate(token) {
            Some(tag) => {
                tags.insert(tag);
            }
            None => words.push(token),
        }
    }

    TagQuery {
        tags,
        text: words.join(" "),
    }
}

fn tag_predicate(token: &str) -> Option<Tag> {
    let prefix = token.get(..TAG_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(TAG_PREFIX) {
        return None;
    }
    Tag::parse(&token[TAG_PREFIX.len()..])
}

/// Notes matching every tag in the query and, if the query has text, whose
/// content contains it (case-insensitively).
///
/// Tag predicates narrow the candidates before any content is read. Notes that
/// cannot be read are left out of a text match.
pub fn evaluate<R, S>(query: &TagQuery, index: &TagIndex, corpus: &R, search: &S) -> BTreeSet<String>
where
    R: CorpusReader + ?Sized,
    S: ContentSearch + ?Sized,
{
    let candidates = index.notes_with_tags(&query.tags);
    if query.text.is_empty() {
        return candidates;
    }

    candidates
        .into_iter()
        .filter(|key| match corpus.read_note(key) {
            Ok(content) => search.contains_substring(&content, &query.text, true),
            Err(e) => {
                log::warn!("Skipping {} in text search: {}", key, e);
                false
            }
        })
        .collect()
}

/// Known tags starting with `partial`, most used first.
///
/// `partial` may carry a leading sigil and any case.
pub fn suggest_tags(partial: &str, index: &TagIndex, limit: Option<usize>) -> Vec<Tag> {
    let partial = partial.trim();
    let partial = partial.strip_prefix(TAG_SIGIL).unwrap_or(partial);
    let partial = partial.to_ascii_lowercase();

    index
        .all_tags(SortOrder::CountDesc)
        .into_iter()
        .map(|(tag, _)| tag)
        .filter(|tag| tag.as_str().starts_with(&partial))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
