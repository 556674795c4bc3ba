use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Number of leading lines scanned for a tag declaration.
pub const METADATA_WINDOW: usize = 10;
/// Marker that opens a tag declaration line. Matched case-insensitively.
pub const TAG_MARKER: &str = "tags:";
pub const TAG_SIGIL: char = '#';

static TAG_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").unwrap());
static TAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([A-Za-z0-9-]+)$").unwrap());

/// A normalized tag: lowercase, `[a-z0-9-]+`, stored without the sigil.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(String);

impl Tag {
    /// Normalizes a bare tag name (no sigil). Returns `None` if the name fails
    /// [`is_valid_tag`].
    pub fn parse(name: &str) -> Option<Tag> {
        is_valid_tag(name).then(|| Tag(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn display_form(&self) -> String {
        format!("{}{}", TAG_SIGIL, self.0)
    }

    pub fn storage_form(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Character-class check for a tag name supplied directly by a caller.
pub fn is_valid_tag(name: &str) -> bool {
    TAG_NAME.is_match(name)
}

pub fn to_display_form(tag: &Tag) -> String {
    tag.display_form()
}

pub fn to_storage_form(tag: &Tag) -> String {
    tag.storage_form().to_string()
}

/// Returns the normalized tag set declared in the note's metadata window.
///
/// Only the first `tags:` line within the first [`METADATA_WINDOW`] lines is
/// considered. A marker line whose value has no `#` token at all, such as a
/// YAML `tags: [a, b]` entry, is not a declaration. Tokens that are not `#`
/// followed by `[A-Za-z0-9-]+` are skipped.
pub fn extract_tags(content: &str) -> BTreeSet<Tag> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    find_tag_line(&lines)
        .map(|line| line.tags())
        .unwrap_or_default()
}

/// Serializes a tag set as a fresh declaration line, without a line ending.
pub fn format_tag_line<'a, I>(tags: I) -> String
where
    I: IntoIterator<Item = &'a Tag>,
{
    let mut line = TAG_MARKER.to_string();
    for tag in tags {
        line.push(' ');
        line.push_str(&tag.display_form());
    }
    line
}

/// A change to a note's tag set: `(tags - remove) ∪ add`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEdit {
    pub remove: BTreeSet<Tag>,
    pub add: BTreeSet<Tag>,
}

impl TagEdit {
    pub fn rename(old: Tag, new: Tag) -> Self {
        Self::merge(BTreeSet::from([old]), new)
    }

    pub fn merge(sources: BTreeSet<Tag>, target: Tag) -> Self {
        let remove = sources.into_iter().filter(|t| *t != target).collect();
        Self {
            remove,
            add: BTreeSet::from([target]),
        }
    }

    pub fn delete(tag: Tag) -> Self {
        Self {
            remove: BTreeSet::from([tag]),
            add: BTreeSet::new(),
        }
    }

    pub fn insert(tag: Tag) -> Self {
        Self {
            remove: BTreeSet::new(),
            add: BTreeSet::from([tag]),
        }
    }

    pub fn apply_to(&self, tags: &BTreeSet<Tag>) -> BTreeSet<Tag> {
        tags.difference(&self.remove)
            .chain(self.add.iter())
            .cloned()
            .collect()
    }
}

/// Rewrites the metadata tag line of `content` according to `edit`.
///
/// Content whose tag set would not change is returned byte-identical. Tags
/// being introduced take the place of the first removed token, or are appended.
/// A line left with no tokens is removed. Surviving tokens are rejoined with
/// single spaces. When the note has no tag line and `edit` adds tags, one is
/// inserted at the top, or just below a `---` front-matter block that closes
/// early enough to keep the new line inside the window.
pub fn rewrite_tags(content: &str, edit: &TagEdit) -> String {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();

    let Some(line) = find_tag_line(&lines) else {
        if edit.add.is_empty() {
            return content.to_string();
        }
        return insert_tag_line(&lines, &edit.add);
    };

    let current = line.tags();
    let target = edit.apply_to(&current);
    if target == current {
        return content.to_string();
    }

    let mut to_insert: Vec<String> = target
        .difference(&current)
        .map(Tag::display_form)
        .collect();
    let mut seen = BTreeSet::new();
    let mut tokens: Vec<String> = Vec::new();

    for token in line.body.split_whitespace() {
        match parse_token(token) {
            Some(tag) if target.contains(&tag) => {
                if seen.insert(tag) {
                    tokens.push(token.to_string());
                }
            }
            Some(_) => tokens.append(&mut to_insert),
            None => tokens.push(token.to_string()),
        }
    }
    tokens.append(&mut to_insert);

    let mut out = String::with_capacity(content.len());
    for (i, raw) in lines.iter().enumerate() {
        if i != line.index {
            out.push_str(raw);
            continue;
        }
        if tokens.is_empty() {
            continue;
        }
        out.push_str(line.prefix);
        out.push(' ');
        out.push_str(&tokens.join(" "));
        out.push_str(line.ending);
    }
    out
}

struct TagLine<'a> {
    index: usize,
    /// Leading whitespace plus the marker as written.
    prefix: &'a str,
    body: &'a str,
    ending: &'a str,
}

impl TagLine<'_> {
    fn tags(&self) -> BTreeSet<Tag> {
        self.body.split_whitespace().filter_map(parse_token).collect()
    }
}

fn find_tag_line<'a>(lines: &[&'a str]) -> Option<TagLine<'a>> {
    lines
        .iter()
        .copied()
        .take(METADATA_WINDOW)
        .enumerate()
        .find_map(|(index, raw)| {
            let (text, ending) = split_line_ending(raw);
            let at = marker_end(text)?;
            if !declares_tags(&text[at..]) {
                return None;
            }
            Some(TagLine {
                index,
                prefix: &text[..at],
                body: &text[at..],
                ending,
            })
        })
}

fn marker_end(text: &str) -> Option<usize> {
    let trimmed = text.trim_start();
    let indent = text.len() - trimmed.len();
    let head = trimmed.get(..TAG_MARKER.len())?;
    head.eq_ignore_ascii_case(TAG_MARKER)
        .then_some(indent + TAG_MARKER.len())
}

fn declares_tags(body: &str) -> bool {
    body.trim().is_empty() || body.split_whitespace().any(|t| t.starts_with(TAG_SIGIL))
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(text) = line.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = line.strip_suffix('\n') {
        (text, "\n")
    } else {
        (line, "")
    }
}

fn parse_token(token: &str) -> Option<Tag> {
    let caps = TAG_TOKEN.captures(token)?;
    Some(Tag(caps[1].to_ascii_lowercase()))
}

fn insert_tag_line(lines: &[&str], tags: &BTreeSet<Tag>) -> String {
    let ending = lines
        .first()
        .map(|l| split_line_ending(l).1)
        .filter(|e| !e.is_empty())
        .unwrap_or("\n");
    let at = match front_matter_end(lines) {
        Some(close) if close + 1 < METADATA_WINDOW => close + 1,
        Some(_) => 1,
        None => 0,
    };
    let new_line = format!("{}{}", format_tag_line(tags), ending);

    let mut out = String::with_capacity(lines.iter().map(|l| l.len()).sum::<usize>() + new_line.len());
    for (i, raw) in lines.iter().enumerate() {
        if i == at {
            out.push_str(&new_line);
        }
        out.push_str(raw);
    }
    if at >= lines.len() {
        out.push_str(&new_line);
    }
    out
}

/// Index of the closing fence when the note opens with a `---` block that
/// closes within the window.
fn front_matter_end(lines: &[&str]) -> Option<usize> {
    let is_fence = |raw: &str| split_line_ending(raw).0.trim_end() == "---";
    if !lines.first().is_some_and(|first| is_fence(*first)) {
        return None;
    }
    lines
        .iter()
        .take(METADATA_WINDOW)
        .skip(1)
        .position(|raw| is_fence(*raw))
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<Tag> {
        names.iter().map(|n| Tag::parse(n).unwrap()).collect()
    }

    fn tag(name: &str) -> Tag {
        Tag::parse(name).unwrap()
    }

    #[test]
    fn test_extract_basic() {
        let content = "tags: #bug #urgent #project-alpha\n\nCrash on startup.\n";
        assert_eq!(extract_tags(content), tags(&["bug", "urgent", "project-alpha"]));
    }

    #[test]
    fn test_extract_is_lowercase_and_deduplicated() {
        let content = "Tags: #Bug #BUG #bug #Release-2\n";
        assert_eq!(extract_tags(content), tags(&["bug", "release-2"]));
    }

    #[test]
    fn test_extract_rejects_punctuation() {
        let content = "tags: #ok #bad, #no_underscore #semi; #✓ # #also-ok plain\n";
        let result = extract_tags(content);
        assert_eq!(result, tags(&["ok", "also-ok"]));
        for t in &result {
            assert!(t.as_str().chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    #[test]
    fn test_extract_only_first_marker_line_in_window() {
        let mut content = String::from("title\n");
        content.push_str("tags: #first\n");
        content.push_str("tags: #second\n");
        assert_eq!(extract_tags(&content), tags(&["first"]));

        let mut late = String::new();
        for i in 0..METADATA_WINDOW {
            late.push_str(&format!("line {}\n", i));
        }
        late.push_str("tags: #too-late\n");
        assert!(extract_tags(&late).is_empty());
    }

    #[test]
    fn test_extract_ignores_body_hashtags() {
        let content = "Meeting notes\n\nWe should #refactor this.\n";
        assert!(extract_tags(content).is_empty());
    }

    #[test]
    fn test_extract_degenerate_inputs() {
        assert!(extract_tags("").is_empty());
        assert!(extract_tags("no marker here").is_empty());
        assert!(extract_tags("tags:").is_empty());
        assert_eq!(extract_tags("  tags: #indented"), tags(&["indented"]));
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(is_valid_tag("project-alpha"));
        assert!(is_valid_tag("Bug42"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("two words"));
        assert!(!is_valid_tag("#bug"));
        assert!(!is_valid_tag("under_score"));
        assert!(!is_valid_tag("café"));
    }

    #[test]
    fn test_display_and_storage_forms() {
        let t = tag("Urgent");
        assert_eq!(to_display_form(&t), "#urgent");
        assert_eq!(to_storage_form(&t), "urgent");
        assert_eq!(t.to_string(), "urgent");
    }

    #[test]
    fn test_unchanged_set_is_byte_identical() {
        let content = "Tags:  #Bug   #urgent stray\r\nbody\n";
        let edit = TagEdit::rename(tag("bug"), tag("bug"));
        assert_eq!(rewrite_tags(content, &edit), content);
        assert_eq!(rewrite_tags(content, &TagEdit::default()), content);
    }

    #[test]
    fn test_format_round_trip() {
        let set = tags(&["bug", "project-alpha", "urgent"]);
        let line = format_tag_line(&set);
        assert_eq!(line, "tags: #bug #project-alpha #urgent");
        assert_eq!(extract_tags(&line), set);
        assert_eq!(format_tag_line(&extract_tags(&line)), line);
    }

    #[test]
    fn test_rename_in_place() {
        let content = "tags: #bug #urgent\nbody #bug\n";
        let result = rewrite_tags(content, &TagEdit::rename(tag("bug"), tag("defect")));
        assert_eq!(result, "tags: #defect #urgent\nbody #bug\n");
    }

    #[test]
    fn test_rename_into_existing_tag_deduplicates() {
        let content = "tags: #bug #defect\n";
        let result = rewrite_tags(content, &TagEdit::rename(tag("bug"), tag("defect")));
        assert_eq!(result, "tags: #defect\n");
    }

    #[test]
    fn test_merge_emits_target_once() {
        let content = "tags: #bug #feature #urgent\n";
        let edit = TagEdit::merge(tags(&["bug", "urgent"]), tag("triaged"));
        let result = rewrite_tags(content, &edit);
        assert_eq!(result, "tags: #triaged #feature\n");
        assert_eq!(result.matches("#triaged").count(), 1);
    }

    #[test]
    fn test_merge_target_among_sources() {
        let edit = TagEdit::merge(tags(&["bug", "defect"]), tag("defect"));
        assert_eq!(edit.remove, tags(&["bug"]));
        assert_eq!(rewrite_tags("tags: #bug #defect\n", &edit), "tags: #defect\n");
    }

    #[test]
    fn test_delete_keeps_other_tokens() {
        let content = "tags: #keep #gone note-to-self\n";
        let result = rewrite_tags(content, &TagEdit::delete(tag("gone")));
        assert_eq!(result, "tags: #keep note-to-self\n");
    }

    #[test]
    fn test_delete_last_tag_removes_line() {
        let content = "Title\ntags: #only\r\nBody\n";
        let result = rewrite_tags(content, &TagEdit::delete(tag("only")));
        assert_eq!(result, "Title\nBody\n");
    }

    #[test]
    fn test_insert_creates_line_at_top() {
        let result = rewrite_tags("Some text\nmore\n", &TagEdit::insert(tag("new")));
        assert_eq!(result, "tags: #new\nSome text\nmore\n");

        assert_eq!(rewrite_tags("", &TagEdit::insert(tag("new"))), "tags: #new\n");
        assert_eq!(
            rewrite_tags("single", &TagEdit::insert(tag("new"))),
            "tags: #new\nsingle"
        );
    }

    #[test]
    fn test_insert_after_front_matter_block() {
        let content = "---\r\ntitle: x\r\n---\r\nbody\r\n";
        let result = rewrite_tags(content, &TagEdit::insert(tag("new")));
        assert_eq!(result, "---\r\ntitle: x\r\n---\r\ntags: #new\r\nbody\r\n");
        assert_eq!(extract_tags(&result), tags(&["new"]));
    }

    #[test]
    fn test_insert_inside_long_front_matter() {
        let mut content = String::from("---\n");
        for i in 0..8 {
            content.push_str(&format!("key{}: v\n", i));
        }
        content.push_str("---\nbody\n");

        let result = rewrite_tags(&content, &TagEdit::insert(tag("new")));
        assert!(result.starts_with("---\ntags: #new\nkey0: v\n"));
        assert_eq!(extract_tags(&result), tags(&["new"]));
    }

    #[test]
    fn test_yaml_tags_value_is_left_alone() {
        let content = "---\ntags: [a, b]\n---\nbody\n";
        assert!(extract_tags(content).is_empty());

        let result = rewrite_tags(content, &TagEdit::insert(tag("new")));
        assert_eq!(result, "---\ntags: [a, b]\n---\ntags: #new\nbody\n");
        assert_eq!(extract_tags(&result), tags(&["new"]));
    }

    #[test]
    fn test_marker_without_sigil_tokens_is_skipped() {
        let content = "tags: none yet\ntags: #real\n";
        assert_eq!(extract_tags(content), tags(&["real"]));
        assert_eq!(
            rewrite_tags(content, &TagEdit::insert(tag("more"))),
            "tags: none yet\ntags: #real #more\n"
        );
    }

    #[test]
    fn test_changed_line_is_rejoined_with_single_spaces() {
        let content = "tags:\t#a\t\t#b  \nbody\n";
        assert_eq!(rewrite_tags(content, &TagEdit::insert(tag("c"))), "tags: #a #b #c\nbody\n");
        // An unchanged set keeps the original spacing.
        assert_eq!(rewrite_tags(content, &TagEdit::insert(tag("a"))), content);
    }

    #[test]
    fn test_insert_appends_to_existing_line() {
        let content = "tags: #a\n";
        assert_eq!(rewrite_tags(content, &TagEdit::insert(tag("b"))), "tags: #a #b\n");
    }

    #[test]
    fn test_remove_absent_tag_without_line_is_noop() {
        let content = "plain note\n";
        assert_eq!(rewrite_tags(content, &TagEdit::delete(tag("x"))), content);
    }
}
