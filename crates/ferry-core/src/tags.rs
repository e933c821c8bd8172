//! Tag truncation for proposal ids and hashtags.
//!
//! The target schema caps tags at 50 characters. Long tags keep their
//! numeric suffix (`...-ledamoter-3` stays `...-3`) and every rename is kept
//! in a [`TagTable`] so text bodies can be rewritten and the operator can be
//! shown what changed.

use std::collections::BTreeMap;

pub const MAX_TAG_LEN: usize = 50;

/// Truncate `tag` to at most [`MAX_TAG_LEN`] characters, keeping the part
/// after the last `-`.
///
/// ```
/// use ferry_core::tags::truncate_tag;
///
/// let long = format!("{}-3", "a".repeat(53));
/// let short = truncate_tag(&long);
/// assert!(short.chars().count() <= 50);
/// assert!(short.ends_with("-3"));
/// ```
#[must_use]
pub fn truncate_tag(tag: &str) -> String {
    if tag.chars().count() <= MAX_TAG_LEN {
        return tag.to_string();
    }
    let Some((text, num)) = tag.rsplit_once('-') else {
        return tag.chars().take(MAX_TAG_LEN).collect();
    };
    let num_len = num.chars().count();
    if num_len >= MAX_TAG_LEN - 1 {
        return tag.chars().take(MAX_TAG_LEN).collect();
    }
    let keep = MAX_TAG_LEN - 1 - num_len;
    let head: String = text.chars().take(keep).collect();
    format!("{head}-{num}")
}

/// Which field a truncated tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOrigin {
    Aid,
    Tag,
}

/// Long tag -> truncated tag, for the whole run.
#[derive(Debug, Default)]
pub struct TagTable {
    renames: BTreeMap<String, String>,
}

impl TagTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate and remember the rename. Short tags pass through untracked.
    pub fn truncate(&mut self, tag: &str) -> String {
        let short = truncate_tag(tag);
        if short != tag {
            self.renames.insert(tag.to_string(), short.clone());
        }
        short
    }

    /// Truncate an object's aid and tags in place, then rewrite `#tag`
    /// words in its text. Returns every long tag found, with its origin.
    pub fn adjust(
        &mut self,
        aid: Option<&mut String>,
        tags: &mut [String],
        text: &mut String,
    ) -> Vec<(TagOrigin, String)> {
        let mut found = Vec::new();
        if let Some(aid) = aid {
            if aid.chars().count() > MAX_TAG_LEN {
                found.push((TagOrigin::Aid, aid.clone()));
                *aid = self.truncate(aid);
            }
        }
        for tag in tags.iter_mut() {
            if tag.chars().count() > MAX_TAG_LEN {
                found.push((TagOrigin::Tag, tag.clone()));
                *tag = self.truncate(tag);
            }
        }
        if !found.is_empty() {
            *text = self.rewrite_text(text);
        }
        found
    }

    /// Replace every space-separated `#longtag` word with its truncated form.
    #[must_use]
    pub fn rewrite_text(&self, text: &str) -> String {
        text.split(' ')
            .map(|word| {
                word.strip_prefix('#')
                    .and_then(|tag| self.renames.get(tag))
                    .map_or_else(|| word.to_string(), |short| format!("#{short}"))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `(long, truncated)` pairs in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renames.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn get(&self, long: &str) -> Option<&str> {
        self.renames.get(long).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.renames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_tag() -> String {
        // 55 chars, numeric suffix "3".
        let tag = format!("21-c-val-av-riksforbundets-styrelse-ordinarie-ledam-{}", "3");
        let tag = format!("{}{}", "x".repeat(55 - tag.chars().count()), tag);
        assert_eq!(tag.chars().count(), 55);
        tag
    }

    #[test]
    fn long_tag_keeps_numeric_suffix() {
        let mut table = TagTable::new();
        let tag = long_tag();
        let short = table.truncate(&tag);
        assert!(short.chars().count() <= MAX_TAG_LEN);
        assert!(short.ends_with("-3"));
        assert_eq!(table.get(&tag), Some(short.as_str()));
    }

    #[test]
    fn short_tags_are_untouched_and_untracked() {
        let mut table = TagTable::new();
        assert_eq!(table.truncate("budget-1"), "budget-1");
        assert!(table.is_empty());
    }

    #[test]
    fn tag_without_dash_is_cut() {
        let tag = "a".repeat(60);
        assert_eq!(truncate_tag(&tag), "a".repeat(50));
    }

    #[test]
    fn multibyte_tags_count_chars() {
        let tag = format!("{}-12", "ö".repeat(60));
        let short = truncate_tag(&tag);
        assert_eq!(short.chars().count(), 50);
        assert!(short.ends_with("-12"));
    }

    #[test]
    fn adjust_rewrites_aid_tags_and_text() {
        let mut table = TagTable::new();
        let tag = long_tag();
        let mut aid = tag.clone();
        let mut tags = vec![tag.clone(), "kort-1".to_string()];
        let mut text = format!("Se #{tag} och #kort-1");

        let found = table.adjust(Some(&mut aid), &mut tags, &mut text);
        let short = truncate_tag(&tag);
        assert_eq!(found, vec![(TagOrigin::Aid, tag.clone()), (TagOrigin::Tag, tag)]);
        assert_eq!(aid, short);
        assert_eq!(tags, vec![short.clone(), "kort-1".to_string()]);
        assert_eq!(text, format!("Se #{short} och #kort-1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn adjust_without_long_tags_leaves_text_alone() {
        let mut table = TagTable::new();
        let mut tags = vec!["a-1".to_string()];
        let mut text = "double  space #a-1".to_string();
        assert!(table.adjust(None, &mut tags, &mut text).is_empty());
        assert_eq!(text, "double  space #a-1");
    }
}
