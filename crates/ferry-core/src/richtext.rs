//! Plain-text to rich-text body conversion.
//!
//! Pure string transforms: `@userid` mentions and `#tag` hashtags become the
//! target editor's mention spans, and plain text gets paragraph markup.

use regex::{Captures, Regex};

use crate::model::Pk;

const MENTION_PATTERN: &str = r"(\A|\s)@([a-zA-Z1-9][\w-]+)";
const HASHTAG_PATTERN: &str = r#"(?P<pre>\A|\s|[(\[{>"'])#(?P<tag>[\w-]*\w)"#;

/// Compiled patterns for one run.
#[derive(Debug, Clone)]
pub struct RichText {
    mention: Regex,
    hashtag: Regex,
    blank_lines: Regex,
    repeated_breaks: Regex,
}

impl RichText {
    /// # Errors
    ///
    /// Only if one of the built-in patterns fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            mention: Regex::new(MENTION_PATTERN)?,
            hashtag: Regex::new(HASHTAG_PATTERN)?,
            blank_lines: Regex::new(r"(\s*)\n{2,}")?,
            repeated_breaks: Regex::new(r"(<br/>\n){2,}")?,
        })
    }

    /// Mentions first, then hashtags.
    pub fn convert_body<F>(&self, text: &str, resolve_user: F) -> String
    where
        F: FnMut(&str) -> Option<(Pk, String)>,
    {
        self.hashtags_to_spans(&self.mentions_to_spans(text, resolve_user))
    }

    /// Replace `@userid` with a mention span. `resolve_user` receives the
    /// lowercased userid; users it cannot resolve are left as their bare
    /// userid.
    pub fn mentions_to_spans<F>(&self, text: &str, mut resolve_user: F) -> String
    where
        F: FnMut(&str) -> Option<(Pk, String)>,
    {
        self.mention
            .replace_all(text, |caps: &Captures<'_>| {
                let pre = &caps[1];
                let userid = caps[2].to_lowercase();
                match resolve_user(&userid) {
                    Some((pk, name)) => format!("{pre}{}", mention_span(pk, &name)),
                    None => format!("{pre}{userid}"),
                }
            })
            .into_owned()
    }

    /// Replace `#tag` with a hashtag span, keeping the preceding character.
    #[must_use]
    pub fn hashtags_to_spans(&self, text: &str) -> String {
        self.hashtag
            .replace_all(text, |caps: &Captures<'_>| {
                format!("{}{}", &caps["pre"], hashtag_span(&caps["tag"]))
            })
            .into_owned()
    }

    /// Wrap plain text in `<p>` paragraphs with `<br/>` line breaks. Text
    /// that already contains a paragraph tag is returned unchanged.
    #[must_use]
    pub fn add_paras(&self, text: &str) -> String {
        if text.to_lowercase().contains("<p>") {
            return text.to_string();
        }
        let text = self.blank_lines.replace_all(text.trim(), "</p>\n<p>");
        let mut reformatted = String::with_capacity(text.len() + 16);
        for row in text.lines() {
            let row = row.trim();
            reformatted.push_str(row);
            if !row.ends_with('>') {
                reformatted.push_str("<br/>");
            }
            reformatted.push('\n');
        }
        let wrapped = format!("<p>{reformatted}</p>").replace("<br/>\n</p>", "</p>");
        self.repeated_breaks
            .replace_all(&wrapped, "</p>\n<p>")
            .into_owned()
    }
}

#[must_use]
pub fn mention_span(pk: Pk, name: &str) -> String {
    format!(
        "<span class=\"mention\" data-index=\"0\" data-denotation-char=\"@\" data-id=\"{pk}\" data-value=\"{name}\"><span contenteditable=\"false\"><span class=\"ql-mention-denotation-char\">@</span>{name}</span></span>\n"
    )
}

#[must_use]
pub fn hashtag_span(tag: &str) -> String {
    format!(
        "<span class=\"mention\" data-index=\"0\" data-denotation-char=\"#\" data-id=\"{tag}\" data-value=\"{tag}\"><span contenteditable=\"false\"><span class=\"ql-mention-denotation-char\">#</span>{tag}</span></span>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt() -> RichText {
        RichText::new().expect("patterns compile")
    }

    #[test]
    fn mention_becomes_span_with_pk_and_name() {
        let out = rt().mentions_to_spans("Hi @Anna!", |userid| {
            assert_eq!(userid, "anna");
            Some((3, "Anna Berg".to_string()))
        });
        assert_eq!(out, format!("Hi {}!", mention_span(3, "Anna Berg")));
        assert!(out.contains("data-id=\"3\""));
    }

    #[test]
    fn unknown_mention_is_left_as_userid() {
        let out = rt().mentions_to_spans("@ghost said hi", |_| None);
        assert_eq!(out, "ghost said hi");
    }

    #[test]
    fn email_addresses_are_not_mentions() {
        let out = rt().mentions_to_spans("mail anna@example.org", |_| {
            panic!("should not resolve")
        });
        assert_eq!(out, "mail anna@example.org");
    }

    #[test]
    fn hashtag_keeps_preceding_character() {
        let out = rt().hashtags_to_spans("(#budget-2) and #vote");
        assert_eq!(
            out,
            format!("({}) and {}", hashtag_span("budget-2"), hashtag_span("vote"))
        );
    }

    #[test]
    fn convert_body_handles_both() {
        let out = rt().convert_body("@anna #tag", |_| Some((1, "Anna".to_string())));
        assert!(out.contains("data-denotation-char=\"@\""));
        assert!(out.contains("data-id=\"tag\""));
    }

    #[test]
    fn add_paras_wraps_lines() {
        assert_eq!(rt().add_paras("Hello\nworld"), "<p>Hello<br/>\nworld</p>");
    }

    #[test]
    fn add_paras_splits_on_blank_lines() {
        assert_eq!(rt().add_paras("A\n\nB\n"), "<p>A</p>\n<p>B</p>");
    }

    #[test]
    fn add_paras_leaves_markup_alone() {
        assert_eq!(rt().add_paras("<P>done</P>"), "<P>done</P>");
    }

    #[test]
    fn add_paras_on_empty_text() {
        assert_eq!(rt().add_paras("   "), "<p></p>");
    }
}
