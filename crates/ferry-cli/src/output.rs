//! How the end-of-run summary reaches stdout.
//!
//! `--json` forces JSON. Otherwise `FORMAT` (`pretty`, `text` or `json`)
//! decides, and without it a terminal gets the sectioned layout while pipes
//! get plain `key value` lines.

use ferry_core::config::resolve_output;
use serde::Serialize;
use std::io::{self, Write};

/// Column count of the dashed line under each summary section.
pub const SECTION_RULE_WIDTH: usize = 72;

/// Section heading underlined with dashes.
pub fn section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    writeln!(w, "{}", "-".repeat(SECTION_RULE_WIDTH))
}

/// `key:` padded to a fixed column, then the value.
pub fn field(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<36} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output with sections.
    Pretty,
    /// Plain `key value` lines for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Resolve from the `--json` flag, `FORMAT` and TTY detection.
    pub fn resolve(json_flag: bool) -> Self {
        Self::from_name(resolve_output(json_flag))
    }

    fn from_name(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }
}

/// Something that renders itself in every mode.
pub trait Renderable: Serialize {
    fn render_pretty(&self, w: &mut dyn Write) -> io::Result<()>;

    fn render_text(&self, w: &mut dyn Write) -> io::Result<()>;
}

/// Render `item` to stdout in the requested mode.
pub fn render<R: Renderable>(mode: OutputMode, item: &R) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, item)?;
            writeln!(out)?;
        }
        OutputMode::Pretty => item.render_pretty(&mut out)?,
        OutputMode::Text => item.render_text(&mut out)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_modes() {
        assert_eq!(OutputMode::from_name("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_name("text"), OutputMode::Text);
        assert_eq!(OutputMode::from_name("pretty"), OutputMode::Pretty);
    }

    #[test]
    fn json_flag_wins() {
        assert_eq!(OutputMode::resolve(true), OutputMode::Json);
    }

    #[test]
    fn field_aligns_keys() {
        let mut buf = Vec::new();
        field(&mut buf, "poll.poll", "3").expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        assert!(line.starts_with("poll.poll:"));
        assert!(line.trim_end().ends_with(" 3"));
    }

    #[test]
    fn section_has_rule() {
        let mut buf = Vec::new();
        section(&mut buf, "Records").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text.lines().nth(1).map(str::len), Some(SECTION_RULE_WIDTH));
    }
}
