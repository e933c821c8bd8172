use anyhow::Result;
use clap::Args;
use ferry_core::config::resolve_config;
use ferry_core::ledger::LedgerEntry;
use ferry_core::{ExportOutcome, SourceTree, export};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::output::{OutputMode, Renderable, field, render, section};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Legacy snapshot to export.
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// Where to write the record array.
    #[arg(long, value_name = "PATH", default_value = "voteit4_export.json")]
    pub output: PathBuf,

    /// Config file (defaults to ./ferry.toml when present).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Legacy snapshot to check.
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// Config file (defaults to ./ferry.toml when present).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TagRename<'a> {
    long: &'a str,
    short: &'a str,
}

/// End-of-run report.
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    source: String,
    /// Output file, when one was written.
    written: Option<String>,
    records: usize,
    counts: BTreeMap<&'static str, usize>,
    skipped_users: &'a [String],
    truncated_tags: Vec<TagRename<'a>>,
    diagnostics: &'a BTreeMap<String, Vec<LedgerEntry>>,
    critical: Vec<&'a str>,
    omitted: usize,
    halted_at: Option<&'a str>,
}

impl<'a> RunSummary<'a> {
    fn new(source: &Path, outcome: &'a ExportOutcome, written: Option<&Path>) -> Self {
        Self {
            source: source.display().to_string(),
            written: written.map(|path| path.display().to_string()),
            records: outcome.records.len(),
            counts: outcome.counts(),
            skipped_users: &outcome.skipped_users,
            truncated_tags: outcome
                .truncated_tags
                .iter()
                .map(|(long, short)| TagRename { long, short })
                .collect(),
            diagnostics: outcome.ledger.errors(),
            critical: outcome
                .ledger
                .critical_kinds()
                .iter()
                .map(String::as_str)
                .collect(),
            omitted: outcome.ledger.omitted(),
            halted_at: outcome.halted.as_ref().map(|halt| halt.path.as_str()),
        }
    }
}

impl Renderable for RunSummary<'_> {
    fn render_pretty(&self, w: &mut dyn Write) -> io::Result<()> {
        section(w, "Export summary")?;
        field(w, "source", &self.source)?;
        field(w, "output", self.written.as_deref().unwrap_or("(not written)"))?;
        field(w, "records", self.records.to_string())?;
        writeln!(w)?;

        section(w, "Records per model")?;
        for (model, count) in &self.counts {
            field(w, model, count.to_string())?;
        }
        writeln!(w)?;

        if !self.skipped_users.is_empty() {
            section(w, &format!("Skipped users ({})", self.skipped_users.len()))?;
            writeln!(w, "{}", self.skipped_users.join(", "))?;
            writeln!(w)?;
        }

        if !self.truncated_tags.is_empty() {
            section(w, "Truncated tags")?;
            for rename in &self.truncated_tags {
                writeln!(w, "{} -> {}", rename.long, rename.short)?;
            }
            writeln!(w)?;
        }

        if !self.diagnostics.is_empty() {
            section(w, "Diagnostics")?;
            for (path, entries) in self.diagnostics {
                writeln!(w, "{path}")?;
                for entry in entries {
                    writeln!(w, "  {entry}")?;
                }
            }
            if self.omitted > 0 {
                writeln!(w, "({} repeated diagnostics omitted)", self.omitted)?;
            }
            writeln!(w)?;
        }

        if !self.critical.is_empty() {
            section(w, &format!("{} critical error types", self.critical.len()))?;
            for message in &self.critical {
                writeln!(w, "{message}")?;
            }
        }
        if let Some(path) = self.halted_at {
            writeln!(w, "Stopped at {path}")?;
        }
        Ok(())
    }

    fn render_text(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "source {}", self.source)?;
        writeln!(w, "written {}", self.written.as_deref().unwrap_or("-"))?;
        writeln!(w, "records {}", self.records)?;
        for (model, count) in &self.counts {
            writeln!(w, "model {model} {count}")?;
        }
        for userid in self.skipped_users {
            writeln!(w, "skipped_user {userid}")?;
        }
        for rename in &self.truncated_tags {
            writeln!(w, "tag {} {}", rename.long, rename.short)?;
        }
        for (path, entries) in self.diagnostics {
            for entry in entries {
                writeln!(w, "diagnostic {path} {entry}")?;
            }
        }
        for message in &self.critical {
            writeln!(w, "critical {message}")?;
        }
        if let Some(path) = self.halted_at {
            writeln!(w, "halted {path}")?;
        }
        Ok(())
    }
}

fn run_pipeline(source: &Path, config: Option<&Path>, cwd: &Path) -> Result<ExportOutcome> {
    let (config, config_path) = resolve_config(config, cwd)?;
    if let Some(path) = &config_path {
        info!(config = %path.display(), "loaded config");
    }
    let tree = SourceTree::load(source)?;
    export(&tree, &config)
}

/// Resolve relative paths against the working directory.
fn absolute(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

pub fn run_export(args: &ExportArgs, mode: OutputMode, cwd: &Path) -> Result<()> {
    let source = absolute(&args.source, cwd);
    let config = args.config.as_deref().map(|path| absolute(path, cwd));
    let outcome = run_pipeline(&source, config.as_deref(), cwd)?;

    let output = absolute(&args.output, cwd);
    let written = outcome.write_json(&output);
    let summary = RunSummary::new(
        &args.source,
        &outcome,
        written.is_ok().then_some(args.output.as_path()),
    );
    render(mode, &summary)?;
    written
}

pub fn run_check(args: &CheckArgs, mode: OutputMode, cwd: &Path) -> Result<()> {
    let source = absolute(&args.source, cwd);
    let config = args.config.as_deref().map(|path| absolute(path, cwd));
    let outcome = run_pipeline(&source, config.as_deref(), cwd)?;

    render(mode, &RunSummary::new(&args.source, &outcome, None))?;
    if outcome.has_critical() {
        anyhow::bail!(
            "{} critical error types - export would not be written",
            outcome.ledger.critical_kinds().len().max(1)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::ExportConfig;

    const TREE: &str = r#"{
        "organisation": {"title": "Org", "created": "2020-01-01T00:00:00Z", "modified": "2020-01-01T00:00:00Z"},
        "users": [{"userid": "anna", "created": "2020-01-01T00:00:00Z", "modified": "2020-01-01T00:00:00Z"}],
        "meetings": []
    }"#;

    fn outcome() -> ExportOutcome {
        let tree = SourceTree::from_json(TREE).expect("parse");
        export(&tree, &ExportConfig::default()).expect("export")
    }

    #[test]
    fn summary_serializes_counts_and_skips() {
        let outcome = outcome();
        let summary =
            RunSummary::new(Path::new("snap.json"), &outcome, Some(Path::new("out.json")));
        let value = serde_json::to_value(&summary).expect("json");
        assert_eq!(value["records"], 1);
        assert_eq!(value["counts"]["organisation.organisation"], 1);
        assert_eq!(value["skipped_users"], serde_json::json!(["anna"]));
        assert_eq!(value["written"], "out.json");
        assert_eq!(value["critical"], serde_json::json!([]));
    }

    #[test]
    fn text_summary_is_line_oriented() {
        let outcome = outcome();
        let summary = RunSummary::new(Path::new("snap.json"), &outcome, None);
        let mut buf = Vec::new();
        summary.render_text(&mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("written -"));
        assert!(text.contains("model organisation.organisation 1"));
        assert!(text.contains("skipped_user anna"));
    }

    #[test]
    fn pretty_summary_marks_unwritten_output() {
        let outcome = outcome();
        let summary = RunSummary::new(Path::new("snap.json"), &outcome, None);
        let mut buf = Vec::new();
        summary.render_pretty(&mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("(not written)"));
        assert!(text.contains("Skipped users (1)"));
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(absolute(Path::new("a.json"), cwd), PathBuf::from("/work/a.json"));
        assert_eq!(absolute(Path::new("/tmp/a.json"), cwd), PathBuf::from("/tmp/a.json"));
    }
}
