use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::ledger::DedupMode;

/// Name of the config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ferry.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Record each distinct diagnostic message only once.
    #[serde(default)]
    pub single_error: bool,
    /// Restrict the export to these meeting names. Empty means all.
    #[serde(default)]
    pub only_meetings: Vec<String>,
    /// Stop at the first critical diagnostic instead of collecting the rest.
    #[serde(default)]
    pub die_on_critical: bool,
    #[serde(default = "default_true")]
    pub validate_records: bool,
    #[serde(default)]
    pub report_not_closed: bool,
    #[serde(default)]
    pub report_truncated_tags: bool,
    #[serde(default)]
    pub report_schulze_stv: bool,
    #[serde(default)]
    pub report_empty_polls: bool,
    #[serde(default)]
    pub report_duplicate_email: bool,
    /// userid -> replacement email address.
    #[serde(default)]
    pub email_overrides: BTreeMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            single_error: false,
            only_meetings: Vec::new(),
            die_on_critical: false,
            validate_records: default_true(),
            report_not_closed: false,
            report_truncated_tags: false,
            report_schulze_stv: false,
            report_empty_polls: false,
            report_duplicate_email: false,
            email_overrides: BTreeMap::new(),
        }
    }
}

impl ExportConfig {
    #[must_use]
    pub const fn dedup_mode(&self) -> DedupMode {
        if self.single_error {
            DedupMode::OncePerMessage
        } else {
            DedupMode::EveryInstance
        }
    }

    /// Whether a meeting with this legacy name takes part in the run.
    #[must_use]
    pub fn includes_meeting(&self, name: &str) -> bool {
        self.only_meetings.is_empty() || self.only_meetings.iter().any(|m| m == name)
    }
}

/// Load a config file. A missing file yields the defaults.
///
/// # Errors
///
/// Fails if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<ExportConfig> {
    if !path.exists() {
        return Ok(ExportConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ExportConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the config for a run: an explicit path wins, then `ferry.toml` in
/// `cwd`, then the defaults.
///
/// # Errors
///
/// An explicit path that does not exist is an error; so is any unreadable or
/// unparsable file.
pub fn resolve_config(
    explicit: Option<&Path>,
    cwd: &Path,
) -> Result<(ExportConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        return Ok((load_config(path)?, Some(path.to_path_buf())));
    }

    let local = cwd.join(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Ok((load_config(&local)?, Some(local)));
    }
    Ok((ExportConfig::default(), None))
}

/// Pick the summary rendering mode: `--json`, then `FORMAT`, then TTY
/// detection.
#[must_use]
pub fn resolve_output(cli_json: bool) -> &'static str {
    resolve_output_from(cli_json, env::var("FORMAT").ok(), std::io::stdout().is_terminal())
}

fn resolve_output_from(cli_json: bool, env_format: Option<String>, is_tty: bool) -> &'static str {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json";
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode;
    }

    if is_tty { "pretty" } else { "text" }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&dir.path().join("ferry.toml")).expect("load should succeed");
        assert_eq!(cfg, ExportConfig::default());
        assert!(cfg.validate_records);
        assert!(!cfg.die_on_critical);
        assert_eq!(cfg.dedup_mode(), DedupMode::EveryInstance);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ferry.toml");
        std::fs::write(
            &path,
            r#"
single_error = true
only_meetings = ["arsmote-2021"]
report_empty_polls = true

[email_overrides]
anna = "anna@example.org"
"#,
        )
        .expect("write config");

        let cfg = load_config(&path).expect("load should succeed");
        assert_eq!(cfg.dedup_mode(), DedupMode::OncePerMessage);
        assert!(cfg.report_empty_polls);
        assert!(!cfg.report_not_closed);
        assert!(cfg.validate_records);
        assert!(cfg.includes_meeting("arsmote-2021"));
        assert!(!cfg.includes_meeting("styrelse"));
        assert_eq!(cfg.email_overrides["anna"], "anna@example.org");
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ferry.toml");
        std::fs::write(&path, "die_on_critical = \"maybe\"").expect("write config");
        let err = load_config(&path).expect_err("bad type");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn explicit_path_wins_over_local_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("ferry.toml"), "single_error = true").expect("write local");
        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "die_on_critical = true").expect("write explicit");

        let (cfg, source) = resolve_config(Some(&explicit), dir.path()).expect("resolve");
        assert!(cfg.die_on_critical);
        assert!(!cfg.single_error);
        assert_eq!(source.as_deref(), Some(explicit.as_path()));

        let (local, source) = resolve_config(None, dir.path()).expect("resolve");
        assert!(local.single_error);
        assert!(source.is_some());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(resolve_config(Some(&dir.path().join("nope.toml")), dir.path()).is_err());
    }

    #[test]
    fn cli_json_overrides_env() {
        assert_eq!(resolve_output_from(true, Some("text".to_string()), true), "json");
    }

    #[test]
    fn format_aliases_are_normalized() {
        assert_eq!(resolve_output_from(false, Some("human".to_string()), false), "pretty");
        assert_eq!(resolve_output_from(false, Some("table".to_string()), true), "text");
        assert_eq!(resolve_output_from(false, Some("bogus".to_string()), false), "text");
        assert_eq!(resolve_output_from(false, None, true), "pretty");
    }
}
