//! Poll result and ballot transcoding.
//!
//! Every legacy voting plugin is one [`VotingMethod`] variant. Results and
//! ballots are parsed into a per-method input schema, every proposal UID is
//! resolved to a pk through a [`PollScope`], and the normalized payload is
//! returned as JSON ready for the `poll.poll` / `poll.vote` records.
//!
//! Failures follow the crate-wide split: a malformed payload is a
//! [`ExportError::Skip`], a payload that proves the source data is corrupt
//! (a proposal from another meeting, a ranking beyond `max_stars`, an unknown
//! plugin) is an [`ExportError::Abort`].

pub mod ballot;
pub mod schulze;
pub mod settings;
pub mod stv;
pub mod tally;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Diagnostic, ErrorCode, ExportError};
use crate::model::{EntityKind, Pk};
use crate::registry::Registry;

pub use ballot::{Ballot, transcode_ballot};
pub use settings::SettingsOutcome;

/// Closed set of legacy voting plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VotingMethod {
    Schulze,
    SortedSchulze,
    SchulzePr,
    SchulzeStv,
    ScottishStv,
    Irv,
    RepeatedIrv,
    CombinedSimple,
    Dutt,
    Majority,
}

impl VotingMethod {
    pub const ALL: [Self; 10] = [
        Self::Schulze,
        Self::SortedSchulze,
        Self::SchulzePr,
        Self::SchulzeStv,
        Self::ScottishStv,
        Self::Irv,
        Self::RepeatedIrv,
        Self::CombinedSimple,
        Self::Dutt,
        Self::Majority,
    ];

    /// Parse a legacy plugin id.
    ///
    /// # Errors
    ///
    /// Unknown plugins are critical: the poll cannot be represented at all.
    pub fn from_plugin(plugin: &str) -> Result<Self, ExportError> {
        Self::ALL
            .into_iter()
            .find(|method| method.plugin_id() == plugin)
            .ok_or_else(|| {
                ExportError::abort(
                    ErrorCode::UnknownPlugin,
                    format!("No such poll plugin {plugin} - skipping export"),
                )
            })
    }

    /// Identifier used by the legacy system.
    #[must_use]
    pub const fn plugin_id(self) -> &'static str {
        match self {
            Self::Schulze => "schulze",
            Self::SortedSchulze => "sorted_schulze",
            Self::SchulzePr => "schulze_pr",
            Self::SchulzeStv => "schulze_stv",
            Self::ScottishStv => "scottish_stv",
            Self::Irv => "irv",
            Self::RepeatedIrv => "repeated_irv",
            Self::CombinedSimple => "combined_simple",
            Self::Dutt => "dutt_poll",
            Self::Majority => "majority_poll",
        }
    }

    /// Method name in the target schema.
    #[must_use]
    pub const fn target_name(self) -> &'static str {
        match self {
            Self::Schulze => "schulze",
            Self::SortedSchulze => "repeated_schulze",
            Self::SchulzePr => "schulze_pr",
            Self::SchulzeStv => "schulze_stv",
            Self::ScottishStv => "scottish_stv",
            Self::Irv => "irv",
            Self::RepeatedIrv => "repeated_irv",
            Self::CombinedSimple => "combined_simple",
            Self::Dutt => "dutt",
            Self::Majority => "majority",
        }
    }

    /// Ranked-ballot methods whose legacy rankings are inverted on export.
    #[must_use]
    pub const fn is_schulze_family(self) -> bool {
        matches!(
            self,
            Self::Schulze | Self::SortedSchulze | Self::SchulzePr | Self::SchulzeStv
        )
    }

    #[must_use]
    pub const fn is_stv_family(self) -> bool {
        matches!(self, Self::ScottishStv | Self::Irv | Self::RepeatedIrv)
    }
}

impl fmt::Display for VotingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plugin_id())
    }
}

/// Proposal resolution bound to the meeting that owns the poll.
#[derive(Debug)]
pub struct PollScope<'a> {
    registry: &'a mut Registry,
    meeting: Pk,
}

impl<'a> PollScope<'a> {
    pub const fn new(registry: &'a mut Registry, meeting: Pk) -> Self {
        Self { registry, meeting }
    }

    /// Resolve one proposal UID.
    ///
    /// # Errors
    ///
    /// Skip for an unknown UID, abort for a proposal of another meeting.
    pub fn proposal(&mut self, uid: &str) -> Result<Pk, ExportError> {
        self.registry
            .resolve_checked(EntityKind::Proposal, uid, self.meeting)
            .map_err(|err| match err {
                crate::RegistryError::CrossScope { .. } => ExportError::abort(
                    ErrorCode::CrossScopeReference,
                    format!("Must skip export: Proposal from another meeting: {err}"),
                ),
                crate::RegistryError::Unresolved { .. } => err.into(),
            })
    }

    /// Resolve a list of UIDs, keeping order.
    ///
    /// # Errors
    ///
    /// See [`proposal`](Self::proposal).
    pub fn proposals<S: AsRef<str>>(&mut self, uids: &[S]) -> Result<Vec<Pk>, ExportError> {
        uids.iter().map(|uid| self.proposal(uid.as_ref())).collect()
    }
}

/// Everything the transcoder reads from a legacy poll.
#[derive(Debug, Clone, Copy)]
pub struct PollInput<'a> {
    pub plugin: &'a str,
    pub settings: &'a Map<String, Value>,
    pub result: Option<&'a Value>,
    pub closed: bool,
    /// Number of legacy vote objects, clones included.
    pub vote_count: usize,
}

/// Switches that turn soft conditions into diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeOptions {
    pub report_schulze_stv: bool,
}

/// Normalized `(method, settings, result)` triple plus recoverable notes.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodedPoll {
    pub method: VotingMethod,
    pub settings: Map<String, Value>,
    /// `None` unless the poll is closed.
    pub result: Option<Value>,
    pub notes: Vec<Diagnostic>,
}

/// Transcode a poll's settings and, when closed, its result.
///
/// # Errors
///
/// [`ExportError::Skip`] for malformed or incomplete results,
/// [`ExportError::Abort`] for unknown plugins, invalid settings and
/// cross-meeting proposal references.
pub fn transcode_poll(
    input: &PollInput<'_>,
    scope: &mut PollScope<'_>,
    options: TranscodeOptions,
) -> Result<TranscodedPoll, ExportError> {
    let legacy = VotingMethod::from_plugin(input.plugin)?;
    let SettingsOutcome {
        method,
        settings,
        result,
        mut notes,
    } = settings::adjust(legacy, input)?;

    if !input.closed {
        return Ok(TranscodedPoll {
            method,
            settings,
            result: None,
            notes,
        });
    }

    let Some(raw) = result else {
        return Err(ExportError::skip(
            ErrorCode::EmptyPoll,
            "Skipping poll without result data",
        ));
    };

    if method == VotingMethod::SchulzeStv && options.report_schulze_stv {
        notes.push(Diagnostic::new(
            ErrorCode::SchulzeStvExported,
            "Schulze STV poll exported without its election rounds",
        ));
    }

    let mut result = match method {
        VotingMethod::Schulze => schulze::single(&raw, scope)?,
        VotingMethod::SortedSchulze => schulze::repeated(&raw, scope)?,
        VotingMethod::SchulzePr => schulze::proportional(&raw, scope)?,
        VotingMethod::SchulzeStv => schulze::stv(&raw, scope)?,
        VotingMethod::ScottishStv | VotingMethod::Irv | VotingMethod::RepeatedIrv => {
            stv::result(&raw, scope)?
        }
        VotingMethod::CombinedSimple => tally::combined(&raw, scope)?,
        VotingMethod::Dutt => tally::dutt(&raw, scope)?,
        VotingMethod::Majority => tally::majority(&raw, scope)?,
    };
    if let Value::Object(map) = &mut result {
        map.insert("vote_count".into(), Value::from(input.vote_count));
    }

    Ok(TranscodedPoll {
        method,
        settings,
        result: Some(result),
        notes,
    })
}

/// Parse a payload into its per-method schema.
pub(crate) fn parse<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T, ExportError> {
    T::deserialize(value).map_err(|e| {
        ExportError::skip(
            ErrorCode::MalformedResult,
            format!("Malformed {what} result data, skipping: {e}"),
        )
    })
}

/// Results of mapping-shaped methods must be JSON objects.
pub(crate) fn require_object(raw: &Value) -> Result<&Map<String, Value>, ExportError> {
    raw.as_object().ok_or_else(|| {
        ExportError::skip(
            ErrorCode::MalformedResult,
            "Result data isn't a dict, skipping",
        )
    })
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, ExportError> {
    serde_json::to_value(value).map_err(|e| {
        ExportError::skip(
            ErrorCode::MalformedResult,
            format!("Result could not be encoded: {e}"),
        )
    })
}

/// Candidates that are not approved, in candidate order.
pub(crate) fn denied(candidates: &[Pk], approved: &[Pk]) -> Vec<Pk> {
    candidates
        .iter()
        .copied()
        .filter(|pk| !approved.contains(pk))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::registry;
    use super::*;
    use serde_json::json;

    fn run(
        plugin: &str,
        settings: Value,
        result: Value,
        closed: bool,
    ) -> Result<TranscodedPoll, ExportError> {
        run_with(plugin, settings, result, closed, TranscodeOptions::default())
    }

    fn run_with(
        plugin: &str,
        settings: Value,
        result: Value,
        closed: bool,
        options: TranscodeOptions,
    ) -> Result<TranscodedPoll, ExportError> {
        let mut registry = registry(&["uid-a", "uid-b", "uid-c"]);
        let mut scope = PollScope::new(&mut registry, 1);
        let settings = settings.as_object().cloned().unwrap_or_default();
        let input = PollInput {
            plugin,
            settings: &settings,
            result: Some(&result),
            closed,
            vote_count: 2,
        };
        transcode_poll(&input, &mut scope, options)
    }

    #[test]
    fn plugin_ids_round_trip() {
        for method in VotingMethod::ALL {
            assert_eq!(VotingMethod::from_plugin(method.plugin_id()), Ok(method));
        }
        assert_eq!(VotingMethod::Majority.target_name(), "majority");
        assert_eq!(VotingMethod::SortedSchulze.target_name(), "repeated_schulze");
    }

    #[test]
    fn unknown_plugin_is_critical() {
        let err = run("approval", json!({}), json!({}), true).expect_err("unknown");
        assert!(err.is_critical());
        assert_eq!(err.diagnostic().code, ErrorCode::UnknownPlugin);
    }

    #[test]
    fn unknown_plugin_is_critical_for_open_polls_too() {
        let err = run("approval", json!({}), json!({}), false).expect_err("unknown");
        assert!(err.is_critical());
    }

    #[test]
    fn open_poll_has_no_result() {
        let out = run("schulze", json!({"max_stars": 5}), json!({}), false).expect("open");
        assert_eq!(out.result, None);
        assert_eq!(out.method, VotingMethod::Schulze);
    }

    #[test]
    fn closed_schulze_gets_vote_count() {
        let out = run(
            "schulze",
            json!({}),
            json!({"winner": "uid-b", "candidates": ["uid-a", "uid-b", "uid-c"],
                   "pairs": [], "strong_pairs": []}),
            true,
        )
        .expect("closed");
        let result = out.result.expect("result");
        assert_eq!(result["approved"], json!([2]));
        assert_eq!(result["denied"], json!([1, 3]));
        assert_eq!(result["vote_count"], json!(2));
    }

    #[test]
    fn schulze_stv_note_has_its_own_code() {
        let result = json!({"winners": ["uid-a"], "candidates": ["uid-a", "uid-b"]});
        let quiet = run("schulze_stv", json!({}), result.clone(), true).expect("closed");
        assert!(quiet.notes.is_empty());

        let options = TranscodeOptions {
            report_schulze_stv: true,
        };
        let out = run_with("schulze_stv", json!({}), result, true, options).expect("closed");
        assert_eq!(out.notes.len(), 1);
        let note = &out.notes[0];
        assert_eq!(note.code, ErrorCode::SchulzeStvExported);
        assert!(!note.code.is_critical());
        assert!(note.message.contains("election rounds"));
    }

    #[test]
    fn cross_meeting_proposal_aborts() {
        let err = run(
            "schulze",
            json!({}),
            json!({"winner": "other-x", "candidates": ["uid-a"], "pairs": [], "strong_pairs": []}),
            true,
        )
        .expect_err("cross scope");
        assert!(err.is_critical());
        assert_eq!(err.diagnostic().code, ErrorCode::CrossScopeReference);
    }

    #[test]
    fn denied_keeps_candidate_order() {
        assert_eq!(denied(&[5, 3, 9, 1], &[9]), vec![5, 3, 1]);
    }
}
