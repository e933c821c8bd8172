//! Count-based results: `combined_simple`, `dutt_poll` and `majority_poll`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PollScope, parse, require_object, to_json};
use crate::error::{ErrorCode, ExportError};
use crate::model::Pk;

#[derive(Debug, Deserialize)]
struct CombinedIn {
    approve: u64,
    deny: u64,
    abstain: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

#[derive(Debug, Serialize)]
struct CombinedOut {
    results: BTreeMap<Pk, Tally>,
    approved: Vec<Pk>,
    denied: Vec<Pk>,
}

/// `combined_simple`: a yes/no/abstain tally per proposal. Only strict
/// majorities decide; a tie leaves the proposal in neither list.
pub fn combined(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    let entries = require_object(raw)?;
    let mut results = BTreeMap::new();
    for (uid, tally) in entries {
        let tally: CombinedIn = parse(tally, "combined_simple")?;
        results.insert(
            scope.proposal(uid)?,
            Tally {
                yes: tally.approve,
                no: tally.deny,
                abstain: tally.abstain,
            },
        );
    }
    let approved = results
        .iter()
        .filter(|(_, t)| t.yes > t.no)
        .map(|(pk, _)| *pk)
        .collect();
    let denied = results
        .iter()
        .filter(|(_, t)| t.no > t.yes)
        .map(|(pk, _)| *pk)
        .collect();
    to_json(&CombinedOut {
        results,
        approved,
        denied,
    })
}

#[derive(Debug, Deserialize)]
struct DuttRow {
    num: u64,
    uid: String,
}

#[derive(Debug, Serialize)]
struct VotesRow {
    votes: u64,
    proposal: Pk,
}

#[derive(Debug, Serialize)]
struct DuttOut {
    results: Vec<VotesRow>,
}

fn require_rows(raw: &Value) -> Result<&Vec<Value>, ExportError> {
    raw.as_array().ok_or_else(|| {
        ExportError::skip(
            ErrorCode::MalformedResult,
            "Result data isn't a list, skipping",
        )
    })
}

/// `dutt_poll`: `[{num, uid, percent}]` becomes `{results: [{votes, proposal}]}`.
pub fn dutt(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    let rows = require_rows(raw)?;
    if rows.first().is_some_and(|row| row.get("num").is_none()) {
        return Err(ExportError::skip(
            ErrorCode::MalformedResult,
            "Dutt poll with bad result data, skipping",
        ));
    }
    let results = rows
        .iter()
        .map(|row| {
            let row: DuttRow = parse(row, "dutt_poll")?;
            Ok::<_, ExportError>(VotesRow {
                votes: row.num,
                proposal: scope.proposal(&row.uid)?,
            })
        })
        .collect::<Result<Vec<_>, ExportError>>()?;
    to_json(&DuttOut { results })
}

#[derive(Debug, Deserialize)]
struct MajorityRow {
    count: u64,
    uid: MajorityChoice,
}

#[derive(Debug, Deserialize)]
struct MajorityChoice {
    proposal: String,
}

#[derive(Debug, Serialize)]
struct MajorityOut {
    results: Vec<VotesRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    approved: Option<Vec<Pk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denied: Option<Vec<Pk>>,
}

/// `majority_poll`: results sorted ascending by votes. The top proposal is
/// approved only when it strictly beats the runner-up; a tie at the top
/// yields no decision at all.
pub fn majority(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    let rows = require_rows(raw)?;
    let mut results = rows
        .iter()
        .map(|row| {
            let row: MajorityRow = parse(row, "majority_poll")?;
            Ok::<_, ExportError>(VotesRow {
                votes: row.count,
                proposal: scope.proposal(&row.uid.proposal)?,
            })
        })
        .collect::<Result<Vec<_>, ExportError>>()?;
    results.sort_by_key(|row| row.votes);

    let (approved, denied) = match results.as_slice() {
        [only] => (Some(vec![only.proposal]), None),
        [rest @ .., runner_up, top] if top.votes != runner_up.votes => (
            Some(vec![top.proposal]),
            Some(
                rest.iter()
                    .chain(std::iter::once(runner_up))
                    .map(|row| row.proposal)
                    .collect(),
            ),
        ),
        _ => (None, None),
    };
    to_json(&MajorityOut {
        results,
        approved,
        denied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::transcode::test_support::registry;
    use proptest::prelude::*;
    use serde_json::json;

    fn fixture() -> Registry {
        registry(&["uid-a", "uid-b", "uid-c"])
    }

    fn majority_rows(counts: &[(u64, &str)]) -> Value {
        Value::Array(
            counts
                .iter()
                .map(|(count, uid)| json!({"count": count, "num": "0.5", "uid": {"proposal": uid}}))
                .collect(),
        )
    }

    #[test]
    fn combined_strict_majorities() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = json!({
            "uid-a": {"approve": 5, "deny": 2, "abstain": 0},
            "uid-b": {"approve": 1, "deny": 4, "abstain": 1},
            "uid-c": {"approve": 3, "deny": 3, "abstain": 2}
        });
        let out = combined(&raw, &mut scope).expect("transcode");
        assert_eq!(out["results"]["1"], json!({"yes": 5, "no": 2, "abstain": 0}));
        assert_eq!(out["approved"], json!([1]));
        assert_eq!(out["denied"], json!([2]));
    }

    #[test]
    fn dutt_rows_are_renamed() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = json!([
            {"num": 4, "percent": "57.1%", "uid": "uid-b"},
            {"num": 1, "percent": "14.3%", "uid": "uid-a"}
        ]);
        let out = dutt(&raw, &mut scope).expect("transcode");
        assert_eq!(
            out,
            json!({"results": [{"votes": 4, "proposal": 2}, {"votes": 1, "proposal": 1}]})
        );
    }

    #[test]
    fn dutt_without_num_is_skip() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let err = dutt(&json!([{"uid": "uid-a"}]), &mut scope).expect_err("bad rows");
        assert!(!err.is_critical());
    }

    #[test]
    fn majority_clear_winner() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = majority_rows(&[(350, "uid-a"), (145, "uid-b"), (20, "uid-c")]);
        let out = majority(&raw, &mut scope).expect("transcode");
        assert_eq!(out["results"][0], json!({"votes": 20, "proposal": 3}));
        assert_eq!(out["approved"], json!([1]));
        assert_eq!(out["denied"], json!([3, 2]));
    }

    #[test]
    fn majority_tie_below_the_top_still_decides() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = majority_rows(&[(2, "uid-b"), (10, "uid-a"), (2, "uid-c")]);
        let out = majority(&raw, &mut scope).expect("transcode");
        assert_eq!(out["approved"], json!([1]));
        assert_eq!(out["denied"], json!([2, 3]));
    }

    #[test]
    fn majority_tie_at_top_has_no_decision() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = majority_rows(&[(10, "uid-a"), (10, "uid-b"), (2, "uid-c")]);
        let out = majority(&raw, &mut scope).expect("transcode");
        assert!(out.get("approved").is_none());
        assert!(out.get("denied").is_none());
    }

    #[test]
    fn majority_single_result_is_approved() {
        let mut registry = fixture();
        let mut scope = PollScope::new(&mut registry, 1);
        let out = majority(&majority_rows(&[(3, "uid-b")]), &mut scope).expect("transcode");
        assert_eq!(out["approved"], json!([2]));
        assert!(out.get("denied").is_none());
    }

    proptest! {
        #[test]
        fn majority_decision_invariant(counts in prop::collection::vec(0_u64..20, 2..4)) {
            let uids = ["uid-a", "uid-b", "uid-c"];
            let rows: Vec<(u64, &str)> = counts.iter().copied().zip(uids).collect();
            let mut registry = fixture();
            let mut scope = PollScope::new(&mut registry, 1);
            let out = majority(&majority_rows(&rows), &mut scope).expect("transcode");

            let mut sorted = counts.clone();
            sorted.sort_unstable();
            let top = sorted[sorted.len() - 1];
            let runner_up = sorted[sorted.len() - 2];
            if top == runner_up {
                prop_assert!(out.get("approved").is_none());
                prop_assert!(out.get("denied").is_none());
            } else {
                prop_assert_eq!(out["approved"].as_array().map(Vec::len), Some(1));
                prop_assert_eq!(out["denied"].as_array().map(Vec::len), Some(counts.len() - 1));
            }
        }
    }
}
