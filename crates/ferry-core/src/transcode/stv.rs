//! STV-family results (`scottish_stv`, `irv`, `repeated_irv`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{PollScope, denied, parse, require_object, to_json};
use crate::error::{ErrorCode, ExportError};
use crate::model::Pk;

/// Vote counts are decimals; the legacy dump has them as numbers or text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DecimalIn {
    Number(Number),
    Text(String),
}

impl DecimalIn {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoundIn {
    #[serde(default)]
    selected: Vec<String>,
    /// A list of `{uid: count}` mappings.
    #[serde(default)]
    vote_count: Vec<BTreeMap<String, DecimalIn>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct RoundOut {
    selected: Vec<Pk>,
    vote_count: Vec<(Pk, String)>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ResultIn {
    #[serde(default)]
    winners: Option<Vec<String>>,
    candidates: Vec<String>,
    #[serde(default)]
    rounds: Vec<RoundIn>,
    #[serde(default)]
    empty_ballot_count: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ResultOut {
    winners: Vec<Pk>,
    approved: Vec<Pk>,
    candidates: Vec<Pk>,
    denied: Vec<Pk>,
    rounds: Vec<RoundOut>,
    empty_ballot_count: Value,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn reformat_round(round: RoundIn, scope: &mut PollScope<'_>) -> Result<RoundOut, ExportError> {
    let selected = scope.proposals(&round.selected)?;
    let mut vote_count = Vec::new();
    for entry in round.vote_count {
        for (uid, count) in entry {
            vote_count.push((scope.proposal(&uid)?, count.into_text()));
        }
    }
    Ok(RoundOut {
        selected,
        vote_count,
        extra: round.extra,
    })
}

/// Winners become `approved`, every round's counts become `[pk, "decimal"]`
/// pairs, and `empty_ballot_count` is always present.
pub fn result(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    require_object(raw)?;
    let input: ResultIn = parse(raw, "STV")?;
    let Some(winner_uids) = input.winners else {
        return Err(ExportError::skip(
            ErrorCode::MissingWinner,
            "No winners in result data, skipping",
        ));
    };
    let winners = scope.proposals(&winner_uids)?;
    let candidates = scope.proposals(&input.candidates)?;
    let denied = denied(&candidates, &winners);
    let rounds = input
        .rounds
        .into_iter()
        .map(|round| reformat_round(round, scope))
        .collect::<Result<Vec<_>, _>>()?;
    to_json(&ResultOut {
        approved: winners.clone(),
        winners,
        candidates,
        denied,
        rounds,
        empty_ballot_count: input.empty_ballot_count.unwrap_or_else(|| Value::from(0)),
        extra: input.extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::test_support::registry;
    use serde_json::json;

    #[test]
    fn rounds_are_rebuilt_with_decimal_strings() {
        let mut registry = registry(&["uid-a", "uid-b", "uid-c"]);
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = json!({
            "complete": false,
            "quota": 1,
            "winners": ["uid-c"],
            "candidates": ["uid-a", "uid-b", "uid-c"],
            "rounds": [{
                "status": "Elected",
                "method": "Direct",
                "selected": ["uid-c"],
                "vote_count": [{"uid-a": 0}, {"uid-b": "0.5"}, {"uid-c": 2}]
            }]
        });
        let out = result(&raw, &mut scope).expect("transcode");
        assert_eq!(out["winners"], json!([3]));
        assert_eq!(out["approved"], json!([3]));
        assert_eq!(out["denied"], json!([1, 2]));
        assert_eq!(out["empty_ballot_count"], json!(0));
        assert_eq!(out["quota"], json!(1));
        let round = &out["rounds"][0];
        assert_eq!(round["selected"], json!([3]));
        assert_eq!(round["vote_count"], json!([[1, "0"], [2, "0.5"], [3, "2"]]));
        assert_eq!(round["status"], json!("Elected"));
    }

    #[test]
    fn existing_empty_ballot_count_is_kept() {
        let mut registry = registry(&["uid-a"]);
        let mut scope = PollScope::new(&mut registry, 1);
        let raw = json!({"winners": ["uid-a"], "candidates": ["uid-a"], "rounds": [], "empty_ballot_count": 4});
        let out = result(&raw, &mut scope).expect("transcode");
        assert_eq!(out["empty_ballot_count"], json!(4));
    }

    #[test]
    fn missing_winners_is_skip() {
        let mut registry = registry(&["uid-a"]);
        let mut scope = PollScope::new(&mut registry, 1);
        let err = result(&json!({"candidates": ["uid-a"]}), &mut scope).expect_err("no winners");
        assert_eq!(err.diagnostic().code, ErrorCode::MissingWinner);
    }
}
