//! Schulze-family results: single winner, repeated, proportional and STV.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{PollScope, denied, parse, require_object, to_json};
use crate::error::{ErrorCode, ExportError};
use crate::model::Pk;

/// `[[uid_a, uid_b], strength]`
type PairIn = ((String, String), Value);
type PairOut = ([Pk; 2], Value);

/// One decided Schulze round as stored by the legacy plugin.
#[derive(Debug, Deserialize)]
struct RoundIn {
    winner: String,
    #[serde(default)]
    candidates: Option<Vec<String>>,
    #[serde(default)]
    pairs: Option<Vec<PairIn>>,
    #[serde(default)]
    strong_pairs: Option<Vec<PairIn>>,
    #[serde(default)]
    tied_winners: Option<Vec<String>>,
    #[serde(default)]
    tie_breaker: Option<Vec<String>>,
    /// Historic tie-break graph, not carried over.
    #[serde(default, rename = "actions")]
    _actions: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct RoundOut {
    winner: Pk,
    candidates: Vec<Pk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pairs: Option<Vec<PairOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strong_pairs: Option<Vec<PairOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tied_winners: Option<Vec<Pk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tie_breaker: Option<Vec<Pk>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn resolve_pairs(
    pairs: Option<Vec<PairIn>>,
    scope: &mut PollScope<'_>,
) -> Result<Option<Vec<PairOut>>, ExportError> {
    pairs
        .map(|pairs| {
            pairs
                .into_iter()
                .map(|((a, b), strength)| {
                    Ok::<_, ExportError>(([scope.proposal(&a)?, scope.proposal(&b)?], strength))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
}

fn resolve_opt(
    uids: Option<Vec<String>>,
    scope: &mut PollScope<'_>,
) -> Result<Option<Vec<Pk>>, ExportError> {
    uids.map(|uids| scope.proposals(&uids)).transpose()
}

fn reformat_round(round: RoundIn, scope: &mut PollScope<'_>) -> Result<RoundOut, ExportError> {
    let winner = scope.proposal(&round.winner)?;
    // A round decided with nothing else left carries only its winner.
    let candidates = match round.candidates {
        Some(uids) => scope.proposals(&uids)?,
        None => vec![winner],
    };
    Ok(RoundOut {
        winner,
        candidates,
        pairs: resolve_pairs(round.pairs, scope)?,
        strong_pairs: resolve_pairs(round.strong_pairs, scope)?,
        tied_winners: resolve_opt(round.tied_winners, scope)?,
        tie_breaker: resolve_opt(round.tie_breaker, scope)?,
        extra: round.extra,
    })
}

fn missing_winner(key: &str) -> ExportError {
    ExportError::skip(
        ErrorCode::MissingWinner,
        format!("No {key} in result data, skipping"),
    )
}

#[derive(Debug, Serialize)]
struct SingleOut {
    #[serde(flatten)]
    round: RoundOut,
    approved: Vec<Pk>,
    denied: Vec<Pk>,
}

/// `schulze`: one round, one winner.
pub fn single(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    if !require_object(raw)?.contains_key("winner") {
        return Err(missing_winner("winner"));
    }
    let round = reformat_round(parse(raw, "schulze")?, scope)?;
    let approved = vec![round.winner];
    let denied = denied(&round.candidates, &approved);
    to_json(&SingleOut {
        round,
        approved,
        denied,
    })
}

#[derive(Debug, Deserialize)]
struct RepeatedIn {
    winners: Vec<String>,
    candidates: Vec<String>,
    #[serde(default)]
    rounds: Vec<RoundIn>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct RepeatedOut {
    candidates: Vec<Pk>,
    approved: Vec<Pk>,
    denied: Vec<Pk>,
    rounds: Vec<RoundOut>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// `sorted_schulze`: every round is a single-winner result; the overall
/// winners become `approved` and are not kept as a separate key.
pub fn repeated(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    if !require_object(raw)?.contains_key("winners") {
        return Err(missing_winner("winners"));
    }
    let input: RepeatedIn = parse(raw, "sorted_schulze")?;
    let candidates = scope.proposals(&input.candidates)?;
    let approved = scope.proposals(&input.winners)?;
    let denied = denied(&candidates, &approved);
    let rounds = input
        .rounds
        .into_iter()
        .map(|round| reformat_round(round, scope))
        .collect::<Result<Vec<_>, _>>()?;
    to_json(&RepeatedOut {
        candidates,
        approved,
        denied,
        rounds,
        extra: input.extra,
    })
}

#[derive(Debug, Deserialize)]
struct ProportionalIn {
    candidates: Vec<String>,
    order: Vec<String>,
    #[serde(default)]
    rounds: Vec<ProportionalRound<String>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ProportionalRound<T> {
    winner: T,
}

#[derive(Debug, Serialize)]
struct ProportionalOut {
    candidates: Vec<Pk>,
    order: Vec<Pk>,
    rounds: Vec<ProportionalRound<Pk>>,
    approved: Vec<Pk>,
    denied: Vec<Pk>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// `schulze_pr`: a ranking, no approve/deny decision.
pub fn proportional(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    require_object(raw)?;
    let input: ProportionalIn = parse(raw, "schulze_pr")?;
    let candidates = scope.proposals(&input.candidates)?;
    let order = scope.proposals(&input.order)?;
    let rounds = input
        .rounds
        .into_iter()
        .map(|round| {
            scope
                .proposal(&round.winner)
                .map(|winner| ProportionalRound { winner })
        })
        .collect::<Result<Vec<_>, _>>()?;
    to_json(&ProportionalOut {
        candidates,
        order,
        rounds,
        approved: Vec::new(),
        denied: Vec::new(),
        extra: input.extra,
    })
}

#[derive(Debug, Deserialize)]
struct StvIn {
    #[serde(default)]
    winners: Option<Vec<String>>,
    candidates: Vec<String>,
    #[serde(default)]
    tie_breaker: Option<Vec<String>>,
    #[serde(default)]
    tied_winners: Option<Vec<Vec<String>>>,
    #[serde(default, rename = "actions")]
    _actions: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct StvOut {
    winners: Vec<Pk>,
    approved: Vec<Pk>,
    candidates: Vec<Pk>,
    denied: Vec<Pk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tie_breaker: Option<Vec<Pk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tied_winners: Option<Vec<Pk>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// `schulze_stv`: tied winner groups are flattened, audit actions dropped.
pub fn stv(raw: &Value, scope: &mut PollScope<'_>) -> Result<Value, ExportError> {
    require_object(raw)?;
    let input: StvIn = parse(raw, "schulze_stv")?;
    let tie_breaker = resolve_opt(input.tie_breaker, scope)?;
    let tied_winners = input
        .tied_winners
        .map(|groups| scope.proposals(&groups.concat()))
        .transpose()?;
    let candidates = scope.proposals(&input.candidates)?;
    let winners = scope.proposals(&input.winners.ok_or_else(|| missing_winner("winners"))?)?;
    let denied = denied(&candidates, &winners);
    to_json(&StvOut {
        approved: winners.clone(),
        winners,
        candidates,
        denied,
        tie_breaker,
        tied_winners,
        extra: input.extra,
    })
}
