//! Ballot transcoding: one legacy vote payload to one `vote_data` string.
//!
//! Dispatch is on the legacy plugin, independent of the result transcoder,
//! so a `sorted_schulze` poll exported as `schulze` still gets ranking
//! ballots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{PollScope, VotingMethod};
use crate::error::{ErrorCode, ExportError};
use crate::model::Pk;

/// A transcoded ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ballot {
    /// `(proposal, points)` sorted by proposal, higher is better.
    Ranking(Vec<(Pk, i64)>),
    Choice(Pk),
    Partition(Partition),
    /// Unordered multi-select, sorted.
    Selection(Vec<Pk>),
    /// Preference order, first is most preferred.
    Order(Vec<Pk>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub yes: Vec<Pk>,
    pub no: Vec<Pk>,
    pub abstain: Vec<Pk>,
}

#[derive(Serialize)]
struct ChoiceOut {
    choice: Pk,
}

impl Ballot {
    /// Encode as the target's `vote_data` text: compact JSON, except STV
    /// orders which are a comma-joined pk list.
    ///
    /// # Errors
    ///
    /// Only if JSON encoding fails.
    pub fn encode(&self) -> Result<String, ExportError> {
        let encoded = match self {
            Self::Ranking(items) => serde_json::to_string(items),
            Self::Choice(choice) => serde_json::to_string(&ChoiceOut { choice: *choice }),
            Self::Partition(partition) => serde_json::to_string(partition),
            Self::Selection(pks) => serde_json::to_string(pks),
            Self::Order(pks) => {
                return Ok(pks
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(","));
            }
        };
        encoded.map_err(|e| ExportError::skip(ErrorCode::MalformedBallot, e.to_string()))
    }
}

/// Legacy rankings are 1 = best; target points are `max_stars` = best.
/// `None` when the arithmetic leaves `i64`.
#[must_use]
pub const fn remap_rank(rank: i64, max_stars: i64) -> Option<i64> {
    match max_stars.checked_add(1) {
        Some(top) => top.checked_sub(rank),
        None => None,
    }
}

/// Remap every rank and sort by proposal pk.
///
/// # Errors
///
/// A rank above `max_stars + 1`, or one whose remap overflows, is
/// critical: the vote contradicts its poll's settings.
pub fn remap_ranking(
    items: &[(Pk, i64)],
    max_stars: i64,
) -> Result<Vec<(Pk, i64)>, ExportError> {
    let out_of_range = |rank: i64| {
        ExportError::abort(
            ErrorCode::RankingOutOfRange,
            format!("Poll contained setting max_stars {max_stars} but has votes with {rank}"),
        )
    };
    let mut remapped = Vec::with_capacity(items.len());
    for &(pk, rank) in items {
        let in_range = max_stars.checked_add(1).is_some_and(|top| rank <= top);
        match remap_rank(rank, max_stars) {
            Some(points) if in_range => remapped.push((pk, points)),
            _ => return Err(out_of_range(rank)),
        }
    }
    remapped.sort_by_key(|(pk, _)| *pk);
    Ok(remapped)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RankIn {
    Int(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct MajorityIn {
    proposal: String,
}

#[derive(Debug, Deserialize)]
struct ListIn {
    proposals: Vec<String>,
}

fn parse_ballot<T: DeserializeOwned>(data: &Value, method: VotingMethod) -> Result<T, ExportError> {
    T::deserialize(data).map_err(|e| {
        ExportError::skip(
            ErrorCode::MalformedBallot,
            format!("Malformed {method} vote data: {e}"),
        )
    })
}

fn corrupt(method: VotingMethod, detail: &str) -> ExportError {
    ExportError::skip(
        ErrorCode::MalformedBallot,
        format!("Corrupt data within {method} vote data: {detail}"),
    )
}

/// Transcode one legacy vote payload.
///
/// # Errors
///
/// Skip for malformed payloads or unknown proposals, abort for rankings
/// beyond `max_stars` and cross-meeting proposals.
pub fn transcode_ballot(
    method: VotingMethod,
    max_stars: i64,
    data: &Value,
    scope: &mut PollScope<'_>,
) -> Result<Ballot, ExportError> {
    match method {
        VotingMethod::Majority => {
            let ballot: MajorityIn = parse_ballot(data, method)?;
            Ok(Ballot::Choice(scope.proposal(&ballot.proposal)?))
        }
        VotingMethod::Schulze
        | VotingMethod::SortedSchulze
        | VotingMethod::SchulzePr
        | VotingMethod::SchulzeStv => {
            let ranking: BTreeMap<String, RankIn> = parse_ballot(data, method)?;
            let mut items = Vec::with_capacity(ranking.len());
            for (uid, rank) in ranking {
                let rank = match rank {
                    RankIn::Int(rank) => rank,
                    RankIn::Text(text) => text
                        .trim()
                        .parse()
                        .map_err(|_| corrupt(method, &format!("ranking '{text}'")))?,
                };
                items.push((scope.proposal(&uid)?, rank));
            }
            Ok(Ballot::Ranking(remap_ranking(&items, max_stars)?))
        }
        VotingMethod::CombinedSimple => {
            let choices: BTreeMap<String, String> = parse_ballot(data, method)?;
            let mut partition = Partition::default();
            for (uid, choice) in choices {
                let pk = scope.proposal(&uid)?;
                match choice.as_str() {
                    "approve" => partition.yes.push(pk),
                    "deny" => partition.no.push(pk),
                    "abstain" | "" => partition.abstain.push(pk),
                    other => return Err(corrupt(method, &format!("choice '{other}'"))),
                }
            }
            partition.yes.sort_unstable();
            partition.no.sort_unstable();
            partition.abstain.sort_unstable();
            Ok(Ballot::Partition(partition))
        }
        VotingMethod::Dutt => {
            let ballot: ListIn = parse_ballot(data, method)?;
            let mut pks = scope.proposals(&ballot.proposals)?;
            pks.sort_unstable();
            Ok(Ballot::Selection(pks))
        }
        VotingMethod::ScottishStv | VotingMethod::Irv | VotingMethod::RepeatedIrv => {
            let ballot: ListIn = parse_ballot(data, method)?;
            Ok(Ballot::Order(scope.proposals(&ballot.proposals)?))
        }
    }
}
