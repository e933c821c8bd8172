//! Polls, their votes and the electoral register each closed poll implies.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use super::meeting::MeetingScope;
use super::{Exporter, clip};
use crate::error::{Diagnostic, ErrorCode, ExportError, Halt};
use crate::model::fields::{PollFields, VoteFields};
use crate::model::{EntityKind, Pk};
use crate::register::{PendingRegister, RegisterSource};
use crate::source::{Poll, Vote};
use crate::transcode::{
    PollInput, PollScope, TranscodeOptions, VotingMethod, settings, transcode_ballot,
    transcode_poll,
};

const MAX_POLL_TITLE_LEN: usize = 70;

fn has_result(result: Option<&Value>) -> bool {
    match result {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(rows)) => !rows.is_empty(),
        Some(_) => true,
    }
}

pub(super) fn export_poll(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    ai_path: &str,
    ai_pk: Pk,
    poll: &Poll,
) -> Result<(), Halt> {
    let path = format!("{ai_path}/{}", poll.name);
    let closed = poll.is_closed();

    if !closed && ex.config.report_not_closed {
        ex.ledger.report(
            &path,
            Diagnostic::new(
                ErrorCode::PollNotClosed,
                format!("Warning: not closed, state is {}", poll.state),
            ),
        )?;
    }
    if poll.is_ongoing() && scope.latest_register.is_none() {
        ex.ledger.report(
            &path,
            Diagnostic::new(
                ErrorCode::PollWithoutRegister,
                "Ongoing poll but meeting has no electoral register, skipping",
            ),
        )?;
        return Ok(());
    }
    if closed && (poll.votes.is_empty() || !has_result(poll.result.as_ref())) {
        debug!(path = %path, votes = poll.votes.len(), "skipping empty poll");
        if ex.config.report_empty_polls {
            ex.ledger.report(
                &path,
                Diagnostic::new(
                    ErrorCode::EmptyPoll,
                    "Closed poll without votes or result, skipping",
                ),
            )?;
        }
        return Ok(());
    }

    let Some(proposals) = poll_proposals(ex, scope, &path, poll)? else {
        return Ok(());
    };
    let Some(legacy) = ex.settle(&path, VotingMethod::from_plugin(&poll.plugin))? else {
        return Ok(());
    };

    let input = PollInput {
        plugin: &poll.plugin,
        settings: &poll.settings,
        result: poll.result.as_ref(),
        closed,
        vote_count: poll.votes.len(),
    };
    let options = TranscodeOptions {
        report_schulze_stv: ex.config.report_schulze_stv,
    };
    let transcoded = transcode_poll(
        &input,
        &mut PollScope::new(&mut ex.registry, scope.pk),
        options,
    );
    let Some(transcoded) = ex.settle(&path, transcoded)? else {
        return Ok(());
    };
    for note in transcoded.notes {
        ex.ledger.report(&path, note)?;
    }

    // Votes point at the poll, which is appended after them.
    let poll_pk = ex.registry.next_pk(EntityKind::Poll);
    let mut fields = PollFields {
        title: clip(&poll.title, MAX_POLL_TITLE_LEN),
        modified: poll.modified,
        created: poll.created,
        started: poll.start_time,
        closed: poll.end_time,
        body: poll.description.clone(),
        state: if closed {
            "finished".to_string()
        } else {
            poll.state.clone()
        },
        meeting: scope.pk,
        agenda_item: ai_pk,
        method_name: transcoded.method.target_name(),
        proposals,
        electoral_register: if poll.is_ongoing() {
            scope.latest_register
        } else {
            None
        },
        settings_data: transcoded.settings,
        abstains: 0,
        result_data: transcoded.result,
        ballot_data: closed.then(|| poll.ballots.clone().unwrap_or(Value::Null)),
    };

    if closed {
        let classified = classify_votes(ex, &path, poll)?;
        let weights = electorate(ex, scope, &path, poll, &classified)?;
        let mut ballots = BallotContext {
            legacy,
            max_stars: settings::max_stars(&poll.settings),
            poll_pk,
            voted: HashSet::new(),
        };
        for vote in classified.primaries {
            export_vote(ex, scope, &path, &mut ballots, vote)?;
        }

        let pending = PendingRegister {
            created: poll.start_time,
            meeting: scope.pk,
            source: RegisterSource::Votes,
        };
        let linked = scope.registers.register_or_reuse(
            &mut fields,
            pending,
            &weights,
            &mut ex.registry,
            &mut ex.stream,
        );
        ex.settle(&path, linked)?;
    }

    ex.emit(&path, EntityKind::Poll, &fields)?;
    Ok(())
}

/// Resolve the poll's proposals. A deleted proposal drops the whole poll.
fn poll_proposals(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    path: &str,
    poll: &Poll,
) -> Result<Option<Vec<Pk>>, Halt> {
    let mut pks = Vec::with_capacity(poll.proposals.len());
    for uid in &poll.proposals {
        match PollScope::new(&mut ex.registry, scope.pk).proposal(uid) {
            Ok(pk) => pks.push(pk),
            Err(ExportError::Skip(_)) => {
                ex.ledger.report(
                    path,
                    Diagnostic::new(
                        ErrorCode::UnresolvedReference,
                        format!(
                            "Must skip export: Poll in state {} contains deleted proposal uid: {uid}",
                            poll.state
                        ),
                    ),
                )?;
                return Ok(None);
            }
            Err(err) => {
                ex.ledger.record(path, err)?;
                return Ok(None);
            }
        }
    }
    Ok(Some(pks))
}

/// Votes split into primaries and clone counts.
struct Classified<'p> {
    primaries: Vec<&'p Vote>,
    clones: HashMap<String, u32>,
}

/// A primary vote is stored under its creator's userid; any other vote by
/// the same creator is a clone that adds weight.
fn classify_votes<'p>(
    ex: &mut Exporter<'_>,
    path: &str,
    poll: &'p Poll,
) -> Result<Classified<'p>, Halt> {
    let mut classified = Classified {
        primaries: Vec::new(),
        clones: HashMap::new(),
    };
    for vote in &poll.votes {
        match vote.creator.as_deref() {
            Some(creator) if creator == vote.name => classified.primaries.push(vote),
            Some(creator) if !creator.is_empty() => {
                *classified.clones.entry(creator.to_lowercase()).or_insert(0) += 1;
            }
            _ => {
                ex.ledger.critical(
                    &format!("{path}/{}", vote.name),
                    Diagnostic::new(ErrorCode::VoteWithoutCreator, "Vote has no creator"),
                )?;
            }
        }
    }
    Ok(classified)
}

/// Voter weights implied by a closed poll. With clones present only the
/// voters themselves are known; otherwise everyone who could vote when the
/// poll closed is included.
fn electorate(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    path: &str,
    poll: &Poll,
    classified: &Classified<'_>,
) -> Result<Vec<(Pk, u32)>, Halt> {
    let mut userids: BTreeMap<String, u32> = BTreeMap::new();
    for vote in &classified.primaries {
        let userid = vote.name.to_lowercase();
        let weight = 1 + classified.clones.get(&userid).copied().unwrap_or(0);
        userids.insert(userid, weight);
    }
    if classified.clones.is_empty() {
        for userid in &poll.voters_mark_closed {
            userids.entry(userid.to_lowercase()).or_insert(1);
        }
    }

    let mut weights = Vec::with_capacity(userids.len());
    for (userid, weight) in userids {
        if let Some(pk) = ex.member(scope, path, &userid, Some("in poll"))? {
            weights.push((pk, weight));
        }
    }
    Ok(weights)
}

/// Per-poll state shared by its votes.
struct BallotContext {
    legacy: VotingMethod,
    max_stars: i64,
    poll_pk: Pk,
    /// Users that already have a vote in this poll.
    voted: HashSet<Pk>,
}

fn export_vote(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    poll_path: &str,
    ballots: &mut BallotContext,
    vote: &Vote,
) -> Result<(), Halt> {
    let path = format!("{poll_path}/{}", vote.name);
    if ex.registry.peek(EntityKind::User, &vote.name).is_none() {
        ex.ledger.critical(
            &path,
            Diagnostic::new(ErrorCode::DuplicateVote, "Duplicate vote or deleted user"),
        )?;
        return Ok(());
    }
    let Some(user) = ex.member(scope, &path, &vote.name, None)? else {
        return Ok(());
    };
    if !ballots.voted.insert(user) {
        ex.ledger.critical(
            &path,
            Diagnostic::new(
                ErrorCode::DuplicateVote,
                format!("Duplicate vote from {} in one poll, later vote dropped", vote.name),
            ),
        )?;
        return Ok(());
    }

    let encoded = transcode_ballot(
        ballots.legacy,
        ballots.max_stars,
        &vote.data,
        &mut PollScope::new(&mut ex.registry, scope.pk),
    )
    .and_then(|ballot| ballot.encode());
    let Some(vote_data) = ex.settle(&path, encoded)? else {
        return Ok(());
    };
    let fields = VoteFields {
        user,
        poll: ballots.poll_pk,
        created: vote.created,
        changed: vote.modified,
        vote_data,
    };
    ex.emit(&path, EntityKind::Vote, &fields)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_results_are_detected() {
        assert!(!has_result(None));
        assert!(!has_result(Some(&Value::Null)));
        assert!(!has_result(Some(&json!({}))));
        assert!(!has_result(Some(&json!([]))));
        assert!(has_result(Some(&json!({"winner": "a"}))));
        assert!(has_result(Some(&json!([{"num": 1}]))));
    }
}
