//! Per-meeting export: the meeting record and everything that hangs off it
//! before the agenda is walked.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use super::{Exporter, agenda, clip, speakers};
use crate::error::{Diagnostic, ErrorCode, Halt};
use crate::model::fields::{
    GroupMembershipFields, GroupRoleFields, MeetingFields, MeetingGroupFields, MeetingRolesFields,
    ParticipantNumberFields, ParticipantNumberSystemFields, ReactionButtonFields, ReactionFields,
};
use crate::model::{EntityKind, Pk};
use crate::register::{PendingRegister, RegisterDedup, RegisterSource, emit_register};
use crate::source::{Delegation, Meeting, Timestamp, VoteGroup, VoteGroupRole};

const MAX_TITLE_LEN: usize = 100;
const MAX_PARTICIPANT_NUMBER: i64 = 1 << 15;
const VOTER_ROLE: &str = "role:Voter";

/// Legacy role -> target meeting role. `None` drops the role.
const ROLE_MAP: [(&str, Option<&str>); 10] = [
    ("role:Viewer", Some("participant")),
    ("role:Moderator", Some("moderator")),
    (VOTER_ROLE, Some("potential_voter")),
    ("role:Discuss", Some("discusser")),
    ("role:Propose", Some("proposer")),
    ("role:Administrator", None),
    ("role:Meeting creator", None),
    ("role:Owner", None),
    ("role:Reviewer", None),
    ("role:Editor", None),
];

/// Roles carried by every group role the dialects install.
const GROUP_ROLE_GRANTS: [&str; 3] = ["proposer", "potential_voter", "discusser"];

fn target_role(legacy: &str) -> Option<Option<&'static str>> {
    ROLE_MAP
        .iter()
        .find(|(name, _)| *name == legacy)
        .map(|(_, target)| *target)
}

fn like_model(legacy: &str) -> Option<&'static str> {
    match legacy {
        "DiscussionPost" => Some("discussion_post"),
        "Meeting" => Some("meeting"),
        "Proposal" => Some("proposal"),
        _ => None,
    }
}

/// A like waiting for the meeting's reaction button.
#[derive(Debug, Clone, Copy)]
pub(super) struct PendingReaction {
    pub(super) content_type: [&'static str; 2],
    pub(super) object_id: Pk,
    pub(super) user: Pk,
    pub(super) agenda_item: Pk,
}

/// State that lives for exactly one meeting.
#[derive(Debug)]
pub(super) struct MeetingScope {
    pub(super) pk: Pk,
    pub(super) name: String,
    pub(super) path: String,
    /// Users with an exported role assignment.
    pub(super) members: HashSet<Pk>,
    /// System userid (lowercased) -> the meeting group standing in for it.
    pub(super) system_groups: HashMap<String, Pk>,
    groupids: HashSet<String>,
    /// Holders of the voter role, for a synthesized register.
    voters: BTreeSet<String>,
    pub(super) participant_numbers: HashMap<i64, String>,
    pub(super) latest_register: Option<Pk>,
    pub(super) registers: RegisterDedup,
    /// Agenda item uid -> (pk, created).
    pub(super) agenda_items: HashMap<String, (Pk, Timestamp)>,
    /// Proposal ids already used per agenda item.
    pub(super) prop_ids: HashMap<Pk, HashSet<String>>,
    /// (agenda item pk, 0-based paragraph index) -> paragraph pk.
    pub(super) paragraphs: HashMap<(Pk, u32), Pk>,
    pub(super) reactions: Vec<PendingReaction>,
}

impl MeetingScope {
    fn new(pk: Pk, meeting: &Meeting) -> Self {
        Self {
            pk,
            name: meeting.name.clone(),
            path: format!("/{}", meeting.name),
            members: HashSet::new(),
            system_groups: HashMap::new(),
            groupids: HashSet::new(),
            voters: BTreeSet::new(),
            participant_numbers: HashMap::new(),
            latest_register: None,
            registers: RegisterDedup::new(),
            agenda_items: HashMap::new(),
            prop_ids: HashMap::new(),
            paragraphs: HashMap::new(),
            reactions: Vec::new(),
        }
    }
}

/// `(er_policy_name, installed_dialect)` for meetings with group voting.
/// Delegations win when both are present.
fn dialect(meeting: &Meeting) -> Option<(&'static str, &'static str)> {
    if meeting.delegations.is_some() {
        Some(("gv_auto_before_p", "sfsfum"))
    } else if meeting.vote_groups.is_some() {
        Some(("main_subst_active", "ordinarie_och_ersattare"))
    } else {
        None
    }
}

pub(super) fn export_meeting(ex: &mut Exporter<'_>, meeting: &Meeting) -> Result<(), Halt> {
    let path = format!("/{}", meeting.name);
    info!(meeting = %meeting.name, "exporting meeting");

    if meeting.multiple_votes {
        ex.ledger.critical(
            &path,
            Diagnostic::new(
                ErrorCode::MultipleVotesMeeting,
                "Multi-votes activated, adjust export",
            ),
        )?;
    }

    let dialect = dialect(meeting);
    let fields = MeetingFields {
        title: clip(&meeting.title, MAX_TITLE_LEN),
        modified: meeting.modified,
        created: meeting.created,
        body: meeting.body.clone(),
        state: meeting.state.clone(),
        start_time: meeting.start_time,
        end_time: meeting.end_time,
        er_policy_name: dialect.map(|(policy, _)| policy.to_string()),
        organisation: 1,
        installed_dialect: dialect.map(|(_, name)| name.to_string()),
        group_roles_active: dialect.map(|_| true),
        group_votes_active: dialect.map(|_| true),
    };
    let Some(meeting_pk) = ex.emit(&path, EntityKind::Meeting, &fields)? else {
        return Ok(());
    };
    let mut scope = MeetingScope::new(meeting_pk, meeting);

    system_user_groups(ex, &mut scope, meeting)?;
    meeting_roles(ex, &mut scope, meeting)?;
    participant_numbers(ex, &mut scope, meeting)?;
    legacy_registers(ex, &mut scope, meeting)?;
    if let Some(groups) = &meeting.vote_groups {
        export_vote_groups(ex, &mut scope, meeting, groups)?;
    }
    if let Some(delegations) = &meeting.delegations {
        export_delegations(ex, &mut scope, meeting, delegations)?;
    }

    for item in &meeting.agenda_items {
        agenda::export_agenda_item(ex, &mut scope, item)?;
    }
    reactions(ex, &mut scope, meeting)?;
    speakers::export_speaker_lists(ex, &scope, meeting)?;
    Ok(())
}

fn check_groupid(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    groupid: &str,
) -> Result<(), Halt> {
    if !scope.groupids.insert(groupid.to_string()) {
        ex.ledger.critical(
            &scope.path,
            Diagnostic::new(
                ErrorCode::DuplicateGroupId,
                format!("{groupid} not unique for meeting"),
            ),
        )?;
    }
    Ok(())
}

/// System users are global in the legacy system and meeting-local groups in
/// the target, so every meeting gets its own group per system user.
fn system_user_groups(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
) -> Result<(), Halt> {
    if !meeting.system_userids.is_empty() {
        info!(
            meeting = %meeting.name,
            users = %meeting.system_userids.join(", "),
            "system users become meeting groups"
        );
    }
    for userid in &meeting.system_userids {
        let Some(user_pk) = ex.user(&scope.path, userid, None)? else {
            continue;
        };
        let Some(profile) = ex.profile(user_pk).cloned() else {
            continue;
        };
        check_groupid(ex, scope, userid)?;
        let fields = MeetingGroupFields {
            created: profile.created,
            modified: profile.modified,
            title: profile.name,
            body: None,
            meeting: scope.pk,
            groupid: userid.clone(),
            votes: None,
        };
        if let Some(group_pk) = ex.emit(&scope.path, EntityKind::MeetingGroup, &fields)? {
            scope.system_groups.insert(userid.to_lowercase(), group_pk);
        }
    }
    Ok(())
}

fn meeting_roles(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
) -> Result<(), Halt> {
    for entry in &meeting.security {
        if entry.userid != entry.userid.to_lowercase() {
            ex.ledger.report(
                &scope.path,
                Diagnostic::new(
                    ErrorCode::SecurityEntry,
                    format!("UserID with uppercase in security entries: {}", entry.userid),
                ),
            )?;
        }
        if entry.userid.is_empty() {
            ex.ledger.report(
                &scope.path,
                Diagnostic::new(ErrorCode::SecurityEntry, "Empty userid in security entries"),
            )?;
            continue;
        }
        let Ok(user_pk) = ex.registry.resolve(EntityKind::User, &entry.userid) else {
            ex.ledger.report(
                &scope.path,
                Diagnostic::new(
                    ErrorCode::SecurityEntry,
                    format!(
                        "Skipping meeting roles assigned to non-existing user: {}",
                        entry.userid
                    ),
                ),
            )?;
            continue;
        };

        let mut assigned = BTreeSet::new();
        for group in &entry.groups {
            match target_role(group) {
                Some(Some(role)) => {
                    assigned.insert(role);
                }
                Some(None) => {}
                None => ex.ledger.report(
                    &scope.path,
                    Diagnostic::new(
                        ErrorCode::SecurityEntry,
                        format!("Unknown role {group} for {}, ignored", entry.userid),
                    ),
                )?,
            }
        }
        // Admin-only entries are dropped; access can be regained in the target.
        if assigned.is_empty() {
            debug!(userid = %entry.userid, "no exportable meeting roles");
            continue;
        }
        assigned.insert("participant");

        let fields = MeetingRolesFields {
            context: scope.pk,
            user: user_pk,
            assigned: assigned.into_iter().map(str::to_string).collect(),
        };
        if ex.emit(&scope.path, EntityKind::MeetingRoles, &fields)?.is_some() {
            if entry.groups.iter().any(|group| group == VOTER_ROLE) {
                scope.voters.insert(entry.userid.to_lowercase());
            }
            scope.members.insert(user_pk);
        }
    }
    Ok(())
}

fn participant_numbers(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
) -> Result<(), Halt> {
    if meeting.participant_numbers.is_empty() {
        return Ok(());
    }
    let Some(system_pk) = ex.emit(
        &scope.path,
        EntityKind::ParticipantNumberSystem,
        &ParticipantNumberSystemFields { meeting: scope.pk },
    )?
    else {
        return Ok(());
    };

    let mut numbers = HashSet::new();
    let mut holders = HashSet::new();
    for entry in &meeting.participant_numbers {
        scope
            .participant_numbers
            .insert(entry.number, entry.userid.clone());
        if !holders.insert(entry.userid.to_lowercase()) {
            ex.ledger.report(
                &scope.path,
                Diagnostic::new(
                    ErrorCode::ParticipantNumberReused,
                    format!(
                        "{} has several participant numbers, number {} skipped",
                        entry.userid, entry.number
                    ),
                ),
            )?;
            continue;
        }
        if entry.userid != entry.userid.to_lowercase() {
            ex.ledger.report(
                &scope.path,
                Diagnostic::new(
                    ErrorCode::SecurityEntry,
                    format!("Uppercase userid in participant numbers: {}", entry.userid),
                ),
            )?;
        }

        let invalid = if !numbers.insert(entry.number) {
            Some(format!("Duplicate participant number {}", entry.number))
        } else if entry.number < 1 {
            Some(format!("Participant number {} is below 1", entry.number))
        } else if entry.number > MAX_PARTICIPANT_NUMBER {
            Some(format!("Participant number {} exceeds small int", entry.number))
        } else {
            None
        };
        if let Some(message) = invalid {
            ex.ledger.critical(
                &scope.path,
                Diagnostic::new(ErrorCode::InvalidParticipantNumber, message),
            )?;
            continue;
        }
        let Ok(number) = u32::try_from(entry.number) else {
            continue;
        };

        let Some(user) = ex.user(&scope.path, &entry.userid, Some("in participant numbers"))? else {
            continue;
        };
        let fields = ParticipantNumberFields {
            number,
            user,
            pns: system_pk,
            created: entry.created.unwrap_or(meeting.created),
        };
        ex.emit(&scope.path, EntityKind::ParticipantNumber, &fields)?;
    }
    Ok(())
}

/// Emit the meeting's own register snapshots, or one synthesized from the
/// voter role when there are none. Either way they seed the deduplicator.
fn legacy_registers(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
) -> Result<(), Halt> {
    let path = scope.path.clone();
    for register in &meeting.electoral_registers {
        let mut weights = Vec::with_capacity(register.userids.len());
        for userid in &register.userids {
            if let Some(user) = ex.member(scope, &path, userid, Some("in electoral register"))? {
                weights.push((user, 1));
            }
        }
        let pending = PendingRegister {
            created: Some(register.time),
            meeting: scope.pk,
            source: RegisterSource::Snapshot,
        };
        seed_register(ex, scope, pending, &weights)?;
    }

    if scope.latest_register.is_none() {
        let voters: Vec<String> = scope.voters.iter().cloned().collect();
        let mut weights = Vec::with_capacity(voters.len());
        for userid in &voters {
            if let Some(user) = ex.member(scope, &path, userid, Some("in electoral register"))? {
                weights.push((user, 1));
            }
        }
        let pending = PendingRegister {
            created: Some(meeting.start_time.unwrap_or(meeting.created)),
            meeting: scope.pk,
            source: RegisterSource::Snapshot,
        };
        seed_register(ex, scope, pending, &weights)?;
    }
    Ok(())
}

fn seed_register(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    pending: PendingRegister,
    weights: &[(Pk, u32)],
) -> Result<(), Halt> {
    let emitted = emit_register(pending, weights, &mut ex.registry, &mut ex.stream);
    if let Some(register_pk) = ex.settle(&scope.path, emitted)? {
        scope.registers.track_original(register_pk, weights);
        scope.latest_register = Some(register_pk);
    }
    Ok(())
}

fn group_role(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    role_id: &str,
    title: &str,
) -> Result<Option<Pk>, Halt> {
    if role_id.chars().count() > MAX_TITLE_LEN || title.chars().count() > MAX_TITLE_LEN {
        ex.ledger.critical(
            &scope.path,
            Diagnostic::new(
                ErrorCode::FieldTooLong,
                format!("Group role {role_id} has an id or title over {MAX_TITLE_LEN} chars"),
            ),
        )?;
        return Ok(None);
    }
    let fields = GroupRoleFields {
        title: title.to_string(),
        meeting: scope.pk,
        role_id: role_id.to_string(),
        roles: Some(GROUP_ROLE_GRANTS.iter().map(|role| (*role).to_string()).collect()),
    };
    ex.emit(&scope.path, EntityKind::GroupRole, &fields)
}

fn group_fields(
    ex: &Exporter<'_>,
    scope: &MeetingScope,
    meeting: &Meeting,
    groupid: &str,
    title: &str,
    description: &str,
    votes: Option<u32>,
) -> MeetingGroupFields {
    MeetingGroupFields {
        created: meeting.created,
        modified: meeting.modified,
        title: title.to_string(),
        body: Some(ex.richtext.add_paras(description)),
        meeting: scope.pk,
        groupid: groupid.to_string(),
        votes,
    }
}

fn membership(
    ex: &mut Exporter<'_>,
    path: &str,
    userid: &str,
    meeting_group: Pk,
    role: Option<Pk>,
    votes: Option<u32>,
) -> Result<(), Halt> {
    let Some(user) = ex.user(path, userid, None)? else {
        return Ok(());
    };
    let fields = GroupMembershipFields {
        user,
        meeting_group,
        role,
        votes,
    };
    ex.emit(path, EntityKind::GroupMembership, &fields)?;
    Ok(())
}

/// Vote groups: a main and a substitute role, one group per vote group with
/// one vote per primary member.
fn export_vote_groups(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
    groups: &[VoteGroup],
) -> Result<(), Halt> {
    let main = group_role(ex, scope, "main", "Ordinarie")?;
    let substitute = group_role(ex, scope, "substitute", "Ersättare")?;

    for group in groups {
        let path = format!("{}/{}", scope.path, group.name);
        check_groupid(ex, scope, &group.name)?;
        let votes = u32::try_from(group.primaries()).ok().filter(|votes| *votes > 0);
        let fields = group_fields(
            ex,
            scope,
            meeting,
            &group.name,
            &group.title,
            &group.description,
            votes,
        );
        let Some(group_pk) = ex.emit(&path, EntityKind::MeetingGroup, &fields)? else {
            continue;
        };
        for member in &group.members {
            let role = match member.role {
                VoteGroupRole::Primary => main,
                VoteGroupRole::Standin => substitute,
                VoteGroupRole::None => None,
            };
            membership(ex, &path, &member.userid, group_pk, role, None)?;
        }
    }
    Ok(())
}

/// Delegations: leaders first, then members that are not also leaders.
fn export_delegations(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
    delegations: &[Delegation],
) -> Result<(), Halt> {
    let leader = group_role(ex, scope, "leader", "Delegationsledare")?;
    let member = group_role(ex, scope, "member", "Medlem")?;

    for delegation in delegations {
        let path = format!("{}/{}", scope.path, delegation.name);
        check_groupid(ex, scope, &delegation.name)?;
        let fields = group_fields(
            ex,
            scope,
            meeting,
            &delegation.name,
            &delegation.title,
            &delegation.description,
            delegation.vote_count,
        );
        let Some(group_pk) = ex.emit(&path, EntityKind::MeetingGroup, &fields)? else {
            continue;
        };
        for userid in &delegation.leaders {
            let votes = delegation.voters.get(userid).copied();
            membership(ex, &path, userid, group_pk, leader, votes)?;
        }
        for userid in &delegation.members {
            if delegation.leaders.contains(userid) {
                continue;
            }
            let votes = delegation.voters.get(userid).copied();
            membership(ex, &path, userid, group_pk, member, votes)?;
        }
    }
    Ok(())
}

/// One "like" button per meeting with likes, then every collected like.
fn reactions(
    ex: &mut Exporter<'_>,
    scope: &mut MeetingScope,
    meeting: &Meeting,
) -> Result<(), Halt> {
    if scope.reactions.is_empty() {
        return Ok(());
    }
    let allowed_models = meeting
        .like_context_types
        .iter()
        .filter_map(|legacy| like_model(legacy))
        .map(str::to_string)
        .collect();
    let change_roles = meeting
        .like_user_roles
        .iter()
        .filter_map(|legacy| target_role(legacy).flatten())
        .map(str::to_string)
        .collect();
    let button = ReactionButtonFields {
        title: "Gilla".into(),
        icon: "mdi-thumb-up".into(),
        color: "primary".into(),
        meeting: scope.pk,
        change_roles,
        list_roles: vec!["participant".into()],
        active: false,
        allowed_models,
    };
    let Some(button_pk) = ex.emit(&scope.path, EntityKind::ReactionButton, &button)? else {
        return Ok(());
    };
    for reaction in std::mem::take(&mut scope.reactions) {
        let fields = ReactionFields {
            content_type: reaction.content_type,
            object_id: reaction.object_id,
            button: button_pk,
            user: reaction.user,
            agenda_item: reaction.agenda_item,
        };
        ex.emit(&scope.path, EntityKind::Reaction, &fields)?;
    }
    Ok(())
}
