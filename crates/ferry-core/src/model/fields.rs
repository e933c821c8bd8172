//! Field maps for every exported model.
//!
//! Each struct serializes to the `fields` object of one record. Optional
//! relations that the target schema expects as explicit `null` are plain
//! `Option`s; keys the target expects to be absent use
//! `skip_serializing_if`.

use serde::Serialize;
use serde_json::{Map, Value};

use super::Pk;
use crate::source::Timestamp;

#[derive(Debug, Clone, Serialize)]
pub struct OrganisationFields {
    pub created: Timestamp,
    pub modified: Timestamp,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserFields {
    pub first_name: String,
    pub last_name: String,
    pub date_joined: Timestamp,
    pub last_login: Timestamp,
    pub email: String,
    pub organisation: Pk,
    pub userid: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingFields {
    pub title: String,
    pub modified: Timestamp,
    pub created: Timestamp,
    pub body: String,
    pub state: String,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub er_policy_name: Option<String>,
    pub organisation: Pk,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_dialect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_roles_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_votes_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingGroupFields {
    pub created: Timestamp,
    pub modified: Timestamp,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub meeting: Pk,
    pub groupid: String,
    pub votes: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupRoleFields {
    pub title: String,
    pub meeting: Pk,
    pub role_id: String,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupMembershipFields {
    pub user: Pk,
    pub meeting_group: Pk,
    pub role: Option<Pk>,
    pub votes: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingRolesFields {
    pub context: Pk,
    pub user: Pk,
    pub assigned: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantNumberSystemFields {
    pub meeting: Pk,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantNumberFields {
    pub number: u32,
    pub user: Pk,
    pub pns: Pk,
    pub created: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElectoralRegisterFields {
    pub created: Option<Timestamp>,
    pub meeting: Pk,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoterWeightFields {
    pub register: Pk,
    pub user: Pk,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgendaItemFields {
    pub title: String,
    pub modified: Timestamp,
    pub created: Timestamp,
    pub body: String,
    pub state: String,
    pub tags: Vec<String>,
    pub meeting: Pk,
    pub block_discussion: bool,
    pub block_proposals: bool,
    pub order: Pk,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextDocumentFields {
    pub modified: Timestamp,
    pub created: Timestamp,
    pub title: String,
    pub body: String,
    pub base_tag: String,
    pub agenda_item: Pk,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextParagraphFields {
    pub modified: Timestamp,
    pub created: Timestamp,
    pub body: String,
    pub paragraph_id: u32,
    pub text_document: Pk,
    pub agenda_item: Pk,
}

/// Exactly one of author or meeting group owns a proposal or post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorship {
    Author(Pk),
    MeetingGroup(Pk),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalFields {
    pub modified: Timestamp,
    pub created: Timestamp,
    pub body: String,
    pub state: String,
    pub prop_id: String,
    pub agenda_item: Pk,
    pub tags: Vec<String>,
    pub mentions: Vec<Pk>,
    #[serde(flatten)]
    pub authorship: Authorship,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffProposalFields {
    pub paragraph: Pk,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscussionPostFields {
    pub modified: Timestamp,
    pub created: Timestamp,
    pub body: String,
    pub tags: Vec<String>,
    pub mentions: Vec<Pk>,
    pub agenda_item: Pk,
    #[serde(flatten)]
    pub authorship: Authorship,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollFields {
    pub title: String,
    pub modified: Timestamp,
    pub created: Timestamp,
    pub started: Option<Timestamp>,
    pub closed: Option<Timestamp>,
    pub body: String,
    pub state: String,
    pub meeting: Pk,
    pub agenda_item: Pk,
    pub method_name: &'static str,
    pub proposals: Vec<Pk>,
    pub electoral_register: Option<Pk>,
    pub settings_data: Map<String, Value>,
    pub abstains: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ballot_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteFields {
    pub user: Pk,
    pub poll: Pk,
    pub created: Timestamp,
    pub changed: Timestamp,
    pub vote_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionButtonFields {
    pub title: String,
    pub icon: String,
    pub color: String,
    pub meeting: Pk,
    pub change_roles: Vec<String>,
    pub list_roles: Vec<String>,
    pub active: bool,
    pub allowed_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionFields {
    pub content_type: [&'static str; 2],
    pub object_id: Pk,
    pub button: Pk,
    pub user: Pk,
    pub agenda_item: Pk,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeakerListSystemFields {
    pub state: &'static str,
    pub meeting: Pk,
    pub method_name: &'static str,
    pub settings_data: Map<String, Value>,
    pub safe_positions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeakerListFields {
    pub title: String,
    pub state: &'static str,
    pub speaker_system: Pk,
    pub agenda_item: Pk,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeakerFields {
    pub user: Pk,
    pub speaker_list: Pk,
    pub created: Timestamp,
    pub started: Timestamp,
    pub seconds: u32,
}
