//! Legacy snapshot: the typed input tree walked by the pipeline.
//!
//! The snapshot is a single JSON document. Unknown fields are ignored so
//! that dumps from newer legacy versions still load; missing collections
//! default to empty.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Legacy timestamps keep their original UTC offset.
pub type Timestamp = DateTime<FixedOffset>;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceTree {
    pub organisation: Organisation,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub meetings: Vec<Meeting>,
}

impl SourceTree {
    /// Parse a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the text does not match the snapshot schema.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read and parse a snapshot file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organisation {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created: Timestamp,
    pub modified: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub userid: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub created: Timestamp,
    pub modified: Timestamp,
}

impl User {
    /// "First Last", or the userid when both names are blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.userid.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meeting {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: String,
    pub created: Timestamp,
    pub modified: Timestamp,
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub system_userids: Vec<String>,
    #[serde(default)]
    pub security: Vec<SecurityEntry>,
    /// Present (even empty) when the vote-groups dialect was installed.
    #[serde(default)]
    pub vote_groups: Option<Vec<VoteGroup>>,
    /// Present (even empty) when the delegations dialect was installed.
    #[serde(default)]
    pub delegations: Option<Vec<Delegation>>,
    #[serde(default)]
    pub participant_numbers: Vec<ParticipantNumberEntry>,
    #[serde(default)]
    pub electoral_registers: Vec<LegacyRegister>,
    #[serde(default)]
    pub agenda_items: Vec<AgendaItem>,
    #[serde(default)]
    pub speaker_settings: Option<SpeakerSettings>,
    #[serde(default)]
    pub speaker_lists: Vec<SpeakerListEntry>,
    #[serde(default)]
    pub like_context_types: Vec<String>,
    #[serde(default)]
    pub like_user_roles: Vec<String>,
    #[serde(default)]
    pub multiple_votes: bool,
}

/// One row of the meeting's local role assignments.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityEntry {
    pub userid: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteGroup {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<VoteGroupMember>,
}

impl VoteGroup {
    #[must_use]
    pub fn primaries(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.role == VoteGroupRole::Primary)
            .count()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteGroupMember {
    pub userid: String,
    #[serde(default)]
    pub role: VoteGroupRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteGroupRole {
    Primary,
    Standin,
    #[default]
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delegation {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vote_count: Option<u32>,
    #[serde(default)]
    pub leaders: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
    /// userid -> votes held inside the delegation.
    #[serde(default)]
    pub voters: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantNumberEntry {
    pub number: i64,
    pub userid: String,
    #[serde(default)]
    pub created: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRegister {
    pub time: Timestamp,
    #[serde(default)]
    pub userids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerSettings {
    #[serde(default = "default_safe_positions")]
    pub safe_positions: u32,
    #[serde(default)]
    pub speaker_list_count: u32,
    #[serde(default)]
    pub speaker_list_plugin: Option<String>,
}

impl Default for SpeakerSettings {
    fn default() -> Self {
        Self {
            safe_positions: default_safe_positions(),
            speaker_list_count: 0,
            speaker_list_plugin: None,
        }
    }
}

const fn default_safe_positions() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerListEntry {
    /// Agenda item uid, optionally suffixed with `/<n>` for extra lists.
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub modified: Option<Timestamp>,
    /// Participant number -> seconds spoken per entry.
    #[serde(default)]
    pub speaker_log: BTreeMap<u32, Vec<u32>>,
}

impl SpeakerListEntry {
    #[must_use]
    pub fn agenda_item_uid(&self) -> &str {
        self.key.split_once('/').map_or(self.key.as_str(), |(uid, _)| uid)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgendaItem {
    pub name: String,
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: Timestamp,
    pub modified: Timestamp,
    #[serde(default)]
    pub discussion_block: bool,
    #[serde(default)]
    pub proposal_block: bool,
    #[serde(default)]
    pub diff_text: Option<DiffText>,
    #[serde(default)]
    pub proposals: Vec<Proposal>,
    #[serde(default)]
    pub discussion_posts: Vec<DiscussionPost>,
    #[serde(default)]
    pub polls: Vec<Poll>,
}

/// Paragraph-split base text that diff proposals point into.
#[derive(Debug, Clone, Deserialize)]
pub struct DiffText {
    pub hashtag: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Proposal {
    pub uid: String,
    pub aid: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub state: String,
    #[serde(default)]
    pub creators: Vec<String>,
    pub created: Timestamp,
    pub modified: Timestamp,
    #[serde(default)]
    pub mentions: Vec<String>,
    /// 0-based paragraph index into the agenda item's diff text.
    #[serde(default)]
    pub diff_text_para: Option<u32>,
    #[serde(default)]
    pub likes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscussionPost {
    pub uid: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creators: Vec<String>,
    pub created: Timestamp,
    pub modified: Timestamp,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Poll {
    pub uid: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub state: String,
    pub plugin: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub proposals: Vec<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub ballots: Option<Value>,
    pub created: Timestamp,
    pub modified: Timestamp,
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub voters_mark_closed: Vec<String>,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl Poll {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }

    #[must_use]
    pub fn is_ongoing(&self) -> bool {
        self.state == "ongoing"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vote {
    pub name: String,
    #[serde(default)]
    pub creator: Option<String>,
    pub created: Timestamp,
    pub modified: Timestamp,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "organisation": {
            "title": "Org",
            "created": "2020-01-01T00:00:00+01:00",
            "modified": "2020-01-02T00:00:00+01:00"
        },
        "users": [
            {"userid": "anna", "first_name": "Anna", "last_name": "Berg",
             "created": "2020-01-01T00:00:00Z", "modified": "2020-01-01T00:00:00Z"},
            {"userid": "bot", "created": "2020-01-01T00:00:00Z", "modified": "2020-01-01T00:00:00Z",
             "unknown_field": 3}
        ],
        "meetings": [{
            "name": "m1", "title": "Meeting", "state": "closed",
            "created": "2020-01-01T00:00:00Z", "modified": "2020-01-01T00:00:00Z",
            "vote_groups": [],
            "speaker_lists": [{"key": "ai-uid/2", "title": "List", "speaker_log": {"5": [30, 60]}}]
        }]
    }"#;

    #[test]
    fn parses_minimal_snapshot() {
        let tree = SourceTree::from_json(MINIMAL).expect("parse");
        assert_eq!(tree.users.len(), 2);
        assert_eq!(tree.organisation.body, "");
        let meeting = &tree.meetings[0];
        assert!(meeting.vote_groups.is_some());
        assert!(meeting.delegations.is_none());
        assert!(!meeting.multiple_votes);
        assert_eq!(meeting.speaker_lists[0].agenda_item_uid(), "ai-uid");
        assert_eq!(meeting.speaker_lists[0].speaker_log[&5], vec![30, 60]);
    }

    #[test]
    fn display_name_falls_back_to_userid() {
        let tree = SourceTree::from_json(MINIMAL).expect("parse");
        assert_eq!(tree.users[0].display_name(), "Anna Berg");
        assert_eq!(tree.users[1].display_name(), "bot");
    }

    #[test]
    fn unknown_vote_group_role_maps_to_none() {
        let group: VoteGroup = serde_json::from_str(
            r#"{"name": "g", "title": "G", "members": [
                {"userid": "a", "role": "primary"},
                {"userid": "b", "role": "standin"},
                {"userid": "c", "role": "observer"}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(group.primaries(), 1);
        assert_eq!(group.members[2].role, VoteGroupRole::None);
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{").expect("write");
        let err = SourceTree::load(&path).expect_err("truncated json");
        assert!(err.to_string().contains("snapshot.json"));
    }
}
