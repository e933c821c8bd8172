//! Entity kinds of the target schema.
//!
//! Each kind owns an independent primary-key sequence and maps to one
//! `<namespace>.<kind>` model name in the export stream.

use std::fmt;

/// Every record kind the exporter can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Organisation,
    User,
    Meeting,
    MeetingGroup,
    GroupRole,
    GroupMembership,
    MeetingRoles,
    ParticipantNumberSystem,
    ParticipantNumber,
    ElectoralRegister,
    VoterWeight,
    AgendaItem,
    TextDocument,
    TextParagraph,
    Proposal,
    DiffProposal,
    DiscussionPost,
    Poll,
    Vote,
    ReactionButton,
    Reaction,
    SpeakerListSystem,
    SpeakerList,
    Speaker,
}

impl EntityKind {
    /// All kinds in the order the legacy hierarchy is walked.
    pub const ALL: [Self; 24] = [
        Self::Organisation,
        Self::User,
        Self::Meeting,
        Self::MeetingGroup,
        Self::GroupRole,
        Self::GroupMembership,
        Self::MeetingRoles,
        Self::ParticipantNumberSystem,
        Self::ParticipantNumber,
        Self::ElectoralRegister,
        Self::VoterWeight,
        Self::AgendaItem,
        Self::TextDocument,
        Self::TextParagraph,
        Self::Proposal,
        Self::DiffProposal,
        Self::DiscussionPost,
        Self::Poll,
        Self::Vote,
        Self::ReactionButton,
        Self::Reaction,
        Self::SpeakerListSystem,
        Self::SpeakerList,
        Self::Speaker,
    ];

    /// Target model identifier, `<namespace>.<kind>`.
    #[must_use]
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::Organisation => "organisation.organisation",
            Self::User => "core.user",
            Self::Meeting => "meeting.meeting",
            Self::MeetingGroup => "meeting.meetinggroup",
            Self::GroupRole => "meeting.grouprole",
            Self::GroupMembership => "meeting.groupmembership",
            Self::MeetingRoles => "meeting.meetingroles",
            Self::ParticipantNumberSystem => "participant_number.pnsystem",
            Self::ParticipantNumber => "participant_number.participantnumber",
            Self::ElectoralRegister => "poll.electoralregister",
            Self::VoterWeight => "poll.voterweight",
            Self::AgendaItem => "agenda.agendaitem",
            Self::TextDocument => "proposal.textdocument",
            Self::TextParagraph => "proposal.textparagraph",
            Self::Proposal => "proposal.proposal",
            Self::DiffProposal => "proposal.diffproposal",
            Self::DiscussionPost => "discussion.discussionpost",
            Self::Poll => "poll.poll",
            Self::Vote => "poll.vote",
            Self::ReactionButton => "reactions.reactionbutton",
            Self::Reaction => "reactions.reaction",
            Self::SpeakerListSystem => "speaker.speakerlistsystem",
            Self::SpeakerList => "speaker.speakerlist",
            Self::Speaker => "speaker.speaker",
        }
    }

    /// Legacy keys of this kind are compared case-insensitively.
    #[must_use]
    pub const fn folds_case(self) -> bool {
        matches!(self, Self::User)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}
