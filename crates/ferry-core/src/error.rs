use std::fmt;

/// Machine-readable diagnostic codes.
///
/// `E2xxx` codes are recoverable (a record is skipped or auto-corrected),
/// `E3xxx` codes are critical and prevent the export file from being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    MalformedResult,
    MissingWinner,
    UnresolvedReference,
    MalformedBallot,
    SettingsCorrected,
    TagTruncated,
    SchulzeStvExported,
    PollNotClosed,
    EmptyPoll,
    PollWithoutRegister,
    SpeakerListVariant,
    UserOutsideMeeting,
    DuplicateEmail,
    SecurityEntry,
    ParticipantNumberReused,
    CrossScopeReference,
    DuplicateVote,
    RankingOutOfRange,
    UnknownPlugin,
    DuplicateGroupId,
    MalformedRecord,
    InvalidSettings,
    AuthorConflict,
    DuplicateProposalId,
    InvalidText,
    InvalidParticipantNumber,
    MultipleVotesMeeting,
    MissingUser,
    FieldTooLong,
    VoteWithoutCreator,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MalformedResult => "E2001",
            Self::MissingWinner => "E2002",
            Self::UnresolvedReference => "E2003",
            Self::MalformedBallot => "E2004",
            Self::SettingsCorrected => "E2101",
            Self::TagTruncated => "E2102",
            Self::SchulzeStvExported => "E2103",
            Self::PollNotClosed => "E2201",
            Self::EmptyPoll => "E2202",
            Self::PollWithoutRegister => "E2203",
            Self::SpeakerListVariant => "E2204",
            Self::UserOutsideMeeting => "E2205",
            Self::DuplicateEmail => "E2206",
            Self::SecurityEntry => "E2207",
            Self::ParticipantNumberReused => "E2208",
            Self::CrossScopeReference => "E3001",
            Self::DuplicateVote => "E3002",
            Self::RankingOutOfRange => "E3003",
            Self::UnknownPlugin => "E3004",
            Self::DuplicateGroupId => "E3005",
            Self::MalformedRecord => "E3006",
            Self::InvalidSettings => "E3007",
            Self::AuthorConflict => "E3008",
            Self::DuplicateProposalId => "E3009",
            Self::InvalidText => "E3010",
            Self::InvalidParticipantNumber => "E3011",
            Self::MultipleVotesMeeting => "E3012",
            Self::MissingUser => "E3013",
            Self::FieldTooLong => "E3014",
            Self::VoteWithoutCreator => "E3015",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MalformedResult => "Malformed poll result",
            Self::MissingWinner => "Poll result has no winner",
            Self::UnresolvedReference => "Unresolved legacy reference",
            Self::MalformedBallot => "Malformed ballot",
            Self::SettingsCorrected => "Poll settings auto-corrected",
            Self::TagTruncated => "Tag truncated",
            Self::SchulzeStvExported => "Schulze STV poll exported",
            Self::PollNotClosed => "Poll not closed",
            Self::EmptyPoll => "Poll without result data",
            Self::PollWithoutRegister => "Ongoing poll without electoral register",
            Self::SpeakerListVariant => "Unsupported speaker list variant",
            Self::UserOutsideMeeting => "User is not part of meeting",
            Self::DuplicateEmail => "Duplicate email address",
            Self::SecurityEntry => "Questionable meeting security entry",
            Self::ParticipantNumberReused => "User holds several participant numbers",
            Self::CrossScopeReference => "Reference crosses meeting boundary",
            Self::DuplicateVote => "Duplicate vote or deleted user",
            Self::RankingOutOfRange => "Ranking inconsistent with poll settings",
            Self::UnknownPlugin => "Unknown voting method",
            Self::DuplicateGroupId => "Group id not unique within meeting",
            Self::MalformedRecord => "Malformed export record",
            Self::InvalidSettings => "Invalid poll settings",
            Self::AuthorConflict => "Author and meeting group conflict",
            Self::DuplicateProposalId => "Duplicate proposal id",
            Self::InvalidText => "Invalid characters in text",
            Self::InvalidParticipantNumber => "Invalid participant number",
            Self::MultipleVotesMeeting => "Multiple votes activated",
            Self::MissingUser => "Missing user",
            Self::FieldTooLong => "Field exceeds target length",
            Self::VoteWithoutCreator => "Vote without creator",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::CrossScopeReference => {
                Some("Remove the moved or copied proposal from the poll before exporting.")
            }
            Self::DuplicateVote => Some("Delete the stray vote object in the legacy poll."),
            Self::RankingOutOfRange => {
                Some("Raise max_stars in the poll settings to match its votes.")
            }
            Self::UnknownPlugin => Some("Add a transcoder for the plugin or delete the poll."),
            Self::DuplicateGroupId => Some("Rename one of the colliding groups."),
            Self::MalformedRecord => Some("Report a bug with the offending entity path."),
            Self::InvalidSettings => Some("Fix the poll settings in the legacy system."),
            Self::MultipleVotesMeeting => Some("Disable multiple votes before exporting."),
            Self::MissingUser => Some("Restore the user or remove its references."),
            Self::TagTruncated => Some("Check the truncation table printed after export."),
            Self::SchulzeStvExported => {
                Some("Compare the exported winners against the legacy poll result.")
            }
            _ => None,
        }
    }

    /// Critical codes abort the batch.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        self.code().as_bytes()[1] == b'3'
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single diagnostic: a code plus the formatted, entity-specific message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Failure of a single transcoding or emission step.
///
/// `Skip` omits the record and lets the run continue; `Abort` marks the whole
/// batch as unwritable. Both are routed into the [`Ledger`](crate::Ledger).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("skipped: {0}")]
    Skip(Diagnostic),

    #[error("critical: {0}")]
    Abort(Diagnostic),
}

impl ExportError {
    pub fn skip(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Skip(Diagnostic::new(code, message))
    }

    pub fn abort(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Abort(Diagnostic::new(code, message))
    }

    #[must_use]
    pub const fn diagnostic(&self) -> &Diagnostic {
        match self {
            Self::Skip(d) | Self::Abort(d) => d,
        }
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Abort(_))
    }
}

/// Raised only when `die_on_critical` is configured: traversal stops at the
/// first critical diagnostic instead of collecting the full ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("halted on critical diagnostic at {path}: {diagnostic}")]
pub struct Halt {
    pub path: String,
    pub diagnostic: Diagnostic,
}
