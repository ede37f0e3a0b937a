use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The recognized event-type whitelist from the upstream event taxonomy.
/// Anything not in this set is dropped at ingest rather than stored — see
/// the Event invariants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum EventType {
    WatchEvent,
    PullRequestEvent,
    IssuesEvent,
    PushEvent,
    ForkEvent,
    CreateEvent,
    DeleteEvent,
    ReleaseEvent,
    CommitCommentEvent,
    IssueCommentEvent,
    PullRequestReviewEvent,
    PullRequestReviewCommentEvent,
    PublicEvent,
    MemberEvent,
    GollumEvent,
    DeploymentEvent,
    DeploymentStatusEvent,
    StatusEvent,
    CheckRunEvent,
    CheckSuiteEvent,
}

/// The three headline types every implementation recognizes.
pub const MINIMUM_EVENT_TYPES: &[EventType] = &[
    EventType::WatchEvent,
    EventType::PullRequestEvent,
    EventType::IssuesEvent,
];

/// The full extended set used by the richer analytics in the repository
/// layer.
pub const EXTENDED_EVENT_TYPES: &[EventType] = &[
    EventType::WatchEvent,
    EventType::PullRequestEvent,
    EventType::IssuesEvent,
    EventType::PushEvent,
    EventType::ForkEvent,
    EventType::CreateEvent,
    EventType::DeleteEvent,
    EventType::ReleaseEvent,
    EventType::CommitCommentEvent,
    EventType::IssueCommentEvent,
    EventType::PullRequestReviewEvent,
    EventType::PullRequestReviewCommentEvent,
    EventType::PublicEvent,
    EventType::MemberEvent,
    EventType::GollumEvent,
    EventType::DeploymentEvent,
    EventType::DeploymentStatusEvent,
    EventType::StatusEvent,
    EventType::CheckRunEvent,
    EventType::CheckSuiteEvent,
];

/// Which whitelist an ingestion engine should filter against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizedSet {
    Minimum,
    #[default]
    Extended,
}

impl RecognizedSet {
    pub fn types(self) -> &'static [EventType] {
        match self {
            RecognizedSet::Minimum => MINIMUM_EVENT_TYPES,
            RecognizedSet::Extended => EXTENDED_EVENT_TYPES,
        }
    }

    pub fn recognizes(self, raw_type: &str) -> bool {
        self.types().iter().any(|t| t.to_string() == raw_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_set_is_a_subset_of_extended() {
        for t in MINIMUM_EVENT_TYPES {
            assert!(EXTENDED_EVENT_TYPES.contains(t));
        }
    }

    #[test]
    fn recognizes_matches_display_form() {
        assert!(RecognizedSet::Minimum.recognizes("WatchEvent"));
        assert!(!RecognizedSet::Minimum.recognizes("MemberEvent"));
        assert!(RecognizedSet::Extended.recognizes("MemberEvent"));
        assert!(!RecognizedSet::Extended.recognizes("BogusEvent"));
    }
}
