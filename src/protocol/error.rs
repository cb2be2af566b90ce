//! Error codes the group coordinator answers with.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    #[error("The server experienced an unexpected error when processing the request.")]
    UnknownServerError,

    #[error("The requested offset is not within the range of offsets maintained by the server.")]
    OffsetOutOfRange,

    #[error("This server does not host this topic-partition.")]
    UnknownTopicOrPartition,

    #[error("There is no leader for this topic-partition as we are in the middle of a leadership election.")]
    LeaderNotAvailable,

    #[error("For requests intended only for the leader, this error indicates that the broker is not the current leader.")]
    NotLeaderOrFollower,

    #[error("The request timed out.")]
    RequestTimedOut,

    #[error("The metadata field of the offset request was too large.")]
    OffsetMetadataTooLarge,

    #[error("The server disconnected before a response was received.")]
    NetworkException,

    #[error("The coordinator is loading and hence can't process requests.")]
    CoordinatorLoadInProgress,

    #[error("The coordinator is not available.")]
    CoordinatorNotAvailable,

    #[error("This is not the correct coordinator.")]
    NotCoordinator,

    #[error("Specified group generation id is not valid.")]
    IllegalGeneration,

    #[error("The group member's supported protocols are incompatible with those of existing members or first group member tried to join with empty protocol type or empty protocol list.")]
    InconsistentGroupProtocol,

    #[error("The configured groupId is invalid.")]
    InvalidGroupId,

    #[error("The coordinator is not aware of this member.")]
    UnknownMemberId,

    #[error("The session timeout is not within the range allowed by the broker.")]
    InvalidSessionTimeout,

    #[error("The group is rebalancing, so a rejoin is needed.")]
    RebalanceInProgress,

    #[error("The committing offset data size is not valid.")]
    InvalidCommitOffsetSize,

    #[error("Topic authorization failed.")]
    TopicAuthorizationFailed,

    #[error("Group authorization failed.")]
    GroupAuthorizationFailed,

    #[error("The group id does not exist.")]
    GroupIdNotFound,

    #[error("The leader high watermark has not caught up from a recent leader election so the offsets cannot be guaranteed to be monotonically increasing.")]
    OffsetNotAvailable,

    #[error("The group member needs to have a valid member id before actually entering a consumer group.")]
    MemberIdRequired,

    #[error("The consumer group has reached its max size.")]
    GroupMaxSizeReached,

    #[error("The broker rejected this static consumer since another consumer with the same group.instance.id has registered with a different member.id.")]
    FencedInstanceId,

    #[error("There are unstable offsets that need to be cleared.")]
    UnstableOffsetCommit,

    #[error("Unknown error code {0}")]
    Unknown(i16),
}

impl Error {
    /// Maps a raw error code, `0` meaning success.
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::UnknownServerError),
            1 => Some(Self::OffsetOutOfRange),
            3 => Some(Self::UnknownTopicOrPartition),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderOrFollower),
            7 => Some(Self::RequestTimedOut),
            12 => Some(Self::OffsetMetadataTooLarge),
            13 => Some(Self::NetworkException),
            14 => Some(Self::CoordinatorLoadInProgress),
            15 => Some(Self::CoordinatorNotAvailable),
            16 => Some(Self::NotCoordinator),
            22 => Some(Self::IllegalGeneration),
            23 => Some(Self::InconsistentGroupProtocol),
            24 => Some(Self::InvalidGroupId),
            25 => Some(Self::UnknownMemberId),
            26 => Some(Self::InvalidSessionTimeout),
            27 => Some(Self::RebalanceInProgress),
            28 => Some(Self::InvalidCommitOffsetSize),
            29 => Some(Self::TopicAuthorizationFailed),
            30 => Some(Self::GroupAuthorizationFailed),
            69 => Some(Self::GroupIdNotFound),
            78 => Some(Self::OffsetNotAvailable),
            79 => Some(Self::MemberIdRequired),
            81 => Some(Self::GroupMaxSizeReached),
            82 => Some(Self::FencedInstanceId),
            88 => Some(Self::UnstableOffsetCommit),
            _ => Some(Self::Unknown(code)),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::UnknownTopicOrPartition => 3,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderOrFollower => 6,
            Self::RequestTimedOut => 7,
            Self::OffsetMetadataTooLarge => 12,
            Self::NetworkException => 13,
            Self::CoordinatorLoadInProgress => 14,
            Self::CoordinatorNotAvailable => 15,
            Self::NotCoordinator => 16,
            Self::IllegalGeneration => 22,
            Self::InconsistentGroupProtocol => 23,
            Self::InvalidGroupId => 24,
            Self::UnknownMemberId => 25,
            Self::InvalidSessionTimeout => 26,
            Self::RebalanceInProgress => 27,
            Self::InvalidCommitOffsetSize => 28,
            Self::TopicAuthorizationFailed => 29,
            Self::GroupAuthorizationFailed => 30,
            Self::GroupIdNotFound => 69,
            Self::OffsetNotAvailable => 78,
            Self::MemberIdRequired => 79,
            Self::GroupMaxSizeReached => 81,
            Self::FencedInstanceId => 82,
            Self::UnstableOffsetCommit => 88,
            Self::Unknown(code) => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(Error::new(0), None);
        assert_eq!(Error::new(25), Some(Error::UnknownMemberId));
        assert_eq!(Error::new(27), Some(Error::RebalanceInProgress));
        assert_eq!(Error::new(1234), Some(Error::Unknown(1234)));

        for code in -1..100 {
            if let Some(err) = Error::new(code) {
                assert_eq!(err.code(), code, "{err:?}");
            }
        }
    }
}
