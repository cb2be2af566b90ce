use std::time::Duration;

use thiserror::Error;

pub use crate::backoff::BackoffError;
pub use crate::protocol::error::Error as ProtocolError;

/// Which part of the group a server error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// The error is for the whole group.
    Group(String),

    /// The error is for a single partition of an offset request.
    Partition(String, i32),
}

/// Failures to get any answer from the coordinator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(
        "Server error {protocol_error:?} with message \"{}\", request: {request:?}",
        error_message.as_deref().unwrap_or_default()
    )]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    },

    #[error("Invalid offsets: {0}")]
    InvalidOffsets(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("Not a member of group {group}")]
    NotMember { group: String },

    #[error("Member has left group {group}")]
    Left { group: String },

    #[error("Membership of group {group} was lost: {reason}")]
    GroupLost { group: String, reason: String },

    #[error("All retries failed: {0}")]
    RetryFailed(#[from] BackoffError),
}

impl Error {
    pub(crate) fn group(protocol_error: ProtocolError, group: &str) -> Self {
        Self::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Group(group.to_string()),
        }
    }

    /// The protocol error code, if the coordinator answered with one.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            Self::ServerError { protocol_error, .. } => Some(*protocol_error),
            _ => None,
        }
    }

    /// Classifies the error for retry and rejoin decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transient,
            Self::ServerError { protocol_error, .. } => classify(*protocol_error),
            Self::InvalidOffsets(_) | Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::NotMember { .. } => ErrorKind::Fencing,
            Self::InvalidResponse(_)
            | Self::InvalidAssignment(_)
            | Self::Left { .. }
            | Self::GroupLost { .. }
            | Self::RetryFailed(_) => ErrorKind::Fatal,
        }
    }
}

/// How the consumer group reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network trouble or an unavailable coordinator, the request may be retried.
    Transient,

    /// The member id or generation is no longer valid, the identity is
    /// dropped and the member joins again.
    Fencing,

    /// The group is rebalancing, the member joins again keeping its identity.
    Rebalance,

    /// The input was rejected before anything was sent.
    Validation,

    /// Retrying will not help.
    Fatal,
}

fn classify(protocol_error: ProtocolError) -> ErrorKind {
    match protocol_error {
        ProtocolError::CoordinatorNotAvailable
        | ProtocolError::NotCoordinator
        | ProtocolError::CoordinatorLoadInProgress
        | ProtocolError::RequestTimedOut
        | ProtocolError::NetworkException
        | ProtocolError::UnknownServerError
        | ProtocolError::UnstableOffsetCommit
        | ProtocolError::LeaderNotAvailable
        | ProtocolError::NotLeaderOrFollower => ErrorKind::Transient,
        ProtocolError::UnknownMemberId | ProtocolError::IllegalGeneration => ErrorKind::Fencing,
        ProtocolError::RebalanceInProgress => ErrorKind::Rebalance,
        _ => ErrorKind::Fatal,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
