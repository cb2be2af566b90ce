//! Events reported by a consumer group to an injected sink.
use std::fmt::{Debug, Display};
use std::time::Duration;

use tracing::{info, warn};

use crate::client::error::ProtocolError;

/// Result of a heartbeat or commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,

    /// The group is rebalancing. Informational, not a failure.
    Rebalancing,

    Failure(String),
}

/// Why the member joins the group again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinReason {
    RebalanceInProgress,

    /// The coordinator rejected the member id or generation.
    Fenced(ProtocolError),

    /// No heartbeat succeeded within the session timeout.
    SessionTimeout,

    SubscriptionChanged,
}

impl Display for RejoinReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RebalanceInProgress => write!(f, "rebalance in progress"),
            Self::Fenced(e) => write!(f, "fenced: {e}"),
            Self::SessionTimeout => write!(f, "session timed out"),
            Self::SubscriptionChanged => write!(f, "subscription changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InstrumentationEvent {
    Heartbeat {
        group_id: String,
        member_id: String,
        generation_id: i32,
        duration: Duration,
        outcome: Outcome,
    },
    RejoinTriggered {
        group_id: String,
        reason: RejoinReason,
    },
    Commit {
        group_id: String,
        partitions: usize,
        duration: Duration,
        outcome: Outcome,
    },
    Joined {
        group_id: String,
        member_id: String,
        generation_id: i32,
        leader: bool,
        partitions: usize,
    },
}

/// Receives the events of one consumer group.
///
/// Called inline from the heartbeat and commit paths, implementations should
/// return quickly.
pub trait Instrumentation: Debug + Send + Sync {
    fn emit(&self, event: InstrumentationEvent);
}

/// Writes events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn emit(&self, event: InstrumentationEvent) {
        match event {
            InstrumentationEvent::Heartbeat {
                group_id,
                member_id,
                generation_id,
                duration,
                outcome: Outcome::Failure(e),
            } => warn!(
                group = group_id.as_str(),
                member_id = member_id.as_str(),
                generation_id,
                ?duration,
                e = e.as_str(),
                "heartbeat failed",
            ),
            InstrumentationEvent::Heartbeat {
                group_id,
                member_id,
                generation_id,
                duration,
                outcome,
            } => tracing::debug!(
                group = group_id.as_str(),
                member_id = member_id.as_str(),
                generation_id,
                ?duration,
                ?outcome,
                "heartbeat",
            ),
            InstrumentationEvent::RejoinTriggered { group_id, reason } => {
                info!(group = group_id.as_str(), %reason, "rejoin triggered")
            }
            InstrumentationEvent::Commit {
                group_id,
                partitions,
                duration,
                outcome: Outcome::Failure(e),
            } => warn!(
                group = group_id.as_str(),
                partitions,
                ?duration,
                e = e.as_str(),
                "offset commit failed",
            ),
            InstrumentationEvent::Commit {
                group_id,
                partitions,
                duration,
                outcome,
            } => tracing::debug!(
                group = group_id.as_str(),
                partitions,
                ?duration,
                ?outcome,
                "offset commit",
            ),
            InstrumentationEvent::Joined {
                group_id,
                member_id,
                generation_id,
                leader,
                partitions,
            } => info!(
                group = group_id.as_str(),
                member_id = member_id.as_str(),
                generation_id,
                leader,
                partitions,
                "joined group",
            ),
        }
    }
}
