//! Identity and state machine of one group membership.
//!
//! All reads and writes of `{member_id, generation_id}` and of the state tag
//! happen under a single lock, so concurrent heartbeat, commit, rejoin and
//! leave paths never see a torn identity.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::client::error::{Error, Result};
use crate::protocol::messages::PartitionAssignment;

/// Generation id of a member that has not completed a join.
pub const NO_GENERATION_ID: i32 = 0;

/// Lifecycle of a group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupState {
    Unjoined,
    Joining,
    Syncing,
    Stable,
    Rejoining,
    Leaving,
    Left,
}

/// A member id together with the generation it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub member_id: String,
    pub generation_id: i32,
}

#[derive(Debug)]
pub(crate) enum JoinStart {
    /// Another join finished while this one was waiting.
    AlreadyStable,

    /// Join with this member id, empty when unknown.
    Join { member_id: String },
}

#[derive(Debug)]
pub(crate) enum HeartbeatTarget {
    NotStable,
    NotDue,
    Due(Generation),
}

#[derive(Debug)]
pub(crate) enum LeaveStart {
    AlreadyLeft,

    /// Never joined, the member stays unjoined.
    NotJoined,
    Leave { member_id: Option<String> },
}

#[derive(Debug)]
struct State {
    state: GroupState,
    member_id: Option<String>,
    generation_id: i32,
    leader: Option<String>,
    assignment: Vec<PartitionAssignment>,

    /// Last heartbeat that was answered, `None` right after a join.
    last_request: Option<Instant>,

    /// Start of the current session window.
    last_success: Option<Instant>,

    /// Set when rejoining gave up.
    lost: Option<String>,
}

impl State {
    fn clear_identity(&mut self) {
        self.member_id = None;
        self.generation_id = NO_GENERATION_ID;
        self.leader = None;
    }

    fn matches(&self, generation: &Generation) -> bool {
        self.member_id.as_deref() == Some(generation.member_id.as_str())
            && self.generation_id == generation.generation_id
    }

    fn has_left(&self, group: &str) -> Result<()> {
        match (&self.lost, self.state) {
            (Some(reason), _) => Err(Error::GroupLost {
                group: group.to_string(),
                reason: reason.clone(),
            }),
            (None, GroupState::Leaving | GroupState::Left) => Err(Error::Left {
                group: group.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Membership {
    group: String,
    inner: Mutex<State>,
}

impl Membership {
    pub(crate) fn new(group: String) -> Self {
        Self {
            group,
            inner: Mutex::new(State {
                state: GroupState::Unjoined,
                member_id: None,
                generation_id: NO_GENERATION_ID,
                leader: None,
                assignment: vec![],
                last_request: None,
                last_success: None,
                lost: None,
            }),
        }
    }

    pub(crate) fn state(&self) -> GroupState {
        self.inner.lock().state
    }

    pub(crate) fn member_id(&self) -> Option<String> {
        self.inner.lock().member_id.clone()
    }

    pub(crate) fn generation_id(&self) -> i32 {
        self.inner.lock().generation_id
    }

    pub(crate) fn is_leader(&self) -> bool {
        let inner = self.inner.lock();
        inner.member_id.is_some() && inner.member_id == inner.leader
    }

    pub(crate) fn assignment(&self) -> Vec<PartitionAssignment> {
        self.inner.lock().assignment.clone()
    }

    /// Fails once the member left the group or lost it for good.
    pub(crate) fn ensure_not_left(&self) -> Result<()> {
        self.inner.lock().has_left(&self.group)
    }

    /// The identity to commit offsets with.
    pub(crate) fn generation(&self) -> Result<Generation> {
        let inner = self.inner.lock();
        inner.has_left(&self.group)?;

        match &inner.member_id {
            Some(member_id) if inner.generation_id != NO_GENERATION_ID => Ok(Generation {
                member_id: member_id.clone(),
                generation_id: inner.generation_id,
            }),
            _ => Err(Error::NotMember {
                group: self.group.clone(),
            }),
        }
    }

    pub(crate) fn begin_join(&self) -> Result<JoinStart> {
        let mut inner = self.inner.lock();
        inner.has_left(&self.group)?;

        match inner.state {
            GroupState::Stable => Ok(JoinStart::AlreadyStable),
            _ => {
                inner.state = GroupState::Joining;
                Ok(JoinStart::Join {
                    member_id: inner.member_id.clone().unwrap_or_default(),
                })
            }
        }
    }

    /// Stores the member id handed out with `MemberIdRequired`.
    pub(crate) fn member_id_assigned(&self, member_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.has_left(&self.group)?;

        inner.member_id = Some(member_id.to_string());
        Ok(())
    }

    pub(crate) fn joined(&self, generation: &Generation, leader: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.has_left(&self.group)?;

        inner.state = GroupState::Syncing;
        inner.member_id = Some(generation.member_id.clone());
        inner.generation_id = generation.generation_id;
        inner.leader = Some(leader.to_string());
        Ok(())
    }

    pub(crate) fn synced(
        &self,
        generation: &Generation,
        assignment: Vec<PartitionAssignment>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.has_left(&self.group)?;

        if inner.state != GroupState::Syncing || !inner.matches(generation) {
            return Err(Error::InvalidResponse(format!(
                "sync for generation {} no longer current",
                generation.generation_id
            )));
        }

        inner.state = GroupState::Stable;
        inner.assignment = assignment;
        inner.last_request = None;
        inner.last_success = Some(Instant::now());
        Ok(())
    }

    /// Drops the identity if it still is `generation`.
    pub(crate) fn clear_identity(&self, generation: Option<&Generation>) {
        let mut inner = self.inner.lock();
        match generation {
            Some(generation) if !inner.matches(generation) => {}
            _ => inner.clear_identity(),
        }
    }

    /// Moves `Stable` to `Rejoining`, dropping the identity first when it was
    /// fenced. Returns whether this call started the rejoin.
    pub(crate) fn request_rejoin(&self, fenced: Option<&Generation>) -> bool {
        let mut inner = self.inner.lock();

        if let Some(generation) = fenced {
            if inner.matches(generation) {
                inner.clear_identity();
            }
        }

        if inner.state != GroupState::Stable {
            return false;
        }

        inner.state = GroupState::Rejoining;
        true
    }

    /// A join that failed in the foreground leaves the member unjoined.
    pub(crate) fn join_failed(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, GroupState::Joining | GroupState::Syncing) {
            inner.state = GroupState::Unjoined;
        }
    }

    pub(crate) fn heartbeat_target(&self, interval: Duration, now: Instant) -> HeartbeatTarget {
        let inner = self.inner.lock();

        let member_id = match (&inner.member_id, inner.state) {
            (Some(member_id), GroupState::Stable) => member_id,
            _ => return HeartbeatTarget::NotStable,
        };

        if let Some(last) = inner.last_request {
            if now.saturating_duration_since(last) < interval {
                return HeartbeatTarget::NotDue;
            }
        }

        HeartbeatTarget::Due(Generation {
            member_id: member_id.clone(),
            generation_id: inner.generation_id,
        })
    }

    pub(crate) fn heartbeat_succeeded(&self, generation: &Generation, now: Instant) {
        let mut inner = self.inner.lock();
        if inner.state == GroupState::Stable && inner.matches(generation) {
            inner.last_request = Some(now);
            inner.last_success = Some(now);
        }
    }

    /// Whether no heartbeat succeeded within the session timeout.
    pub(crate) fn session_expired(&self, session_timeout: Duration, now: Instant) -> bool {
        let inner = self.inner.lock();
        inner.state == GroupState::Stable
            && inner
                .last_success
                .map(|last| now.saturating_duration_since(last) >= session_timeout)
                .unwrap_or_default()
    }

    /// When the coordinator expires the session unless a heartbeat succeeds.
    pub(crate) fn session_deadline(&self, session_timeout: Duration) -> Option<Instant> {
        self.inner
            .lock()
            .last_success
            .map(|last| last + session_timeout)
    }

    pub(crate) fn begin_leave(&self) -> LeaveStart {
        let mut inner = self.inner.lock();
        match (inner.state, &inner.member_id) {
            (GroupState::Leaving | GroupState::Left, _) => return LeaveStart::AlreadyLeft,
            (GroupState::Unjoined, None) => return LeaveStart::NotJoined,
            _ => {}
        }

        inner.state = GroupState::Leaving;
        LeaveStart::Leave {
            member_id: inner.member_id.clone(),
        }
    }

    pub(crate) fn left(&self) {
        let mut inner = self.inner.lock();
        inner.state = GroupState::Left;
        inner.clear_identity();
        inner.assignment.clear();
    }

    /// Gives up on the group after rejoining failed. Does nothing when the
    /// member is already leaving.
    pub(crate) fn lose(&self, reason: String) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, GroupState::Leaving | GroupState::Left) {
            return false;
        }

        inner.state = GroupState::Left;
        inner.clear_identity();
        inner.assignment.clear();
        inner.lost = Some(reason);
        true
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn generation(member_id: &str, generation_id: i32) -> Generation {
        Generation {
            member_id: member_id.to_string(),
            generation_id,
        }
    }

    fn stable(membership: &Membership, member_id: &str, generation_id: i32) {
        assert_matches!(membership.begin_join(), Ok(JoinStart::Join { .. }));
        let generation = generation(member_id, generation_id);
        membership.joined(&generation, member_id).unwrap();
        membership.synced(&generation, vec![]).unwrap();
    }

    #[test]
    fn join_sync_leave() {
        let membership = Membership::new("g".to_string());
        assert_eq!(membership.state(), GroupState::Unjoined);
        assert_matches!(membership.generation(), Err(Error::NotMember { .. }));

        assert_matches!(
            membership.begin_join(),
            Ok(JoinStart::Join { member_id }) if member_id.is_empty()
        );
        assert_eq!(membership.state(), GroupState::Joining);

        let gen = generation("m1", 3);
        membership.joined(&gen, "m1").unwrap();
        assert_eq!(membership.state(), GroupState::Syncing);
        assert!(membership.is_leader());

        membership.synced(&gen, vec![]).unwrap();
        assert_eq!(membership.state(), GroupState::Stable);
        assert_eq!(membership.generation().unwrap(), gen);
        assert_matches!(membership.begin_join(), Ok(JoinStart::AlreadyStable));

        assert_matches!(
            membership.begin_leave(),
            LeaveStart::Leave { member_id: Some(id) } if id == "m1"
        );
        membership.left();
        assert_eq!(membership.state(), GroupState::Left);
        assert_eq!(membership.member_id(), None);
        assert_matches!(membership.begin_leave(), LeaveStart::AlreadyLeft);
        assert_matches!(membership.begin_join(), Err(Error::Left { .. }));
    }

    #[test]
    fn rejoin_keeps_member_id_on_rebalance() {
        let membership = Membership::new("g".to_string());
        stable(&membership, "m1", 1);

        assert!(membership.request_rejoin(None));
        assert_eq!(membership.state(), GroupState::Rejoining);
        assert_eq!(membership.member_id().as_deref(), Some("m1"));

        // only the first request starts a rejoin
        assert!(!membership.request_rejoin(None));

        assert_matches!(
            membership.begin_join(),
            Ok(JoinStart::Join { member_id }) if member_id == "m1"
        );
    }

    #[test]
    fn fencing_clears_identity() {
        let membership = Membership::new("g".to_string());
        stable(&membership, "m1", 1);

        assert!(membership.request_rejoin(Some(&generation("m1", 1))));
        assert_eq!(membership.member_id(), None);
        assert_eq!(membership.generation_id(), NO_GENERATION_ID);
        assert_matches!(
            membership.begin_join(),
            Ok(JoinStart::Join { member_id }) if member_id.is_empty()
        );
    }

    #[test]
    fn stale_fencing_keeps_newer_identity() {
        let membership = Membership::new("g".to_string());
        stable(&membership, "m1", 2);

        // a response for generation 1 arrives late
        membership.clear_identity(Some(&generation("m1", 1)));
        assert_eq!(membership.generation().unwrap(), generation("m1", 2));

        assert!(membership.request_rejoin(Some(&generation("m1", 1))));
        assert_eq!(membership.member_id().as_deref(), Some("m1"));
    }

    #[test]
    fn heartbeat_due() {
        let membership = Membership::new("g".to_string());
        let interval = Duration::from_secs(3);
        let now = Instant::now();

        assert_matches!(
            membership.heartbeat_target(interval, now),
            HeartbeatTarget::NotStable
        );

        stable(&membership, "m1", 1);
        let gen = assert_matches!(
            membership.heartbeat_target(interval, now),
            HeartbeatTarget::Due(gen) => gen
        );

        membership.heartbeat_succeeded(&gen, now);
        assert_matches!(
            membership.heartbeat_target(interval, now + Duration::from_secs(1)),
            HeartbeatTarget::NotDue
        );
        assert_matches!(
            membership.heartbeat_target(Duration::ZERO, now),
            HeartbeatTarget::Due(_)
        );
        assert_matches!(
            membership.heartbeat_target(interval, now + interval),
            HeartbeatTarget::Due(_)
        );
    }

    #[test]
    fn session_expiry() {
        let membership = Membership::new("g".to_string());
        let session_timeout = Duration::from_secs(10);
        stable(&membership, "m1", 1);

        let now = Instant::now();
        assert!(!membership.session_expired(session_timeout, now));
        assert!(membership.session_expired(session_timeout, now + session_timeout));

        membership.heartbeat_succeeded(&generation("m1", 1), now + Duration::from_secs(5));
        assert!(!membership.session_expired(session_timeout, now + session_timeout));
    }

    #[test]
    fn session_deadline_follows_last_success() {
        let membership = Membership::new("g".to_string());
        let session_timeout = Duration::from_secs(10);
        assert_eq!(membership.session_deadline(session_timeout), None);

        stable(&membership, "m1", 1);
        let start = membership
            .session_deadline(session_timeout)
            .expect("stable member has a session");

        let later = start + Duration::from_secs(4);
        membership.heartbeat_succeeded(&generation("m1", 1), later);
        assert_eq!(
            membership.session_deadline(session_timeout),
            Some(later + session_timeout)
        );
    }

    #[test]
    fn leave_before_join_keeps_member_unjoined() {
        let membership = Membership::new("g".to_string());

        assert_matches!(membership.begin_leave(), LeaveStart::NotJoined);
        assert_eq!(membership.state(), GroupState::Unjoined);
        assert_matches!(membership.begin_join(), Ok(JoinStart::Join { .. }));
    }

    #[test]
    fn lost_group_is_terminal() {
        let membership = Membership::new("g".to_string());
        stable(&membership, "m1", 1);
        assert!(membership.request_rejoin(None));

        assert!(membership.lose("coordinator gone".to_string()));
        assert_eq!(membership.state(), GroupState::Left);
        assert_matches!(membership.generation(), Err(Error::GroupLost { reason, .. }) if reason == "coordinator gone");
        assert_matches!(membership.begin_join(), Err(Error::GroupLost { .. }));
    }

    #[test]
    fn leaving_wins_over_lose() {
        let membership = Membership::new("g".to_string());
        stable(&membership, "m1", 1);

        assert_matches!(membership.begin_leave(), LeaveStart::Leave { .. });
        assert!(!membership.lose("late".to_string()));
        assert_matches!(membership.ensure_not_left(), Err(Error::Left { .. }));
    }
}
