//! Kafka separates storage from compute. Storage is handled by the brokers and
//! compute is mainly handled by consumers or frameworks built on top of consumers
//! (Kafka Streams, ksqlDB). Consumer groups play a key role in the effectiveness
//! and scalability of Kafka consumers.
//!
//! https://developer.confluent.io/courses/architecture/consumer-group-protocol

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, ErrorOrThrottle};
use crate::client::assignor::{validate_plan, Assignor};
use crate::client::error::{Error, ErrorKind, ProtocolError, Result, TransportError};
use crate::client::heartbeat::HeartbeatScheduler;
use crate::client::instrumentation::{
    Instrumentation, InstrumentationEvent, Outcome, RejoinReason,
};
use crate::client::membership::{
    Generation, GroupState, HeartbeatTarget, JoinStart, LeaveStart, Membership,
};
use crate::client::offsets::{CommitTarget, OffsetTracker, OffsetsView};
use crate::client::{validate_topics, GroupConfig};
use crate::connection::CoordinatorLink;
use crate::protocol::messages::{
    ConsumerGroupMemberMetadata, HeartbeatRequest, JoinGroupProtocol, JoinGroupRequest,
    LeaveGroupRequest, PartitionAssignment, SyncGroupRequest,
};
use crate::throttle::maybe_throttle;
use crate::topic::Topic;

/// Protocol type of consumer groups, as opposed to e.g. connect groups.
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";

/// Options of a single [`ConsumerGroup::heartbeat`] call.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartbeatOptions {
    /// Minimum time since the last heartbeat, defaults to the configured
    /// heartbeat interval. Zero sends a heartbeat right away.
    pub interval: Option<Duration>,
}

impl HeartbeatOptions {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
        }
    }
}

/// What a [`ConsumerGroup::heartbeat`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The last heartbeat is more recent than the interval, nothing was sent.
    NotDue,

    /// A heartbeat was sent and acknowledged.
    Sent,

    /// The member is not stable, nothing was sent.
    Skipped,

    /// The coordinator asked the member to rejoin, which is under way.
    RejoinRequired(RejoinReason),
}

/// Who asks for a rejoin. The heartbeat loop must not cancel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Caller {
    Scheduler,
    Foreground,
}

/// Membership of one consumer in a group.
///
/// ConsumerGroup doesn't consume topics, you have to consume the assigned
/// partitions and report progress to the [`OffsetTracker`] yourself. Once
/// joined, heartbeats are sent in the background and rebalances are followed
/// automatically. Use [`assignment`](Self::assignment) to see which
/// partitions are currently owned.
///
/// Must be constructed using [`ConsumerGroupBuilder`](crate::client::ConsumerGroupBuilder).
#[derive(Debug)]
pub struct ConsumerGroup<L>
where
    L: CoordinatorLink + 'static,
{
    inner: Arc<Inner<L>>,
}

/// Subscribed topics, `version` counts replacements.
#[derive(Debug)]
struct Subscription {
    topics: Vec<Topic>,
    version: u64,
}

#[derive(Debug)]
struct Inner<L> {
    link: L,
    config: GroupConfig,
    subscription: RwLock<Subscription>,
    assignor: Arc<dyn Assignor>,
    instrumentation: Arc<dyn Instrumentation>,

    membership: Membership,
    offsets: OffsetTracker,

    /// Held for every join, sync and heartbeat request.
    rpc: tokio::sync::Mutex<()>,

    /// Held for a whole join/sync round including retries.
    join_lock: tokio::sync::Mutex<()>,

    scheduler: Mutex<Option<HeartbeatScheduler>>,
}

impl<L> ConsumerGroup<L>
where
    L: CoordinatorLink + 'static,
{
    pub(crate) fn new(
        link: L,
        config: GroupConfig,
        topics: Vec<Topic>,
        assignor: Arc<dyn Assignor>,
        instrumentation: Arc<dyn Instrumentation>,
    ) -> Self {
        let group_id = config.group_id.clone();
        let offsets = OffsetTracker::new(topics.iter().map(|t| t.name.clone()));

        Self {
            inner: Arc::new(Inner {
                link,
                config,
                subscription: RwLock::new(Subscription {
                    topics,
                    version: 0,
                }),
                assignor,
                instrumentation,
                membership: Membership::new(group_id),
                offsets,
                rpc: Default::default(),
                join_lock: Default::default(),
                scheduler: Mutex::new(None),
            }),
        }
    }

    /// Joins the group and waits for the assignment.
    ///
    /// Transient failures are retried with backoff. Returns immediately when
    /// the member is already stable.
    pub async fn join(&self) -> Result<()> {
        self.inner.join().await
    }

    /// Sends a heartbeat if the last one is at least `options.interval` old.
    ///
    /// A rebalance or fencing response is not an error, the member starts
    /// rejoining in the background and [`HeartbeatOutcome::RejoinRequired`]
    /// is returned.
    pub async fn heartbeat(&self, options: HeartbeatOptions) -> Result<HeartbeatOutcome> {
        let interval = options
            .interval
            .unwrap_or(self.inner.config.heartbeat_interval);

        self.inner.heartbeat(interval, Caller::Foreground).await
    }

    /// Commits `offsets` with the current member id and generation.
    ///
    /// The tracker's result is returned unchanged. Fencing and rebalance
    /// errors additionally start a rejoin.
    pub async fn commit_offsets(&self, offsets: &OffsetsView) -> Result<()> {
        self.inner.commit_offsets(offsets).await
    }

    /// Progress that was not committed yet. Does not talk to the coordinator.
    pub fn uncommitted_offsets(&self) -> OffsetsView {
        self.inner.offsets.uncommitted_offsets()
    }

    /// Fetches the committed offsets of the assigned partitions to resume
    /// consumption from. Partitions without a commit are left out.
    pub async fn fetch_offsets(&self) -> Result<OffsetsView> {
        self.inner.membership.ensure_not_left()?;

        let assignment = self.inner.membership.assignment();
        self.inner
            .offsets
            .fetch(&self.inner.link, &self.inner.config.group_id, &assignment)
            .await
    }

    /// Replaces the subscription. A stable member rejoins right away so the
    /// leader can take the new topics into account.
    pub async fn subscribe(&self, topics: Vec<Topic>) -> Result<()> {
        self.inner.subscribe(topics).await
    }

    /// Leaves the group.
    ///
    /// Dynamic members tell the coordinator, static members only drop their
    /// local identity. Failures to reach the coordinator are logged and
    /// otherwise ignored. Calling this again is a no-op.
    pub async fn leave(&self) -> Result<()> {
        self.inner.leave().await
    }

    pub fn offset_tracker(&self) -> &OffsetTracker {
        &self.inner.offsets
    }

    pub fn state(&self) -> GroupState {
        self.inner.membership.state()
    }

    pub fn member_id(&self) -> Option<String> {
        self.inner.membership.member_id()
    }

    pub fn generation_id(&self) -> i32 {
        self.inner.membership.generation_id()
    }

    /// Partitions assigned in the current generation.
    pub fn assignment(&self) -> Vec<PartitionAssignment> {
        self.inner.membership.assignment()
    }

    pub fn is_leader(&self) -> bool {
        self.inner.membership.is_leader()
    }

    pub fn group_id(&self) -> &str {
        &self.inner.config.group_id
    }

    pub fn group_instance_id(&self) -> Option<&str> {
        self.inner.config.group_instance_id.as_deref()
    }
}

impl<L> Inner<L>
where
    L: CoordinatorLink + 'static,
{
    fn group_id(&self) -> &str {
        &self.config.group_id
    }

    async fn join(self: &Arc<Self>) -> Result<()> {
        self.membership.ensure_not_left()?;
        if self.membership.state() == GroupState::Stable {
            return Ok(());
        }

        let _guard = self.join_lock.lock().await;
        let result = self.join_with_retry().await;
        if result.is_err() {
            self.membership.join_failed();
        }

        result
    }

    /// Runs join rounds until one succeeds. Callers hold `join_lock`.
    async fn join_with_retry(self: &Arc<Self>) -> Result<()> {
        let mut backoff = Backoff::new(&self.config.backoff);
        let this = self;

        backoff
            .retry_with_backoff("join_group", || async move {
                match this.join_once().await {
                    Ok(()) => ControlFlow::Break(Ok(())),
                    Err(ErrorOrThrottle::Throttle(throttle)) => {
                        ControlFlow::Continue(ErrorOrThrottle::Throttle(throttle))
                    }
                    Err(ErrorOrThrottle::Error(e)) => match e.kind() {
                        ErrorKind::Transient | ErrorKind::Fencing | ErrorKind::Rebalance => {
                            ControlFlow::Continue(ErrorOrThrottle::Error(e))
                        }
                        ErrorKind::Validation | ErrorKind::Fatal => ControlFlow::Break(Err(e)),
                    },
                }
            })
            .await
            .map_err(Error::RetryFailed)?
    }

    /// One join and sync round.
    async fn join_once(self: &Arc<Self>) -> Result<(), ErrorOrThrottle<Error>> {
        let mut member_id = match self.membership.begin_join()? {
            JoinStart::AlreadyStable => return Ok(()),
            JoinStart::Join { member_id } => member_id,
        };

        let (topics, subscription_version) = {
            let subscription = self.subscription.read();
            (subscription.topics.clone(), subscription.version)
        };
        let protocol_name = self.assignor.name().to_string();
        let metadata = ConsumerGroupMemberMetadata {
            version: 0,
            topics: topics.iter().map(|t| t.name.clone()).collect(),
            owned_partitions: self.membership.assignment(),
            generation_id: self.membership.generation_id(),
            ..Default::default()
        };

        let response = loop {
            let request = JoinGroupRequest {
                group_id: self.group_id().to_string(),
                session_timeout_ms: self.config.session_timeout_ms(),
                rebalance_timeout_ms: self.config.rebalance_timeout_ms(),
                member_id: member_id.clone(),
                group_instance_id: self.config.group_instance_id.clone(),
                protocol_type: CONSUMER_PROTOCOL_TYPE.to_string(),
                protocols: vec![JoinGroupProtocol {
                    name: protocol_name.clone(),
                    metadata: metadata.clone(),
                }],
            };

            let response = {
                let _rpc = self.rpc.lock().await;
                self.link.join_group(&request).await
            };
            self.membership.ensure_not_left()?;
            let response = response?;

            match response.error_code {
                None => break response,
                Some(ProtocolError::MemberIdRequired) if !response.member_id.is_empty() => {
                    debug!(
                        group = self.group_id(),
                        member_id = response.member_id.as_str(),
                        "coordinator assigned member id, joining again",
                    );

                    member_id = response.member_id;
                    self.membership.member_id_assigned(&member_id)?;
                }
                Some(protocol_error) => {
                    return Err(self.group_error(protocol_error, None, response.throttle_time_ms))
                }
            }
        };

        if !response.protocol_name.is_empty() && response.protocol_name != protocol_name {
            return Err(Error::InvalidResponse(format!(
                "coordinator selected protocol {}, only {} is supported",
                response.protocol_name, protocol_name
            ))
            .into());
        }

        let generation = Generation {
            member_id: response.member_id.clone(),
            generation_id: response.generation_id,
        };
        self.membership.joined(&generation, &response.leader)?;

        let leader = response.leader == response.member_id;
        let assignments = if leader {
            debug!(
                group = self.group_id(),
                members = response.members.len(),
                "elected leader, computing assignment",
            );

            let plan = self.assignor.assign(&topics, &response.members)?;
            validate_plan(plan, &response.members)?
        } else {
            vec![]
        };

        let request = SyncGroupRequest {
            group_id: self.group_id().to_string(),
            generation_id: generation.generation_id,
            member_id: generation.member_id.clone(),
            group_instance_id: self.config.group_instance_id.clone(),
            protocol_type: Some(CONSUMER_PROTOCOL_TYPE.to_string()),
            protocol_name: Some(protocol_name),
            assignments,
        };

        let response = {
            let _rpc = self.rpc.lock().await;
            self.link.sync_group(&request).await
        };
        self.membership.ensure_not_left()?;
        let response = response?;

        if let Some(protocol_error) = response.error_code {
            return Err(self.group_error(
                protocol_error,
                Some(&generation),
                response.throttle_time_ms,
            ));
        }

        let assignment = response.assignment.topics;
        let partitions = assignment.iter().map(|a| a.partitions.len()).sum();

        self.membership.synced(&generation, assignment.clone())?;
        self.offsets.retain_assigned(&assignment);
        self.start_heartbeat();

        self.instrumentation.emit(InstrumentationEvent::Joined {
            group_id: self.group_id().to_string(),
            member_id: generation.member_id,
            generation_id: generation.generation_id,
            leader,
            partitions,
        });

        // the subscription changed while this round was running
        if self.subscription.read().version != subscription_version {
            self.trigger_rejoin(
                RejoinReason::SubscriptionChanged,
                None,
                Caller::Foreground,
            );
        }

        Ok(())
    }

    /// Turns an error code of a join or sync response into the error for
    /// the retry loop, dropping the identity on fencing.
    fn group_error(
        &self,
        protocol_error: ProtocolError,
        generation: Option<&Generation>,
        throttle_time_ms: Option<i32>,
    ) -> ErrorOrThrottle<Error> {
        let e = Error::group(protocol_error, self.group_id());

        match e.kind() {
            ErrorKind::Fencing => {
                self.membership.clear_identity(generation);
            }
            ErrorKind::Validation | ErrorKind::Fatal => return e.into(),
            ErrorKind::Transient | ErrorKind::Rebalance => {}
        }

        match maybe_throttle(throttle_time_ms) {
            Err(throttle) => throttle,
            Ok(()) => e.into(),
        }
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let mut slot = self.scheduler.lock();

        // leave or a rejoin may have taken over since the sync
        if self.membership.state() != GroupState::Stable {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);

        let scheduler = HeartbeatScheduler::spawn(self.config.heartbeat_interval, move || {
            let weak = Weak::clone(&weak);
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.scheduled_heartbeat().await,
                    None => ControlFlow::Break(()),
                }
            }
        });

        if let Some(previous) = slot.replace(scheduler) {
            previous.stop();
        }
    }

    async fn scheduled_heartbeat(self: &Arc<Self>) -> ControlFlow<()> {
        match self
            .heartbeat(self.config.heartbeat_interval, Caller::Scheduler)
            .await
        {
            Ok(HeartbeatOutcome::Sent | HeartbeatOutcome::NotDue) => ControlFlow::Continue(()),
            Ok(HeartbeatOutcome::Skipped | HeartbeatOutcome::RejoinRequired(_)) => {
                ControlFlow::Break(())
            }
            Err(Error::Left { .. } | Error::GroupLost { .. }) => ControlFlow::Break(()),
            Err(e) => {
                if !self
                    .membership
                    .session_expired(self.config.session_timeout, Instant::now())
                {
                    return ControlFlow::Continue(());
                }

                warn!(
                    group = self.group_id(),
                    e = %e,
                    session_timeout = ?self.config.session_timeout,
                    "no heartbeat succeeded within the session timeout",
                );

                // the coordinator expired the session as well
                let generation = self.membership.generation().ok();
                self.trigger_rejoin(
                    RejoinReason::SessionTimeout,
                    generation.as_ref(),
                    Caller::Scheduler,
                );
                ControlFlow::Break(())
            }
        }
    }

    async fn heartbeat(
        self: &Arc<Self>,
        interval: Duration,
        caller: Caller,
    ) -> Result<HeartbeatOutcome> {
        self.membership.ensure_not_left()?;

        let start = Instant::now();
        let generation = match self.membership.heartbeat_target(interval, start) {
            HeartbeatTarget::NotStable => return Ok(HeartbeatOutcome::Skipped),
            HeartbeatTarget::NotDue => return Ok(HeartbeatOutcome::NotDue),
            HeartbeatTarget::Due(generation) => generation,
        };

        let request = HeartbeatRequest {
            group_id: self.group_id().to_string(),
            generation_id: generation.generation_id,
            member_id: generation.member_id.clone(),
            group_instance_id: self.config.group_instance_id.clone(),
        };

        let call = async {
            let _rpc = self.rpc.lock().await;
            self.link.heartbeat(&request).await
        };
        let response = match self.membership.session_deadline(self.config.session_timeout) {
            Some(deadline) => tokio::time::timeout_at(deadline, call).await,
            None => Ok(call.await),
        };
        self.membership.ensure_not_left()?;

        let Ok(response) = response else {
            return Ok(self.session_timed_out(generation, start, caller));
        };

        let result = response.and_then(|response| {
            if let Some(throttle) = response.throttle_time_ms.filter(|t| *t > 0) {
                debug!(group = self.group_id(), throttle, "heartbeat throttled");
            }

            match response.error_code {
                None => Ok(()),
                Some(protocol_error) => Err(Error::group(protocol_error, self.group_id())),
            }
        });

        let (outcome, result) = match result {
            Ok(()) => {
                self.membership.heartbeat_succeeded(&generation, start);
                (Outcome::Success, Ok(HeartbeatOutcome::Sent))
            }
            Err(e) => match (e.kind(), e.protocol_error()) {
                (ErrorKind::Rebalance, _) => {
                    let reason = RejoinReason::RebalanceInProgress;
                    self.trigger_rejoin(reason, None, caller);
                    (
                        Outcome::Rebalancing,
                        Ok(HeartbeatOutcome::RejoinRequired(reason)),
                    )
                }
                (ErrorKind::Fencing, Some(protocol_error)) => {
                    let reason = RejoinReason::Fenced(protocol_error);
                    self.trigger_rejoin(reason, Some(&generation), caller);
                    (
                        Outcome::Failure(e.to_string()),
                        Ok(HeartbeatOutcome::RejoinRequired(reason)),
                    )
                }
                _ => (Outcome::Failure(e.to_string()), Err(e)),
            },
        };

        self.instrumentation.emit(InstrumentationEvent::Heartbeat {
            group_id: self.group_id().to_string(),
            member_id: generation.member_id,
            generation_id: generation.generation_id,
            duration: start.elapsed(),
            outcome,
        });

        result
    }

    /// No heartbeat got an answer before the session deadline, the
    /// coordinator considers the member gone.
    fn session_timed_out(
        self: &Arc<Self>,
        generation: Generation,
        start: Instant,
        caller: Caller,
    ) -> HeartbeatOutcome {
        let e = Error::Transport(TransportError::Timeout(start.elapsed()));
        warn!(
            group = self.group_id(),
            member_id = generation.member_id.as_str(),
            e = %e,
            session_timeout = ?self.config.session_timeout,
            "heartbeat unanswered within the session timeout",
        );

        let reason = RejoinReason::SessionTimeout;
        self.trigger_rejoin(reason, Some(&generation), caller);

        self.instrumentation.emit(InstrumentationEvent::Heartbeat {
            group_id: self.group_id().to_string(),
            member_id: generation.member_id,
            generation_id: generation.generation_id,
            duration: start.elapsed(),
            outcome: Outcome::Failure(e.to_string()),
        });

        HeartbeatOutcome::RejoinRequired(reason)
    }

    async fn commit_offsets(self: &Arc<Self>, offsets: &OffsetsView) -> Result<()> {
        let start = Instant::now();
        let mut sent = None;

        let target = CommitTarget {
            group_id: self.group_id(),
            group_instance_id: self.config.group_instance_id.as_deref(),
            membership: &self.membership,
        };
        let result = self
            .offsets
            .commit(&self.link, target, offsets, |generation| {
                sent = Some(generation.clone())
            })
            .await;

        // nothing was sent
        let Some(generation) = sent else {
            return result;
        };

        let outcome = match &result {
            Ok(()) => Outcome::Success,
            Err(e) if e.kind() == ErrorKind::Rebalance => Outcome::Rebalancing,
            Err(e) => Outcome::Failure(e.to_string()),
        };
        self.instrumentation.emit(InstrumentationEvent::Commit {
            group_id: self.group_id().to_string(),
            partitions: offsets.partition_count(),
            duration: start.elapsed(),
            outcome,
        });

        if let Err(e) = &result {
            match (e.kind(), e.protocol_error()) {
                (ErrorKind::Rebalance, _) => {
                    self.trigger_rejoin(RejoinReason::RebalanceInProgress, None, Caller::Foreground)
                }
                (ErrorKind::Fencing, Some(protocol_error)) => self.trigger_rejoin(
                    RejoinReason::Fenced(protocol_error),
                    Some(&generation),
                    Caller::Foreground,
                ),
                _ => {}
            }
        }

        result
    }

    /// Moves a stable member to rejoining and stops its heartbeats. Returns
    /// whether this call did the transition.
    fn begin_rejoin(
        &self,
        reason: RejoinReason,
        fenced: Option<&Generation>,
        caller: Caller,
    ) -> bool {
        if !self.membership.request_rejoin(fenced) {
            return false;
        }

        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            match caller {
                Caller::Scheduler => scheduler.detach(),
                Caller::Foreground => scheduler.stop(),
            }
        }

        info!(group = self.group_id(), %reason, "rejoining group");
        self.instrumentation.emit(InstrumentationEvent::RejoinTriggered {
            group_id: self.group_id().to_string(),
            reason,
        });

        true
    }

    /// Starts a rejoin in the background.
    fn trigger_rejoin(
        self: &Arc<Self>,
        reason: RejoinReason,
        fenced: Option<&Generation>,
        caller: Caller,
    ) {
        if !self.begin_rejoin(reason, fenced, caller) {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.rejoin().await });
    }

    async fn rejoin(self: Arc<Self>) {
        let result = {
            let _guard = self.join_lock.lock().await;
            self.join_with_retry().await
        };

        let Err(e) = result else {
            return;
        };

        if matches!(
            self.membership.state(),
            GroupState::Leaving | GroupState::Left
        ) {
            debug!(group = self.group_id(), e = %e, "rejoin aborted by leave");
            return;
        }

        error!(group = self.group_id(), e = %e, "rejoin failed, giving up on the group");
        if self.membership.lose(e.to_string()) {
            if let Some(scheduler) = self.scheduler.lock().take() {
                scheduler.stop();
            }
        }
    }

    async fn subscribe(self: &Arc<Self>, topics: Vec<Topic>) -> Result<()> {
        validate_topics(&topics)?;
        self.membership.ensure_not_left()?;

        self.offsets
            .set_subscription(topics.iter().map(|t| t.name.clone()));
        {
            let mut subscription = self.subscription.write();
            subscription.topics = topics;
            subscription.version += 1;
        }

        if !self.begin_rejoin(RejoinReason::SubscriptionChanged, None, Caller::Foreground) {
            return Ok(());
        }

        let _guard = self.join_lock.lock().await;
        let result = self.join_with_retry().await;
        if result.is_err() {
            self.membership.join_failed();
        }

        result
    }

    async fn leave(&self) -> Result<()> {
        let member_id = match self.membership.begin_leave() {
            LeaveStart::AlreadyLeft => return Ok(()),
            LeaveStart::NotJoined => {
                debug!(group = self.group_id(), "never joined, nothing to leave");
                return Ok(());
            }
            LeaveStart::Leave { member_id } => member_id,
        };

        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }

        match (member_id, &self.config.group_instance_id) {
            (None, _) => {
                debug!(group = self.group_id(), "not a member, nothing to leave");
            }
            (Some(member_id), Some(group_instance_id)) => {
                info!(
                    group = self.group_id(),
                    member_id = member_id.as_str(),
                    group_instance_id = group_instance_id.as_str(),
                    "static member keeps its registration, not leaving",
                );
            }
            (Some(member_id), None) => {
                let request = LeaveGroupRequest {
                    group_id: self.group_id().to_string(),
                    member_id,
                };

                let result = self
                    .link
                    .leave_group(&request)
                    .await
                    .and_then(|response| match response.error_code {
                        None => Ok(()),
                        Some(protocol_error) => Err(Error::group(protocol_error, self.group_id())),
                    });

                match result {
                    Ok(()) => info!(
                        group = self.group_id(),
                        member_id = request.member_id.as_str(),
                        "left group",
                    ),
                    Err(e) => warn!(
                        group = self.group_id(),
                        member_id = request.member_id.as_str(),
                        e = %e,
                        "leave request failed, leaving anyway",
                    ),
                }
            }
        }

        self.membership.left();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::client::assignor::AssignmentPlan;
    use crate::client::ConsumerGroupBuilder;
    use crate::protocol::messages::{
        HeartbeatResponse, JoinGroupResponse, JoinGroupResponseMember, LeaveGroupResponse,
        OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest, OffsetFetchResponse,
        SyncGroupResponse,
    };

    /// The membership is driven by hand, nothing may reach the coordinator.
    #[derive(Debug)]
    struct Disconnected;

    #[async_trait]
    impl CoordinatorLink for Disconnected {
        async fn join_group(&self, _: &JoinGroupRequest) -> Result<JoinGroupResponse> {
            unreachable!()
        }

        async fn sync_group(&self, _: &SyncGroupRequest) -> Result<SyncGroupResponse> {
            unreachable!()
        }

        async fn heartbeat(&self, _: &HeartbeatRequest) -> Result<HeartbeatResponse> {
            unreachable!()
        }

        async fn leave_group(&self, _: &LeaveGroupRequest) -> Result<LeaveGroupResponse> {
            unreachable!()
        }

        async fn commit_offsets(&self, _: &OffsetCommitRequest) -> Result<OffsetCommitResponse> {
            unreachable!()
        }

        async fn fetch_offsets(&self, _: &OffsetFetchRequest) -> Result<OffsetFetchResponse> {
            unreachable!()
        }
    }

    #[derive(Debug)]
    struct NoAssignment;

    impl Assignor for NoAssignment {
        fn name(&self) -> &str {
            "none"
        }

        fn assign(&self, _: &[Topic], _: &[JoinGroupResponseMember]) -> Result<AssignmentPlan> {
            Ok(AssignmentPlan::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_scheduler_once_leaving() {
        let group = ConsumerGroupBuilder::new("g", vec![Topic::new("t", 0..1)])
            .build(Disconnected, Arc::new(NoAssignment))
            .unwrap();
        let inner = &group.inner;

        let generation = Generation {
            member_id: "m1".to_string(),
            generation_id: 1,
        };
        inner.membership.begin_join().unwrap();
        inner.membership.joined(&generation, "m1").unwrap();
        inner.membership.synced(&generation, vec![]).unwrap();

        inner.start_heartbeat();
        let scheduler = inner.scheduler.lock().take();
        assert!(scheduler.is_some());

        // leave takes over between sync and scheduler start
        assert!(matches!(
            inner.membership.begin_leave(),
            LeaveStart::Leave { .. }
        ));
        inner.start_heartbeat();
        assert!(inner.scheduler.lock().is_none());
    }
}
