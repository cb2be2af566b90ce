use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rskafka_group::client::assignor::{AssignmentPlan, Assignor};
use rskafka_group::client::error::{Error, ProtocolError, TransportError};
use rskafka_group::client::instrumentation::{Instrumentation, InstrumentationEvent};
use rskafka_group::connection::CoordinatorLink;
use rskafka_group::protocol::messages::{
    ConsumerGroupMemberAssignment, HeartbeatRequest, HeartbeatResponse, JoinGroupRequest,
    JoinGroupResponse, JoinGroupResponseMember, LeaveGroupRequest, LeaveGroupResponse,
    OffsetCommitRequest, OffsetCommitResponse, OffsetCommitResponsePartition,
    OffsetCommitResponseTopic, OffsetFetchRequest, OffsetFetchResponse,
    OffsetFetchResponsePartition, OffsetFetchResponseTopic, PartitionAssignment,
    SyncGroupRequest, SyncGroupResponse,
};
use rskafka_group::topic::Topic;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

/// Start logging if the `RUST_LOG` environment variable is set.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

pub fn start_logging() {
    static LOG_SETUP: Once = Once::new();

    LOG_SETUP.call_once(|| {
        LogTracer::init().unwrap();

        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();

        tracing::subscriber::set_global_default(subscriber).unwrap();
    })
}

/// A failure the mock coordinator answers with.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Protocol(ProtocolError),
    Timeout,
}

impl Fault {
    fn into_result(self) -> Result<Option<ProtocolError>, Error> {
        match self {
            Self::Protocol(e) => Ok(Some(e)),
            Self::Timeout => Err(Error::Transport(TransportError::Timeout(
                Duration::from_secs(1),
            ))),
        }
    }
}

fn no_fault(fault: Option<Fault>) -> Result<Option<ProtocolError>, Error> {
    fault.map(Fault::into_result).unwrap_or(Ok(None))
}

/// Requests received and scripted answers of [`MockLink`].
#[derive(Debug, Default)]
pub struct MockState {
    pub joins: Vec<JoinGroupRequest>,
    pub syncs: Vec<SyncGroupRequest>,
    pub heartbeats: Vec<HeartbeatRequest>,
    pub leaves: Vec<LeaveGroupRequest>,
    pub commits: Vec<OffsetCommitRequest>,
    pub fetches: Vec<OffsetFetchRequest>,

    pub join_faults: VecDeque<Fault>,
    pub heartbeat_faults: VecDeque<Fault>,
    pub commit_faults: VecDeque<Fault>,
    pub fail_leave: bool,

    /// Heartbeats are recorded but never answered.
    pub unanswered_heartbeats: bool,

    pub join_delay: Option<Duration>,

    /// Answer joins without member id with `MemberIdRequired`.
    pub require_member_id: bool,

    /// Leader announced in join responses, the joining member if unset.
    pub leader: Option<String>,

    /// Members besides the joining one.
    pub other_members: Vec<String>,

    /// Handed to followers, the leader gets its share of the plan.
    pub follower_assignment: Vec<PartitionAssignment>,

    pub committed: BTreeMap<(String, i32), i64>,
    pub commit_delay: Option<Duration>,

    pub next_member: usize,
    pub generation: i32,
}

/// Coordinator double recording every request.
#[derive(Debug, Default)]
pub struct MockLink {
    pub state: Mutex<MockState>,
    commits_in_flight: AtomicUsize,
    max_commits_in_flight: AtomicUsize,
}

impl MockLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_commits_in_flight(&self) -> usize {
        self.max_commits_in_flight.load(Ordering::SeqCst)
    }

    pub fn join_count(&self) -> usize {
        self.state.lock().joins.len()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.state.lock().heartbeats.len()
    }
}

#[async_trait]
impl CoordinatorLink for MockLink {
    async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinGroupResponse, Error> {
        let delay = {
            let mut state = self.state.lock();
            state.joins.push(request.clone());
            state.join_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();

        if let Some(error_code) = no_fault(state.join_faults.pop_front())? {
            return Ok(JoinGroupResponse {
                error_code: Some(error_code),
                ..Default::default()
            });
        }

        let member_id = if request.member_id.is_empty() {
            state.next_member += 1;
            let member_id = format!("member-{}", state.next_member);

            if state.require_member_id {
                return Ok(JoinGroupResponse {
                    error_code: Some(ProtocolError::MemberIdRequired),
                    member_id,
                    ..Default::default()
                });
            }
            member_id
        } else {
            request.member_id.clone()
        };

        state.generation += 1;
        let protocol = request.protocols.first().cloned().unwrap_or_else(|| {
            panic!("join request without protocol: {request:?}");
        });

        let mut members = vec![JoinGroupResponseMember {
            member_id: member_id.clone(),
            group_instance_id: request.group_instance_id.clone(),
            metadata: protocol.metadata.clone(),
        }];
        members.extend(state.other_members.iter().map(|id| JoinGroupResponseMember {
            member_id: id.clone(),
            group_instance_id: None,
            metadata: protocol.metadata.clone(),
        }));

        Ok(JoinGroupResponse {
            throttle_time_ms: None,
            error_code: None,
            generation_id: state.generation,
            protocol_name: protocol.name,
            leader: state.leader.clone().unwrap_or_else(|| member_id.clone()),
            member_id,
            members,
        })
    }

    async fn sync_group(&self, request: &SyncGroupRequest) -> Result<SyncGroupResponse, Error> {
        let mut state = self.state.lock();
        state.syncs.push(request.clone());

        let assignment = if request.assignments.is_empty() {
            ConsumerGroupMemberAssignment::new(state.follower_assignment.clone())
        } else {
            request
                .assignments
                .iter()
                .find(|a| a.member_id == request.member_id)
                .map(|a| a.assignment.clone())
                .unwrap_or_default()
        };

        Ok(SyncGroupResponse {
            throttle_time_ms: None,
            error_code: None,
            assignment,
        })
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, Error> {
        let unanswered = {
            let mut state = self.state.lock();
            state.heartbeats.push(request.clone());
            state.unanswered_heartbeats
        };
        if unanswered {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        Ok(HeartbeatResponse {
            throttle_time_ms: None,
            error_code: no_fault(state.heartbeat_faults.pop_front())?,
        })
    }

    async fn leave_group(&self, request: &LeaveGroupRequest) -> Result<LeaveGroupResponse, Error> {
        let mut state = self.state.lock();
        state.leaves.push(request.clone());

        if state.fail_leave {
            return Err(Error::Transport(TransportError::ConnectionReset(
                "coordinator went away".to_string(),
            )));
        }

        Ok(LeaveGroupResponse::default())
    }

    async fn commit_offsets(
        &self,
        request: &OffsetCommitRequest,
    ) -> Result<OffsetCommitResponse, Error> {
        let in_flight = self.commits_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_commits_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = self.state.lock().commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock();
            state.commits.push(request.clone());

            no_fault(state.commit_faults.pop_front()).map(|error_code| {
                if error_code.is_none() {
                    for topic in &request.topics {
                        for partition in &topic.partitions {
                            state.committed.insert(
                                (topic.name.clone(), partition.partition_index),
                                partition.committed_offset,
                            );
                        }
                    }
                }

                OffsetCommitResponse {
                    throttle_time_ms: None,
                    topics: request
                        .topics
                        .iter()
                        .map(|topic| OffsetCommitResponseTopic {
                            name: topic.name.clone(),
                            partitions: topic
                                .partitions
                                .iter()
                                .map(|p| OffsetCommitResponsePartition {
                                    partition_index: p.partition_index,
                                    error_code,
                                })
                                .collect(),
                        })
                        .collect(),
                }
            })
        };

        self.commits_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_offsets(
        &self,
        request: &OffsetFetchRequest,
    ) -> Result<OffsetFetchResponse, Error> {
        let mut state = self.state.lock();
        state.fetches.push(request.clone());

        let topics = request
            .topics
            .iter()
            .map(|topic| OffsetFetchResponseTopic {
                name: topic.name.clone(),
                partitions: topic
                    .partition_indexes
                    .iter()
                    .map(|partition| OffsetFetchResponsePartition {
                        partition_index: *partition,
                        committed_offset: state
                            .committed
                            .get(&(topic.name.clone(), *partition))
                            .copied()
                            .unwrap_or(-1),
                        metadata: None,
                        error_code: None,
                    })
                    .collect(),
            })
            .collect();

        Ok(OffsetFetchResponse {
            throttle_time_ms: None,
            topics,
            error_code: None,
        })
    }
}

/// Hands every partition to the first member.
#[derive(Debug, Default)]
pub struct FirstMemberAssignor {
    calls: AtomicUsize,
}

impl FirstMemberAssignor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Assignor for FirstMemberAssignor {
    fn name(&self) -> &str {
        "first"
    }

    fn assign(
        &self,
        topics: &[Topic],
        members: &[JoinGroupResponseMember],
    ) -> Result<AssignmentPlan, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut plan = AssignmentPlan::new();
        if let Some(first) = members.first() {
            plan.insert(
                first.member_id.clone(),
                topics
                    .iter()
                    .map(|t| PartitionAssignment {
                        topic: t.name.clone(),
                        partitions: t.partitions.iter().copied().collect(),
                    })
                    .collect(),
            );
        }

        Ok(plan)
    }
}

#[derive(Debug, Default)]
pub struct RecordingInstrumentation {
    events: Mutex<Vec<InstrumentationEvent>>,
}

impl RecordingInstrumentation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<InstrumentationEvent> {
        self.events.lock().clone()
    }
}

impl Instrumentation for RecordingInstrumentation {
    fn emit(&self, event: InstrumentationEvent) {
        self.events.lock().push(event);
    }
}

/// Polls `condition` until it holds, panics after a minute.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
