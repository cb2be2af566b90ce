//! Consumption progress and offset commits of one group member.
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::client::error::{Error, RequestContext, Result};
use crate::client::membership::{Generation, Membership};
use crate::connection::CoordinatorLink;
use crate::protocol::messages::{
    OffsetCommitRequest, OffsetCommitRequestTopic, OffsetCommitRequestTopicPartition,
    OffsetFetchRequest, OffsetFetchRequestTopic, PartitionAssignment,
};

/// Retention of committed offsets, -1 leaves it to the broker.
const DEFAULT_RETENTION_TIME_MS: i64 = -1;

/// Committed offset reported for partitions without a commit.
const NO_COMMITTED_OFFSET: i64 = -1;

/// Offset of a single partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOffset {
    pub partition: i32,
    pub offset: i64,
}

impl PartitionOffset {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }

    /// Parses an offset given as a decimal string.
    pub fn parse(partition: i32, offset: &str) -> Result<Self> {
        if offset.is_empty() || !offset.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidOffsets(format!(
                "offset {offset:?} of partition {partition} is not a decimal number"
            )));
        }

        let offset = offset.parse::<i64>().map_err(|e| {
            Error::InvalidOffsets(format!(
                "offset {offset:?} of partition {partition} is out of range: {e}"
            ))
        })?;

        Ok(Self { partition, offset })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOffsets {
    pub topic: String,
    pub partitions: Vec<PartitionOffset>,
}

/// Offsets per topic, ordered by topic and partition when produced by the
/// tracker.
///
/// Depending on where it comes from this is either the progress that still
/// has to be committed or the position committed last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetsView {
    pub topics: Vec<TopicOffsets>,
}

impl OffsetsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the offsets of one topic.
    pub fn with_topic(
        mut self,
        topic: impl Into<String>,
        partitions: impl IntoIterator<Item = PartitionOffset>,
    ) -> Self {
        self.topics.push(TopicOffsets {
            topic: topic.into(),
            partitions: partitions.into_iter().collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.topics.iter().all(|t| t.partitions.is_empty())
    }

    pub fn partition_count(&self) -> usize {
        self.topics.iter().map(|t| t.partitions.len()).sum()
    }

    /// The offset of `partition` in `topic`, if present.
    pub fn get(&self, topic: &str, partition: i32) -> Option<i64> {
        self.topics
            .iter()
            .filter(|t| t.topic == topic)
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition == partition)
            .map(|p| p.offset)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    /// Next offset to consume, as reported by [`OffsetTracker::track`].
    position: Option<i64>,

    /// Offset the coordinator acknowledged last.
    committed: Option<i64>,
}

impl Progress {
    fn is_dirty(&self) -> bool {
        self.position.is_some() && self.position != self.committed
    }
}

/// Who commits, the identity is read once the commit is about to be sent.
pub(crate) struct CommitTarget<'a> {
    pub(crate) group_id: &'a str,
    pub(crate) group_instance_id: Option<&'a str>,
    pub(crate) membership: &'a Membership,
}

/// Tracks processed and committed offsets per partition.
///
/// Consumers report progress through [`track`](Self::track) while heartbeats
/// and commits run concurrently. Reads return a snapshot and never wait on a
/// commit in flight. Commits are serialized, a second commit waits until the
/// first one got its answer.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    subscription: RwLock<BTreeSet<String>>,
    progress: RwLock<BTreeMap<String, BTreeMap<i32, Progress>>>,
    commit_lock: tokio::sync::Mutex<()>,
}

impl OffsetTracker {
    pub(crate) fn new(topics: impl IntoIterator<Item = String>) -> Self {
        Self {
            subscription: RwLock::new(topics.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Records that `offset` of `partition` was processed.
    ///
    /// The next commit will store `offset + 1`, the position to resume from.
    pub fn track(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        self.check_topic(topic)?;
        check_partition(topic, partition)?;

        let position = offset
            .checked_add(1)
            .filter(|_| offset >= 0)
            .ok_or_else(|| {
                Error::InvalidOffsets(format!(
                    "offset {offset} of {topic}/{partition} is out of range"
                ))
            })?;

        let mut progress = self.progress.write();
        progress
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default()
            .position = Some(position);

        Ok(())
    }

    /// Progress that differs from what was committed last.
    pub fn uncommitted_offsets(&self) -> OffsetsView {
        self.view(|p| if p.is_dirty() { p.position } else { None })
    }

    /// Offsets acknowledged by the coordinator.
    pub fn committed_offsets(&self) -> OffsetsView {
        self.view(|p| p.committed)
    }

    fn view(&self, offset: impl Fn(&Progress) -> Option<i64>) -> OffsetsView {
        let progress = self.progress.read();

        let topics = progress
            .iter()
            .filter_map(|(topic, partitions)| {
                let partitions: Vec<_> = partitions
                    .iter()
                    .filter_map(|(partition, p)| {
                        offset(p).map(|offset| PartitionOffset::new(*partition, offset))
                    })
                    .collect();

                (!partitions.is_empty()).then(|| TopicOffsets {
                    topic: topic.clone(),
                    partitions,
                })
            })
            .collect();

        OffsetsView { topics }
    }

    pub(crate) fn set_subscription(&self, topics: impl IntoIterator<Item = String>) {
        let topics: BTreeSet<_> = topics.into_iter().collect();
        self.progress.write().retain(|topic, _| topics.contains(topic));
        *self.subscription.write() = topics;
    }

    /// Forgets partitions that are no longer assigned to this member.
    pub(crate) fn retain_assigned(&self, assignment: &[PartitionAssignment]) {
        let mut progress = self.progress.write();

        progress.retain(|topic, partitions| {
            let assigned = assignment
                .iter()
                .filter(|a| &a.topic == topic)
                .flat_map(|a| a.partitions.iter())
                .collect::<BTreeSet<_>>();

            partitions.retain(|partition, _| assigned.contains(partition));
            !partitions.is_empty()
        });
    }

    fn mark_committed(&self, topic: &str, partition: i32, offset: i64) {
        let mut progress = self.progress.write();
        let entry = progress
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();

        if let Some(previous) = entry.committed {
            if offset < previous {
                warn!(
                    topic,
                    partition, previous, offset, "committed offset moved backwards",
                );
            }
        }
        entry.committed = Some(offset);
    }

    fn check_topic(&self, topic: &str) -> Result<()> {
        if self.subscription.read().contains(topic) {
            Ok(())
        } else {
            Err(Error::InvalidOffsets(format!(
                "topic {topic:?} is not subscribed"
            )))
        }
    }

    fn validate(&self, view: &OffsetsView) -> Result<()> {
        let mut seen = BTreeSet::new();

        for topic in &view.topics {
            self.check_topic(&topic.topic)?;

            for p in &topic.partitions {
                check_partition(&topic.topic, p.partition)?;

                if p.offset < 0 {
                    return Err(Error::InvalidOffsets(format!(
                        "offset {} of {}/{} is negative",
                        p.offset, topic.topic, p.partition
                    )));
                }

                if !seen.insert((topic.topic.as_str(), p.partition)) {
                    return Err(Error::InvalidOffsets(format!(
                        "{}/{} is listed twice",
                        topic.topic, p.partition
                    )));
                }
            }
        }

        Ok(())
    }

    /// Commits `view` with the current identity of `target.membership`.
    ///
    /// Input is validated before anything is sent. The identity is read only
    /// after earlier commits finished, so a queued commit uses the
    /// generation that is current when it is actually sent. `on_send` sees
    /// that generation. A response arriving after the member left is
    /// discarded.
    pub(crate) async fn commit<L, F>(
        &self,
        link: &L,
        target: CommitTarget<'_>,
        view: &OffsetsView,
        on_send: F,
    ) -> Result<()>
    where
        L: CoordinatorLink + ?Sized,
        F: FnOnce(&Generation) + Send,
    {
        self.validate(view)?;
        if view.is_empty() {
            return Ok(());
        }

        let _guard = self.commit_lock.lock().await;
        let generation = target.membership.generation()?;
        on_send(&generation);

        let request = OffsetCommitRequest {
            group_id: target.group_id.to_string(),
            generation_id: generation.generation_id,
            member_id: generation.member_id,
            group_instance_id: target.group_instance_id.map(ToString::to_string),
            retention_time_ms: DEFAULT_RETENTION_TIME_MS,
            topics: view
                .topics
                .iter()
                .filter(|t| !t.partitions.is_empty())
                .map(|t| OffsetCommitRequestTopic {
                    name: t.topic.clone(),
                    partitions: t
                        .partitions
                        .iter()
                        .map(|p| OffsetCommitRequestTopicPartition {
                            partition_index: p.partition,
                            committed_offset: p.offset,
                            committed_metadata: None,
                        })
                        .collect(),
                })
                .collect(),
        };

        let response = link.commit_offsets(&request).await;
        target.membership.ensure_not_left()?;
        let response = response?;

        if let Some(throttle) = response.throttle_time_ms.filter(|t| *t > 0) {
            debug!(group = target.group_id, throttle, "offset commit throttled");
        }

        let mut first_error = None;
        for topic in response.topics {
            for partition in topic.partitions {
                match partition.error_code {
                    None => {
                        if let Some(offset) = view.get(&topic.name, partition.partition_index) {
                            self.mark_committed(&topic.name, partition.partition_index, offset);
                        }
                    }
                    Some(protocol_error) => {
                        first_error.get_or_insert(Error::ServerError {
                            protocol_error,
                            error_message: None,
                            request: RequestContext::Partition(
                                topic.name.clone(),
                                partition.partition_index,
                            ),
                        });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetches the committed offsets of `assignment` and makes them the
    /// committed baseline.
    pub(crate) async fn fetch<L>(
        &self,
        link: &L,
        group_id: &str,
        assignment: &[PartitionAssignment],
    ) -> Result<OffsetsView>
    where
        L: CoordinatorLink + ?Sized,
    {
        let topics: Vec<_> = assignment
            .iter()
            .filter(|a| !a.partitions.is_empty())
            .map(|a| OffsetFetchRequestTopic {
                name: a.topic.clone(),
                partition_indexes: a.partitions.clone(),
            })
            .collect();

        if topics.is_empty() {
            return Ok(OffsetsView::new());
        }

        let request = OffsetFetchRequest {
            group_id: group_id.to_string(),
            topics,
            require_stable: true,
        };

        let response = link.fetch_offsets(&request).await?;
        if let Some(protocol_error) = response.error_code {
            return Err(Error::group(protocol_error, group_id));
        }

        let mut view = OffsetsView::new();
        for topic in response.topics {
            let mut partitions = vec![];

            for partition in topic.partitions {
                if let Some(protocol_error) = partition.error_code {
                    return Err(Error::ServerError {
                        protocol_error,
                        error_message: partition.metadata,
                        request: RequestContext::Partition(
                            topic.name.clone(),
                            partition.partition_index,
                        ),
                    });
                }

                if partition.committed_offset == NO_COMMITTED_OFFSET {
                    continue;
                }
                if partition.committed_offset < 0 {
                    return Err(Error::InvalidResponse(format!(
                        "committed offset {} of {}/{}",
                        partition.committed_offset, topic.name, partition.partition_index
                    )));
                }

                partitions.push(PartitionOffset::new(
                    partition.partition_index,
                    partition.committed_offset,
                ));
            }

            partitions.sort_by_key(|p| p.partition);
            if !partitions.is_empty() {
                view = view.with_topic(topic.name, partitions);
            }
        }

        for topic in &view.topics {
            for p in &topic.partitions {
                self.mark_committed(&topic.topic, p.partition, p.offset);
            }
        }

        Ok(view)
    }
}

fn check_partition(topic: &str, partition: i32) -> Result<()> {
    if partition < 0 {
        return Err(Error::InvalidOffsets(format!(
            "partition {partition} of {topic} is negative"
        )));
    }
    Ok(())
}
