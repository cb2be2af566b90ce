use crate::protocol::error::Error;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetCommitRequestTopicPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The message offset to be committed.
    pub committed_offset: i64,

    /// Any associated metadata the client wants to keep.
    pub committed_metadata: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetCommitRequestTopic {
    /// The topic name.
    pub name: String,

    /// Each partition to commit offsets for.
    pub partitions: Vec<OffsetCommitRequestTopicPartition>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetCommitRequest {
    /// The unique group identifier.
    pub group_id: String,

    /// The generation of the group.
    pub generation_id: i32,

    /// The member ID assigned by the group coordinator.
    pub member_id: String,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 7.
    pub group_instance_id: Option<String>,

    /// The time period in ms to retain the offset, -1 for the broker default.
    ///
    /// Added in version 2.
    /// Removed in version 5.
    pub retention_time_ms: i64,

    /// The topics to commit offsets for.
    pub topics: Vec<OffsetCommitRequestTopic>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetCommitResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetCommitResponseTopic {
    /// The topic name.
    pub name: String,

    /// The responses for each partition in the topic.
    pub partitions: Vec<OffsetCommitResponsePartition>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OffsetCommitResponse {
    /// The duration in milliseconds for which the request was throttled due to a
    /// quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 3.
    pub throttle_time_ms: Option<i32>,

    /// The responses for each topic.
    pub topics: Vec<OffsetCommitResponseTopic>,
}
