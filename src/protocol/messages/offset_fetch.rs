use crate::protocol::error::Error;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetFetchRequestTopic {
    /// The topic name.
    pub name: String,

    /// The partition indexes we would like to fetch offsets for.
    pub partition_indexes: Vec<i32>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetFetchRequest {
    /// The group to fetch offsets for.
    pub group_id: String,

    /// Each topic we would like to fetch offsets for.
    pub topics: Vec<OffsetFetchRequestTopic>,

    /// Whether broker should hold on returning unstable offsets but set
    /// a retriable error code for the partitions.
    ///
    /// Added in version 7
    pub require_stable: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetFetchResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The committed message offset, -1 when nothing was committed.
    pub committed_offset: i64,

    /// The partition metadata.
    pub metadata: Option<String>,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OffsetFetchResponseTopic {
    /// The topic name.
    pub name: String,

    /// The responses per partition.
    pub partitions: Vec<OffsetFetchResponsePartition>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OffsetFetchResponse {
    /// The duration in milliseconds for which the request was throttled due to a
    /// quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 3.
    pub throttle_time_ms: Option<i32>,

    /// The responses per topic.
    pub topics: Vec<OffsetFetchResponseTopic>,

    /// The top-level error code, or 0 if there was no error.
    ///
    /// Added in version 2.
    pub error_code: Option<Error>,
}
