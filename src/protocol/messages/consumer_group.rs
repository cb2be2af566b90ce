/// Partitions of one topic owned by, or assigned to, a member.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PartitionAssignment {
    pub topic: String,
    pub partitions: Vec<i32>,
}

// ConsumerGroupMemberMetadata holds the metadata for consumer group
// https://github.com/apache/kafka/blob/trunk/clients/src/main/resources/common/message/ConsumerProtocolSubscription.json
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConsumerGroupMemberMetadata {
    pub version: i16,
    // Version >= 0
    pub topics: Vec<String>,
    // Version >= 0
    pub user_data: Vec<u8>,
    // Version >= 1
    pub owned_partitions: Vec<PartitionAssignment>,
    // Version >= 2
    pub generation_id: i32,
    // Version >= 2
    pub rack_id: Option<String>,
}

// ConsumerGroupMemberAssignment holds the member assignment for a consume group
// https://github.com/apache/kafka/blob/trunk/clients/src/main/resources/common/message/ConsumerProtocolAssignment.json
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConsumerGroupMemberAssignment {
    pub version: i16,
    pub topics: Vec<PartitionAssignment>,
    pub user_data: Vec<u8>,
}

impl ConsumerGroupMemberAssignment {
    pub fn new(topics: Vec<PartitionAssignment>) -> Self {
        Self {
            version: 0,
            topics,
            user_data: vec![],
        }
    }

    /// Number of partitions across all topics.
    pub fn partition_count(&self) -> usize {
        self.topics.iter().map(|t| t.partitions.len()).sum()
    }
}
