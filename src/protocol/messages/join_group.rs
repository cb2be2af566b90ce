use crate::protocol::error::Error;
use crate::protocol::messages::ConsumerGroupMemberMetadata;

/// The list of protocols that the member supports.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JoinGroupProtocol {
    /// The protocol name.
    pub name: String,

    /// The protocol metadata.
    pub metadata: ConsumerGroupMemberMetadata,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JoinGroupRequest {
    /// The group identifier.
    pub group_id: String,

    /// The coordinator considers the consumer dead if it receives no heartbeat after
    /// this timeout in milliseconds.
    pub session_timeout_ms: i32,

    /// The maximum time in milliseconds that the coordinator will wait for each
    /// member to rejoin when rebalancing the group.
    ///
    /// Added in version 1.
    pub rebalance_timeout_ms: i32,

    /// The member id assigned by the group coordinator, empty on the first join.
    pub member_id: String,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 5.
    pub group_instance_id: Option<String>,

    /// The unique name the for class of protocols implemented by the group we want to join.
    pub protocol_type: String,

    /// The list of protocols that the member supports.
    pub protocols: Vec<JoinGroupProtocol>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JoinGroupResponseMember {
    /// The group member ID.
    pub member_id: String,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 5.
    pub group_instance_id: Option<String>,

    /// The group member metadata.
    pub metadata: ConsumerGroupMemberMetadata,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct JoinGroupResponse {
    /// The duration in milliseconds for which the request was throttled due to a
    /// quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 2.
    pub throttle_time_ms: Option<i32>,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,

    /// The generation ID of the group.
    pub generation_id: i32,

    /// The group protocol selected by the coordinator.
    pub protocol_name: String,

    /// The leader of the group.
    pub leader: String,

    /// The member ID assigned by the group coordinator.
    pub member_id: String,

    /// Every member of the generation, only populated for the leader.
    pub members: Vec<JoinGroupResponseMember>,
}
