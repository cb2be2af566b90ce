use crate::protocol::error::Error;
use crate::protocol::messages::ConsumerGroupMemberAssignment;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SyncGroupRequestAssignment {
    /// The ID of the member to assign.
    pub member_id: String,

    /// The member assignment.
    pub assignment: ConsumerGroupMemberAssignment,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SyncGroupRequest {
    /// The unique group identifier.
    pub group_id: String,

    /// The generation of the group.
    pub generation_id: i32,

    /// The member ID assigned by the group.
    pub member_id: String,

    /// The unique identifier of the consumer instance provided by end user.
    ///
    /// Added in version 3.
    pub group_instance_id: Option<String>,

    /// The group protocol type.
    ///
    /// Added in version 5.
    pub protocol_type: Option<String>,

    /// The group protocol name.
    ///
    /// Added in version 5.
    pub protocol_name: Option<String>,

    /// Each assignment, only sent by the leader.
    pub assignments: Vec<SyncGroupRequestAssignment>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SyncGroupResponse {
    /// The duration in milliseconds for which the request was throttled due to a
    /// quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<i32>,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,

    /// The member assignment.
    pub assignment: ConsumerGroupMemberAssignment,
}
