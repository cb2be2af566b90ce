//! The boundary between the group core and the coordinator broker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::error::Error;
use crate::protocol::messages::{
    HeartbeatRequest, HeartbeatResponse, JoinGroupRequest, JoinGroupResponse, LeaveGroupRequest,
    LeaveGroupResponse, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, SyncGroupRequest, SyncGroupResponse,
};

/// Performs group and offset requests against the coordinator of one group.
///
/// Every call delivers exactly one response or one error. Broker side
/// failures are reported through the `error_code` fields of the responses,
/// failures to get an answer at all (timeouts, reset connections) as
/// [`Error::Transport`]. Implementations must not retry on their own, the
/// consumer group decides when a request is repeated.
///
/// Locating the coordinator, caching the connection to it and encoding the
/// requests are up to the implementation.
#[async_trait]
pub trait CoordinatorLink: std::fmt::Debug + Send + Sync {
    async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinGroupResponse, Error>;

    async fn sync_group(&self, request: &SyncGroupRequest) -> Result<SyncGroupResponse, Error>;

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, Error>;

    async fn leave_group(&self, request: &LeaveGroupRequest)
        -> Result<LeaveGroupResponse, Error>;

    async fn commit_offsets(
        &self,
        request: &OffsetCommitRequest,
    ) -> Result<OffsetCommitResponse, Error>;

    async fn fetch_offsets(&self, request: &OffsetFetchRequest)
        -> Result<OffsetFetchResponse, Error>;
}

#[async_trait]
impl<T> CoordinatorLink for Arc<T>
where
    T: CoordinatorLink + ?Sized,
{
    async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinGroupResponse, Error> {
        self.as_ref().join_group(request).await
    }

    async fn sync_group(&self, request: &SyncGroupRequest) -> Result<SyncGroupResponse, Error> {
        self.as_ref().sync_group(request).await
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, Error> {
        self.as_ref().heartbeat(request).await
    }

    async fn leave_group(
        &self,
        request: &LeaveGroupRequest,
    ) -> Result<LeaveGroupResponse, Error> {
        self.as_ref().leave_group(request).await
    }

    async fn commit_offsets(
        &self,
        request: &OffsetCommitRequest,
    ) -> Result<OffsetCommitResponse, Error> {
        self.as_ref().commit_offsets(request).await
    }

    async fn fetch_offsets(
        &self,
        request: &OffsetFetchRequest,
    ) -> Result<OffsetFetchResponse, Error> {
        self.as_ref().fetch_offsets(request).await
    }
}
