mod consumer_group;
pub use consumer_group::*;
mod heartbeat;
pub use heartbeat::*;
mod join_group;
pub use join_group::*;
mod leave_group;
pub use leave_group::*;
mod offset_commit;
pub use offset_commit::*;
mod offset_fetch;
pub use offset_fetch::*;
mod sync_group;
pub use sync_group::*;
