pub mod protocol;
pub mod snapshot;

pub use protocol::{
    ConnectionState, PollTier, SnapshotSource, SyncConfig, SyncError, SyncHandle, SyncOutcome,
    SyncProtocol,
};
pub use snapshot::{changed_dates, content_hash, CapacitySnapshot};
