//! Sync dispatcher: persists CMI snapshots off the RTE call path and feeds
//! derived progress back to the host.

mod dispatcher;
mod events;
mod retry;

pub use dispatcher::{SyncDispatcher, SyncHandle, SyncReport, SyncTarget};
pub use events::{
    ProgressEvent, ProgressObserver, ProgressReceiver, ProgressSender, ProgressSink,
    ProgressUpdate, SharedProgressObserver, progress_channel,
};
pub use retry::{RetryPolicy, SyncConfig};
