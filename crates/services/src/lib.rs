#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod handshake;
pub mod player;
pub mod registry;
pub mod remote;
pub mod sync;

pub use rte_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, PlayerError, RemoteStoreError, SyncError};
pub use handshake::Readiness;
pub use player::{ClosedSession, PlayerService, PlayerSession};
pub use registry::FrameRegistry;
pub use remote::{MirroredAttemptWriter, RemoteAttemptStore, RemoteStoreConfig};
pub use sync::{
    ProgressEvent, ProgressUpdate, RetryPolicy, SyncConfig, SyncDispatcher, SyncReport,
};
