pub mod config;
pub mod logging;

// Task model and lifecycle
pub mod events;
pub mod registry;
pub mod state_machine;

// Admission and execution
pub mod executor;
pub mod gate;
pub mod manager;
pub mod playlist;
pub mod scheduler;

pub use manager::{DownloadManager, ManagerError, ManagerStats, PlaylistSummary};
