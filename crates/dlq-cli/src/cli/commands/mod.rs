//! CLI command handlers.

mod config;
mod get;
mod playlist;
mod session;

pub use config::run_config;
pub use get::run_get;
pub use playlist::run_playlist;
pub use session::SessionOptions;
