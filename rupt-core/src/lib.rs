//! Rupt Core - Core data structures and collaborator traits
//!
//! Shared by the transport/realtime layer (`rupt-client`) and the session
//! orchestration layer (`rupt-session`).

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use storage::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
