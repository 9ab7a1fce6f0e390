pub mod cli;
pub mod config;
pub mod core;
pub mod demo;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;

// Re-export for convenience
pub use crate::config::EngineConfig;
pub use crate::core::{AssetCatalog, Canvas, EntityId, Shape};
pub use crate::engine::{Engine, SessionId, SessionTarget};
