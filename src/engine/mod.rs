pub mod adapter;
pub mod hub;
pub mod runner;

pub use adapter::{serve_connection, Disconnect, SessionPhase};
pub use hub::{HubHandle, HubStats, Outbound, SessionHub, SessionId, SessionTarget};
pub use runner::Engine;
