//! The model-leg and telephony-leg wire protocols.

pub mod client_events;
pub mod registry;
pub mod server_events;
pub mod session_config;
pub mod telephony;

pub use client_events::ClientEvent;
pub use server_events::ServerEvent;
pub use session_config::SessionConfig;
