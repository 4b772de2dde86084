//! # Data Ingestors Module
//!
//! Clients that hold the connection to a data source and feed what they
//! receive into the core components.
//!
//! ## Contained Modules:
//! - **`emulator_wss`**: a reconnecting WebSocket session against a
//!   data-emulation server. Negotiates the catalog, carries dataset
//!   selections and ingests the live feed.

/// The WebSocket session for data-emulation servers.
pub mod emulator_wss;

// --- Public API Re-exports ---
pub use emulator_wss::{FeedSession, SessionConfig};
