//! # lib_feed
//!
//! Client-side building blocks for talking to a data-emulation server over a
//! persistent WebSocket: the server advertises a catalog of datasets, the user
//! picks one, and the server streams that dataset's live feed back.
//!
//! Modules are gated by cargo features (`session`, `shell`, `loggers`), all
//! of which are enabled by the default `full` feature.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "session")]
pub mod catalog;
#[cfg(feature = "session")]
pub mod core;
#[cfg(feature = "session")]
pub mod error;
#[cfg(feature = "session")]
pub mod ingestors;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "session")]
pub mod protocol;
#[cfg(feature = "shell")]
pub mod shell;

#[cfg(all(test, feature = "session"))]
mod testing;

// Re-export the types most callers need.
#[cfg(feature = "session")]
pub use catalog::{Catalog, DatasetDescriptor};
#[cfg(feature = "session")]
pub use error::{FeedError, FeedResult};
#[cfg(feature = "session")]
pub use ingestors::{FeedSession, SessionConfig};
#[cfg(feature = "shell")]
pub use shell::CommandInterpreter;
