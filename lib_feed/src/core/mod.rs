//! # Core Session Components
//!
//! The pieces shared between the receive loop and the command side:
//!
//! - **`outbound`**: the sender for the live connection, present only
//!   while a socket is up.
//! - **`state`**: the session record (catalog, active dataset, connection
//!   status) behind one lock, read as whole snapshots.
//! - **`selection`**: request/response correlation for "select dataset",
//!   built on a one-shot channel per request.
//! - **`dispatcher`**: classifies decoded frames and applies them to the
//!   state, the pending selection and the delivery queue.

/// Shared sending half of the live connection.
pub mod outbound;
/// Shared, snapshot-able session record.
pub mod state;
/// One-at-a-time dataset selection over the async transport.
pub mod selection;
/// Routes inbound frames to state updates and signals.
pub mod dispatcher;

pub use dispatcher::{Dispatched, MessageDispatcher};
pub use outbound::{FrameSender, OutboundSlot};
pub use selection::{ConfirmationSource, SelectionConfirmation, SelectionProtocol, SelectionSlot};
pub use state::{ConnectionStatus, SessionState, SharedState};
