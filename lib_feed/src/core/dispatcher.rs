//! # Message Dispatcher
//!
//! Turns one inbound frame into exactly one effect:
//!
//! | type              | effect                                                    |
//! |-------------------|-----------------------------------------------------------|
//! | `init`            | replace the catalog, mark initialized, bump init epoch    |
//! | `datasetSelected` | set the active dataset, complete the pending selection    |
//! | `status`          | record the text; may complete the pending selection       |
//! | `data`            | publish as the latest feed payload                        |
//! | anything else     | log and discard                                           |
//!
//! Every classified message is also pushed onto a bounded delivery queue.
//! Sends on it never wait: once [`DELIVERY_QUEUE_CAPACITY`] messages are
//! buffered the oldest are overwritten, so neither a slow consumer nor a
//! missing one can stall the network read or grow memory.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::core::selection::{ConfirmationSource, SelectionConfirmation, SelectionSlot};
use crate::core::state::SharedState;
use crate::protocol::InboundMessage;

/// Active dataset name used when a confirmation names nothing.
pub const UNKNOWN_DATASET: &str = "Unknown dataset";

/// Messages buffered for a consumer before the oldest are dropped.
pub const DELIVERY_QUEUE_CAPACITY: usize = 1024;

/// Receiving end of the delivery queue. A receiver that fell behind gets
/// `Lagged` once and then continues with the oldest retained message.
pub type MessageReceiver = broadcast::Receiver<Arc<InboundMessage>>;

/// What a frame turned into; mostly useful for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    CatalogReplaced { datasets: usize },
    DatasetSelected { name: String, woke_waiter: bool },
    Status { confirmed_selection: bool },
    Data,
    Discarded,
}

/// Applies inbound messages to the shared session.
pub struct MessageDispatcher {
    state: SharedState,
    selection: Arc<SelectionSlot>,
    init_epoch: watch::Sender<u64>,
    latest: watch::Sender<Option<Arc<Value>>>,
    queue: broadcast::Sender<Arc<InboundMessage>>,
}

impl MessageDispatcher {
    /// Creates a dispatcher and hands back the receiving end of its
    /// delivery queue.
    pub fn new(state: SharedState, selection: Arc<SelectionSlot>) -> (Self, MessageReceiver) {
        let (queue, receiver) = broadcast::channel(DELIVERY_QUEUE_CAPACITY);
        let (init_epoch, _) = watch::channel(0);
        let (latest, _) = watch::channel(None);
        let dispatcher = Self { state, selection, init_epoch, latest, queue };
        (dispatcher, receiver)
    }

    /// Counter bumped on every `init`; wait on it to learn that a catalog arrived.
    pub fn subscribe_init(&self) -> watch::Receiver<u64> {
        self.init_epoch.subscribe()
    }

    /// Latest `data` payload, `None` until the first one arrives.
    pub fn subscribe_data(&self) -> watch::Receiver<Option<Arc<Value>>> {
        self.latest.subscribe()
    }

    /// Decodes and dispatches one text frame. Malformed frames are logged and
    /// discarded.
    pub async fn handle_frame(&self, text: &str) -> Dispatched {
        match InboundMessage::decode(text) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                log::warn!("Discarding frame: {}", e);
                log::trace!("Discarded frame body: {}", text);
                Dispatched::Discarded
            }
        }
    }

    pub async fn dispatch(&self, message: InboundMessage) -> Dispatched {
        let message = Arc::new(message);
        let outcome = match message.as_ref() {
            InboundMessage::Init { catalog } => {
                let datasets = catalog.len();
                let catalog = catalog.clone();
                self.state
                    .update(|state| {
                        state.catalog = catalog;
                        state.initialized = true;
                    })
                    .await;
                self.init_epoch.send_modify(|epoch| *epoch += 1);
                log::info!("Catalog received: {} datasets", datasets);
                Dispatched::CatalogReplaced { datasets }
            }
            InboundMessage::DatasetSelected { name, path } => {
                let name = name
                    .clone()
                    .or_else(|| path.clone())
                    .unwrap_or_else(|| UNKNOWN_DATASET.to_string());
                let active = name.clone();
                self.state.update(|state| state.active_dataset = Some(active)).await;
                log::info!("Server selected dataset '{}'", name);
                let woke_waiter = self.selection.complete(SelectionConfirmation {
                    dataset: Some(name.clone()),
                    source: ConfirmationSource::DatasetSelected,
                });
                Dispatched::DatasetSelected { name, woke_waiter }
            }
            InboundMessage::Status { message: text } => {
                log::info!("Server status: {}", text);
                let recorded = text.clone();
                self.state.update(|state| state.last_status = Some(recorded)).await;
                let confirmed_selection = is_selection_confirmation(text)
                    && self.selection.complete(SelectionConfirmation {
                        dataset: None,
                        source: ConfirmationSource::StatusText,
                    });
                Dispatched::Status { confirmed_selection }
            }
            InboundMessage::Data { payload } => {
                self.latest.send_replace(Some(Arc::new(payload.clone())));
                Dispatched::Data
            }
            InboundMessage::Unknown { kind, .. } => {
                log::warn!("Discarding message with unknown type '{}'", kind);
                return Dispatched::Discarded;
            }
        };

        // Nobody listening is fine; the queue is best-effort.
        let _ = self.queue.send(message);
        outcome
    }
}

/// Fallback for servers that confirm a selection with a `status` message
/// instead of `datasetSelected`: the text must mention both "dataset" and
/// "selected", case-insensitively. Any status text that happens to contain
/// both words will be taken as a confirmation.
pub fn is_selection_confirmation(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("dataset") && lower.contains("selected")
}
