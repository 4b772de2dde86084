//! # Selection Protocol
//!
//! "Select dataset" looks synchronous to the caller but rides on a push
//! transport: the request frame goes out, and some later inbound frame
//! confirms it. Each request gets a fresh `oneshot` channel parked in the
//! [`SelectionSlot`]; the dispatcher completes it, the caller waits on it with
//! a timeout and the session's shutdown token.
//!
//! Only one selection may be outstanding. A second `select` while one is
//! pending is rejected with [`FeedError::State`]; the first request is left
//! untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::catalog::DatasetDescriptor;
use crate::core::outbound::OutboundSlot;
use crate::core::state::SharedState;
use crate::error::{FeedError, FeedResult};
use crate::protocol::OutboundMessage;

/// Which inbound message confirmed a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSource {
    /// A dedicated `datasetSelected` message.
    DatasetSelected,
    /// A `status` message whose text reads like a selection confirmation.
    StatusText,
}

/// Payload delivered to the waiting `select` caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionConfirmation {
    /// Active dataset name as set by the confirmation, if it carried one.
    pub dataset: Option<String>,
    pub source: ConfirmationSource,
}

struct PendingSelection {
    id: u64,
    target: DatasetDescriptor,
    issued_at: Instant,
    responder: oneshot::Sender<SelectionConfirmation>,
}

/// Holds at most one pending selection request.
#[derive(Default)]
pub struct SelectionSlot {
    pending: Mutex<Option<PendingSelection>>,
    next_id: AtomicU64,
}

impl SelectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingSelection>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|p| !p.responder.is_closed())
    }

    /// Parks a new request. A leftover whose waiter is already gone is
    /// replaced; a live one makes this call fail.
    pub(crate) fn begin(
        &self,
        target: DatasetDescriptor,
    ) -> FeedResult<(u64, oneshot::Receiver<SelectionConfirmation>)> {
        let mut pending = self.lock();
        if let Some(current) = pending.as_ref() {
            if !current.responder.is_closed() {
                return Err(FeedError::State(format!(
                    "a dataset selection is already pending ({})",
                    current.target.name
                )));
            }
            log::debug!("Discarding stale selection request for '{}'", current.target.name);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (responder, receiver) = oneshot::channel();
        *pending = Some(PendingSelection { id, target, issued_at: Instant::now(), responder });
        Ok((id, receiver))
    }

    /// Wakes the pending caller, if any. Returns `true` if a waiter received
    /// the confirmation.
    pub fn complete(&self, confirmation: SelectionConfirmation) -> bool {
        let Some(pending) = self.lock().take() else {
            log::debug!("Selection confirmation with nothing pending ({:?})", confirmation.source);
            return false;
        };
        log::info!(
            "Selection of '{}' confirmed via {:?} after {} ms",
            pending.target.name,
            confirmation.source,
            pending.issued_at.elapsed().as_millis()
        );
        pending.responder.send(confirmation).is_ok()
    }

    /// Removes request `id` if it is still the pending one.
    pub(crate) fn abandon(&self, id: u64) -> bool {
        let mut pending = self.lock();
        if pending.as_ref().is_some_and(|p| p.id == id) {
            *pending = None;
            true
        } else {
            false
        }
    }

    /// Drops whatever is pending; its waiter sees the channel close.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(pending) => {
                log::warn!("Cancelling pending selection of '{}'", pending.target.name);
                true
            }
            None => false,
        }
    }
}

/// Issues selection requests and waits for their confirmation.
#[derive(Clone)]
pub struct SelectionProtocol {
    slot: Arc<SelectionSlot>,
    outbound: OutboundSlot,
    state: SharedState,
    shutdown: CancellationToken,
    timeout: Duration,
}

impl SelectionProtocol {
    pub fn new(
        slot: Arc<SelectionSlot>,
        outbound: OutboundSlot,
        state: SharedState,
        shutdown: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self { slot, outbound, state, shutdown, timeout }
    }

    /// Sends `selectDataset` for `descriptor` and waits for the server to
    /// confirm it.
    ///
    /// # Errors
    /// - [`FeedError::State`] without a live connection or while another
    ///   selection is pending (returned without waiting).
    /// - [`FeedError::Timeout`] if no confirmation arrives in time; the
    ///   active dataset is left as it was.
    /// - [`FeedError::Connection`] if the connection drops mid-wait.
    /// - [`FeedError::Shutdown`] if the session is closed mid-wait.
    pub async fn select(&self, descriptor: &DatasetDescriptor) -> FeedResult<SelectionConfirmation> {
        if self.shutdown.is_cancelled() {
            return Err(FeedError::Shutdown);
        }

        let frame = OutboundMessage::select(descriptor).to_frame()?;
        let (id, receiver) = {
            let outbound = self.outbound.lock().await;
            let sender = outbound
                .as_ref()
                .ok_or_else(|| FeedError::State("not connected to the emulator".to_string()))?;
            let (id, receiver) = self.slot.begin(descriptor.clone())?;
            if sender.send(frame).is_err() {
                self.slot.abandon(id);
                return Err(FeedError::Connection(
                    "connection closed before the selection could be sent".to_string(),
                ));
            }
            (id, receiver)
        };

        self.state.update(|state| state.selection_pending = true).await;
        log::info!("Requested dataset [{}] {} ({})", descriptor.index, descriptor.name, descriptor.path);

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(FeedError::Shutdown),
            outcome = tokio::time::timeout(self.timeout, receiver) => match outcome {
                Ok(Ok(confirmation)) => Ok(confirmation),
                Ok(Err(_)) => Err(FeedError::Connection(
                    "connection lost while waiting for the selection to be confirmed".to_string(),
                )),
                Err(_) => Err(FeedError::timeout("selection confirmation", self.timeout)),
            },
        };

        if let Err(e) = &result {
            self.slot.abandon(id);
            log::warn!("Selection of '{}' failed: {}", descriptor.name, e);
        }
        let still_pending = self.slot.is_pending();
        self.state.update(|state| state.selection_pending = still_pending).await;
        result
    }
}
