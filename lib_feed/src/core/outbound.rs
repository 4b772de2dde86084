//! # Outbound Handle
//!
//! The sending half for the live connection, shared between the transport
//! (which installs and clears it) and the selection protocol (which sends on
//! it). Senders hold the lock while sending so a frame is never queued on a
//! handle that is being torn down.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Text frames queued for the connection's writer.
pub type FrameSender = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone, Default)]
pub struct OutboundSlot {
    inner: Arc<Mutex<Option<FrameSender>>>,
}

impl OutboundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install(&self, sender: FrameSender) {
        *self.inner.lock().await = Some(sender);
    }

    /// Removes the handle. Returns `true` if one was installed.
    pub async fn clear(&self) -> bool {
        self.inner.lock().await.take().is_some()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .await
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Locks the handle for a send; `None` inside means "not connected".
    pub async fn lock(&self) -> MutexGuard<'_, Option<FrameSender>> {
        self.inner.lock().await
    }
}
