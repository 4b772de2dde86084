//! # Session State
//!
//! A single record guarded by one `RwLock`. Readers always take a full
//! [`SessionState`] clone so a catalog is never shown next to an active
//! dataset name from a different moment.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::Catalog;

/// Lifecycle of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Everything the command side may want to show about the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub catalog: Catalog,
    /// Name of the dataset the server last confirmed as active.
    pub active_dataset: Option<String>,
    pub status: ConnectionStatus,
    /// Set by an `init` message on the current connection.
    pub initialized: bool,
    pub selection_pending: bool,
    /// Text of the most recent `status` message.
    pub last_status: Option<String>,
}

/// Cloneable handle to the shared session record.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<SessionState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent copy of the whole record.
    pub async fn snapshot(&self) -> SessionState {
        self.inner.read().await.clone()
    }

    /// Applies `f` under the write lock and returns its result.
    pub async fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut *guard)
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.read().await.status
    }

    pub async fn set_status(&self, status: ConnectionStatus) {
        let mut guard = self.inner.write().await;
        if guard.status != status {
            log::debug!("Connection status: {:?} -> {:?}", guard.status, status);
            guard.status = status;
        }
    }

    /// Marks the connection as lost. The catalog and active dataset are kept
    /// for display; `initialized` is cleared until the next `init`.
    pub async fn mark_failed(&self) {
        self.update(|state| {
            state.status = ConnectionStatus::Failed;
            state.initialized = false;
        })
        .await;
    }
}
