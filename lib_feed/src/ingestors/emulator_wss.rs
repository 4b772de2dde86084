//! # Emulator WSS Session
//!
//! Persistent WebSocket session against a data-emulation server.
//! Location: lib_feed/src/ingestors/emulator_wss.rs
//!
//! ## Lifecycle
//! 1. [`FeedSession::connect`] spawns the supervisor task and waits (bounded)
//!    for the first `init` message.
//! 2. The supervisor connects, sends `getDatasets` as the first frame, then
//!    pumps inbound frames into the [`MessageDispatcher`] and outbound frames
//!    from the [`OutboundSlot`] onto the socket.
//! 3. When the connection drops the session goes to `Failed`, the pending
//!    selection (if any) is cancelled, and after `reconnect_delay` the
//!    supervisor tries again, for as long as the session is running.
//! 4. [`FeedSession::close`] stops everything; it is safe to call repeatedly.
//!
//! A session is single-use: once closed, `connect` returns
//! [`FeedError::Shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use crate::catalog::DatasetDescriptor;
use crate::core::dispatcher::{MessageDispatcher, MessageReceiver};
use crate::core::outbound::OutboundSlot;
use crate::core::selection::{SelectionConfirmation, SelectionProtocol, SelectionSlot};
use crate::core::state::{ConnectionStatus, SessionState, SharedState};
use crate::error::{FeedError, FeedResult};
use crate::protocol::OutboundMessage;

/// Connection settings for a [`FeedSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// WebSocket endpoint of the emulator, e.g. `ws://127.0.0.1:8765`.
    pub url: String,
    /// Bound on waiting for the first catalog after `connect()`.
    pub connect_timeout: Duration,
    /// Bound on waiting for a selection to be confirmed.
    pub select_timeout: Duration,
    /// Pause between a lost connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Bound on joining the receive task during `close()`.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765".to_string(),
            connect_timeout: Duration::from_secs(10),
            select_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the supervisor task shares with the session handle.
struct SessionInner {
    config: SessionConfig,
    state: SharedState,
    dispatcher: MessageDispatcher,
    selection: Arc<SelectionSlot>,
    outbound: OutboundSlot,
    running: AtomicBool,
    shutdown: CancellationToken,
}

/// Why a single connection ended.
enum ConnectionEnd {
    Shutdown,
    Dropped(String),
}

/// A long-lived client session with a data-emulation server.
pub struct FeedSession {
    inner: Arc<SessionInner>,
    protocol: SelectionProtocol,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    messages: StdMutex<Option<MessageReceiver>>,
}

impl FeedSession {
    pub fn new(config: SessionConfig) -> Self {
        let state = SharedState::new();
        let selection = Arc::new(SelectionSlot::new());
        let outbound = OutboundSlot::new();
        let shutdown = CancellationToken::new();
        let (dispatcher, messages) = MessageDispatcher::new(state.clone(), Arc::clone(&selection));
        let protocol = SelectionProtocol::new(
            Arc::clone(&selection),
            outbound.clone(),
            state.clone(),
            shutdown.clone(),
            config.select_timeout,
        );

        let inner = Arc::new(SessionInner {
            config,
            state,
            dispatcher,
            selection,
            outbound,
            running: AtomicBool::new(false),
            shutdown,
        });

        Self {
            inner,
            protocol,
            supervisor: Mutex::new(None),
            messages: StdMutex::new(Some(messages)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Starts the receive loop (once) and waits for the server's catalog.
    ///
    /// Returns `Ok` as soon as an `init` message has been applied. The
    /// supervisor keeps retrying in the background even if this call times
    /// out; call [`close`](Self::close) to stop it.
    ///
    /// # Errors
    /// - [`FeedError::Timeout`] if no catalog arrives within `connect_timeout`.
    /// - [`FeedError::Shutdown`] if the session is (or gets) closed.
    pub async fn connect(&self) -> FeedResult<()> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(FeedError::Shutdown);
        }

        let mut init = inner.dispatcher.subscribe_init();
        let seen = *init.borrow_and_update();

        {
            let mut supervisor = self.supervisor.lock().await;
            // close() may have run since the check above and emptied the slot.
            if inner.shutdown.is_cancelled() {
                return Err(FeedError::Shutdown);
            }
            if supervisor.is_none() {
                inner.running.store(true, Ordering::SeqCst);
                *supervisor = Some(tokio::spawn(supervise(Arc::clone(inner))));
            } else if inner.state.snapshot().await.initialized {
                return Ok(());
            }
        }

        let limit = inner.config.connect_timeout;
        let initialized = async move { init.wait_for(|epoch| *epoch > seen).await.map(|_| ()) };

        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => Err(FeedError::Shutdown),
            outcome = tokio::time::timeout(limit, initialized) => match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(FeedError::Connection(
                    "dispatcher stopped before the catalog arrived".to_string(),
                )),
                Err(_) => {
                    log::warn!("No catalog from {} within {:?}", inner.config.url, limit);
                    Err(FeedError::timeout("catalog initialization", limit))
                }
            },
        }
    }

    /// Asks the server to stream `descriptor` and waits for confirmation.
    /// See [`SelectionProtocol::select`] for the failure modes.
    pub async fn select(&self, descriptor: &DatasetDescriptor) -> FeedResult<SelectionConfirmation> {
        self.protocol.select(descriptor).await
    }

    /// Consistent copy of the session record.
    pub async fn snapshot(&self) -> SessionState {
        self.inner.state.snapshot().await
    }

    /// `true` between `connect()` and `close()`.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// `true` while a live connection can accept frames.
    pub async fn is_connected(&self) -> bool {
        self.inner.outbound.is_connected().await
    }

    /// Resolves once `close()` has been requested.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    /// The latest `data` payload, updated in place as the feed streams.
    pub fn latest_data(&self) -> watch::Receiver<Option<Arc<Value>>> {
        self.inner.dispatcher.subscribe_data()
    }

    /// Takes the delivery queue receiver. Only the first caller gets it.
    pub fn take_messages(&self) -> Option<MessageReceiver> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Stops the session: cancels pending waits, tears the connection down,
    /// joins the receive task (bounded by `close_timeout`) and drains any
    /// undelivered messages. Calling it again is a no-op.
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.shutdown.cancel();
        let mut was_running = inner.running.swap(false, Ordering::SeqCst);
        inner.outbound.clear().await;

        let handle = {
            let mut supervisor = self.supervisor.lock().await;
            // A connect() that won the lock before the cancel may have set it again.
            was_running |= inner.running.swap(false, Ordering::SeqCst);
            supervisor.take()
        };
        if let Some(mut handle) = handle {
            let limit = inner.config.close_timeout;
            match tokio::time::timeout(limit, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Receive task ended abnormally: {}", e),
                Err(_) => {
                    log::warn!("Receive task did not stop within {:?}; aborting it", limit);
                    handle.abort();
                }
            }
        }

        inner.selection.cancel();
        let drained = self.drain_messages();
        inner
            .state
            .update(|state| {
                state.status = ConnectionStatus::Disconnected;
                state.initialized = false;
                state.selection_pending = false;
            })
            .await;

        if was_running {
            log::info!("Session with {} closed ({} undelivered messages dropped)", inner.config.url, drained);
        } else {
            log::debug!("close() on a session that is not running");
        }
    }

    fn drain_messages(&self) -> usize {
        let mut guard = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drained = 0;
        if let Some(receiver) = guard.as_mut() {
            loop {
                match receiver.try_recv() {
                    Ok(_) => drained += 1,
                    Err(TryRecvError::Lagged(skipped)) => drained += skipped as usize,
                    Err(_) => break,
                }
            }
        }
        drained
    }
}

/// Connect/reconnect loop. Runs until the session stops running.
async fn supervise(inner: Arc<SessionInner>) {
    let url = inner.config.url.clone();
    let mut attempt: u64 = 0;

    while inner.running.load(Ordering::SeqCst) {
        attempt += 1;
        inner.state.set_status(ConnectionStatus::Connecting).await;
        log::info!("Connecting to data emulator at {} (attempt {})", url, attempt);

        let connected = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((ws_stream, _)) => {
                log::info!("Connected to data emulator at {}", url);
                match run_connection(&inner, ws_stream).await {
                    ConnectionEnd::Shutdown => break,
                    ConnectionEnd::Dropped(reason) => log::warn!("Connection to {} lost: {}", url, reason),
                }
            }
            Err(e) => log::error!("Failed to connect to {}: {}", url, e),
        }

        inner.outbound.clear().await;
        inner.selection.cancel();
        inner.state.mark_failed().await;

        if !inner.running.load(Ordering::SeqCst) {
            break;
        }
        log::info!("Reconnecting to {} in {:?}...", url, inner.config.reconnect_delay);
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
    }

    inner.outbound.clear().await;
    inner.state.set_status(ConnectionStatus::Disconnected).await;
    log::debug!("Receive loop for {} stopped", url);
}

/// Drives one established connection until it drops or the session stops.
async fn run_connection(
    inner: &SessionInner,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> ConnectionEnd {
    let (mut write, mut read) = ws_stream.split();

    // The catalog request is always the first frame on a connection.
    let request = match OutboundMessage::GetDatasets.to_frame() {
        Ok(frame) => frame,
        Err(e) => return ConnectionEnd::Dropped(e.to_string()),
    };
    if let Err(e) = write.send(WsMessage::Text(request.into())).await {
        return ConnectionEnd::Dropped(format!("failed to request the catalog: {}", e));
    }

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    inner.outbound.install(frame_tx).await;
    inner.state.set_status(ConnectionStatus::Connected).await;

    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => {
                let _ = write.close().await;
                return ConnectionEnd::Shutdown;
            }
            outgoing = frame_rx.recv() => match outgoing {
                Some(frame) => {
                    log::debug!("Sending frame: {}", frame);
                    if let Err(e) = write.send(WsMessage::Text(frame.into())).await {
                        return ConnectionEnd::Dropped(format!("send failed: {}", e));
                    }
                }
                // Only close() clears the handle while we are connected.
                None => return ConnectionEnd::Shutdown,
            },
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    inner.dispatcher.handle_frame(text.as_str()).await;
                }
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        inner.dispatcher.handle_frame(text).await;
                    }
                    Err(_) => log::warn!("Discarding {}-byte binary frame that is not UTF-8", bytes.len()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    return ConnectionEnd::Dropped(format!("closed by server ({:?})", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return ConnectionEnd::Dropped(e.to_string()),
                None => return ConnectionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}
