//! Local stand-in for a data-emulation server, used by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

/// How the mock answers `selectDataset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectReply {
    DatasetSelected,
    StatusText,
    Silent,
}

pub struct MockEmulator {
    pub url: String,
    frames: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
    kick: Arc<Notify>,
    pushes: broadcast::Sender<String>,
    accept_task: JoinHandle<()>,
}

impl MockEmulator {
    /// Starts listening on an ephemeral port. With `catalog == None` the mock
    /// never answers `getDatasets`.
    pub async fn start(catalog: Option<Value>, reply: SelectReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock emulator");
        let url = format!("ws://{}", listener.local_addr().expect("mock emulator address"));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let kick = Arc::new(Notify::new());
        let (pushes, _) = broadcast::channel(64);

        let accept_task = tokio::spawn({
            let frames = Arc::clone(&frames);
            let connections = Arc::clone(&connections);
            let kick = Arc::clone(&kick);
            let pushes = pushes.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        catalog.clone(),
                        reply,
                        Arc::clone(&frames),
                        Arc::clone(&kick),
                        pushes.subscribe(),
                    ));
                }
            }
        });

        Self { url, frames, connections, kick, pushes, accept_task }
    }

    /// Three datasets in two categories: a.csv, b.csv (EEG), c.csv (ECG).
    pub fn sample_catalog() -> Value {
        json!({
            "EEG": [
                {"filename": "a.csv", "path": "/d/a.csv"},
                {"filename": "b.csv", "path": "/d/b.csv"}
            ],
            "ECG": [
                {"filename": "c.csv", "path": "/d/c.csv"}
            ]
        })
    }

    /// A `ws://` URL on which nothing is listening.
    pub async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind spare listener");
        let addr = listener.local_addr().expect("spare address");
        drop(listener);
        format!("ws://{}", addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every frame the client has sent, in arrival order.
    pub async fn frames(&self) -> Vec<Value> {
        self.frames.lock().await.clone()
    }

    pub async fn frames_of_type(&self, kind: &str) -> Vec<Value> {
        self.frames
            .lock()
            .await
            .iter()
            .filter(|frame| frame["type"] == kind)
            .cloned()
            .collect()
    }

    /// Polls until at least `count` frames of `kind` arrived or `within` elapsed.
    pub async fn wait_for_frames(&self, kind: &str, count: usize, within: Duration) -> Vec<Value> {
        let deadline = Instant::now() + within;
        loop {
            let frames = self.frames_of_type(kind).await;
            if frames.len() >= count || Instant::now() >= deadline {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_connections(&self, count: usize, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while self.connections() < count {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Drops every open connection without a close handshake.
    pub fn drop_connections(&self) {
        self.kick.notify_waiters();
    }

    /// Sends `frame` to every open connection.
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.pushes.send(text.to_string());
    }
}

impl Drop for MockEmulator {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    catalog: Option<Value>,
    reply: SelectReply,
    frames: Arc<Mutex<Vec<Value>>>,
    kick: Arc<Notify>,
    mut pushes: broadcast::Receiver<String>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    loop {
        tokio::select! {
            _ = kick.notified() => return,
            pushed = pushes.recv() => match pushed {
                Ok(text) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    frames.lock().await.push(frame.clone());

                    let response = match frame["type"].as_str() {
                        Some("getDatasets") => catalog
                            .as_ref()
                            .map(|datasets| json!({"type": "init", "availableDatasets": datasets})),
                        Some("selectDataset") => {
                            let path = frame["filePath"].as_str().unwrap_or_default();
                            let name = path.rsplit('/').next().unwrap_or(path);
                            match reply {
                                SelectReply::DatasetSelected => Some(json!({
                                    "type": "datasetSelected", "name": name, "path": path
                                })),
                                SelectReply::StatusText => Some(json!({
                                    "type": "status", "message": "Dataset successfully selected"
                                })),
                                SelectReply::Silent => None,
                            }
                        }
                        _ => None,
                    };

                    if let Some(response) = response {
                        if ws.send(Message::Text(response.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
