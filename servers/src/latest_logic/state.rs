use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The last payload posted to the server. Cloning shares the same slot.
#[derive(Clone, Default)]
pub struct AppState {
    latest: Arc<RwLock<Option<Value>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored payload.
    pub async fn store(&self, payload: Value) {
        *self.latest.write().await = Some(payload);
    }

    /// The stored payload, or `None` when nothing meaningful has been stored.
    ///
    /// Null, `false`, zero and empty strings, arrays or objects all read
    /// back as nothing.
    pub async fn latest(&self) -> Option<Value> {
        self.latest
            .read()
            .await
            .as_ref()
            .filter(|payload| !is_blank(payload))
            .cloned()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
