use crate::latest_logic::state::AppState;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Body of `GET /api/data/latest` before anything was stored. The spelling
/// is what existing clients of this endpoint match on.
pub const NO_DATA_MESSAGE: &str = "No data recieved yet";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", post(store_handler))
        .route("/api/data/latest", get(latest_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run(port: u16, state: AppState, shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    log::info!("HTTP server listening on {}", addr);
    serve(listener, state, shutdown).await
}

pub async fn serve(listener: TcpListener, state: AppState, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("HTTP server shutting down.");
        })
        .await?;
    Ok(())
}

async fn store_handler(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    log::debug!("Stored new payload ({} bytes)", payload.to_string().len());
    state.store(payload.clone()).await;
    Json(json!({"status": "success", "data": payload}))
}

async fn latest_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.latest().await {
        Some(payload) => Json(payload),
        None => Json(json!({"message": NO_DATA_MESSAGE})),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    async fn spawn_server() -> (String, broadcast::Sender<()>, JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(serve(listener, AppState::new(), shutdown_tx.subscribe()));
        (base, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_latest_before_any_post() {
        let (base, _shutdown, _handle) = spawn_server().await;

        let body: Value = reqwest::get(format!("{}/api/data/latest", base)).await.unwrap().json().await.unwrap();

        assert_eq!(body, json!({"message": "No data recieved yet"}));
    }

    #[tokio::test]
    async fn test_post_then_latest_returns_last_payload() {
        let (base, _shutdown, _handle) = spawn_server().await;
        let client = reqwest::Client::new();

        let first = json!({"type": "data", "values": [1]});
        let second = json!({"type": "data", "values": [2]});
        let response = client.post(format!("{}/api/data", base)).json(&first).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let echoed: Value = response.json().await.unwrap();
        assert_eq!(echoed, json!({"status": "success", "data": first}));

        client.post(format!("{}/api/data", base)).json(&second).send().await.unwrap();

        let latest: Value = client.get(format!("{}/api/data/latest", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(latest, second);
    }

    #[tokio::test]
    async fn test_empty_object_counts_as_nothing() {
        let (base, _shutdown, _handle) = spawn_server().await;
        let client = reqwest::Client::new();

        client.post(format!("{}/api/data", base)).json(&json!({})).send().await.unwrap();
        let latest: Value = client.get(format!("{}/api/data/latest", base)).send().await.unwrap().json().await.unwrap();

        assert_eq!(latest, json!({"message": NO_DATA_MESSAGE}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (base, _shutdown, _handle) = spawn_server().await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/data", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_health_and_graceful_shutdown() {
        let (base, shutdown, handle) = spawn_server().await;

        let response = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "OK");

        shutdown.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
