use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// POSTs every new payload seen on `latest` to `target` until `stop`
/// resolves or the feed goes away.
///
/// Payloads that arrive while a request is in flight collapse into the most
/// recent one. Failed requests are logged and the loop carries on.
pub async fn run<F>(
    client: reqwest::Client,
    target: Url,
    mut latest: watch::Receiver<Option<Arc<Value>>>,
    stop: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(stop);
    log::info!("Forwarding live payloads to {}", target);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            changed = latest.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let Some(payload) = latest.borrow_and_update().clone() else {
            continue;
        };

        match client.post(target.clone()).json(payload.as_ref()).send().await {
            Ok(response) if response.status().is_success() => {
                log::debug!("Forwarded payload to {} ({})", target, response.status());
            }
            Ok(response) => {
                log::warn!("Forward target {} answered {}", target, response.status());
            }
            Err(e) => {
                log::warn!("Failed to forward payload to {}: {}", target, e);
            }
        }
    }

    log::info!("Forwarder stopped.");
}
