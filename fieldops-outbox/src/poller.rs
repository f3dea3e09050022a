use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::probe::ConnectivityProbe;
use crate::queue::OfflineQueue;

/// Feeds connectivity into the queue forever. A transition to online drains
/// the queue; while online, leftovers from a failed drain are retried on
/// every tick until they succeed or run out of retries.
pub async fn run(
    queue: Arc<OfflineQueue>,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
) -> Result<()> {
    tracing::info!("Starting offline queue poller");

    loop {
        match poll_once(&queue, probe.as_ref()).await {
            Ok(_) => {
                tokio::time::sleep(interval).await;
            }
            Err(e) => {
                tracing::error!("Error in offline queue poller: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

pub async fn poll_once(queue: &OfflineQueue, probe: &dyn ConnectivityProbe) -> Result<()> {
    let online = probe.is_online().await;

    if queue.set_online(online).await?.is_some() {
        return Ok(());
    }

    if online && !queue.is_empty().await {
        let report = queue.process_queue().await?;
        tracing::debug!("Retried queue: {:?}", report);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::FakeDispatcher;
    use crate::probe::StaticProbe;
    use fieldops_core::types::QueuedActionType;
    use fieldops_core::{AppContext, Config, SystemClock};
    use serde_json::json;

    #[tokio::test]
    async fn poll_drains_after_connectivity_returns() {
        let ctx = AppContext::in_memory(Config::default(), Arc::new(SystemClock));
        let fake = Arc::new(FakeDispatcher::new());
        let queue = OfflineQueue::load(ctx, fake.clone()).await.unwrap();
        let probe = StaticProbe::new(false);

        let id = queue
            .add_to_queue(QueuedActionType::CreateTicket, json!({"body": {}}))
            .await
            .unwrap();
        fake.fail_times(&id, 1);

        poll_once(&queue, &probe).await.unwrap();
        assert_eq!(queue.len().await, 1);
        assert!(fake.calls().is_empty());

        probe.set(true);
        poll_once(&queue, &probe).await.unwrap();
        assert_eq!(queue.len().await, 1);

        // still online: the next tick retries the leftover
        poll_once(&queue, &probe).await.unwrap();
        assert!(queue.is_empty().await);
        assert_eq!(fake.calls(), vec![id.clone(), id]);
    }
}
