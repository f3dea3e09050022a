use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::service::NotificationService;

/// Periodically drops expired notifications. Never returns under normal
/// operation.
pub async fn run(service: Arc<NotificationService>, interval: Duration) -> Result<()> {
    tracing::info!("Starting notification sweeper (every {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        match service.cleanup_expired_notifications().await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::debug!("Sweeper removed {} notifications", removed);
            }
            Err(e) => {
                tracing::error!("Error in notification sweeper: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
