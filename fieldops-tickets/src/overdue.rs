use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::tickets::TicketService;

/// Periodically flags overdue tickets and notifies their owners.
pub async fn run(tickets: Arc<TicketService>, interval: Duration) -> Result<()> {
    tracing::info!("Starting overdue ticket checker");

    loop {
        match tickets.notify_overdue().await {
            Ok(count) => {
                if count > 0 {
                    tracing::debug!("Notified {} overdue tickets", count);
                }
                tokio::time::sleep(interval).await;
            }
            Err(e) => {
                tracing::error!("Error checking overdue tickets: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
