use anyhow::Result;
use fieldops_api::{run as run_api, ApiState};
use fieldops_core::{AppContext, Config};
use fieldops_notify::run as run_sweeper;
use fieldops_outbox::{run as run_outbox, HttpDispatcher, HttpProbe, OfflineQueue};
use fieldops_tickets::overdue::run as run_overdue;
use std::sync::Arc;
use std::time::Duration;
use tokio;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Fieldops server");

    let config = Config::from_env();
    let ctx = AppContext::new(config).await?;
    tracing::info!(data_dir = %ctx.config.storage.data_dir.display(), "Context initialized");

    // The outbox only exists when there is an upstream to replay into.
    let mut outbox_parts = None;
    if let Some(upstream) = ctx.config.queue.upstream_url.clone() {
        let dispatcher = Arc::new(HttpDispatcher::new(
            &upstream,
            ctx.config.queue.upstream_token.clone(),
        )?);
        let queue = Arc::new(OfflineQueue::load(ctx.clone(), dispatcher).await?);
        let probe = Arc::new(HttpProbe::new(&upstream)?);
        tracing::info!(upstream = %upstream, pending = queue.len().await, "Offline queue enabled");
        outbox_parts = Some((queue, probe));
    }

    let state = ApiState::new(ctx.clone(), outbox_parts.as_ref().map(|(q, _)| q.clone())).await?;

    if let Some((queue, probe)) = outbox_parts {
        let interval = Duration::from_millis(ctx.config.queue.poll_interval_ms);
        tokio::spawn(async move {
            if let Err(e) = run_outbox(queue, probe, interval).await {
                tracing::error!("Offline queue poller error: {}", e);
            }
        });
    }

    let notifications = state.notifications.clone();
    let sweep_interval = Duration::from_secs(ctx.config.notifications.sweep_interval_secs);
    tokio::spawn(async move {
        if let Err(e) = run_sweeper(notifications, sweep_interval).await {
            tracing::error!("Notification sweeper error: {}", e);
        }
    });

    let tickets = state.tickets.clone();
    let overdue_interval = Duration::from_secs(ctx.config.notifications.overdue_check_secs);
    tokio::spawn(async move {
        if let Err(e) = run_overdue(tickets, overdue_interval).await {
            tracing::error!("Overdue checker error: {}", e);
        }
    });

    tracing::info!("Starting API server");
    tokio::select! {
        res = run_api(state) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
