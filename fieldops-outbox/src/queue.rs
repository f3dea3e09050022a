use fieldops_core::storage::{load_json, save_json, OFFLINE_QUEUE_KEY};
use fieldops_core::types::{QueuedAction, QueuedActionType};
use fieldops_core::{AppContext, CoreResult};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing;

use crate::dispatcher::ActionDispatcher;

pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub failed: usize,
    pub remaining: usize,
    /// Set when another drain was in flight or the queue was offline.
    pub skipped: bool,
}

/// Durable FIFO of mutations waiting for the upstream to be reachable.
pub struct OfflineQueue {
    ctx: AppContext,
    dispatcher: Arc<dyn ActionDispatcher>,
    max_retries: u32,
    actions: Mutex<Vec<QueuedAction>>,
    online: AtomicBool,
    processing: Mutex<()>,
}

impl OfflineQueue {
    pub async fn load(ctx: AppContext, dispatcher: Arc<dyn ActionDispatcher>) -> CoreResult<Self> {
        let actions: Vec<QueuedAction> =
            match load_json(ctx.store.as_ref(), OFFLINE_QUEUE_KEY).await {
                Ok(Some(actions)) => actions,
                Ok(None) => Vec::new(),
                Err(e) => {
                    tracing::error!("Discarding unreadable offline queue: {}", e);
                    Vec::new()
                }
            };

        if !actions.is_empty() {
            tracing::info!("Restored {} queued actions", actions.len());
        }

        let max_retries = match ctx.config.queue.max_retries {
            0 => MAX_RETRIES,
            n => n,
        };

        Ok(Self {
            ctx,
            dispatcher,
            max_retries,
            actions: Mutex::new(actions),
            online: AtomicBool::new(false),
            processing: Mutex::new(()),
        })
    }

    pub async fn add_to_queue(
        &self,
        action_type: QueuedActionType,
        payload: serde_json::Value,
    ) -> CoreResult<String> {
        let action = QueuedAction {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            payload,
            timestamp: self.ctx.now(),
            retry_count: 0,
            last_error: None,
        };
        let id = action.id.clone();

        let mut actions = self.actions.lock().await;
        actions.push(action);
        if let Err(e) = self.persist(&actions).await {
            actions.pop();
            return Err(e);
        }

        tracing::debug!(action_id = %id, "Queued {:?} ({} pending)", action_type, actions.len());
        Ok(id)
    }

    pub async fn remove_from_queue(&self, id: &str) -> CoreResult<bool> {
        let mut actions = self.actions.lock().await;
        let before = actions.len();
        actions.retain(|a| a.id != id);
        if actions.len() == before {
            return Ok(false);
        }
        self.persist(&actions).await?;
        Ok(true)
    }

    pub async fn clear_queue(&self) -> CoreResult<()> {
        let mut actions = self.actions.lock().await;
        actions.clear();
        self.persist(&actions).await
    }

    pub async fn pending(&self) -> Vec<QueuedAction> {
        self.actions.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.actions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.lock().await.is_empty()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records connectivity. Going from offline to online drains the queue;
    /// the drain's report is returned in that case.
    pub async fn set_online(&self, online: bool) -> CoreResult<Option<ProcessReport>> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::info!("Connectivity restored, replaying offline queue");
            return self.process_queue().await.map(Some);
        }
        if !online && was_online {
            tracing::warn!("Connectivity lost, queueing mutations");
        }
        Ok(None)
    }

    /// Replays a snapshot of the queue one action at a time, in insertion
    /// order. Actions added during the drain wait for the next one.
    pub async fn process_queue(&self) -> CoreResult<ProcessReport> {
        let Ok(_guard) = self.processing.try_lock() else {
            tracing::debug!("Queue replay already in flight");
            return Ok(ProcessReport {
                remaining: self.len().await,
                skipped: true,
                ..Default::default()
            });
        };

        if !self.is_online() {
            return Ok(ProcessReport {
                remaining: self.len().await,
                skipped: true,
                ..Default::default()
            });
        }

        let snapshot = self.actions.lock().await.clone();
        let mut report = ProcessReport::default();

        for action in snapshot {
            if !self.is_online() {
                tracing::warn!("Went offline during replay, stopping");
                break;
            }

            let result = self.dispatcher.dispatch(&action).await;

            let mut actions = self.actions.lock().await;
            let Some(pos) = actions.iter().position(|a| a.id == action.id) else {
                // removed while in flight
                continue;
            };

            match result {
                Ok(()) => {
                    actions.remove(pos);
                    report.processed += 1;
                    tracing::debug!(action_id = %action.id, "Replayed queued action");
                }
                Err(e) => {
                    let entry = &mut actions[pos];
                    entry.retry_count += 1;
                    entry.last_error = Some(e.to_string());

                    if entry.retry_count >= self.max_retries {
                        tracing::error!(
                            action_id = %action.id,
                            "Dropping queued action after {} failures: {}",
                            entry.retry_count,
                            e
                        );
                        actions.remove(pos);
                        report.failed += 1;
                    } else {
                        tracing::warn!(
                            action_id = %action.id,
                            "Queued action failed (attempt {}): {}",
                            entry.retry_count,
                            e
                        );
                    }
                }
            }

            self.persist(&actions).await?;
        }

        report.remaining = self.len().await;
        tracing::info!(
            "Queue replay finished: {} processed, {} dropped, {} remaining",
            report.processed,
            report.failed,
            report.remaining
        );
        Ok(report)
    }

    async fn persist(&self, actions: &[QueuedAction]) -> CoreResult<()> {
        save_json(self.ctx.store.as_ref(), OFFLINE_QUEUE_KEY, actions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::FakeDispatcher;
    use chrono::{TimeZone, Utc};
    use fieldops_core::{Config, ManualClock};
    use serde_json::json;

    fn context() -> AppContext {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 8, 1, 10, 0, 0).unwrap());
        AppContext::in_memory(Config::default(), Arc::new(clock))
    }

    async fn queue_with(ctx: AppContext, fake: Arc<FakeDispatcher>) -> OfflineQueue {
        OfflineQueue::load(ctx, fake).await.unwrap()
    }

    #[tokio::test]
    async fn going_online_drains_in_insertion_order() {
        let fake = Arc::new(FakeDispatcher::new());
        let queue = queue_with(context(), fake.clone()).await;

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                queue
                    .add_to_queue(QueuedActionType::CreateTicket, json!({"body": {"n": i}}))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(queue.len().await, 3);

        let report = queue.set_online(true).await.unwrap().unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, 0);
        assert_eq!(fake.calls(), ids);

        // already online: no second drain
        assert!(queue.set_online(true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_queue_does_not_replay() {
        let fake = Arc::new(FakeDispatcher::new());
        let queue = queue_with(context(), fake.clone()).await;
        queue
            .add_to_queue(QueuedActionType::DeleteTicket, json!({"ticketId": "t-1"}))
            .await
            .unwrap();

        let report = queue.process_queue().await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.remaining, 1);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn entries_are_dropped_after_three_failures() {
        let fake = Arc::new(FakeDispatcher::new());
        let queue = queue_with(context(), fake.clone()).await;

        let flaky = queue
            .add_to_queue(QueuedActionType::UpdateTicket, json!({"ticketId": "t-1"}))
            .await
            .unwrap();
        let broken = queue
            .add_to_queue(QueuedActionType::UpdateTicket, json!({"ticketId": "t-2"}))
            .await
            .unwrap();
        let fine = queue
            .add_to_queue(QueuedActionType::UpdateTicket, json!({"ticketId": "t-3"}))
            .await
            .unwrap();
        fake.fail_times(&flaky, 1);
        fake.fail_times(&broken, 10);

        let first = queue.set_online(true).await.unwrap().unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.failed, 0);
        assert_eq!(first.remaining, 2);

        let pending = queue.pending().await;
        assert!(pending.iter().all(|a| a.retry_count == 1));
        assert!(pending.iter().all(|a| a.last_error.is_some()));
        assert!(!pending.iter().any(|a| a.id == fine));

        let second = queue.process_queue().await.unwrap();
        assert_eq!(second.processed, 1);
        assert_eq!(second.remaining, 1);

        let third = queue.process_queue().await.unwrap();
        assert_eq!(third.failed, 1);
        assert_eq!(third.remaining, 0);

        let attempts_on_broken = fake.calls().iter().filter(|id| **id == broken).count();
        assert_eq!(attempts_on_broken, 3);
    }

    #[tokio::test]
    async fn remaining_entries_stay_below_the_retry_limit() {
        let fake = Arc::new(FakeDispatcher::new());
        let queue = queue_with(context(), fake.clone()).await;
        for i in 0..5 {
            queue
                .add_to_queue(QueuedActionType::AddComment, json!({"ticketId": format!("t-{}", i)}))
                .await
                .unwrap();
        }
        fake.set_fail_all(true);
        queue.set_online(true).await.unwrap();
        queue.process_queue().await.unwrap();

        let pending = queue.pending().await;
        assert!(pending.len() <= 5);
        assert!(pending.iter().all(|a| a.retry_count < MAX_RETRIES));

        let last = queue.process_queue().await.unwrap();
        assert_eq!(last.failed, 5);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn queue_survives_a_reload() {
        let ctx = context();
        let fake = Arc::new(FakeDispatcher::new());
        let queue = queue_with(ctx.clone(), fake.clone()).await;
        let payload = json!({"ticketId": "t-7", "body": {"text": "on site"}});
        let id = queue
            .add_to_queue(QueuedActionType::AddComment, payload.clone())
            .await
            .unwrap();
        let original = queue.pending().await.remove(0);

        let reloaded = queue_with(ctx, fake).await;
        let restored = reloaded.pending().await;
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, id);
        assert_eq!(restored[0].action_type, QueuedActionType::AddComment);
        assert_eq!(restored[0].payload, payload);
        assert_eq!(restored[0].timestamp, original.timestamp);
        assert_eq!(restored[0], original);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let fake = Arc::new(FakeDispatcher::new());
        let queue = queue_with(context(), fake).await;
        let a = queue
            .add_to_queue(QueuedActionType::LogTime, json!({"ticketId": "t-1"}))
            .await
            .unwrap();
        queue
            .add_to_queue(QueuedActionType::LogTime, json!({"ticketId": "t-2"}))
            .await
            .unwrap();

        assert!(queue.remove_from_queue(&a).await.unwrap());
        assert!(!queue.remove_from_queue(&a).await.unwrap());
        assert_eq!(queue.len().await, 1);
        queue.clear_queue().await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_queue_blob_loads_empty() {
        let ctx = context();
        ctx.store
            .set(OFFLINE_QUEUE_KEY, json!({"garbage": true}))
            .await
            .unwrap();
        let queue = queue_with(ctx, Arc::new(FakeDispatcher::new())).await;
        assert!(queue.is_empty().await);
    }
}
