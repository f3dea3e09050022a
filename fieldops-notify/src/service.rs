use chrono::{DateTime, Duration, Utc};
use fieldops_core::storage::{load_json, save_json, NOTIFICATIONS_KEY};
use fieldops_core::types::{Notification, NotificationPriority, NotificationType};
use fieldops_core::{AppContext, CoreResult};
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;

use crate::events::TicketEvent;
use crate::factory;

pub type ListenerId = u64;
pub type Listener = Arc<dyn Fn(&Notification) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub ticket_id: Option<String>,
    pub triggered_by: Option<String>,
    /// Falls back to the configured TTL when unset.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub types: Option<Vec<NotificationType>>,
}

pub struct NotificationService {
    ctx: AppContext,
    notifications: RwLock<Vec<Notification>>,
    listeners: std::sync::RwLock<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
}

impl NotificationService {
    pub async fn load(ctx: AppContext) -> CoreResult<Self> {
        let notifications: Vec<Notification> =
            match load_json(ctx.store.as_ref(), NOTIFICATIONS_KEY).await {
                Ok(Some(list)) => list,
                Ok(None) => Vec::new(),
                Err(e) => {
                    tracing::error!("Discarding unreadable notification store: {}", e);
                    Vec::new()
                }
            };

        tracing::info!("Loaded {} notifications", notifications.len());

        Ok(Self {
            ctx,
            notifications: RwLock::new(notifications),
            listeners: std::sync::RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        })
    }

    pub async fn add_notification(&self, new: NewNotification) -> CoreResult<Notification> {
        let mut created = self.add_notifications(vec![new]).await?;
        Ok(created.remove(0))
    }

    /// Stores a batch with a single write, then notifies listeners.
    pub async fn add_notifications(
        &self,
        batch: Vec<NewNotification>,
    ) -> CoreResult<Vec<Notification>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.ctx.now();
        let default_expiry = self
            .ctx
            .config
            .notifications
            .ttl_days
            .map(|days| now + Duration::days(days));

        let created: Vec<Notification> = batch
            .into_iter()
            .map(|new| Notification {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: new.user_id,
                notification_type: new.notification_type,
                title: new.title,
                message: new.message,
                priority: new.priority,
                is_read: false,
                ticket_id: new.ticket_id,
                triggered_by: new.triggered_by,
                created_at: now,
                expires_at: new.expires_at.or(default_expiry),
            })
            .collect();

        {
            let mut notifications = self.notifications.write().await;
            let before = notifications.len();
            notifications.extend(created.iter().cloned());
            if let Err(e) = self.persist(&notifications).await {
                notifications.truncate(before);
                tracing::error!("Failed to persist {} notifications: {}", created.len(), e);
                return Err(e);
            }
        }

        for notification in &created {
            tracing::debug!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                "Added notification"
            );
            self.dispatch(notification);
        }

        Ok(created)
    }

    /// Newest first.
    pub async fn get_notifications_for_user(
        &self,
        user_id: &str,
        query: &NotificationQuery,
    ) -> Vec<Notification> {
        let notifications = self.notifications.read().await;
        let mut matching: Vec<Notification> = notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .filter(|n| !query.unread_only || !n.is_read)
            .filter(|n| match &query.types {
                Some(types) if !types.is_empty() => types.contains(&n.notification_type),
                _ => true,
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        matching
    }

    pub async fn get_notification(&self, id: &str) -> Option<Notification> {
        self.notifications
            .read()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub async fn get_unread_count(&self, user_id: &str) -> usize {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count()
    }

    /// Returns false when no notification has that id.
    pub async fn mark_as_read(&self, id: &str) -> CoreResult<bool> {
        self.set_read(id, true).await
    }

    pub async fn mark_as_unread(&self, id: &str) -> CoreResult<bool> {
        self.set_read(id, false).await
    }

    async fn set_read(&self, id: &str, is_read: bool) -> CoreResult<bool> {
        let mut notifications = self.notifications.write().await;
        let Some(pos) = notifications.iter().position(|n| n.id == id) else {
            return Ok(false);
        };
        if notifications[pos].is_read != is_read {
            notifications[pos].is_read = is_read;
            if let Err(e) = self.persist(&notifications).await {
                notifications[pos].is_read = !is_read;
                return Err(e);
            }
        }
        Ok(true)
    }

    pub async fn mark_all_as_read(&self, user_id: &str) -> CoreResult<usize> {
        let mut notifications = self.notifications.write().await;
        let changed: Vec<usize> = notifications
            .iter()
            .enumerate()
            .filter(|(_, n)| n.user_id == user_id && !n.is_read)
            .map(|(i, _)| i)
            .collect();
        if changed.is_empty() {
            return Ok(0);
        }

        for &i in &changed {
            notifications[i].is_read = true;
        }
        if let Err(e) = self.persist(&notifications).await {
            for &i in &changed {
                notifications[i].is_read = false;
            }
            return Err(e);
        }
        Ok(changed.len())
    }

    pub async fn delete_notification(&self, id: &str) -> CoreResult<bool> {
        let mut notifications = self.notifications.write().await;
        let Some(pos) = notifications.iter().position(|n| n.id == id) else {
            return Ok(false);
        };
        let removed = notifications.remove(pos);
        if let Err(e) = self.persist(&notifications).await {
            notifications.insert(pos, removed);
            return Err(e);
        }
        Ok(true)
    }

    pub async fn cleanup_expired_notifications(&self) -> CoreResult<usize> {
        let now = self.ctx.now();
        let mut notifications = self.notifications.write().await;
        if !notifications.iter().any(|n| n.is_expired(now)) {
            return Ok(0);
        }

        let previous = notifications.clone();
        notifications.retain(|n| !n.is_expired(now));
        let removed = previous.len() - notifications.len();
        if let Err(e) = self.persist(&notifications).await {
            *notifications = previous;
            return Err(e);
        }
        tracing::info!("Removed {} expired notifications", removed);
        Ok(removed)
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|p| p.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub async fn process_event(&self, event: &TicketEvent) -> CoreResult<Vec<Notification>> {
        tracing::debug!("Processing notification event: {}", event.name());

        let recipients = self.extract_recipients(event);
        if recipients.is_empty() {
            tracing::debug!("No recipients for {}", event.name());
            return Ok(Vec::new());
        }

        let batch = match event {
            TicketEvent::Created { ticket, .. } => factory::ticket_created(ticket, &recipients),
            TicketEvent::Assigned {
                ticket,
                assignee_id,
                assigned_by,
            } => vec![factory::ticket_assigned(ticket, assignee_id, assigned_by)],
            TicketEvent::Resolved {
                ticket,
                resolved_by,
                ..
            } => factory::ticket_resolved(ticket, &recipients, resolved_by),
            TicketEvent::Commented {
                ticket,
                commenter,
                comment,
            } => factory::ticket_commented(ticket, &recipients, commenter, comment),
            TicketEvent::Overdue { ticket, .. } => factory::ticket_overdue(ticket, &recipients),
        };

        self.add_notifications(batch).await
    }

    fn extract_recipients(&self, event: &TicketEvent) -> Vec<String> {
        let mut recipients: Vec<String> = match event {
            TicketEvent::Created { ticket, watchers } => watchers
                .iter()
                .filter(|w| **w != ticket.created_by)
                .cloned()
                .collect(),
            TicketEvent::Assigned { assignee_id, .. } => vec![assignee_id.clone()],
            TicketEvent::Resolved {
                ticket,
                resolved_by,
                watchers,
            } => std::iter::once(&ticket.created_by)
                .chain(watchers.iter())
                .filter(|u| *u != resolved_by)
                .cloned()
                .collect(),
            TicketEvent::Commented {
                ticket, commenter, ..
            } => std::iter::once(&ticket.created_by)
                .chain(ticket.assigned_to.iter())
                .filter(|u| *u != commenter)
                .cloned()
                .collect(),
            TicketEvent::Overdue { ticket, watchers } => match &ticket.assigned_to {
                Some(assignee) => vec![assignee.clone()],
                None => watchers.clone(),
            },
        };

        let mut seen = std::collections::HashSet::new();
        recipients.retain(|r| seen.insert(r.clone()));
        recipients
    }

    fn dispatch(&self, notification: &Notification) {
        let listeners: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        for (id, listener) in listeners {
            match std::panic::catch_unwind(AssertUnwindSafe(|| listener(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        listener_id = id,
                        notification_id = %notification.id,
                        "Notification listener failed: {}",
                        e
                    );
                }
                Err(_) => {
                    tracing::error!(
                        listener_id = id,
                        notification_id = %notification.id,
                        "Notification listener panicked"
                    );
                }
            }
        }
    }

    async fn persist(&self, notifications: &[Notification]) -> CoreResult<()> {
        save_json(self.ctx.store.as_ref(), NOTIFICATIONS_KEY, notifications).await
    }
}
