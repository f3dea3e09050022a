use fieldops_core::storage::{load_json, save_json, ACTIVE_TIME_SESSION_KEY, TIME_ENTRIES_KEY};
use fieldops_core::types::{TimeEntry, TimeSession, UserProfile};
use fieldops_core::{AppContext, CoreError, CoreResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing;

use crate::tickets::TicketService;

const MAX_MANUAL_HOURS: f64 = 24.0;

struct TimerState {
    active: Vec<TimeSession>,
    entries: Vec<TimeEntry>,
}

/// Per-user work timers. Stopping a timer (or logging time by hand) books
/// the hours onto the ticket.
pub struct TimeTracker {
    ctx: AppContext,
    tickets: Arc<TicketService>,
    state: Mutex<TimerState>,
}

fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

impl TimeTracker {
    pub async fn load(ctx: AppContext, tickets: Arc<TicketService>) -> CoreResult<Self> {
        let store = ctx.store.as_ref();
        let active: Vec<TimeSession> = load_json(store, ACTIVE_TIME_SESSION_KEY)
            .await?
            .unwrap_or_default();
        let entries: Vec<TimeEntry> = load_json(store, TIME_ENTRIES_KEY)
            .await?
            .unwrap_or_default();

        Ok(Self {
            ctx,
            tickets,
            state: Mutex::new(TimerState { active, entries }),
        })
    }

    pub async fn start(&self, user: &UserProfile, ticket_id: &str) -> CoreResult<TimeSession> {
        let ticket = self.tickets.get_ticket(user, ticket_id).await?;
        if !user.role.is_manager() && ticket.assigned_to.as_deref() != Some(user.id.as_str()) {
            return Err(CoreError::Forbidden(
                "You can only track time on tickets assigned to you".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if let Some(running) = state.active.iter().find(|s| s.user_id == user.id) {
            return Err(CoreError::Conflict(format!(
                "A timer is already running on ticket {}",
                running.ticket_id
            )));
        }

        let session = TimeSession {
            ticket_id: ticket.id.clone(),
            user_id: user.id.clone(),
            started_at: self.ctx.now(),
        };
        state.active.push(session.clone());
        if let Err(e) = save_json(self.ctx.store.as_ref(), ACTIVE_TIME_SESSION_KEY, &state.active).await {
            state.active.pop();
            return Err(e);
        }

        tracing::info!(user_id = %user.id, ticket_id = %ticket.id, "Started timer");
        Ok(session)
    }

    /// Closes the user's timer and books the elapsed hours. The session is
    /// closed and persisted first, so a ticket that was reassigned, reopened
    /// or deleted meanwhile can never leave the timer stuck.
    pub async fn stop(&self, user: &UserProfile, description: Option<String>) -> CoreResult<TimeEntry> {
        let mut state = self.state.lock().await;
        let pos = state
            .active
            .iter()
            .position(|s| s.user_id == user.id)
            .ok_or_else(|| CoreError::Validation("No timer is running".to_string()))?;

        let session = state.active.remove(pos);
        let ended_at = self.ctx.now();
        let hours = round_hours((ended_at - session.started_at).num_seconds().max(0) as f64 / 3600.0);
        let entry = TimeEntry {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id: session.ticket_id.clone(),
            user_id: user.id.clone(),
            started_at: session.started_at,
            ended_at,
            hours,
            description,
        };
        state.entries.push(entry.clone());
        if let Err(e) = self.persist(&state).await {
            state.entries.pop();
            state.active.insert(pos, session);
            return Err(e);
        }
        drop(state);

        tracing::info!(user_id = %user.id, ticket_id = %entry.ticket_id, hours, "Stopped timer");
        if hours > 0.0 {
            match self
                .tickets
                .book_elapsed_time(user, &entry.ticket_id, hours, entry.description.as_deref())
                .await
            {
                Ok(_) => {}
                Err(CoreError::NotFound { .. }) => {
                    tracing::warn!(ticket_id = %entry.ticket_id, "Timer stopped on a deleted ticket");
                }
                Err(e) => {
                    tracing::error!(ticket_id = %entry.ticket_id, "Failed to book {}h: {}", hours, e);
                }
            }
        }
        Ok(entry)
    }

    /// Books time without a running timer.
    pub async fn log_entry(
        &self,
        user: &UserProfile,
        ticket_id: &str,
        hours: f64,
        description: Option<String>,
    ) -> CoreResult<TimeEntry> {
        if !(hours > 0.0 && hours <= MAX_MANUAL_HOURS) {
            return Err(CoreError::Validation(format!(
                "Hours must be between 0 and {}",
                MAX_MANUAL_HOURS
            )));
        }
        let hours = round_hours(hours);

        let mut state = self.state.lock().await;
        self.tickets
            .record_time(user, ticket_id, hours, description.as_deref())
            .await?;

        let ended_at = self.ctx.now();
        let entry = TimeEntry {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id: ticket_id.to_string(),
            user_id: user.id.clone(),
            started_at: ended_at - chrono::Duration::seconds((hours * 3600.0) as i64),
            ended_at,
            hours,
            description,
        };
        state.entries.push(entry.clone());
        save_json(self.ctx.store.as_ref(), TIME_ENTRIES_KEY, &state.entries).await?;
        Ok(entry)
    }

    pub async fn active(&self, user_id: &str) -> Option<TimeSession> {
        self.state
            .lock()
            .await
            .active
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned()
    }

    pub async fn entries_for_ticket(&self, ticket_id: &str) -> Vec<TimeEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    pub async fn entries_for_user(&self, user_id: &str) -> Vec<TimeEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn total_hours_for_ticket(&self, ticket_id: &str) -> f64 {
        round_hours(
            self.entries_for_ticket(ticket_id)
                .await
                .iter()
                .map(|e| e.hours)
                .sum(),
        )
    }

    async fn persist(&self, state: &TimerState) -> CoreResult<()> {
        let store = self.ctx.store.as_ref();
        save_json(store, ACTIVE_TIME_SESSION_KEY, &state.active).await?;
        save_json(store, TIME_ENTRIES_KEY, &state.entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use chrono::Duration;
    use fieldops_core::types::QueuedActionType;

    async fn tracker(fx: &Fixture) -> TimeTracker {
        TimeTracker::load(fx.ctx.clone(), fx.tickets.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stop_books_elapsed_hours_on_the_ticket() {
        let fx = Fixture::new().await;
        let ticket = fx.assigned_ticket("Timed job").await;
        let timer = tracker(&fx).await;

        timer.start(&fx.engineer, &ticket.id).await.unwrap();
        assert!(timer.active(&fx.engineer.id).await.is_some());

        fx.clock.advance(Duration::minutes(90));
        let entry = timer
            .stop(&fx.engineer, Some("Swapped the relay".to_string()))
            .await
            .unwrap();
        assert_eq!(entry.hours, 1.5);
        assert!(timer.active(&fx.engineer.id).await.is_none());

        let after = fx.tickets.get_ticket(&fx.engineer, &ticket.id).await.unwrap();
        assert_eq!(after.actual_hours, 1.5);
        assert_eq!(timer.total_hours_for_ticket(&ticket.id).await, 1.5);
        assert_eq!(timer.entries_for_user(&fx.engineer.id).await.len(), 1);
    }

    #[tokio::test]
    async fn timer_stops_after_reassignment() {
        let fx = Fixture::new().await;
        let ticket = fx.assigned_ticket("Handed over").await;
        let next = fx.assigned_ticket("Next job").await;
        let timer = tracker(&fx).await;

        timer.start(&fx.engineer, &ticket.id).await.unwrap();
        fx.clock.advance(Duration::minutes(30));
        fx.tickets
            .assign_ticket(&fx.admin, &ticket.id, &fx.other_engineer.id)
            .await
            .unwrap();

        let entry = timer.stop(&fx.engineer, None).await.unwrap();
        assert_eq!(entry.hours, 0.5);
        assert!(timer.active(&fx.engineer.id).await.is_none());
        let after = fx.tickets.get_ticket(&fx.admin, &ticket.id).await.unwrap();
        assert_eq!(after.actual_hours, 0.5);

        timer.start(&fx.engineer, &next.id).await.unwrap();
    }

    #[tokio::test]
    async fn timer_stops_after_ticket_deletion() {
        let fx = Fixture::new().await;
        let ticket = fx.assigned_ticket("Cancelled").await;
        let next = fx.assigned_ticket("Next job").await;
        let timer = tracker(&fx).await;

        timer.start(&fx.engineer, &ticket.id).await.unwrap();
        fx.clock.advance(Duration::minutes(15));
        fx.tickets.delete_ticket(&fx.admin, &ticket.id).await.unwrap();

        let entry = timer.stop(&fx.engineer, None).await.unwrap();
        assert_eq!(entry.hours, 0.25);
        assert!(timer.active(&fx.engineer.id).await.is_none());
        assert_eq!(timer.entries_for_ticket(&ticket.id).await.len(), 1);

        // the closed session is what got persisted
        let reloaded = tracker(&fx).await;
        assert!(reloaded.active(&fx.engineer.id).await.is_none());
        reloaded.start(&fx.engineer, &next.id).await.unwrap();
    }

    #[tokio::test]
    async fn short_timers_queue_no_time_log() {
        let fx = Fixture::with_outbox().await;
        let ticket = fx.assigned_ticket("Quick look").await;
        let timer = tracker(&fx).await;

        timer.start(&fx.engineer, &ticket.id).await.unwrap();
        fx.clock.advance(Duration::seconds(10));
        let entry = timer.stop(&fx.engineer, None).await.unwrap();
        assert_eq!(entry.hours, 0.0);

        let outbox = fx.outbox.as_ref().unwrap();
        assert!(outbox
            .pending()
            .await
            .iter()
            .all(|a| a.action_type != QueuedActionType::LogTime));
    }

    #[tokio::test]
    async fn one_timer_per_user() {
        let fx = Fixture::new().await;
        let first = fx.assigned_ticket("First").await;
        let second = fx.assigned_ticket("Second").await;
        let timer = tracker(&fx).await;

        timer.start(&fx.engineer, &first.id).await.unwrap();
        assert!(matches!(
            timer.start(&fx.engineer, &second.id).await,
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            timer.start(&fx.other_engineer, &first.id).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn running_timer_survives_reload() {
        let fx = Fixture::new().await;
        let ticket = fx.assigned_ticket("Long job").await;
        tracker(&fx)
            .await
            .start(&fx.engineer, &ticket.id)
            .await
            .unwrap();

        let reloaded = tracker(&fx).await;
        let running = reloaded.active(&fx.engineer.id).await.unwrap();
        assert_eq!(running.ticket_id, ticket.id);
    }

    #[tokio::test]
    async fn manual_entries_are_validated_and_summed() {
        let fx = Fixture::new().await;
        let ticket = fx.assigned_ticket("Manual").await;
        let timer = tracker(&fx).await;

        assert!(timer.log_entry(&fx.engineer, &ticket.id, 0.0, None).await.is_err());
        assert!(timer.log_entry(&fx.engineer, &ticket.id, 30.0, None).await.is_err());

        timer.log_entry(&fx.engineer, &ticket.id, 2.0, None).await.unwrap();
        timer.log_entry(&fx.supervisor, &ticket.id, 0.25, None).await.unwrap();
        assert_eq!(timer.total_hours_for_ticket(&ticket.id).await, 2.25);
        assert_eq!(timer.entries_for_ticket(&ticket.id).await.len(), 2);
        assert!(timer.stop(&fx.engineer, None).await.is_err());
    }
}
