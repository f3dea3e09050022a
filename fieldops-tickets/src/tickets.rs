use chrono::{DateTime, Utc};
use fieldops_core::status::validate_transition;
use fieldops_core::storage::{load_json, save_json, TICKETS_KEY};
use fieldops_core::types::{
    ActivityEntry, ActivityKind, QueuedActionType, Ticket, TicketPriority, TicketStatus,
    UserProfile, UserRole,
};
use fieldops_core::{AppContext, CoreError, CoreResult};
use fieldops_notify::{NotificationService, TicketEvent};
use fieldops_outbox::OfflineQueue;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;

use crate::users::UserDirectory;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;
const MAX_TICKET_ID_LEN: usize = 64;

fn default_ticket_type() -> String {
    "general".to_string()
}

fn default_priority() -> TicketPriority {
    TicketPriority::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    /// Client-chosen id. Offline clients mint ids locally so that follow-up
    /// actions replayed later still address the same ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_ticket_type")]
    pub ticket_type: String,
    #[serde(default = "default_priority")]
    pub priority: TicketPriority,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub equipment_id: Option<String>,
}

/// Partial update: only supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TicketFilter {
    fn matches(&self, ticket: &Ticket) -> bool {
        self.status.map_or(true, |s| ticket.status == s)
            && self.priority.map_or(true, |p| ticket.priority == p)
            && self
                .created_by
                .as_ref()
                .map_or(true, |u| &ticket.created_by == u)
            && self
                .assigned_to
                .as_ref()
                .map_or(true, |u| ticket.assigned_to.as_ref() == Some(u))
            && self
                .assigned_by
                .as_ref()
                .map_or(true, |u| ticket.assigned_by.as_ref() == Some(u))
    }
}

pub fn can_view(viewer: &UserProfile, ticket: &Ticket) -> bool {
    viewer.role.is_manager() || ticket.involves(&viewer.id)
}

fn ensure_can_modify(actor: &UserProfile, ticket: &Ticket) -> CoreResult<()> {
    if actor.role.is_manager() || ticket.assigned_to.as_deref() == Some(actor.id.as_str()) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "Only the assigned engineer or a supervisor can change this ticket".to_string(),
        ))
    }
}

fn ensure_manager(actor: &UserProfile, action: &str) -> CoreResult<()> {
    if actor.role.is_manager() {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "Only admins and supervisors can {}",
            action
        )))
    }
}

/// Verifying and closing sign off on the work, so they stay with managers
/// whichever route the status change takes.
fn authorize_status(actor: &UserProfile, to: TicketStatus) -> CoreResult<()> {
    if matches!(to, TicketStatus::Verified | TicketStatus::Closed) {
        ensure_manager(actor, "verify or close tickets")?;
    }
    Ok(())
}

fn validate_ticket_id(id: &str) -> CoreResult<()> {
    let well_formed = !id.is_empty()
        && id.len() <= MAX_TICKET_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid ticket id: {}", id)))
    }
}

fn activity(
    actor_id: &str,
    kind: ActivityKind,
    message: String,
    at: DateTime<Utc>,
) -> ActivityEntry {
    ActivityEntry {
        id: uuid::Uuid::new_v4().to_string(),
        actor_id: actor_id.to_string(),
        kind,
        message,
        from_status: None,
        to_status: None,
        at,
    }
}

/// Moves `ticket` to `to` if the transition table allows it, stamping the
/// lifecycle timestamps and the audit trail. Returns whether anything
/// changed.
pub fn apply_status(
    ticket: &mut Ticket,
    to: TicketStatus,
    actor_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let from = ticket.status;
    validate_transition(from, to)?;
    if from == to {
        return Ok(false);
    }
    if to == TicketStatus::Assigned && ticket.assigned_to.is_none() {
        return Err(CoreError::Validation(
            "Use assign to move a ticket to assigned".to_string(),
        ));
    }

    ticket.status = to;
    if to.is_resolved() {
        if ticket.resolved_at.is_none() {
            ticket.resolved_at = Some(now);
        }
    } else {
        ticket.resolved_at = None;
        ticket.verified_at = None;
    }
    if to == TicketStatus::Verified {
        ticket.verified_at = Some(now);
    }
    if to == TicketStatus::Open {
        ticket.assigned_to = None;
        ticket.assigned_by = None;
        ticket.assigned_at = None;
    }

    let mut entry = activity(
        actor_id,
        ActivityKind::StatusChanged,
        format!("Status changed from {} to {}", from, to),
        now,
    );
    entry.from_status = Some(from);
    entry.to_status = Some(to);
    ticket.activity.push(entry);
    Ok(true)
}

pub struct TicketService {
    ctx: AppContext,
    users: Arc<UserDirectory>,
    notifications: Arc<NotificationService>,
    outbox: Option<Arc<OfflineQueue>>,
    tickets: RwLock<Vec<Ticket>>,
}

impl TicketService {
    pub async fn load(
        ctx: AppContext,
        users: Arc<UserDirectory>,
        notifications: Arc<NotificationService>,
        outbox: Option<Arc<OfflineQueue>>,
    ) -> CoreResult<Self> {
        let tickets: Vec<Ticket> = load_json(ctx.store.as_ref(), TICKETS_KEY)
            .await?
            .unwrap_or_default();
        tracing::info!("Loaded {} tickets", tickets.len());

        Ok(Self {
            ctx,
            users,
            notifications,
            outbox,
            tickets: RwLock::new(tickets),
        })
    }

    pub fn users(&self) -> &Arc<UserDirectory> {
        &self.users
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    /// Field engineers see tickets assigned to or created by them; admins
    /// and supervisors see everything. Newest first.
    pub async fn list_for_viewer(&self, viewer: &UserProfile, filter: &TicketFilter) -> Vec<Ticket> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0);

        let mut visible = self.visible_to(viewer).await;
        visible.retain(|t| filter.matches(t));
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible.into_iter().skip(offset).take(limit).collect()
    }

    /// Every ticket the viewer may see, unpaginated.
    pub async fn visible_to(&self, viewer: &UserProfile) -> Vec<Ticket> {
        self.tickets
            .read()
            .await
            .iter()
            .filter(|t| can_view(viewer, t))
            .cloned()
            .collect()
    }

    pub async fn tickets_for_user_field(
        &self,
        viewer: &UserProfile,
        field: &str,
        user_id: &str,
    ) -> CoreResult<Vec<Ticket>> {
        let filter = match field {
            "created_by" => TicketFilter {
                created_by: Some(user_id.to_string()),
                ..Default::default()
            },
            "assigned_to" => TicketFilter {
                assigned_to: Some(user_id.to_string()),
                ..Default::default()
            },
            "assigned_by" => TicketFilter {
                assigned_by: Some(user_id.to_string()),
                ..Default::default()
            },
            _ => return Err(CoreError::Validation(format!("Invalid field: {}", field))),
        };

        let mut tickets = self.visible_to(viewer).await;
        tickets.retain(|t| filter.matches(t));
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    pub async fn get_ticket(&self, viewer: &UserProfile, id: &str) -> CoreResult<Ticket> {
        let ticket = self.find(id).await?;
        if !can_view(viewer, &ticket) {
            return Err(CoreError::Forbidden("Ticket is not visible to you".to_string()));
        }
        Ok(ticket)
    }

    async fn find(&self, id: &str) -> CoreResult<Ticket> {
        self.tickets
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Ticket", id))
    }

    pub async fn create_ticket(&self, actor: &UserProfile, new: NewTicket) -> CoreResult<Ticket> {
        if new.title.trim().is_empty() {
            return Err(CoreError::Validation("Title is required".to_string()));
        }
        if let Some(assignee) = &new.assigned_to {
            ensure_manager(actor, "assign tickets")?;
            self.ensure_engineer(assignee).await?;
        }
        let id = match &new.id {
            Some(id) => {
                validate_ticket_id(id)?;
                id.clone()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let now = self.ctx.now();
        let mut ticket = Ticket {
            id,
            title: new.title.trim().to_string(),
            description: new.description.clone(),
            ticket_type: new.ticket_type.clone(),
            priority: new.priority,
            status: TicketStatus::Open,
            created_by: actor.id.clone(),
            assigned_to: None,
            assigned_by: None,
            location: new.location.clone(),
            created_at: now,
            updated_at: now,
            assigned_at: None,
            resolved_at: None,
            verified_at: None,
            due_date: new.due_date,
            estimated_hours: new.estimated_hours,
            actual_hours: 0.0,
            notes: new.notes.clone(),
            equipment_id: new.equipment_id.clone(),
            activity: vec![activity(
                &actor.id,
                ActivityKind::Created,
                "Ticket created".to_string(),
                now,
            )],
            media: Vec::new(),
            overdue_notified_at: None,
        };

        if let Some(assignee) = &new.assigned_to {
            ticket.assigned_to = Some(assignee.clone());
            ticket.assigned_by = Some(actor.id.clone());
            ticket.assigned_at = Some(now);
            apply_status(&mut ticket, TicketStatus::Assigned, &actor.id, now)?;
        }

        {
            let mut tickets = self.tickets.write().await;
            if tickets.iter().any(|t| t.id == ticket.id) {
                return Err(CoreError::Conflict(format!(
                    "Ticket {} already exists",
                    ticket.id
                )));
            }
            tickets.push(ticket.clone());
            if let Err(e) = self.persist(&tickets).await {
                tickets.pop();
                tracing::error!("Failed to persist new ticket: {}", e);
                return Err(e);
            }
        }

        tracing::info!(ticket_id = %ticket.id, actor = %actor.id, "Created ticket");

        let watchers = self.watchers().await;
        self.emit(TicketEvent::Created {
            ticket: ticket.clone(),
            watchers,
        })
        .await;
        if let Some(assignee) = &ticket.assigned_to {
            self.emit(TicketEvent::Assigned {
                ticket: ticket.clone(),
                assignee_id: assignee.clone(),
                assigned_by: actor.id.clone(),
            })
            .await;
        }

        let body = NewTicket {
            id: Some(ticket.id.clone()),
            ..new
        };
        self.enqueue(
            QueuedActionType::CreateTicket,
            json!({ "ticketId": ticket.id, "body": body }),
        )
        .await;

        Ok(ticket)
    }

    pub async fn update_ticket(
        &self,
        actor: &UserProfile,
        id: &str,
        update: TicketUpdate,
    ) -> CoreResult<Ticket> {
        if matches!(&update.title, Some(t) if t.trim().is_empty()) {
            return Err(CoreError::Validation("Title cannot be empty".to_string()));
        }
        if let Some(status) = update.status {
            authorize_status(actor, status)?;
        }

        let now = self.ctx.now();
        let mut entered_resolved = false;
        let changes = update.clone();
        let ticket = self
            .mutate(id, |ticket| {
                ensure_can_modify(actor, ticket)?;
                if let Some(status) = changes.status {
                    entered_resolved = apply_status(ticket, status, &actor.id, now)?
                        && status == TicketStatus::Resolved;
                }
                if let Some(title) = changes.title {
                    ticket.title = title.trim().to_string();
                }
                if let Some(description) = changes.description {
                    ticket.description = description;
                }
                if let Some(ticket_type) = changes.ticket_type {
                    ticket.ticket_type = ticket_type;
                }
                if let Some(priority) = changes.priority {
                    ticket.priority = priority;
                }
                if changes.location.is_some() {
                    ticket.location = changes.location;
                }
                if let Some(due) = changes.due_date {
                    ticket.due_date = Some(due);
                    ticket.overdue_notified_at = None;
                }
                if changes.estimated_hours.is_some() {
                    ticket.estimated_hours = changes.estimated_hours;
                }
                if changes.notes.is_some() {
                    ticket.notes = changes.notes;
                }
                if changes.equipment_id.is_some() {
                    ticket.equipment_id = changes.equipment_id;
                }
                ticket.activity.push(activity(
                    &actor.id,
                    ActivityKind::Updated,
                    "Ticket details updated".to_string(),
                    now,
                ));
                Ok(())
            })
            .await?;

        if entered_resolved {
            self.emit_resolved(&ticket, actor).await;
        }
        self.enqueue(
            QueuedActionType::UpdateTicket,
            json!({ "ticketId": ticket.id, "body": update }),
        )
        .await;

        Ok(ticket)
    }

    pub async fn change_status(
        &self,
        actor: &UserProfile,
        id: &str,
        status: TicketStatus,
    ) -> CoreResult<Ticket> {
        let now = self.ctx.now();
        let mut changed = false;
        let ticket = self
            .mutate(id, |ticket| {
                ensure_can_modify(actor, ticket)?;
                authorize_status(actor, status)?;
                changed = apply_status(ticket, status, &actor.id, now)?;
                Ok(())
            })
            .await?;

        if !changed {
            return Ok(ticket);
        }

        tracing::info!(ticket_id = %ticket.id, status = %status, "Ticket status changed");
        if status == TicketStatus::Resolved {
            self.emit_resolved(&ticket, actor).await;
        }
        self.enqueue(
            QueuedActionType::UpdateTicket,
            json!({ "ticketId": ticket.id, "body": { "status": status } }),
        )
        .await;

        Ok(ticket)
    }

    pub async fn assign_ticket(
        &self,
        actor: &UserProfile,
        id: &str,
        engineer_id: &str,
    ) -> CoreResult<Ticket> {
        ensure_manager(actor, "assign tickets")?;
        let engineer = self.ensure_engineer(engineer_id).await?;

        let now = self.ctx.now();
        let ticket = self
            .mutate(id, |ticket| {
                if ticket.status.is_resolved() {
                    return Err(CoreError::Validation(
                        "Resolved tickets cannot be reassigned".to_string(),
                    ));
                }
                ticket.assigned_to = Some(engineer.id.clone());
                ticket.assigned_by = Some(actor.id.clone());
                ticket.assigned_at = Some(now);
                if ticket.status == TicketStatus::Open {
                    apply_status(ticket, TicketStatus::Assigned, &actor.id, now)?;
                }
                ticket.activity.push(activity(
                    &actor.id,
                    ActivityKind::Assigned,
                    format!("Assigned to {}", engineer.full_name),
                    now,
                ));
                Ok(())
            })
            .await?;

        tracing::info!(ticket_id = %ticket.id, engineer = %engineer.id, "Assigned ticket");
        self.emit(TicketEvent::Assigned {
            ticket: ticket.clone(),
            assignee_id: engineer.id.clone(),
            assigned_by: actor.id.clone(),
        })
        .await;
        self.enqueue(
            QueuedActionType::AssignTicket,
            json!({ "ticketId": ticket.id, "body": { "engineerId": engineer.id } }),
        )
        .await;

        Ok(ticket)
    }

    pub async fn add_comment(
        &self,
        actor: &UserProfile,
        id: &str,
        text: &str,
    ) -> CoreResult<Ticket> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation("Comment cannot be empty".to_string()));
        }

        let now = self.ctx.now();
        let ticket = self
            .mutate(id, |ticket| {
                if !can_view(actor, ticket) {
                    return Err(CoreError::Forbidden("Ticket is not visible to you".to_string()));
                }
                ticket.activity.push(activity(
                    &actor.id,
                    ActivityKind::Commented,
                    text.to_string(),
                    now,
                ));
                Ok(())
            })
            .await?;

        self.emit(TicketEvent::Commented {
            ticket: ticket.clone(),
            commenter: actor.id.clone(),
            comment: text.to_string(),
        })
        .await;
        self.enqueue(
            QueuedActionType::AddComment,
            json!({ "ticketId": ticket.id, "body": { "text": text } }),
        )
        .await;

        Ok(ticket)
    }

    /// Adds logged hours to a ticket. Called by the time tracker.
    pub async fn record_time(
        &self,
        actor: &UserProfile,
        id: &str,
        hours: f64,
        description: Option<&str>,
    ) -> CoreResult<Ticket> {
        self.add_hours(actor, id, hours, description, true).await
    }

    /// Books hours from a timer that was already running. The work was done
    /// even if the ticket has since been reassigned or reopened.
    pub(crate) async fn book_elapsed_time(
        &self,
        actor: &UserProfile,
        id: &str,
        hours: f64,
        description: Option<&str>,
    ) -> CoreResult<Ticket> {
        self.add_hours(actor, id, hours, description, false).await
    }

    async fn add_hours(
        &self,
        actor: &UserProfile,
        id: &str,
        hours: f64,
        description: Option<&str>,
        require_assignment: bool,
    ) -> CoreResult<Ticket> {
        let now = self.ctx.now();
        let ticket = self
            .mutate(id, |ticket| {
                if require_assignment {
                    ensure_can_modify(actor, ticket)?;
                }
                ticket.actual_hours += hours;
                ticket.activity.push(activity(
                    &actor.id,
                    ActivityKind::TimeLogged,
                    format!("Logged {:.2}h", hours),
                    now,
                ));
                Ok(())
            })
            .await?;

        // upstream rejects empty logs
        if hours <= 0.0 {
            return Ok(ticket);
        }
        self.enqueue(
            QueuedActionType::LogTime,
            json!({
                "ticketId": ticket.id,
                "body": { "hours": hours, "description": description },
            }),
        )
        .await;

        Ok(ticket)
    }

    pub async fn delete_ticket(&self, actor: &UserProfile, id: &str) -> CoreResult<Ticket> {
        ensure_manager(actor, "delete tickets")?;

        let removed = {
            let mut tickets = self.tickets.write().await;
            let pos = tickets
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| CoreError::not_found("Ticket", id))?;
            let removed = tickets.remove(pos);
            if let Err(e) = self.persist(&tickets).await {
                tickets.insert(pos, removed);
                return Err(e);
            }
            removed
        };

        tracing::info!(ticket_id = %removed.id, actor = %actor.id, "Deleted ticket");
        self.enqueue(
            QueuedActionType::DeleteTicket,
            json!({ "ticketId": removed.id }),
        )
        .await;
        Ok(removed)
    }

    /// Flags every overdue ticket that has not been flagged yet and sends
    /// one overdue notification round for each. Returns how many were
    /// flagged.
    pub async fn notify_overdue(&self) -> CoreResult<usize> {
        let now = self.ctx.now();
        let flagged: Vec<Ticket> = {
            let mut tickets = self.tickets.write().await;
            let previous = tickets.clone();
            let mut flagged = Vec::new();
            for ticket in tickets.iter_mut() {
                if ticket.is_overdue(now) && ticket.overdue_notified_at.is_none() {
                    ticket.overdue_notified_at = Some(now);
                    flagged.push(ticket.clone());
                }
            }
            if flagged.is_empty() {
                return Ok(0);
            }
            if let Err(e) = self.persist(&tickets).await {
                *tickets = previous;
                return Err(e);
            }
            flagged
        };

        let watchers = self.watchers().await;
        for ticket in &flagged {
            self.emit(TicketEvent::Overdue {
                ticket: ticket.clone(),
                watchers: watchers.clone(),
            })
            .await;
        }

        tracing::info!("Flagged {} overdue tickets", flagged.len());
        Ok(flagged.len())
    }

    async fn mutate<F>(&self, id: &str, f: F) -> CoreResult<Ticket>
    where
        F: FnOnce(&mut Ticket) -> CoreResult<()>,
    {
        let mut tickets = self.tickets.write().await;
        let pos = tickets
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CoreError::not_found("Ticket", id))?;

        let mut updated = tickets[pos].clone();
        f(&mut updated)?;
        updated.updated_at = self.ctx.now();

        let previous = std::mem::replace(&mut tickets[pos], updated.clone());
        if let Err(e) = self.persist(&tickets).await {
            tickets[pos] = previous;
            tracing::error!(ticket_id = %id, "Failed to persist ticket: {}", e);
            return Err(e);
        }
        Ok(updated)
    }

    async fn ensure_engineer(&self, user_id: &str) -> CoreResult<UserProfile> {
        let user = self.users.get_user(user_id).await?;
        if user.role != UserRole::FieldEngineer || !user.is_active {
            return Err(CoreError::Validation(format!(
                "User {} is not an active field engineer",
                user_id
            )));
        }
        Ok(user)
    }

    async fn watchers(&self) -> Vec<String> {
        self.users
            .users_with_roles(&[UserRole::Admin, UserRole::Supervisor])
            .await
            .into_iter()
            .map(|u| u.id)
            .collect()
    }

    async fn emit_resolved(&self, ticket: &Ticket, actor: &UserProfile) {
        let watchers = self.watchers().await;
        self.emit(TicketEvent::Resolved {
            ticket: ticket.clone(),
            resolved_by: actor.id.clone(),
            watchers,
        })
        .await;
    }

    async fn emit(&self, event: TicketEvent) {
        if let Err(e) = self.notifications.process_event(&event).await {
            tracing::error!(
                ticket_id = %event.ticket().id,
                "Failed to emit {} notifications: {}",
                event.name(),
                e
            );
        }
    }

    async fn enqueue(&self, action_type: QueuedActionType, payload: serde_json::Value) {
        let Some(outbox) = &self.outbox else {
            return;
        };
        if let Err(e) = outbox.add_to_queue(action_type, payload).await {
            tracing::error!("Failed to queue {:?} for upstream: {}", action_type, e);
        }
    }

    async fn persist(&self, tickets: &[Ticket]) -> CoreResult<()> {
        save_json(self.ctx.store.as_ref(), TICKETS_KEY, tickets).await
    }
}
