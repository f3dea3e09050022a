use chrono::{DateTime, TimeZone, Utc};
use fieldops_core::types::{Ticket, TicketPriority, UserProfile, UserRole};
use fieldops_core::{AppContext, Config, ManualClock};
use fieldops_notify::NotificationService;
use fieldops_outbox::{FakeDispatcher, OfflineQueue};
use std::sync::Arc;

use crate::tickets::{NewTicket, TicketService};
use crate::users::{NewUser, UserDirectory};

pub fn context() -> (AppContext, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
    let ctx = AppContext::in_memory(Config::default(), Arc::new(clock.clone()));
    (ctx, clock)
}

pub fn new_user(email: &str, role: UserRole) -> NewUser {
    NewUser {
        email: email.to_string(),
        full_name: format!("User {}", email),
        password: "secret-pass".to_string(),
        role: Some(role),
        department: None,
        phone: None,
    }
}

/// An in-memory deployment with one admin, one supervisor and two
/// field engineers.
pub struct Fixture {
    pub ctx: AppContext,
    pub clock: ManualClock,
    pub users: Arc<UserDirectory>,
    pub notifications: Arc<NotificationService>,
    pub outbox: Option<Arc<OfflineQueue>>,
    pub tickets: Arc<TicketService>,
    pub admin: UserProfile,
    pub supervisor: UserProfile,
    pub engineer: UserProfile,
    pub other_engineer: UserProfile,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(false).await
    }

    pub async fn with_outbox() -> Self {
        Self::build(true).await
    }

    async fn build(with_outbox: bool) -> Self {
        let (ctx, clock) = context();
        let users = Arc::new(UserDirectory::load(ctx.clone()).await.unwrap());
        let admin = users
            .create_user(new_user("admin@example.com", UserRole::Admin))
            .await
            .unwrap();
        let supervisor = users
            .create_user(new_user("super@example.com", UserRole::Supervisor))
            .await
            .unwrap();
        let engineer = users
            .create_user(new_user("eng@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();
        let other_engineer = users
            .create_user(new_user("eng2@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();

        let notifications = Arc::new(NotificationService::load(ctx.clone()).await.unwrap());
        let outbox = if with_outbox {
            Some(Arc::new(
                OfflineQueue::load(ctx.clone(), Arc::new(FakeDispatcher::new()))
                    .await
                    .unwrap(),
            ))
        } else {
            None
        };
        let tickets = Arc::new(
            TicketService::load(ctx.clone(), users.clone(), notifications.clone(), outbox.clone())
                .await
                .unwrap(),
        );

        Self {
            ctx,
            clock,
            users,
            notifications,
            outbox,
            tickets,
            admin,
            supervisor,
            engineer,
            other_engineer,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    /// Created by the supervisor, then assigned to `engineer` by the admin.
    pub async fn assigned_ticket(&self, title: &str) -> Ticket {
        let ticket = self
            .tickets
            .create_ticket(
                &self.supervisor,
                NewTicket {
                    id: None,
                    title: title.to_string(),
                    description: String::new(),
                    ticket_type: "repair".to_string(),
                    priority: TicketPriority::Medium,
                    assigned_to: None,
                    location: Some("Substation 4".to_string()),
                    due_date: None,
                    estimated_hours: Some(2.0),
                    notes: None,
                    equipment_id: None,
                },
            )
            .await
            .unwrap();
        self.tickets
            .assign_ticket(&self.admin, &ticket.id, &self.engineer.id)
            .await
            .unwrap()
    }
}
