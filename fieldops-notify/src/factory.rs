use fieldops_core::types::{NotificationPriority, NotificationType, Ticket};

use crate::service::NewNotification;

fn for_ticket(
    ticket: &Ticket,
    user_id: &str,
    notification_type: NotificationType,
    priority: NotificationPriority,
    title: String,
    message: String,
    triggered_by: Option<&str>,
) -> NewNotification {
    NewNotification {
        user_id: user_id.to_string(),
        notification_type,
        title,
        message,
        priority,
        ticket_id: Some(ticket.id.clone()),
        triggered_by: triggered_by.map(|s| s.to_string()),
        expires_at: None,
    }
}

pub fn ticket_created(ticket: &Ticket, recipients: &[String]) -> Vec<NewNotification> {
    recipients
        .iter()
        .map(|user_id| {
            for_ticket(
                ticket,
                user_id,
                NotificationType::TicketCreated,
                ticket.priority.into(),
                "New Ticket Created".to_string(),
                format!(
                    "New {} priority ticket: {}",
                    ticket.priority, ticket.title
                ),
                Some(&ticket.created_by),
            )
        })
        .collect()
}

pub fn ticket_assigned(ticket: &Ticket, assignee_id: &str, assigned_by: &str) -> NewNotification {
    for_ticket(
        ticket,
        assignee_id,
        NotificationType::TicketAssigned,
        ticket.priority.into(),
        "Ticket Assigned".to_string(),
        format!("You have been assigned to ticket: {}", ticket.title),
        Some(assigned_by),
    )
}

pub fn ticket_resolved(
    ticket: &Ticket,
    recipients: &[String],
    resolved_by: &str,
) -> Vec<NewNotification> {
    recipients
        .iter()
        .map(|user_id| {
            for_ticket(
                ticket,
                user_id,
                NotificationType::TicketResolved,
                NotificationPriority::Medium,
                "Ticket Resolved".to_string(),
                format!("Ticket \"{}\" has been resolved", ticket.title),
                Some(resolved_by),
            )
        })
        .collect()
}

pub fn ticket_commented(
    ticket: &Ticket,
    recipients: &[String],
    commenter: &str,
    comment: &str,
) -> Vec<NewNotification> {
    let preview: String = if comment.chars().count() > 80 {
        let cut: String = comment.chars().take(77).collect();
        format!("{}...", cut)
    } else {
        comment.to_string()
    };

    recipients
        .iter()
        .map(|user_id| {
            for_ticket(
                ticket,
                user_id,
                NotificationType::TicketCommented,
                NotificationPriority::Low,
                "New Comment".to_string(),
                format!("New comment on \"{}\": {}", ticket.title, preview),
                Some(commenter),
            )
        })
        .collect()
}

pub fn ticket_overdue(ticket: &Ticket, recipients: &[String]) -> Vec<NewNotification> {
    let priority = NotificationPriority::from(ticket.priority).max(NotificationPriority::High);
    recipients
        .iter()
        .map(|user_id| {
            for_ticket(
                ticket,
                user_id,
                NotificationType::TicketOverdue,
                priority,
                "Ticket Overdue".to_string(),
                format!("Ticket \"{}\" is past its due date", ticket.title),
                None,
            )
        })
        .collect()
}

pub fn system(
    user_id: &str,
    title: &str,
    message: &str,
    priority: NotificationPriority,
) -> NewNotification {
    NewNotification {
        user_id: user_id.to_string(),
        notification_type: NotificationType::System,
        title: title.to_string(),
        message: message.to_string(),
        priority,
        ticket_id: None,
        triggered_by: None,
        expires_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fieldops_core::types::{TicketPriority, TicketStatus};

    fn ticket(priority: TicketPriority) -> Ticket {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap();
        Ticket {
            id: "t-9".to_string(),
            title: "Generator alarm".to_string(),
            description: "Alarm on site B".to_string(),
            ticket_type: "inspection".to_string(),
            priority,
            status: TicketStatus::Open,
            created_by: "creator".to_string(),
            assigned_to: None,
            assigned_by: None,
            location: None,
            created_at: at,
            updated_at: at,
            assigned_at: None,
            resolved_at: None,
            verified_at: None,
            due_date: None,
            estimated_hours: None,
            actual_hours: 0.0,
            notes: None,
            equipment_id: None,
            activity: Vec::new(),
            media: Vec::new(),
            overdue_notified_at: None,
        }
    }

    #[test]
    fn created_fans_out_with_mapped_priority() {
        let recipients = vec!["sup-1".to_string(), "admin-1".to_string()];
        let built = ticket_created(&ticket(TicketPriority::Critical), &recipients);
        assert_eq!(built.len(), 2);
        assert!(built
            .iter()
            .all(|n| n.priority == NotificationPriority::Urgent
                && n.notification_type == NotificationType::TicketCreated));
        assert_eq!(built[0].user_id, "sup-1");
    }

    #[test]
    fn assigned_carries_the_assigner() {
        let n = ticket_assigned(&ticket(TicketPriority::Medium), "eng-1", "admin-1");
        assert_eq!(n.user_id, "eng-1");
        assert_eq!(n.triggered_by.as_deref(), Some("admin-1"));
        assert_eq!(n.priority, NotificationPriority::Medium);
        assert_eq!(n.ticket_id.as_deref(), Some("t-9"));
    }

    #[test]
    fn overdue_is_never_below_high() {
        let built = ticket_overdue(&ticket(TicketPriority::Low), &["eng-1".to_string()]);
        assert_eq!(built[0].priority, NotificationPriority::High);
        let built = ticket_overdue(&ticket(TicketPriority::Critical), &["eng-1".to_string()]);
        assert_eq!(built[0].priority, NotificationPriority::Urgent);
    }

    #[test]
    fn long_comments_are_truncated() {
        let comment = "x".repeat(200);
        let built = ticket_commented(&ticket(TicketPriority::Low), &["u".to_string()], "c", &comment);
        assert!(built[0].message.ends_with("..."));
        assert!(built[0].message.len() < 140);
    }
}
