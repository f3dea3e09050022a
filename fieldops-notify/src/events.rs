use fieldops_core::types::Ticket;

/// Ticket lifecycle events that produce notifications.
///
/// `watchers` are the active supervisors and admins at the time of the
/// event; the ticket layer resolves them because it owns the user directory.
#[derive(Debug, Clone)]
pub enum TicketEvent {
    Created {
        ticket: Ticket,
        watchers: Vec<String>,
    },
    Assigned {
        ticket: Ticket,
        assignee_id: String,
        assigned_by: String,
    },
    Resolved {
        ticket: Ticket,
        resolved_by: String,
        watchers: Vec<String>,
    },
    Commented {
        ticket: Ticket,
        commenter: String,
        comment: String,
    },
    Overdue {
        ticket: Ticket,
        watchers: Vec<String>,
    },
}

impl TicketEvent {
    pub fn ticket(&self) -> &Ticket {
        match self {
            TicketEvent::Created { ticket, .. }
            | TicketEvent::Assigned { ticket, .. }
            | TicketEvent::Resolved { ticket, .. }
            | TicketEvent::Commented { ticket, .. }
            | TicketEvent::Overdue { ticket, .. } => ticket,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TicketEvent::Created { .. } => "ticket.created",
            TicketEvent::Assigned { .. } => "ticket.assigned",
            TicketEvent::Resolved { .. } => "ticket.resolved",
            TicketEvent::Commented { .. } => "ticket.commented",
            TicketEvent::Overdue { .. } => "ticket.overdue",
        }
    }
}
