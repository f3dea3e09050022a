//! Ticket status state machine.
//!
//! ```text
//! open -> assigned -> in_progress -> resolved -> verified -> closed
//! ```
//!
//! plus the backward edges needed in the field: unassigning, reopening a
//! resolved or verified ticket, and reopening a closed one.

use crate::error::{CoreError, CoreResult};
use crate::types::TicketStatus;

pub fn allowed_transitions(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::*;
    match from {
        Open => &[Assigned, InProgress, Closed],
        Assigned => &[Open, InProgress, Closed],
        InProgress => &[Assigned, Resolved],
        Resolved => &[InProgress, Verified, Closed],
        Verified => &[InProgress, Closed],
        Closed => &[Open],
    }
}

pub fn can_transition(from: TicketStatus, to: TicketStatus) -> bool {
    from == to || allowed_transitions(from).contains(&to)
}

pub fn validate_transition(from: TicketStatus, to: TicketStatus) -> CoreResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}
