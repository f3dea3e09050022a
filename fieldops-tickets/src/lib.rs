pub mod overdue;
pub mod reports;
pub mod session;
pub mod tickets;
pub mod time;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

pub use reports::{EngineerWorkload, TicketSummary};
pub use session::{AuthEvent, AuthListener, SessionManager};
pub use tickets::{NewTicket, TicketFilter, TicketService, TicketUpdate};
pub use time::TimeTracker;
pub use users::{NewUser, UserDirectory, UserUpdate};
