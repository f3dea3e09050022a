pub mod events;
pub mod factory;
pub mod service;
pub mod sweeper;

pub use events::TicketEvent;
pub use service::{Listener, ListenerId, NewNotification, NotificationQuery, NotificationService};
pub use sweeper::run;
