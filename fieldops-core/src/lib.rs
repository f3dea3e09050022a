pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod status;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use context::AppContext;
pub use error::{CoreError, CoreResult};
pub use status::{can_transition, validate_transition};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
