pub mod dispatcher;
pub mod poller;
pub mod probe;
pub mod queue;

pub use dispatcher::{ActionDispatcher, FakeDispatcher, HttpDispatcher};
pub use poller::run;
pub use probe::{ConnectivityProbe, HttpProbe, StaticProbe};
pub use queue::{OfflineQueue, ProcessReport, MAX_RETRIES};
