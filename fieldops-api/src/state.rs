use fieldops_core::types::Notification;
use fieldops_core::{AppContext, CoreResult};
use fieldops_notify::NotificationService;
use fieldops_outbox::OfflineQueue;
use fieldops_tickets::{SessionManager, TicketService, TimeTracker, UserDirectory};
use std::sync::Arc;
use tokio::sync::broadcast;

const LIVE_CHANNEL_CAPACITY: usize = 256;

/// Everything a request handler can reach. Cloned into the router as an
/// extension.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: AppContext,
    pub users: Arc<UserDirectory>,
    pub sessions: Arc<SessionManager>,
    pub notifications: Arc<NotificationService>,
    pub tickets: Arc<TicketService>,
    pub timer: Arc<TimeTracker>,
    pub outbox: Option<Arc<OfflineQueue>>,
    /// Fan-out of every stored notification to websocket clients.
    pub live: broadcast::Sender<Notification>,
}

impl ApiState {
    pub async fn new(ctx: AppContext, outbox: Option<Arc<OfflineQueue>>) -> CoreResult<Self> {
        let users = Arc::new(UserDirectory::load(ctx.clone()).await?);
        let sessions = Arc::new(SessionManager::load(ctx.clone(), users.clone()).await?);
        let notifications = Arc::new(NotificationService::load(ctx.clone()).await?);
        let tickets = Arc::new(
            TicketService::load(
                ctx.clone(),
                users.clone(),
                notifications.clone(),
                outbox.clone(),
            )
            .await?,
        );
        let timer = Arc::new(TimeTracker::load(ctx.clone(), tickets.clone()).await?);

        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        let tx = live.clone();
        notifications.subscribe(Arc::new(move |n: &Notification| {
            // no receivers just means nobody is connected
            let _ = tx.send(n.clone());
            Ok(())
        }));

        Ok(Self {
            ctx,
            users,
            sessions,
            notifications,
            tickets,
            timer,
            outbox,
            live,
        })
    }
}
