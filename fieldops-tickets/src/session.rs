use chrono::Duration;
use fieldops_core::storage::{load_json, save_json, SESSION_KEY};
use fieldops_core::types::{Session, UserProfile};
use fieldops_core::{AppContext, CoreError, CoreResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing;

use crate::users::{NewUser, UserDirectory};

#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut(Session),
}

pub type AuthListener = Arc<dyn Fn(&AuthEvent) -> anyhow::Result<()> + Send + Sync>;

/// Server-side sessions. A token is only honoured while its session is
/// still here, so signing out revokes it.
pub struct SessionManager {
    ctx: AppContext,
    users: Arc<UserDirectory>,
    sessions: RwLock<Vec<Session>>,
    listeners: std::sync::RwLock<Vec<AuthListener>>,
}

impl SessionManager {
    pub async fn load(ctx: AppContext, users: Arc<UserDirectory>) -> CoreResult<Self> {
        let sessions: Vec<Session> = match load_json(ctx.store.as_ref(), SESSION_KEY).await {
            Ok(Some(sessions)) => sessions,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("Discarding unreadable session store: {}", e);
                Vec::new()
            }
        };

        Ok(Self {
            ctx,
            users,
            sessions: RwLock::new(sessions),
            listeners: std::sync::RwLock::new(Vec::new()),
        })
    }

    /// Self-service registration. The requested role is ignored; see
    /// [`UserDirectory::register`].
    pub async fn sign_up(&self, new: NewUser) -> CoreResult<UserProfile> {
        self.users.register(new).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> CoreResult<(Session, UserProfile)> {
        let user = self.users.authenticate(email, password).await?;
        let now = self.ctx.now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            role: user.role,
            created_at: now,
            expires_at: now + Duration::hours(self.ctx.config.server.session_ttl_hours),
        };

        {
            let mut sessions = self.sessions.write().await;
            sessions.retain(|s| s.expires_at > now);
            sessions.push(session.clone());
            self.persist(&sessions).await?;
        }

        tracing::info!(user_id = %user.id, session_id = %session.id, "User signed in");
        self.emit(&AuthEvent::SignedIn(session.clone()));
        Ok((session, user))
    }

    pub async fn sign_out(&self, session_id: &str) -> CoreResult<bool> {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let Some(pos) = sessions.iter().position(|s| s.id == session_id) else {
                return Ok(false);
            };
            let removed = sessions.remove(pos);
            self.persist(&sessions).await?;
            removed
        };

        tracing::info!(user_id = %removed.user_id, "User signed out");
        self.emit(&AuthEvent::SignedOut(removed));
        Ok(true)
    }

    pub async fn validate(&self, session_id: &str) -> CoreResult<Session> {
        let now = self.ctx.now();
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.id == session_id && s.expires_at > now)
            .cloned()
            .ok_or(CoreError::Unauthorized)
    }

    pub fn on_auth_change(&self, listener: AuthListener) {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    fn emit(&self, event: &AuthEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for listener in listeners {
            if let Err(e) = listener(event) {
                tracing::error!("Auth listener failed: {}", e);
            }
        }
    }

    async fn persist(&self, sessions: &[Session]) -> CoreResult<()> {
        save_json(self.ctx.store.as_ref(), SESSION_KEY, sessions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, new_user};
    use fieldops_core::types::UserRole;
    use std::sync::Mutex;

    async fn manager() -> (SessionManager, fieldops_core::ManualClock) {
        let (ctx, clock) = context();
        let users = Arc::new(UserDirectory::load(ctx.clone()).await.unwrap());
        (SessionManager::load(ctx, users).await.unwrap(), clock)
    }

    #[tokio::test]
    async fn first_signup_is_admin_then_engineers() {
        let (sessions, _) = manager().await;
        let first = sessions
            .sign_up(new_user("boss@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();
        let second = sessions
            .sign_up(new_user("eve@example.com", UserRole::Admin))
            .await
            .unwrap();
        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::FieldEngineer);
    }

    #[tokio::test]
    async fn sign_in_validate_sign_out() {
        let (sessions, _) = manager().await;
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        sessions.on_auth_change(Arc::new(move |e: &AuthEvent| {
            let label = match e {
                AuthEvent::SignedIn(_) => "in",
                AuthEvent::SignedOut(_) => "out",
            };
            sink.lock().unwrap().push(label);
            Ok(())
        }));

        sessions
            .sign_up(new_user("eng@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();
        let (session, user) = sessions
            .sign_in("eng@example.com", "secret-pass")
            .await
            .unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(sessions.validate(&session.id).await.is_ok());

        assert!(sessions.sign_out(&session.id).await.unwrap());
        assert!(matches!(
            sessions.validate(&session.id).await,
            Err(CoreError::Unauthorized)
        ));
        assert!(!sessions.sign_out(&session.id).await.unwrap());
        assert_eq!(events.lock().unwrap().as_slice(), &["in", "out"]);
    }

    #[tokio::test]
    async fn sessions_expire() {
        let (sessions, clock) = manager().await;
        sessions
            .sign_up(new_user("eng@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();
        let (session, _) = sessions
            .sign_in("eng@example.com", "secret-pass")
            .await
            .unwrap();
        clock.advance(Duration::hours(169));
        assert!(sessions.validate(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let (sessions, _) = manager().await;
        sessions
            .sign_up(new_user("eng@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();
        assert!(matches!(
            sessions.sign_in("eng@example.com", "nope-nope").await,
            Err(CoreError::Unauthorized)
        ));
    }
}
