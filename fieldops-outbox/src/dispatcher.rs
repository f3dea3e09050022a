use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fieldops_core::types::{QueuedAction, QueuedActionType};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing;

/// Sends one queued mutation to wherever it is going.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &QueuedAction) -> Result<()>;
}

/// Replays queued actions against an upstream fieldops API.
///
/// Payloads are `{ "ticketId": ..., "body": ... }`; `ticketId` is required
/// for every action that targets an existing ticket.
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDispatcher {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

fn ticket_id(payload: &Value) -> Result<&str> {
    payload
        .get("ticketId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing ticketId"))
}

/// Maps an action to `(method, path, body)` on the upstream API.
pub fn route_for(action: &QueuedAction) -> Result<(Method, String, Option<Value>)> {
    let body = action.payload.get("body").cloned();
    let route = match action.action_type {
        QueuedActionType::CreateTicket => (Method::POST, "/api/tickets".to_string(), body),
        QueuedActionType::UpdateTicket => (
            Method::PUT,
            format!("/api/tickets/{}", ticket_id(&action.payload)?),
            body,
        ),
        QueuedActionType::DeleteTicket => (
            Method::DELETE,
            format!("/api/tickets/{}", ticket_id(&action.payload)?),
            None,
        ),
        QueuedActionType::AssignTicket => (
            Method::POST,
            format!("/api/tickets/{}/assign", ticket_id(&action.payload)?),
            body,
        ),
        QueuedActionType::AddComment => (
            Method::POST,
            format!("/api/tickets/{}/comments", ticket_id(&action.payload)?),
            body,
        ),
        QueuedActionType::LogTime => (
            Method::POST,
            format!("/api/tickets/{}/time", ticket_id(&action.payload)?),
            body,
        ),
    };
    Ok(route)
}

#[async_trait]
impl ActionDispatcher for HttpDispatcher {
    async fn dispatch(&self, action: &QueuedAction) -> Result<()> {
        let (method, path, body) = route_for(action)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                action_id = %action.id,
                "Upstream rejected {} {}: {} {}",
                method,
                path,
                status,
                text
            );
            return Err(anyhow!("Upstream returned {} for {} {}", status, method, path));
        }

        tracing::debug!(action_id = %action.id, "Replayed {} {}", method, path);
        Ok(())
    }
}

/// Deterministic dispatcher for tests and demos: succeeds unless told to
/// fail a given action a number of times, or to fail everything.
#[derive(Default)]
pub struct FakeDispatcher {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, u32>>,
    fail_all: AtomicBool,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(&self, action_id: &str, times: u32) {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(action_id.to_string(), times);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Action ids in dispatch order, failed attempts included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl ActionDispatcher for FakeDispatcher {
    async fn dispatch(&self, action: &QueuedAction) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(action.id.clone());

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(anyhow!("Simulated network failure"));
        }

        let mut failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(remaining) = failures.get_mut(&action.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("Simulated failure for {}", action.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn action(action_type: QueuedActionType, payload: Value) -> QueuedAction {
        QueuedAction {
            id: "a-1".to_string(),
            action_type,
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
            last_error: None,
        }
    }

    #[test]
    fn routes_follow_the_ticket_api() {
        let (method, path, body) = route_for(&action(
            QueuedActionType::AssignTicket,
            json!({"ticketId": "t-1", "body": {"engineerId": "e-1"}}),
        ))
        .unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/api/tickets/t-1/assign");
        assert_eq!(body, Some(json!({"engineerId": "e-1"})));

        let (method, path, body) = route_for(&action(
            QueuedActionType::DeleteTicket,
            json!({"ticketId": "t-2"}),
        ))
        .unwrap();
        assert_eq!(method, Method::DELETE);
        assert_eq!(path, "/api/tickets/t-2");
        assert!(body.is_none());
    }

    #[test]
    fn ticket_actions_need_an_id() {
        let err = route_for(&action(QueuedActionType::UpdateTicket, json!({"body": {}})));
        assert!(err.is_err());
        assert!(route_for(&action(QueuedActionType::CreateTicket, json!({"body": {}}))).is_ok());
    }

    #[tokio::test]
    async fn fake_dispatcher_fails_the_scripted_number_of_times() {
        let fake = FakeDispatcher::new();
        let a = action(QueuedActionType::CreateTicket, json!({}));
        fake.fail_times(&a.id, 2);

        assert!(fake.dispatch(&a).await.is_err());
        assert!(fake.dispatch(&a).await.is_err());
        assert!(fake.dispatch(&a).await.is_ok());
        assert_eq!(fake.calls().len(), 3);

        fake.set_fail_all(true);
        assert!(fake.dispatch(&a).await.is_err());
    }
}
