use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use fieldops_core::types::{
    Notification, NotificationType, Session, Ticket, TicketStatus, TimeEntry, UserProfile,
};
use fieldops_core::CoreError;
use fieldops_notify::NotificationQuery;
use fieldops_tickets::{NewTicket, NewUser, TicketFilter, TicketSummary, TicketUpdate, UserUpdate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{generate_token, AuthenticatedUser};
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

pub async fn health(Extension(state): Extension<ApiState>) -> Json<Value> {
    let queued = match &state.outbox {
        Some(outbox) => outbox.len().await,
        None => 0,
    };
    Json(json!({
        "status": "ok",
        "service": "fieldops-api",
        "queuedActions": queued,
    }))
}

// ---- sessions ----

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub session: Session,
    pub user: UserProfile,
}

pub async fn sign_up(
    Extension(state): Extension<ApiState>,
    Json(new): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = state.sessions.sign_up(new).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn sign_in(
    Extension(state): Extension<ApiState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<SignInResponse>> {
    let (session, user) = state.sessions.sign_in(&req.email, &req.password).await?;
    let server = &state.ctx.config.server;
    let token = generate_token(
        &user.id,
        &session.id,
        user.role,
        &server.jwt_secret,
        server.token_ttl_days,
    )?;
    Ok(Json(SignInResponse {
        token,
        session,
        user,
    }))
}

pub async fn sign_out(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Value>> {
    let revoked = state.sessions.sign_out(&auth.session_id).await?;
    Ok(Json(json!({ "success": revoked })))
}

// ---- users ----

pub async fn list_users(Extension(state): Extension<ApiState>) -> Json<Vec<UserProfile>> {
    Json(state.users.list_users().await)
}

pub async fn create_user(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(new): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    auth.require_admin()?;
    let user = state.users.create_user(new).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user_by_id(
    Extension(state): Extension<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.get_user(&id).await?))
}

/// Admin-only: role changes and (de)activation. A deactivated user's
/// tokens stop working on their next request.
pub async fn update_user(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> ApiResult<Json<UserProfile>> {
    auth.require_admin()?;
    let user = state.users.update_user(&id, update).await?;
    tracing::info!(user_id = %user.id, admin = %auth.user.id, "Updated user");
    Ok(Json(user))
}

pub async fn delete_user_by_id(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    auth.require_admin()?;
    Ok(Json(state.users.delete_user_by_id(&id).await?))
}

pub async fn get_user_by_email(
    Extension(state): Extension<ApiState>,
    Path(email): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.users.get_user_by_email(&email).await?))
}

pub async fn delete_user_by_email(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(email): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    auth.require_admin()?;
    Ok(Json(state.users.delete_user_by_email(&email).await?))
}

// ---- tickets ----

pub async fn list_tickets(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(filter): Query<TicketFilter>,
) -> Json<Vec<Ticket>> {
    Json(state.tickets.list_for_viewer(&auth.user, &filter).await)
}

pub async fn create_ticket(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(new): Json<NewTicket>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    let ticket = state.tickets.create_ticket(&auth.user, new).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.tickets.get_ticket(&auth.user, &id).await?))
}

pub async fn update_ticket(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(update): Json<TicketUpdate>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.tickets.update_ticket(&auth.user, &id, update).await?))
}

pub async fn delete_ticket(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.tickets.delete_ticket(&auth.user, &id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub engineer_id: String,
}

pub async fn assign_ticket(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(
        state
            .tickets
            .assign_ticket(&auth.user, &id, &req.engineer_id)
            .await?,
    ))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: TicketStatus,
}

pub async fn change_status(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(
        state
            .tickets
            .change_status(&auth.user, &id, req.status)
            .await?,
    ))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

pub async fn add_comment(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(
        state
            .tickets
            .add_comment(&auth.user, &id, &req.text)
            .await?,
    ))
}

pub async fn tickets_by_user_field(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path((field, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Ticket>>> {
    Ok(Json(
        state
            .tickets
            .tickets_for_user_field(&auth.user, &field, &user_id)
            .await?,
    ))
}

#[derive(Deserialize)]
pub struct LogTimeRequest {
    pub hours: f64,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn log_ticket_time(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(req): Json<LogTimeRequest>,
) -> ApiResult<(StatusCode, Json<TimeEntry>)> {
    let entry = state
        .timer
        .log_entry(&auth.user, &id, req.hours, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn ticket_time(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.tickets.get_ticket(&auth.user, &id).await?;
    let entries = state.timer.entries_for_ticket(&id).await;
    let total = state.timer.total_hours_for_ticket(&id).await;
    Ok(Json(json!({ "entries": entries, "totalHours": total })))
}

// ---- notifications ----

/// Query-string form of `NotificationQuery`; `types` is comma separated.
#[derive(Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub types: Option<String>,
}

impl TryFrom<NotificationParams> for NotificationQuery {
    type Error = ApiError;

    fn try_from(params: NotificationParams) -> Result<Self, Self::Error> {
        let types = match params.types {
            Some(raw) => Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        NotificationType::parse(s).ok_or_else(|| {
                            ApiError(CoreError::Validation(format!(
                                "Unknown notification type: {}",
                                s
                            )))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(NotificationQuery {
            unread_only: params.unread_only,
            limit: params.limit,
            types,
        })
    }
}

pub async fn get_notifications(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(params): Query<NotificationParams>,
) -> ApiResult<Json<Vec<Notification>>> {
    let query = NotificationQuery::try_from(params)?;
    Ok(Json(
        state
            .notifications
            .get_notifications_for_user(&auth.user.id, &query)
            .await,
    ))
}

pub async fn get_unread_count(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<Value> {
    let count = state.notifications.get_unread_count(&auth.user.id).await;
    Json(json!({ "count": count }))
}

/// Someone else's notification is reported as missing.
async fn owned_notification(
    state: &ApiState,
    auth: &AuthenticatedUser,
    id: &str,
) -> ApiResult<Notification> {
    match state.notifications.get_notification(id).await {
        Some(n) if n.user_id == auth.user.id => Ok(n),
        _ => Err(CoreError::not_found("Notification", id).into()),
    }
}

pub async fn mark_notification_read(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_notification(&state, &auth, &id).await?;
    let changed = state.notifications.mark_as_read(&id).await?;
    Ok(Json(json!({ "success": true, "changed": changed })))
}

pub async fn mark_notification_unread(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_notification(&state, &auth, &id).await?;
    let changed = state.notifications.mark_as_unread(&id).await?;
    Ok(Json(json!({ "success": true, "changed": changed })))
}

pub async fn mark_all_read(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Value>> {
    let updated = state.notifications.mark_all_as_read(&auth.user.id).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete_notification(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    owned_notification(&state, &auth, &id).await?;
    let deleted = state.notifications.delete_notification(&id).await?;
    Ok(Json(json!({ "success": deleted })))
}

// ---- time tracking ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerRequest {
    pub ticket_id: String,
}

#[derive(Deserialize, Default)]
pub struct StopTimerRequest {
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn start_timer(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<StartTimerRequest>,
) -> ApiResult<Json<Value>> {
    let session = state.timer.start(&auth.user, &req.ticket_id).await?;
    Ok(Json(json!({ "active": session })))
}

pub async fn stop_timer(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<StopTimerRequest>,
) -> ApiResult<Json<TimeEntry>> {
    Ok(Json(state.timer.stop(&auth.user, req.description).await?))
}

pub async fn active_timer(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<Value> {
    let active = state.timer.active(&auth.user.id).await;
    Json(json!({ "active": active }))
}

pub async fn my_time_entries(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<Vec<TimeEntry>> {
    Json(state.timer.entries_for_user(&auth.user.id).await)
}

// ---- reports ----

pub async fn report_summary(
    Extension(state): Extension<ApiState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<TicketSummary> {
    Json(state.tickets.summary_for(&auth.user).await)
}
