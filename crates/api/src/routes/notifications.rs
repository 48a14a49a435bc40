//! In-app notification endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::{NotificationId, PageRequest, UserId};
use notifications::{Notification, NotificationChannel, NotificationPriority, SendNotification};
use serde::{Deserialize, Serialize};

use super::{parse_id, require};
use crate::error::ApiError;
use crate::state::{AppState, Backend};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub user_id: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// `email`, `sms`, `push` or `in_app` (default).
    pub channel: Option<String>,
    /// `low`, `medium` (default) or `high`.
    pub priority: Option<String>,
    pub action_url: Option<String>,
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub notification_id: String,
}

#[derive(Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub channel: String,
    pub priority: String,
    pub status: String,
    pub action_url: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id.to_string(),
            user_id: n.user_id.to_string(),
            notification_type: n.notification_type,
            title: n.title,
            message: n.message,
            channel: n.channel.as_str().to_string(),
            priority: n.priority.as_str().to_string(),
            status: n.status.as_str().to_string(),
            action_url: n.action_url,
            read_at: n.read_at.map(|t| t.to_rfc3339()),
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

/// POST /notifications: send a notification to one user.
#[tracing::instrument(skip(state, req))]
pub async fn send<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    let channel = match req.channel.as_deref() {
        Some(channel) => channel
            .parse::<NotificationChannel>()
            .map_err(ApiError::BadRequest)?,
        None => NotificationChannel::InApp,
    };
    let priority = match req.priority.as_deref() {
        Some(priority) => priority
            .parse::<NotificationPriority>()
            .map_err(ApiError::BadRequest)?,
        None => NotificationPriority::default(),
    };

    let notification = state
        .notifications
        .send(SendNotification {
            user_id: parse_id("user_id", &req.user_id)?,
            notification_type: req.notification_type,
            title: req.title,
            message: req.message,
            channel,
            priority,
            action_url: req.action_url,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(notification.into())))
}

/// GET /notifications?user_id=: a user's notifications, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let user_id: UserId = parse_id("user_id", require("user_id", &query.user_id)?)?;
    let page = state
        .notifications
        .list_by_user(user_id, PageRequest::new(query.page, query.page_size))
        .await?;

    Ok(Json(NotificationListResponse {
        total: page.total,
        notifications: page
            .items
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    }))
}

/// GET /notifications/unread?user_id=: number of unread notifications.
#[tracing::instrument(skip(state))]
pub async fn unread<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let user_id: UserId = parse_id("user_id", require("user_id", &query.user_id)?)?;
    let unread = state.notifications.unread_count(user_id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

/// POST /notifications/read: mark one notification read.
#[tracing::instrument(skip(state, req))]
pub async fn mark_read<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let id: NotificationId = parse_id("notification_id", &req.notification_id)?;
    let notification = state.notifications.mark_read(id).await?;
    Ok(Json(notification.into()))
}
