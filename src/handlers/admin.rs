// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    forum::moderation,
    handlers::current_user,
    models::{
        moderation::ModerationLogParams,
        user::{BanUserRequest, ChangeRoleRequest, Role, Viewer},
    },
    store::DynStore,
};

/// Lists the most recent moderation log entries.
/// Moderator only.
pub async fn list_moderation_logs(
    State(store): State<DynStore>,
    Query(params): Query<ModerationLogParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200); // Default 50, max 200

    let logs = store.list_moderation_logs(limit).await.map_err(|e| {
        tracing::error!("Failed to list moderation logs: {:?}", e);
        e
    })?;

    Ok(Json(logs))
}

/// Bans a user. A reason is mandatory.
/// Moderator only; administrators can only be banned by administrators.
pub async fn ban_user(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
    Json(payload): Json<BanUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let actor = current_user(store.as_ref(), viewer).await?;
    moderation::ban_user(store.as_ref(), &actor, id, &payload.reason).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Lifts a ban.
/// Moderator only.
pub async fn unban_user(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let actor = current_user(store.as_ref(), viewer).await?;
    moderation::unban_user(store.as_ref(), &actor, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Changes a user's role.
/// Administrator only.
pub async fn change_role(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
    Json(payload): Json<ChangeRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = payload.role.parse::<Role>()?;

    let actor = current_user(store.as_ref(), viewer).await?;
    moderation::change_role(store.as_ref(), &actor, id, role).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "role": role,
    })))
}
