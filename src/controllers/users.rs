use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::ApiJson;
use crate::error::Result;
use crate::middleware::{AdminUser, AuthUser, AUTH_COOKIE};
use crate::response::ApiResponse;
use crate::services::users::{LoginRequest, RegisterRequest, Session};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/me", get(me))
        .route("/users", get(list_users))
        .route("/users/promote", put(promote))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteRequest {
    pub user_id: Uuid,
}

fn session_cookie(state: &AppState, session: &Session) -> String {
    format!(
        "{AUTH_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.token,
        state.tokens.lifetime_secs()
    )
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let session = state.users.register(req).await?;
    let cookie = session_cookie(&state, &session);
    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::created("User registered successfully", session),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let session = state.users.login(req).await?;
    let cookie = session_cookie(&state, &session);
    Ok(([(header::SET_COOKIE, cookie)], ApiResponse::ok("Login successful", session)))
}

pub async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<impl IntoResponse> {
    let profile = state.users.profile(user.user_id).await?;
    Ok(ApiResponse::ok("Successful", profile))
}

pub async fn list_users(State(state): State<Arc<AppState>>, _admin: AdminUser) -> Result<impl IntoResponse> {
    let users = state.users.list().await?;
    Ok(ApiResponse::ok("Successful", users))
}

pub async fn promote(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    ApiJson(req): ApiJson<PromoteRequest>,
) -> Result<impl IntoResponse> {
    let user = state.users.promote(req.user_id).await?;
    tracing::info!(admin_id = %admin.user_id, user_id = %user.id, "promotion granted");
    Ok(ApiResponse::ok("User promoted to admin", user))
}
