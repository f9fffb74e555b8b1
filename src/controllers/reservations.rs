use axum::{
    extract::State,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiJson, ApiPath};
use crate::error::Result;
use crate::middleware::{AdminUser, AuthUser};
use crate::response::ApiResponse;
use crate::services::reservations::ReserveRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservation", post(reserve))
        .route("/reservation/me", get(my_reservations))
        .route("/reservation/{id}", delete(cancel))
        .route("/reservation/admin/{showtime_id}", get(showtime_reservations))
}

pub async fn reserve(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<ReserveRequest>,
) -> Result<impl IntoResponse> {
    let reservations = state.reservations.reserve_seats(user.user_id, req).await?;
    Ok(ApiResponse::ok("Seats reserved successfully", reservations))
}

pub async fn my_reservations(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<impl IntoResponse> {
    let reservations = state.reservations.for_user(user.user_id).await?;
    Ok(ApiResponse::ok("Successful", reservations))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let reservation = state.reservations.cancel_reservation(id, user.user_id).await?;
    Ok(ApiResponse::ok("Reservation cancelled successfully", reservation))
}

pub async fn showtime_reservations(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(showtime_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let reservations = state.reservations.for_showtime(showtime_id).await?;
    Ok(ApiResponse::ok("Successful", reservations))
}
