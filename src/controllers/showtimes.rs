use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::{AppError, Result};
use crate::middleware::AdminUser;
use crate::models::{Seat, ShowtimeInput};
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes", get(list_showtimes).post(create_showtime))
        .route(
            "/showtimes/{id}",
            get(get_showtime).put(update_showtime).delete(delete_showtime),
        )
        .route("/seats/{showtime_id}", get(list_seats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowtimeFilter {
    pub movie_id: Option<Uuid>,
}

pub async fn list_showtimes(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<ShowtimeFilter>,
) -> Result<impl IntoResponse> {
    let showtimes = state.store.list_showtimes(filter.movie_id).await?;
    Ok(ApiResponse::ok("Successful", showtimes))
}

pub async fn get_showtime(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let showtime = state
        .store
        .get_showtime(id)
        .await?
        .ok_or_else(|| AppError::not_found("Showtime"))?;
    Ok(ApiResponse::ok("Successful", showtime))
}

/// Creates the showtime together with its full seat inventory.
pub async fn create_showtime(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(input): ApiJson<ShowtimeInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let showtime = state.store.create_showtime(input, &Seat::inventory()).await?;
    Ok(ApiResponse::created("Showtime created successfully", showtime))
}

pub async fn update_showtime(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ShowtimeInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let showtime = state
        .store
        .update_showtime(id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Showtime"))?;
    Ok(ApiResponse::ok("Showtime updated successfully", showtime))
}

pub async fn delete_showtime(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    if !state.store.delete_showtime(id).await? {
        return Err(AppError::not_found("Showtime"));
    }
    tracing::info!(showtime_id = %id, "showtime deleted");
    Ok(ApiResponse::<()>::message(StatusCode::OK, "Showtime deleted successfully"))
}

pub async fn list_seats(
    State(state): State<Arc<AppState>>,
    ApiPath(showtime_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let seats = state.reservations.seats(showtime_id).await?;
    Ok(ApiResponse::ok("Successful", seats))
}
