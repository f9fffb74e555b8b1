use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, ApiPath};
use crate::error::{AppError, Result};
use crate::middleware::AdminUser;
use crate::models::MovieInput;
use crate::response::ApiResponse;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route(
            "/movies/{id}",
            get(get_movie).put(update_movie).delete(delete_movie),
        )
}

pub async fn list_movies(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let movies = state.store.list_movies().await?;
    Ok(ApiResponse::ok("Successful", movies))
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let movie = state
        .store
        .get_movie(id)
        .await?
        .ok_or_else(|| AppError::not_found("Movie"))?;
    Ok(ApiResponse::ok("Successful", movie))
}

pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(input): ApiJson<MovieInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let movie = state.store.create_movie(input).await?;
    tracing::info!(movie_id = %movie.id, title = %movie.title, "movie created");
    Ok(ApiResponse::created("Movie created successfully", movie))
}

pub async fn update_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<MovieInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let movie = state
        .store
        .update_movie(id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Movie"))?;
    Ok(ApiResponse::ok("Movie updated successfully", movie))
}

pub async fn delete_movie(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    if !state.store.delete_movie(id).await? {
        return Err(AppError::not_found("Movie"));
    }
    tracing::info!(movie_id = %id, "movie deleted");
    Ok(ApiResponse::<()>::message(axum::http::StatusCode::OK, "Movie deleted successfully"))
}
