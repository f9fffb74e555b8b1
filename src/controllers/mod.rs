pub mod movies;
pub mod reservations;
pub mod showtimes;
pub mod users;

use axum::{
    extract::{FromRequest, FromRequestParts},
    Router,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::AppState;

/// `Json` whose rejection is rendered as the API envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(users::routes())
        .merge(movies::routes())
        .merge(showtimes::routes())
        .merge(reservations::routes())
}
