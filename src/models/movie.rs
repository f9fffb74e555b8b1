use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movie_genre")]
pub enum Genre {
    Action,
    Comedy,
    Drama,
    Horror,
    Romance,
    #[serde(rename = "Sci-Fi")]
    #[sqlx(rename = "Sci-Fi")]
    SciFi,
    Documentary,
    Adventure,
    Thriller,
    Mystery,
    #[serde(rename = "Science Fiction")]
    #[sqlx(rename = "Science Fiction")]
    ScienceFiction,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub genre: Genre,
    pub poster_url: Option<String>,
    pub release_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or replacing a movie.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MovieInput {
    #[validate(length(min = 1, max = 255, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    pub genre: Genre,
    #[validate(url(message = "poster must be a valid URL"))]
    pub poster_url: Option<String>,
    /// `YYYY-MM-DD`
    pub release_date: NaiveDate,
}
