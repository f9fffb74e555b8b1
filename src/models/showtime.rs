use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Showtime {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or rescheduling a showtime.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_showtime_window"))]
pub struct ShowtimeInput {
    pub movie_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

fn validate_showtime_window(input: &ShowtimeInput) -> Result<(), ValidationError> {
    if input.start_time >= input.end_time {
        let mut err = ValidationError::new("showtime_window");
        err.message = Some("startTime must be before endTime".into());
        return Err(err);
    }
    Ok(())
}

impl Showtime {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }
}
