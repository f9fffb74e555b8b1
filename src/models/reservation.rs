use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Binds one seat of one showtime to one user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub showtime_id: Uuid,
    pub seat_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.cancelled_at.is_none()
    }
}

/// Reservation joined with the labels a client wants to display.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub showtime_id: Uuid,
    pub showtime_start: DateTime<Utc>,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub created_at: DateTime<Utc>,
}
