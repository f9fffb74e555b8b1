//! # Store
//!
//! Persistence contract of the service. [`crate::database::Database`] is the
//! PostgreSQL implementation used in production; [`MemoryStore`] keeps
//! everything in process and backs the test-suite.
//!
//! Every method is atomic from the caller's point of view: either all of its
//! writes are committed or none are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Movie, MovieInput, NewUser, Reservation, ReservationDetails, Role, Seat, Showtime,
    ShowtimeInput, User,
};

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    // Users

    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>>;
    async fn count_admins(&self) -> Result<i64>;

    // Movies

    async fn create_movie(&self, input: MovieInput) -> Result<Movie>;
    async fn update_movie(&self, id: Uuid, input: MovieInput) -> Result<Option<Movie>>;
    async fn get_movie(&self, id: Uuid) -> Result<Option<Movie>>;
    async fn list_movies(&self) -> Result<Vec<Movie>>;
    /// `Ok(false)` when absent, `Conflict` while any of its showtimes holds an
    /// active reservation.
    async fn delete_movie(&self, id: Uuid) -> Result<bool>;

    // Showtimes

    /// Inserts the showtime and one unreserved seat per entry of
    /// `seat_numbers` in a single transaction. `NotFound` for an unknown movie.
    async fn create_showtime(&self, input: ShowtimeInput, seat_numbers: &[String]) -> Result<Showtime>;
    async fn update_showtime(&self, id: Uuid, input: ShowtimeInput) -> Result<Option<Showtime>>;
    async fn get_showtime(&self, id: Uuid) -> Result<Option<Showtime>>;
    async fn list_showtimes(&self, movie_id: Option<Uuid>) -> Result<Vec<Showtime>>;
    /// `Ok(false)` when absent, `Conflict` while it holds an active reservation.
    async fn delete_showtime(&self, id: Uuid) -> Result<bool>;

    // Seats and reservations

    /// Seats of a showtime in inventory order.
    async fn list_seats(&self, showtime_id: Uuid) -> Result<Vec<Seat>>;

    /// Reserves every seat in `seat_numbers` for `user_id` or none of them.
    ///
    /// - `NotFound` for an unknown showtime or a seat number it doesn't have
    /// - `Validation` when the showtime started at or before `now`
    /// - `Conflict` naming the first seat that is already taken
    async fn reserve_seats(
        &self,
        user_id: Uuid,
        showtime_id: Uuid,
        seat_numbers: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>>;

    async fn find_reservation(&self, id: Uuid) -> Result<Option<Reservation>>;

    /// Cancels an active reservation and frees its seat together.
    ///
    /// - `NotFound` when absent or already cancelled
    /// - `CancellationTooSoon` when the showtime starts at or before `cutoff`
    async fn cancel_reservation(&self, id: Uuid, cutoff: DateTime<Utc>) -> Result<Reservation>;

    /// Active reservations of a user, soonest showtime first.
    async fn list_reservations_by_user(&self, user_id: Uuid) -> Result<Vec<ReservationDetails>>;
    /// Active reservations of a showtime in seat order.
    async fn list_reservations_by_showtime(&self, showtime_id: Uuid) -> Result<Vec<ReservationDetails>>;
}
