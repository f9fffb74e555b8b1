use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Movie, MovieInput, NewUser, Reservation, ReservationDetails, Role, Seat, Showtime,
    ShowtimeInput, User,
};
use crate::store::Store;

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, role, phone, address, created_at, deleted_at";
const MOVIE_COLUMNS: &str = "id, title, description, genre, poster_url, release_date, created_at";
const SHOWTIME_COLUMNS: &str = "id, movie_id, start_time, end_time, created_at";
const RESERVATION_COLUMNS: &str = "id, user_id, showtime_id, seat_id, created_at, cancelled_at";

const RESERVATION_DETAILS: &str = r#"
    SELECT r.id,
           r.user_id,
           u.first_name || ' ' || u.last_name AS user_name,
           r.showtime_id,
           st.start_time AS showtime_start,
           r.seat_id,
           s.seat_number,
           r.created_at
    FROM reservations r
    JOIN users u ON u.id = r.user_id
    JOIN showtimes st ON st.id = r.showtime_id
    JOIN seats s ON s.id = r.seat_id
"#;

#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    /// Every pooled connection carries `statement_timeout`, so no query can
    /// outlive the request that issued it by much.
    pub async fn new(
        database_url: &str,
        pool_size: u32,
        statement_timeout_ms: u64,
    ) -> std::result::Result<Self, sqlx::Error> {
        let options = PgConnectOptions::from_str(database_url)?
            .options([("statement_timeout", statement_timeout_ms.to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        Ok(Database { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Database { pool }
    }

    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    /* ---------- USERS ---------- */

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let query = format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, role, phone, address)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role)
            .bind(&user.phone)
            .bind(&user.address)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                err if err.is_unique_violation() => {
                    AppError::Conflict("Email already exists".to_string())
                }
                err => err,
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at, email"
        );
        Ok(sqlx::query_as::<_, User>(&query).fetch_all(&self.pool).await?)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET role = $2 WHERE id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn count_admins(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND deleted_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?)
    }

    /* ---------- MOVIES ---------- */

    async fn create_movie(&self, input: MovieInput) -> Result<Movie> {
        let query = format!(
            "INSERT INTO movies (id, title, description, genre, poster_url, release_date)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MOVIE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Movie>(&query)
            .bind(Uuid::new_v4())
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.genre)
            .bind(&input.poster_url)
            .bind(input.release_date)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_movie(&self, id: Uuid, input: MovieInput) -> Result<Option<Movie>> {
        let query = format!(
            "UPDATE movies
             SET title = $2, description = $3, genre = $4, poster_url = $5, release_date = $6
             WHERE id = $1
             RETURNING {MOVIE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Movie>(&query)
            .bind(id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.genre)
            .bind(&input.poster_url)
            .bind(input.release_date)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_movie(&self, id: Uuid) -> Result<Option<Movie>> {
        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1");
        Ok(sqlx::query_as::<_, Movie>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_movies(&self) -> Result<Vec<Movie>> {
        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies ORDER BY release_date DESC, title");
        Ok(sqlx::query_as::<_, Movie>(&query).fetch_all(&self.pool).await?)
    }

    async fn delete_movie(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM movies WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Ok(false);
        }

        // lock the showtimes so no reservation can land on them meanwhile
        sqlx::query("SELECT id FROM showtimes WHERE movie_id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let busy = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
              SELECT 1
              FROM reservations r
              JOIN showtimes s ON s.id = r.showtime_id
              WHERE s.movie_id = $1 AND r.cancelled_at IS NULL
            )
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if busy {
            let _ = tx.rollback().await;
            return Err(AppError::Conflict(
                "Movie has showtimes with active reservations".to_string(),
            ));
        }

        sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /* ---------- SHOWTIMES ---------- */

    async fn create_showtime(&self, input: ShowtimeInput, seat_numbers: &[String]) -> Result<Showtime> {
        let mut tx = self.pool.begin().await?;

        let movie = sqlx::query_scalar::<_, Uuid>("SELECT id FROM movies WHERE id = $1 FOR KEY SHARE")
            .bind(input.movie_id)
            .fetch_optional(&mut *tx)
            .await?;
        if movie.is_none() {
            return Err(AppError::not_found("Movie"));
        }

        let query = format!(
            "INSERT INTO showtimes (id, movie_id, start_time, end_time)
             VALUES ($1, $2, $3, $4)
             RETURNING {SHOWTIME_COLUMNS}"
        );
        let showtime = sqlx::query_as::<_, Showtime>(&query)
            .bind(Uuid::new_v4())
            .bind(input.movie_id)
            .bind(input.start_time)
            .bind(input.end_time)
            .fetch_one(&mut *tx)
            .await?;

        let seat_ids: Vec<Uuid> = seat_numbers.iter().map(|_| Uuid::new_v4()).collect();
        let inserted = sqlx::query(
            r#"
            INSERT INTO seats (id, showtime_id, seat_number)
            SELECT seat_id, $1, seat_number
            FROM UNNEST($2::uuid[], $3::text[]) AS t(seat_id, seat_number)
            "#,
        )
        .bind(showtime.id)
        .bind(&seat_ids)
        .bind(seat_numbers)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted != seat_numbers.len() as u64 {
            let _ = tx.rollback().await;
            return Err(AppError::Internal(format!(
                "expected {} seats for showtime {}, inserted {}",
                seat_numbers.len(),
                showtime.id,
                inserted
            )));
        }

        tx.commit().await?;
        info!("Showtime {} created with {} seats", showtime.id, inserted);
        Ok(showtime)
    }

    async fn update_showtime(&self, id: Uuid, input: ShowtimeInput) -> Result<Option<Showtime>> {
        let mut tx = self.pool.begin().await?;

        let movie = sqlx::query_scalar::<_, Uuid>("SELECT id FROM movies WHERE id = $1 FOR KEY SHARE")
            .bind(input.movie_id)
            .fetch_optional(&mut *tx)
            .await?;
        if movie.is_none() {
            return Err(AppError::not_found("Movie"));
        }

        let query = format!(
            "UPDATE showtimes SET movie_id = $2, start_time = $3, end_time = $4
             WHERE id = $1
             RETURNING {SHOWTIME_COLUMNS}"
        );
        let showtime = sqlx::query_as::<_, Showtime>(&query)
            .bind(id)
            .bind(input.movie_id)
            .bind(input.start_time)
            .bind(input.end_time)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(showtime)
    }

    async fn get_showtime(&self, id: Uuid) -> Result<Option<Showtime>> {
        let query = format!("SELECT {SHOWTIME_COLUMNS} FROM showtimes WHERE id = $1");
        Ok(sqlx::query_as::<_, Showtime>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_showtimes(&self, movie_id: Option<Uuid>) -> Result<Vec<Showtime>> {
        let query = format!(
            "SELECT {SHOWTIME_COLUMNS} FROM showtimes
             WHERE ($1::uuid IS NULL OR movie_id = $1)
             ORDER BY start_time"
        );
        Ok(sqlx::query_as::<_, Showtime>(&query)
            .bind(movie_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_showtime(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM showtimes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Ok(false);
        }

        let busy = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reservations WHERE showtime_id = $1 AND cancelled_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if busy {
            let _ = tx.rollback().await;
            return Err(AppError::Conflict(
                "Showtime has active reservations".to_string(),
            ));
        }

        sqlx::query("DELETE FROM showtimes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /* ---------- SEATS & RESERVATIONS ---------- */

    async fn list_seats(&self, showtime_id: Uuid) -> Result<Vec<Seat>> {
        Ok(sqlx::query_as::<_, Seat>(
            r#"
            SELECT id, showtime_id, seat_number, is_reserved
            FROM seats
            WHERE showtime_id = $1
            ORDER BY length(seat_number), seat_number
            "#,
        )
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn reserve_seats(
        &self,
        user_id: Uuid,
        showtime_id: Uuid,
        seat_numbers: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE keeps the showtime from being deleted under us
        let start_time = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT start_time FROM showtimes WHERE id = $1 FOR SHARE",
        )
        .bind(showtime_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Showtime"))?;

        if start_time <= now {
            return Err(AppError::Validation("Showtime has already started".to_string()));
        }

        // ordered by id so concurrent batches always lock seats in the same order
        let seats = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT id, seat_number
            FROM seats
            WHERE showtime_id = $1 AND seat_number = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(showtime_id)
        .bind(seat_numbers)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(missing) = seat_numbers
            .iter()
            .find(|wanted| !seats.iter().any(|(_, number)| number == *wanted))
        {
            return Err(AppError::NotFound(format!("{missing} not found")));
        }

        let insert = format!(
            "INSERT INTO reservations (id, user_id, showtime_id, seat_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {RESERVATION_COLUMNS}"
        );

        let mut reservations = Vec::with_capacity(seats.len());
        for (seat_id, seat_number) in &seats {
            let claimed = sqlx::query(
                "UPDATE seats SET is_reserved = TRUE WHERE id = $1 AND is_reserved = FALSE",
            )
            .bind(seat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if claimed == 0 {
                debug!("seat {} of showtime {} already taken", seat_number, showtime_id);
                let _ = tx.rollback().await;
                return Err(AppError::Conflict(format!("{seat_number} is already reserved")));
            }

            let reservation = sqlx::query_as::<_, Reservation>(&insert)
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(showtime_id)
                .bind(seat_id)
                .fetch_one(&mut *tx)
                .await?;
            reservations.push(reservation);
        }

        tx.commit().await?;

        // locked in id order, handed back in the order they were asked for
        let requested_at = |seat_id: &Uuid| {
            seats
                .iter()
                .find(|(id, _)| id == seat_id)
                .and_then(|(_, number)| seat_numbers.iter().position(|n| n == number))
        };
        reservations.sort_by_key(|r| requested_at(&r.seat_id));
        Ok(reservations)
    }

    async fn find_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        let query = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        Ok(sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn cancel_reservation(&self, id: Uuid, cutoff: DateTime<Utc>) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            SELECT r.seat_id, s.start_time
            FROM reservations r
            JOIN showtimes s ON s.id = r.showtime_id
            WHERE r.id = $1 AND r.cancelled_at IS NULL
            FOR UPDATE OF r
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let (seat_id, start_time) = row.ok_or_else(|| AppError::not_found("Reservation"))?;

        if start_time <= cutoff {
            let _ = tx.rollback().await;
            return Err(AppError::CancellationTooSoon);
        }

        let query = format!(
            "UPDATE reservations SET cancelled_at = NOW()
             WHERE id = $1 AND cancelled_at IS NULL
             RETURNING {RESERVATION_COLUMNS}"
        );
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let freed = sqlx::query("UPDATE seats SET is_reserved = FALSE WHERE id = $1 AND is_reserved = TRUE")
            .bind(seat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if freed != 1 {
            let _ = tx.rollback().await;
            return Err(AppError::Internal(format!(
                "seat {seat_id} was not reserved while reservation {id} was active"
            )));
        }

        tx.commit().await?;
        Ok(reservation)
    }

    async fn list_reservations_by_user(&self, user_id: Uuid) -> Result<Vec<ReservationDetails>> {
        let query = format!(
            "{RESERVATION_DETAILS}
             WHERE r.user_id = $1 AND r.cancelled_at IS NULL
             ORDER BY st.start_time, length(s.seat_number), s.seat_number"
        );
        Ok(sqlx::query_as::<_, ReservationDetails>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_reservations_by_showtime(&self, showtime_id: Uuid) -> Result<Vec<ReservationDetails>> {
        let query = format!(
            "{RESERVATION_DETAILS}
             WHERE r.showtime_id = $1 AND r.cancelled_at IS NULL
             ORDER BY length(s.seat_number), s.seat_number"
        );
        Ok(sqlx::query_as::<_, ReservationDetails>(&query)
            .bind(showtime_id)
            .fetch_all(&self.pool)
            .await?)
    }
}
