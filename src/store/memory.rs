//! In-process [`Store`] used by the tests and for running the API without a
//! database. Every operation runs under one lock, which gives the same
//! all-or-nothing behaviour as the transactional PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::Store;
use crate::error::{AppError, Result};
use crate::models::{
    Movie, MovieInput, NewUser, Reservation, ReservationDetails, Role, Seat, Showtime,
    ShowtimeInput, User,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    movies: HashMap<Uuid, Movie>,
    showtimes: HashMap<Uuid, Showtime>,
    seats: HashMap<Uuid, Seat>,
    reservations: HashMap<Uuid, Reservation>,
}

impl State {
    fn has_active_reservation(&self, showtime_id: Uuid) -> bool {
        self.reservations
            .values()
            .any(|r| r.showtime_id == showtime_id && r.is_active())
    }

    fn seats_of(&self, showtime_id: Uuid) -> Vec<Seat> {
        let mut seats: Vec<Seat> = self
            .seats
            .values()
            .filter(|s| s.showtime_id == showtime_id)
            .cloned()
            .collect();
        seats.sort_by_key(|s| (Seat::ordinal(&s.seat_number), s.seat_number.clone()));
        seats
    }

    /// Drops a showtime with its seats and its (cancelled) reservations.
    fn remove_showtime(&mut self, showtime_id: Uuid) {
        self.showtimes.remove(&showtime_id);
        self.seats.retain(|_, s| s.showtime_id != showtime_id);
        self.reservations.retain(|_, r| r.showtime_id != showtime_id);
    }

    fn details(&self, reservation: &Reservation) -> Option<ReservationDetails> {
        let user = self.users.get(&reservation.user_id)?;
        let showtime = self.showtimes.get(&reservation.showtime_id)?;
        let seat = self.seats.get(&reservation.seat_id)?;
        Some(ReservationDetails {
            id: reservation.id,
            user_id: user.id,
            user_name: user.full_name(),
            showtime_id: showtime.id,
            showtime_start: showtime.start_time,
            seat_id: seat.id,
            seat_number: seat.seat_number.clone(),
            created_at: reservation.created_at,
        })
    }

    fn active_details<F>(&self, filter: F) -> Vec<ReservationDetails>
    where
        F: Fn(&Reservation) -> bool,
    {
        self.reservations
            .values()
            .filter(|r| r.is_active() && filter(r))
            .filter_map(|r| self.details(r))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            phone: user.phone,
            address: user.address,
            created_at: Utc::now(),
            deleted_at: None,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .values()
            .find(|u| u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state.users.get(&id).filter(|u| u.deleted_at.is_none()).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let state = self.lock()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .collect();
        users.sort_by(|a, b| (a.created_at, &a.email).cmp(&(b.created_at, &b.email)));
        Ok(users)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        let mut state = self.lock()?;
        Ok(state
            .users
            .get_mut(&id)
            .filter(|u| u.deleted_at.is_none())
            .map(|u| {
                u.role = role;
                u.clone()
            }))
    }

    async fn count_admins(&self) -> Result<i64> {
        let state = self.lock()?;
        Ok(state
            .users
            .values()
            .filter(|u| u.role.is_admin() && u.deleted_at.is_none())
            .count() as i64)
    }

    async fn create_movie(&self, input: MovieInput) -> Result<Movie> {
        let mut state = self.lock()?;
        let movie = Movie {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            genre: input.genre,
            poster_url: input.poster_url,
            release_date: input.release_date,
            created_at: Utc::now(),
        };
        state.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn update_movie(&self, id: Uuid, input: MovieInput) -> Result<Option<Movie>> {
        let mut state = self.lock()?;
        Ok(state.movies.get_mut(&id).map(|m| {
            m.title = input.title;
            m.description = input.description;
            m.genre = input.genre;
            m.poster_url = input.poster_url;
            m.release_date = input.release_date;
            m.clone()
        }))
    }

    async fn get_movie(&self, id: Uuid) -> Result<Option<Movie>> {
        Ok(self.lock()?.movies.get(&id).cloned())
    }

    async fn list_movies(&self) -> Result<Vec<Movie>> {
        let state = self.lock()?;
        let mut movies: Vec<Movie> = state.movies.values().cloned().collect();
        movies.sort_by(|a, b| {
            b.release_date
                .cmp(&a.release_date)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(movies)
    }

    async fn delete_movie(&self, id: Uuid) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.movies.contains_key(&id) {
            return Ok(false);
        }

        let showtime_ids: Vec<Uuid> = state
            .showtimes
            .values()
            .filter(|s| s.movie_id == id)
            .map(|s| s.id)
            .collect();
        if showtime_ids.iter().any(|sid| state.has_active_reservation(*sid)) {
            return Err(AppError::Conflict(
                "Movie has showtimes with active reservations".to_string(),
            ));
        }

        for sid in showtime_ids {
            state.remove_showtime(sid);
        }
        state.movies.remove(&id);
        Ok(true)
    }

    async fn create_showtime(&self, input: ShowtimeInput, seat_numbers: &[String]) -> Result<Showtime> {
        let mut state = self.lock()?;
        if !state.movies.contains_key(&input.movie_id) {
            return Err(AppError::not_found("Movie"));
        }

        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id: input.movie_id,
            start_time: input.start_time,
            end_time: input.end_time,
            created_at: Utc::now(),
        };
        for number in seat_numbers {
            let seat = Seat {
                id: Uuid::new_v4(),
                showtime_id: showtime.id,
                seat_number: number.clone(),
                is_reserved: false,
            };
            state.seats.insert(seat.id, seat);
        }
        state.showtimes.insert(showtime.id, showtime.clone());
        Ok(showtime)
    }

    async fn update_showtime(&self, id: Uuid, input: ShowtimeInput) -> Result<Option<Showtime>> {
        let mut state = self.lock()?;
        if !state.movies.contains_key(&input.movie_id) {
            return Err(AppError::not_found("Movie"));
        }
        Ok(state.showtimes.get_mut(&id).map(|s| {
            s.movie_id = input.movie_id;
            s.start_time = input.start_time;
            s.end_time = input.end_time;
            s.clone()
        }))
    }

    async fn get_showtime(&self, id: Uuid) -> Result<Option<Showtime>> {
        Ok(self.lock()?.showtimes.get(&id).cloned())
    }

    async fn list_showtimes(&self, movie_id: Option<Uuid>) -> Result<Vec<Showtime>> {
        let state = self.lock()?;
        let mut showtimes: Vec<Showtime> = state
            .showtimes
            .values()
            .filter(|s| movie_id.map_or(true, |m| s.movie_id == m))
            .cloned()
            .collect();
        showtimes.sort_by_key(|s| s.start_time);
        Ok(showtimes)
    }

    async fn delete_showtime(&self, id: Uuid) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.showtimes.contains_key(&id) {
            return Ok(false);
        }
        if state.has_active_reservation(id) {
            return Err(AppError::Conflict(
                "Showtime has active reservations".to_string(),
            ));
        }
        state.remove_showtime(id);
        Ok(true)
    }

    async fn list_seats(&self, showtime_id: Uuid) -> Result<Vec<Seat>> {
        Ok(self.lock()?.seats_of(showtime_id))
    }

    async fn reserve_seats(
        &self,
        user_id: Uuid,
        showtime_id: Uuid,
        seat_numbers: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let mut state = self.lock()?;

        let showtime = state
            .showtimes
            .get(&showtime_id)
            .ok_or_else(|| AppError::not_found("Showtime"))?;
        if showtime.has_started(now) {
            return Err(AppError::Validation("Showtime has already started".to_string()));
        }

        let mut seats = Vec::with_capacity(seat_numbers.len());
        for number in seat_numbers {
            let seat = state
                .seats
                .values()
                .find(|s| s.showtime_id == showtime_id && &s.seat_number == number)
                .ok_or_else(|| AppError::NotFound(format!("{number} not found")))?;
            seats.push((seat.id, seat.seat_number.clone(), seat.is_reserved));
        }

        // nothing is written until every seat passed
        if let Some((_, number, _)) = seats.iter().find(|(_, _, taken)| *taken) {
            return Err(AppError::Conflict(format!("{number} is already reserved")));
        }

        let mut reservations = Vec::with_capacity(seats.len());
        for (seat_id, _, _) in seats {
            if let Some(seat) = state.seats.get_mut(&seat_id) {
                seat.is_reserved = true;
            }
            let reservation = Reservation {
                id: Uuid::new_v4(),
                user_id,
                showtime_id,
                seat_id,
                created_at: Utc::now(),
                cancelled_at: None,
            };
            state.reservations.insert(reservation.id, reservation.clone());
            reservations.push(reservation);
        }
        Ok(reservations)
    }

    async fn find_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.lock()?.reservations.get(&id).cloned())
    }

    async fn cancel_reservation(&self, id: Uuid, cutoff: DateTime<Utc>) -> Result<Reservation> {
        let mut state = self.lock()?;

        let (seat_id, showtime_id) = state
            .reservations
            .get(&id)
            .filter(|r| r.is_active())
            .map(|r| (r.seat_id, r.showtime_id))
            .ok_or_else(|| AppError::not_found("Reservation"))?;

        let start_time = state
            .showtimes
            .get(&showtime_id)
            .map(|s| s.start_time)
            .ok_or_else(|| AppError::not_found("Showtime"))?;
        if start_time <= cutoff {
            return Err(AppError::CancellationTooSoon);
        }

        match state.seats.get_mut(&seat_id) {
            Some(seat) if seat.is_reserved => seat.is_reserved = false,
            _ => {
                return Err(AppError::Internal(format!(
                    "seat {seat_id} was not reserved while reservation {id} was active"
                )))
            }
        }

        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Reservation"))?;
        reservation.cancelled_at = Some(Utc::now());
        Ok(reservation.clone())
    }

    async fn list_reservations_by_user(&self, user_id: Uuid) -> Result<Vec<ReservationDetails>> {
        let state = self.lock()?;
        let mut list = state.active_details(|r| r.user_id == user_id);
        list.sort_by_key(|d| (d.showtime_start, Seat::ordinal(&d.seat_number)));
        Ok(list)
    }

    async fn list_reservations_by_showtime(&self, showtime_id: Uuid) -> Result<Vec<ReservationDetails>> {
        let state = self.lock()?;
        let mut list = state.active_details(|r| r.showtime_id == showtime_id);
        list.sort_by_key(|d| Seat::ordinal(&d.seat_number));
        Ok(list)
    }
}
