//! Seat reservation and cancellation on top of a [`Store`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::retry::RetryPolicy;
use crate::error::{AppError, Result};
use crate::models::{Reservation, ReservationDetails, Seat};
use crate::store::Store;

/// A reservation can be cancelled only while the showtime is further away
/// than this.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub showtime_id: Uuid,
    #[validate(length(min = 1, message = "at least one seat is required"))]
    pub seat_numbers: Vec<String>,
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl ReservationService {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn reserve_seats(&self, user_id: Uuid, req: ReserveRequest) -> Result<Vec<Reservation>> {
        self.reserve_seats_at(user_id, req, Utc::now()).await
    }

    /// All requested seats or none.
    pub async fn reserve_seats_at(
        &self,
        user_id: Uuid,
        req: ReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        req.validate()?;
        let seat_numbers: Vec<String> = req.seat_numbers.iter().map(|s| s.trim().to_string()).collect();

        let mut seen = HashSet::with_capacity(seat_numbers.len());
        if let Some(dup) = seat_numbers.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(AppError::Validation(format!("{dup} is requested more than once")));
        }

        let showtime_id = req.showtime_id;
        let store = &self.store;
        let seats = &seat_numbers;
        let reservations = self
            .retry
            .run("reserve_seats", move || store.reserve_seats(user_id, showtime_id, seats, now))
            .await?;

        info!(
            %user_id,
            %showtime_id,
            seats = reservations.len(),
            "seats reserved"
        );
        Ok(reservations)
    }

    pub async fn cancel_reservation(&self, reservation_id: Uuid, requester: Uuid) -> Result<Reservation> {
        self.cancel_reservation_at(reservation_id, requester, Utc::now()).await
    }

    /// The owner or an admin may cancel, and only while the showtime starts
    /// more than [`CANCELLATION_WINDOW_HOURS`] after `now`.
    pub async fn cancel_reservation_at(
        &self,
        reservation_id: Uuid,
        requester: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let reservation = self
            .store
            .find_reservation(reservation_id)
            .await?
            .filter(Reservation::is_active)
            .ok_or_else(|| AppError::not_found("Reservation"))?;

        if reservation.user_id != requester {
            let is_admin = self
                .store
                .find_user_by_id(requester)
                .await?
                .is_some_and(|u| u.role.is_admin());
            if !is_admin {
                return Err(AppError::Forbidden(
                    "You can only cancel your own reservations".to_string(),
                ));
            }
        }

        let cutoff = now + Duration::hours(CANCELLATION_WINDOW_HOURS);
        let store = &self.store;
        let cancelled = self
            .retry
            .run("cancel_reservation", move || store.cancel_reservation(reservation_id, cutoff))
            .await?;

        info!(%reservation_id, %requester, "reservation cancelled");
        Ok(cancelled)
    }

    /// `NotFound` for an unknown showtime rather than an empty list.
    pub async fn seats(&self, showtime_id: Uuid) -> Result<Vec<Seat>> {
        self.ensure_showtime(showtime_id).await?;
        self.store.list_seats(showtime_id).await
    }

    pub async fn for_user(&self, user_id: Uuid) -> Result<Vec<ReservationDetails>> {
        self.store.list_reservations_by_user(user_id).await
    }

    pub async fn for_showtime(&self, showtime_id: Uuid) -> Result<Vec<ReservationDetails>> {
        self.ensure_showtime(showtime_id).await?;
        self.store.list_reservations_by_showtime(showtime_id).await
    }

    async fn ensure_showtime(&self, showtime_id: Uuid) -> Result<()> {
        match self.store.get_showtime(showtime_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("Showtime")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Genre, MovieInput, NewUser, Role, ShowtimeInput};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ReservationService,
        showtime_id: Uuid,
    }

    async fn fixture(starts_in: Duration) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let movie = store
            .create_movie(MovieInput {
                title: "Alien".into(),
                description: "In space no one can hear you scream".into(),
                genre: Genre::Horror,
                poster_url: None,
                release_date: NaiveDate::from_ymd_opt(1979, 5, 25).unwrap(),
            })
            .await
            .unwrap();
        let start = Utc::now() + starts_in;
        let showtime = store
            .create_showtime(
                ShowtimeInput {
                    movie_id: movie.id,
                    start_time: start,
                    end_time: start + Duration::hours(2),
                },
                &Seat::inventory(),
            )
            .await
            .unwrap();

        let config = Config::from_vars([("JWT_SECRET", "s3cret")]).unwrap();
        let retry = RetryPolicy::from_config(&config.retry);
        Fixture {
            service: ReservationService::new(store.clone(), retry),
            store,
            showtime_id: showtime.id,
        }
    }

    async fn user(store: &MemoryStore, email: &str, role: Role) -> Uuid {
        store
            .create_user(NewUser {
                email: email.into(),
                password_hash: "x".into(),
                first_name: "Test".into(),
                last_name: "User".into(),
                role,
                phone: None,
                address: None,
            })
            .await
            .unwrap()
            .id
    }

    fn request(showtime_id: Uuid, seats: &[&str]) -> ReserveRequest {
        ReserveRequest {
            showtime_id,
            seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// A seat is reserved exactly when one active reservation points at it.
    async fn assert_seats_match_reservations(f: &Fixture) {
        let seats = f.store.list_seats(f.showtime_id).await.unwrap();
        let active = f.store.list_reservations_by_showtime(f.showtime_id).await.unwrap();
        for seat in seats {
            let holders = active.iter().filter(|r| r.seat_id == seat.id).count();
            assert_eq!(seat.is_reserved, holders == 1, "{}", seat.seat_number);
            assert!(holders <= 1);
        }
    }

    async fn is_reserved(f: &Fixture, number: &str) -> bool {
        f.store
            .list_seats(f.showtime_id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.seat_number == number)
            .unwrap()
            .is_reserved
    }

    #[tokio::test]
    async fn reserves_requested_seats() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;

        let made = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-1", "Seat-2"]))
            .await
            .unwrap();

        assert_eq!(made.len(), 2);
        assert!(is_reserved(&f, "Seat-1").await);
        assert!(is_reserved(&f, "Seat-2").await);
        assert!(!is_reserved(&f, "Seat-3").await);
        assert_eq!(f.service.for_user(alice).await.unwrap().len(), 2);
        assert_seats_match_reservations(&f).await;
    }

    #[tokio::test]
    async fn reservations_come_back_in_request_order() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;
        let wanted = ["Seat-9", "Seat-3", "Seat-77", "Seat-1", "Seat-40"];

        let made = f.service.reserve_seats(alice, request(f.showtime_id, &wanted)).await.unwrap();

        let seats = f.store.list_seats(f.showtime_id).await.unwrap();
        let numbers: Vec<_> = made
            .iter()
            .map(|r| {
                seats
                    .iter()
                    .find(|s| s.id == r.seat_id)
                    .map(|s| s.seat_number.as_str())
                    .unwrap()
            })
            .collect();
        assert_eq!(numbers, wanted);
    }

    #[tokio::test]
    async fn empty_and_duplicate_requests_are_rejected() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;

        let err = f.service.reserve_seats(alice, request(f.showtime_id, &[])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-4", "Seat-4"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!is_reserved(&f, "Seat-4").await);
    }

    #[tokio::test]
    async fn unknown_seat_and_showtime_are_not_found() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;

        let err = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-1", "Seat-101"]))
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::NotFound(msg) if msg.contains("Seat-101")));
        assert!(!is_reserved(&f, "Seat-1").await);

        let err = f
            .service
            .reserve_seats(alice, request(Uuid::new_v4(), &["Seat-1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert!(matches!(f.service.seats(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn started_showtime_cannot_be_booked() {
        let f = fixture(Duration::hours(1)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;

        let err = f
            .service
            .reserve_seats_at(alice, request(f.showtime_id, &["Seat-1"]), Utc::now() + Duration::hours(2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;
        let bob = user(&f.store, "bob@example.com", Role::User).await;

        f.service
            .reserve_seats(bob, request(f.showtime_id, &["Seat-7"]))
            .await
            .unwrap();

        let err = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-5", "Seat-6", "Seat-7"]))
            .await
            .unwrap_err();

        assert!(matches!(&err, AppError::Conflict(msg) if msg.contains("Seat-7")));
        assert!(!is_reserved(&f, "Seat-5").await);
        assert!(!is_reserved(&f, "Seat-6").await);
        assert!(f.service.for_user(alice).await.unwrap().is_empty());
        assert_seats_match_reservations(&f).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_for_one_seat_have_one_winner() {
        let f = fixture(Duration::days(3)).await;
        let service = Arc::new(f.service.clone());

        let mut handles = Vec::new();
        for i in 0..16 {
            let uid = user(&f.store, &format!("user{i}@example.com"), Role::User).await;
            let service = service.clone();
            let showtime_id = f.showtime_id;
            handles.push(tokio::spawn(async move {
                service.reserve_seats(uid, request(showtime_id, &["Seat-42"])).await
            }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for outcome in futures::future::join_all(handles).await {
            match outcome.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(f.store.list_reservations_by_showtime(f.showtime_id).await.unwrap().len(), 1);
        assert_seats_match_reservations(&f).await;
    }

    #[tokio::test]
    async fn cancel_frees_the_seat() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;
        let made = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-10"]))
            .await
            .unwrap();

        let cancelled = f.service.cancel_reservation(made[0].id, alice).await.unwrap();
        assert!(cancelled.cancelled_at.is_some());
        assert!(!is_reserved(&f, "Seat-10").await);
        assert_seats_match_reservations(&f).await;

        // the seat can be booked again, the old reservation is gone for good
        f.service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-10"]))
            .await
            .unwrap();
        let err = f.service.cancel_reservation(made[0].id, alice).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cutoff_is_exclusive_at_24_hours() {
        let f = fixture(Duration::days(5)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;
        let made = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-1", "Seat-2"]))
            .await
            .unwrap();
        let start = f.store.get_showtime(f.showtime_id).await.unwrap().unwrap().start_time;

        let exactly_24h = start - Duration::hours(24);
        let err = f
            .service
            .cancel_reservation_at(made[0].id, alice, exactly_24h)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CancellationTooSoon));
        assert!(is_reserved(&f, "Seat-1").await);

        let one_second_earlier = exactly_24h - Duration::seconds(1);
        f.service
            .cancel_reservation_at(made[1].id, alice, one_second_earlier)
            .await
            .unwrap();
        assert!(!is_reserved(&f, "Seat-2").await);
        assert_seats_match_reservations(&f).await;
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_cancel() {
        let f = fixture(Duration::days(3)).await;
        let alice = user(&f.store, "alice@example.com", Role::User).await;
        let mallory = user(&f.store, "mallory@example.com", Role::User).await;
        let admin = user(&f.store, "admin@example.com", Role::Admin).await;
        let made = f
            .service
            .reserve_seats(alice, request(f.showtime_id, &["Seat-1", "Seat-2"]))
            .await
            .unwrap();

        let err = f.service.cancel_reservation(made[0].id, mallory).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(is_reserved(&f, "Seat-1").await);

        f.service.cancel_reservation(made[0].id, admin).await.unwrap();
        assert!(!is_reserved(&f, "Seat-1").await);

        let listed = f.service.for_showtime(f.showtime_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].seat_number, "Seat-2");
        assert_eq!(listed[0].user_name, "Test User");
    }
}
