pub mod credentials;
pub mod reservations;
pub mod retry;
pub mod users;

pub use credentials::TokenService;
pub use reservations::ReservationService;
pub use retry::RetryPolicy;
pub use users::UserService;
