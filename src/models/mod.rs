pub mod user;
pub mod movie;
pub mod showtime;
pub mod seat;
pub mod reservation;

pub use user::{NewUser, Role, User, UserProfile};
pub use movie::{Genre, Movie, MovieInput};
pub use showtime::{Showtime, ShowtimeInput};
pub use seat::Seat;
pub use reservation::{Reservation, ReservationDetails};
