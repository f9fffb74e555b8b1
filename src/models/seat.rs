use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Every showtime gets the same fixed inventory.
pub const SEATS_PER_SHOWTIME: usize = 100;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: Uuid,
    pub showtime_id: Uuid,
    pub seat_number: String,
    pub is_reserved: bool,
}

impl Seat {
    /// Seat numbers generated for a new showtime: `Seat-1` .. `Seat-100`.
    pub fn inventory() -> Vec<String> {
        (1..=SEATS_PER_SHOWTIME).map(|n| format!("Seat-{n}")).collect()
    }

    /// Position of the seat in the inventory, used for ordering.
    pub fn ordinal(seat_number: &str) -> Option<usize> {
        seat_number.strip_prefix("Seat-")?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn inventory_is_seat_1_to_100() {
        let seats = Seat::inventory();
        assert_eq!(seats.len(), SEATS_PER_SHOWTIME);
        assert_eq!(seats.first().map(String::as_str), Some("Seat-1"));
        assert_eq!(seats.last().map(String::as_str), Some("Seat-100"));
        assert_eq!(seats.iter().collect::<HashSet<_>>().len(), SEATS_PER_SHOWTIME);
    }

    proptest! {
        #[test]
        fn ordinal_matches_inventory_position(idx in 0usize..SEATS_PER_SHOWTIME) {
            let seats = Seat::inventory();
            prop_assert_eq!(Seat::ordinal(&seats[idx]), Some(idx + 1));
        }

        #[test]
        fn foreign_labels_have_no_ordinal(label in "[A-Z]{1,3}[0-9]{1,3}") {
            prop_assert_eq!(Seat::ordinal(&label), None);
        }
    }
}
