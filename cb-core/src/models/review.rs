//! Bidirectional booking reviews.
//!
//! `reviews` is the authoritative rating surface; the rating fields on
//! `bookings` are vestigial and never written by this path.
//! `cleaners.average_rating` is a denormalized aggregate updated atomically
//! with the review insert.

use cb_common::{
    ids::{BookingId, ReviewId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which side of the booking wrote the review. At most one review per
/// (booking, reviewer_role).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerRole {
    Client,
    Cleaner,
}

/// A star rating in `[1, 5]`.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub fn new(stars: u8) -> Result<Self, Error> {
        if (1..=5).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(Error::InvalidInput(format!(
                "rating out of range: {stars}"
            )))
        }
    }

    pub fn stars(self) -> u8 {
        self.0
    }
}

impl<'de> serde::Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let stars = u8::deserialize(deserializer)?;
        Rating::new(stars)
            .map_err(|_| serde::de::Error::custom("rating out of range"))
    }
}

/// A review left by one party of a booking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub booking_id: BookingId,
    pub reviewer_role: ReviewerRole,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: TimestampMs,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(1).is_ok());
        assert!(Rating::new(5).is_ok());
        assert!(Rating::new(6).is_err());
        assert!(serde_json::from_str::<Rating>("3").is_ok());
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }
}
