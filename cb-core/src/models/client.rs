//! Client profiles and aggregates.

use cb_common::{
    amount::Amount,
    ids::{ClientId, UserId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

/// A client profile.
///
/// `total_bookings` is incremented only when a booking completes. The
/// first-booking discount reads this aggregate, so a second booking created
/// while the first is still pending is deliberately still treated as
/// "first" (long-standing production behavior; do not "fix").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub user_id: UserId,
    /// Contact snapshot materialized from the owning user row.
    pub email: Option<String>,
    pub phone: Option<String>,

    pub total_bookings: u32,
    pub total_spent: Amount,

    pub created_at: TimestampMs,
}
