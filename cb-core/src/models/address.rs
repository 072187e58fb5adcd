//! Addresses owned by users.

use cb_common::{
    ids::{AddressId, UserId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A service address. At most one default per user; the store's pre-write
/// rule clears the default flag on siblings when one is set. Coordinates
/// may be absent, which is tolerated and triggers lazy geocoding at
/// check-in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,

    pub street: String,
    pub city: String,
    pub county: String,
    pub postal_code: Option<String>,
    pub is_default: bool,

    pub coordinates: Option<GeoPoint>,

    pub created_at: TimestampMs,
}
