//! GPS check-in/check-out records.

use cb_common::{
    ids::{BookingId, CheckinId, CleanerId},
    time::TimestampMs,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// At most one check-in record per booking. Check-in transitions the
/// booking to IN_PROGRESS; check-out records the worked hours and
/// transitions it to COMPLETED.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkin {
    pub id: CheckinId,
    pub booking_id: BookingId,
    pub cleaner_id: CleanerId,

    pub checkin_at: TimestampMs,
    pub checkin_location: GeoPoint,

    pub checkout_at: Option<TimestampMs>,
    pub checkout_location: Option<GeoPoint>,
    /// `checkout - checkin` in hours, two decimal places.
    pub total_hours_worked: Option<Decimal>,
}

impl Checkin {
    pub fn has_checked_out(&self) -> bool {
        self.checkout_at.is_some()
    }
}

/// Maximum distance from the service address at which a check-in is
/// accepted, in meters. The boundary itself is accepted.
pub const CHECKIN_MAX_DISTANCE_M: f64 = 200.0;
