//! The central booking entity and its status machine.

use std::fmt::{self, Display};
use std::str::FromStr;

use cb_common::{
    amount::Amount,
    ids::{AddressId, BookingId, CleanerId, ClientId},
    time::TimestampMs,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// --- Booking status machine --- //

/// Booking lifecycle states.
///
/// `PENDING -> CONFIRMED -> IN_PROGRESS -> COMPLETED` is the happy path;
/// `CANCELLED`, `NO_SHOW_CLIENT`, `NO_SHOW_CLEANER`, `DISPUTED` and
/// `REFUNDED` are terminal-or-branch states. The no-show states exist in
/// the data model but are only ever set by manual admin tooling outside the
/// engine; the engine itself never records a transition into them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShowClient,
    NoShowCleaner,
    Disputed,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::NoShowClient => "NO_SHOW_CLIENT",
            Self::NoShowCleaner => "NO_SHOW_CLEANER",
            Self::Disputed => "DISPUTED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// The legal transition relation. Any pair outside this set fails with
    /// [`Error::InvalidStateTransition`].
    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Completed, Disputed)
                | (Disputed, Refunded)
                | (Disputed, Completed)
        )
    }

    /// Builds the [`Error`] for an illegal `self -> to` transition.
    pub fn transition_error(self, to: BookingStatus) -> Error {
        Error::InvalidStateTransition {
            entity: "booking",
            from: self.as_str().to_owned(),
            to: to.as_str().to_owned(),
        }
    }
}

impl Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Booking enums --- //

/// The kind of cleaning job.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Standard,
    DeepCleaning,
    Office,
    PostRenovation,
    MoveInOut,
}

impl ServiceType {
    pub const ALL: [Self; 5] = [
        Self::Standard,
        Self::DeepCleaning,
        Self::Office,
        Self::PostRenovation,
        Self::MoveInOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::DeepCleaning => "DEEP_CLEANING",
            Self::Office => "OFFICE",
            Self::PostRenovation => "POST_RENOVATION",
            Self::MoveInOut => "MOVE_IN_OUT",
        }
    }
}

/// How often the client wants the service repeated. Recurrence scheduling
/// itself lives in the outer layer; the engine only consumes the frequency
/// discount.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    OneTime,
    Weekly,
    Biweekly,
    Monthly,
}

/// Who brings the cleaning supplies.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppliesBy {
    ClientProvides,
    CleanerProvides,
}

/// Add-on selections with their quantity fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AddOns {
    pub windows: bool,
    pub window_count: u32,
    pub carpet: bool,
    pub carpet_area_sqm: Decimal,
    pub fridge: bool,
    pub oven: bool,
    pub balcony: bool,
}

impl AddOns {
    pub fn validate(&self) -> Result<(), Error> {
        if self.windows && self.window_count == 0 {
            return Err(Error::InvalidInput(
                "windows addon requires a window count".to_owned(),
            ));
        }
        if self.carpet && self.carpet_area_sqm <= Decimal::ZERO {
            return Err(Error::InvalidInput(
                "carpet addon requires a positive carpet area".to_owned(),
            ));
        }
        Ok(())
    }
}

/// One entry of the `time_preferences` JSON column: a candidate date with
/// acceptable time slots, used when the client has no concrete schedule yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePreference {
    pub date: NaiveDate,
    pub time_slots: Vec<String>,
}

/// Who cancelled a booking. Cancellations from system sources (the
/// auto-expiration sweep) leave the attribution empty (`None` at the
/// [`Booking`] level); admin cancellations use the reserved `Admin`
/// sentinel, never a user reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelActor {
    Client(ClientId),
    Cleaner(CleanerId),
    Admin,
}

// --- Reservation codes --- //

/// The human-friendly booking identifier, shape `CB-<YYYY>-<6 alphanumerics
/// uppercase>`. Unique across all bookings.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationCode(String);

impl ReservationCode {
    /// Assembles a code from its parts. `suffix` must be 6 uppercase
    /// alphanumerics; random generation lives in
    /// [`crate::booking::reservation`].
    pub fn from_parts(year: i32, suffix: &str) -> Self {
        debug_assert_eq!(suffix.len(), 6);
        Self(format!("CB-{year:04}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReservationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReservationCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ok = s.len() == 14
            && s.starts_with("CB-")
            && s.as_bytes()[3..7].iter().all(u8::is_ascii_digit)
            && s.as_bytes()[7] == b'-'
            && s.as_bytes()[8..].iter().all(|b| {
                b.is_ascii_digit() || b.is_ascii_uppercase()
            });
        if ok {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::InvalidInput(format!(
                "malformed reservation code: {s}"
            )))
        }
    }
}

// --- The booking entity --- //

/// A scheduled job between a client and (eventually) a cleaner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub reservation_code: ReservationCode,

    pub client_id: ClientId,
    /// Empty until a cleaner accepts or an admin assigns.
    pub cleaner_id: Option<CleanerId>,
    pub address_id: AddressId,

    pub service_type: ServiceType,
    pub frequency: Frequency,
    /// Client's estimate; pricing charges at least the per-service minimum.
    pub estimated_hours: Decimal,
    /// Optional surface for per-sqm priced services; zero when unknown.
    pub area_sqm: Decimal,
    /// Concrete schedule. Empty iff `time_preferences` is non-empty.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub time_preferences: Vec<TimePreference>,
    pub addons: AddOns,
    pub supplies: SuppliesBy,

    // Derived monetary fields, rounded to 2 decimal places on persistence.
    // Invariants: total = base + addons - discount (+/-0.01) and
    // cleaner_payout = total - platform_fee (+/-0.01).
    pub base_price: Amount,
    pub addons_price: Amount,
    pub discount_applied: Amount,
    pub total_price: Amount,
    pub platform_fee: Amount,
    pub cleaner_payout: Amount,

    pub status: BookingStatus,
    pub confirmed_at: Option<TimestampMs>,
    pub started_at: Option<TimestampMs>,
    pub completed_at: Option<TimestampMs>,
    pub cancelled_at: Option<TimestampMs>,
    pub cancelled_by: Option<CancelActor>,
    pub cancellation_reason: Option<String>,

    /// Vestigial; `reviews` is the authoritative rating surface.
    pub client_rating: Option<u8>,
    pub cleaner_rating: Option<u8>,

    pub created_at: TimestampMs,
}

impl Booking {
    /// Checks the monetary and timestamp invariants. Used by store
    /// implementations before persisting and by tests.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        let recomposed = self
            .base_price
            .checked_add(self.addons_price)
            .and_then(|sum| sum.checked_sub(self.discount_applied));
        match recomposed {
            Some(total) => anyhow::ensure!(
                total.approx_eq(self.total_price),
                "total {} != base {} + addons {} - discount {}",
                self.total_price,
                self.base_price,
                self.addons_price,
                self.discount_applied,
            ),
            None => anyhow::bail!("monetary fields over/underflowed"),
        }

        let payout = self
            .total_price
            .checked_sub(self.platform_fee)
            .ok_or_else(|| anyhow::anyhow!("platform fee exceeds total"))?;
        anyhow::ensure!(
            payout.approx_eq(self.cleaner_payout),
            "cleaner payout {} != total {} - fee {}",
            self.cleaner_payout,
            self.total_price,
            self.platform_fee,
        );

        if let (Some(confirmed), Some(started)) =
            (self.confirmed_at, self.started_at)
        {
            anyhow::ensure!(started >= confirmed, "started before confirmed");
        }
        if let (Some(started), Some(completed)) =
            (self.started_at, self.completed_at)
        {
            anyhow::ensure!(completed >= started, "completed before started");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transition_relation_matches_lifecycle_table() {
        use BookingStatus::*;

        let legal = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, InProgress),
            (Confirmed, Cancelled),
            (InProgress, Completed),
            (InProgress, Cancelled),
            (Completed, Disputed),
            (Disputed, Refunded),
            (Disputed, Completed),
        ];

        let all = [
            Pending,
            Confirmed,
            InProgress,
            Completed,
            Cancelled,
            NoShowClient,
            NoShowCleaner,
            Disputed,
            Refunded,
        ];

        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "({from:?}, {to:?})"
                );
            }
        }
    }

    #[test]
    fn reservation_code_shape() {
        let code = ReservationCode::from_parts(2026, "A1B2C3");
        assert_eq!(code.as_str(), "CB-2026-A1B2C3");
        assert!(ReservationCode::from_str("CB-2026-A1B2C3").is_ok());

        for bad in [
            "CB-2026-A1B2C",    // short suffix
            "CB-2026-A1B2C3D",  // long suffix
            "XX-2026-A1B2C3",   // wrong prefix
            "CB-20X6-A1B2C3",   // non-numeric year
            "CB-2026-a1b2c3",   // lowercase suffix
        ] {
            assert!(ReservationCode::from_str(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn addons_validation() {
        let mut addons = AddOns {
            windows: true,
            window_count: 0,
            ..AddOns::default()
        };
        assert!(addons.validate().is_err());
        addons.window_count = 4;
        assert!(addons.validate().is_ok());
    }
}
