//! GPS check-in / check-out.
//!
//! Check-in gates on the cleaner being the assigned one, the booking being
//! CONFIRMED, no prior check-in, and the GPS position being within 200 m
//! of the service address (when the address has coordinates; geocoding is
//! attempted best-effort when it doesn't). Check-out records the worked
//! hours and completes the booking.

use std::sync::Arc;

use cb_common::{
    ids::{AddressId, BookingId, CheckinId, CleanerId},
    time::TimestampMs,
};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, instrument, warn};

use crate::{
    booking::BookingService,
    error::Error,
    geo::{haversine_m, GeoPoint},
    models::{
        address::Address,
        booking::{Booking, BookingStatus},
        checkin::{Checkin, CHECKIN_MAX_DISTANCE_M},
    },
    traits::{AddressStore, BookingStore, CheckinStore, GeocodeApi},
};

pub struct CheckinService {
    checkins: Arc<dyn CheckinStore>,
    bookings: Arc<dyn BookingStore>,
    addresses: Arc<dyn AddressStore>,
    geocode: Arc<dyn GeocodeApi>,
    booking_service: Arc<BookingService>,
}

impl CheckinService {
    pub fn new(
        checkins: Arc<dyn CheckinStore>,
        bookings: Arc<dyn BookingStore>,
        addresses: Arc<dyn AddressStore>,
        geocode: Arc<dyn GeocodeApi>,
        booking_service: Arc<BookingService>,
    ) -> Self {
        Self {
            checkins,
            bookings,
            addresses,
            geocode,
            booking_service,
        }
    }

    /// The assigned cleaner checks in at the service address. On success
    /// the booking transitions to IN_PROGRESS.
    #[instrument(skip(self))]
    pub async fn check_in(
        &self,
        cleaner_id: CleanerId,
        booking_id: BookingId,
        location: GeoPoint,
    ) -> Result<Checkin, Error> {
        let booking = self.load_booking(booking_id).await?;
        self.authorize_cleaner(&booking, cleaner_id)?;

        if booking.status != BookingStatus::Confirmed {
            return Err(
                booking.status.transition_error(BookingStatus::InProgress)
            );
        }
        if self.checkins.get_by_booking(booking_id).await?.is_some() {
            return Err(Error::Conflict(format!(
                "booking {booking_id} is already checked in"
            )));
        }

        if let Some(target) =
            self.address_coordinates(booking.address_id).await?
        {
            let distance = haversine_m(location, target);
            if distance > CHECKIN_MAX_DISTANCE_M {
                return Err(Error::PolicyViolation(format!(
                    "check-in is {distance:.0} m from the address \
                     (max {CHECKIN_MAX_DISTANCE_M:.0} m)"
                )));
            }
        }

        // The CONFIRMED -> IN_PROGRESS conditional write is the race
        // guard; winning it makes this check-in the only one.
        self.booking_service.start_from_checkin(&booking).await?;

        let checkin = Checkin {
            id: CheckinId::generate(),
            booking_id,
            cleaner_id,
            checkin_at: TimestampMs::now(),
            checkin_location: location,
            checkout_at: None,
            checkout_location: None,
            total_hours_worked: None,
        };
        self.checkins.insert(&checkin).await?;

        info!("Cleaner {cleaner_id} checked in to booking {booking_id}");
        Ok(checkin)
    }

    /// The assigned cleaner checks out, recording the worked hours. On
    /// success the booking transitions to COMPLETED, which triggers the
    /// completion side effects.
    #[instrument(skip(self))]
    pub async fn check_out(
        &self,
        cleaner_id: CleanerId,
        booking_id: BookingId,
        location: GeoPoint,
    ) -> Result<Checkin, Error> {
        let booking = self.load_booking(booking_id).await?;
        self.authorize_cleaner(&booking, cleaner_id)?;

        if booking.status != BookingStatus::InProgress {
            return Err(
                booking.status.transition_error(BookingStatus::Completed)
            );
        }
        let mut checkin = self
            .checkins
            .get_by_booking(booking_id)
            .await?
            .ok_or_else(|| {
                Error::PolicyViolation(format!(
                    "booking {booking_id} was never checked in"
                ))
            })?;
        if checkin.has_checked_out() {
            return Err(Error::Conflict(format!(
                "booking {booking_id} is already checked out"
            )));
        }

        // The IN_PROGRESS -> COMPLETED conditional write guards against a
        // concurrent check-out.
        self.booking_service.complete_from_checkout(&booking).await?;

        let checkout_at = TimestampMs::now();
        let worked =
            checkout_at.saturating_duration_since(checkin.checkin_at);
        let hours = Decimal::from(worked.as_millis() as u64)
            / Decimal::from(3_600_000u32);
        checkin.checkout_at = Some(checkout_at);
        checkin.checkout_location = Some(location);
        checkin.total_hours_worked = Some(hours.round_dp_with_strategy(
            2,
            RoundingStrategy::MidpointAwayFromZero,
        ));
        self.checkins.update(&checkin).await?;

        info!("Cleaner {cleaner_id} checked out of booking {booking_id}");
        Ok(checkin)
    }

    // --- Helpers --- //

    fn authorize_cleaner(
        &self,
        booking: &Booking,
        cleaner_id: CleanerId,
    ) -> Result<(), Error> {
        if booking.cleaner_id != Some(cleaner_id) {
            return Err(Error::Unauthorized(
                "not the assigned cleaner".to_owned(),
            ));
        }
        Ok(())
    }

    /// The address's coordinates, geocoding lazily when absent. A failed
    /// or empty geocode is tolerated: the distance gate is skipped.
    async fn address_coordinates(
        &self,
        address_id: AddressId,
    ) -> Result<Option<GeoPoint>, Error> {
        let address: Address = self
            .addresses
            .get(address_id)
            .await?
            .ok_or_else(|| Error::not_found("address", address_id))?;

        if let Some(coordinates) = address.coordinates {
            return Ok(Some(coordinates));
        }

        match self.geocode.geocode(&address).await {
            Ok(Some(coordinates)) => {
                if let Err(e) = self
                    .addresses
                    .set_coordinates(address_id, coordinates)
                    .await
                {
                    warn!("Failed to backfill geocode: {e:#}");
                }
                Ok(Some(coordinates))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Geocoding failed for {address_id}: {e:#}");
                Ok(None)
            }
        }
    }

    async fn load_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Booking, Error> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))
    }
}
