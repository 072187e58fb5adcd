//! `BookingService`: every write that moves a booking through its
//! lifecycle.
//!
//! Each state update follows the same three stages: load the booking,
//! validate the proposed transition against the status machine and the
//! caller's authority, then persist with a conditional write keyed on the
//! previously observed status. A concurrent transition surfaces as
//! [`Error::Stale`]; callers may refetch and retry. Side effects of a
//! transition (emails, invoice emission, capture, stats) run on detached
//! tasks and never fail the transition itself.

use std::sync::{Arc, Mutex};

use cb_common::{
    ids::{AddressId, BookingId, CleanerId, ClientId},
    rng::Crng,
    time::TimestampMs,
};
use cb_tokio::task::CbTask;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    app::LateBound,
    booking::reservation,
    config::Config,
    error::Error,
    invoice::InvoiceService,
    matching::MatchingEngine,
    models::{
        booking::{
            AddOns, Booking, BookingStatus, CancelActor, Frequency,
            ServiceType, SuppliesBy, TimePreference,
        },
        user::Actor,
    },
    notify::{EmailTemplate, Notifier},
    payments::PaymentService,
    pricing::{self, EffectiveRates, PricingInput},
    traits::{
        AddressStore, BookingStore, CleanerStore, ClientStore,
        SettingsStore,
    },
};

/// The reason recorded on sweep-expired bookings.
const EXPIRATION_REASON: &str =
    "Booking expired: no cleaner accepted in time";

/// Prefix applied to reasons inside the cancellation-fee window.
const LATE_CANCELLATION_TAG: &str = "[Late cancellation]";

/// Inputs of the booking creation contract.
#[derive(Clone, Debug)]
pub struct CreateBookingRequest {
    pub client_id: ClientId,
    pub address_id: AddressId,
    pub service_type: ServiceType,
    pub estimated_hours: Decimal,
    pub area_sqm: Decimal,
    /// Optional when `time_preferences` is non-empty.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub time_preferences: Vec<TimePreference>,
    pub addons: AddOns,
    pub supplies: SuppliesBy,
    pub frequency: Frequency,
}

pub struct BookingService {
    config: Arc<Config>,
    bookings: Arc<dyn BookingStore>,
    clients: Arc<dyn ClientStore>,
    cleaners: Arc<dyn CleanerStore>,
    addresses: Arc<dyn AddressStore>,
    settings: Arc<dyn SettingsStore>,
    notifier: Notifier,
    payments: Arc<PaymentService>,
    invoices: Arc<InvoiceService>,
    /// Late-bound: the matching engine holds this service in turn. Bound
    /// once by the composition root before any request is served.
    matching: LateBound<MatchingEngine>,
    /// Reservation code generation draws from a crypto RNG behind a lock;
    /// generation is two orders of magnitude cheaper than the insert that
    /// follows it.
    rng: Mutex<Box<dyn Crng + Send>>,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        bookings: Arc<dyn BookingStore>,
        clients: Arc<dyn ClientStore>,
        cleaners: Arc<dyn CleanerStore>,
        addresses: Arc<dyn AddressStore>,
        settings: Arc<dyn SettingsStore>,
        notifier: Notifier,
        payments: Arc<PaymentService>,
        invoices: Arc<InvoiceService>,
        rng: Box<dyn Crng + Send>,
    ) -> Self {
        Self {
            config,
            bookings,
            clients,
            cleaners,
            addresses,
            settings,
            notifier,
            payments,
            invoices,
            matching: LateBound::unset(),
            rng: Mutex::new(rng),
        }
    }

    /// Binds the matching engine. Called once by the composition root.
    pub fn bind_matching(&self, matching: Arc<MatchingEngine>) {
        self.matching.bind(matching);
    }

    // --- Creation --- //

    /// Creates a booking: validates schedule and inputs, prices it
    /// deterministically, generates a unique reservation code and persists
    /// it with status PENDING. Matching dispatch runs asynchronously.
    #[instrument(skip_all, fields(client = %req.client_id))]
    pub async fn create(
        &self,
        req: CreateBookingRequest,
    ) -> Result<Booking, Error> {
        let settings = self.settings.get().await?;
        if settings.as_ref().is_some_and(|s| s.maintenance_mode) {
            return Err(Error::PolicyViolation(
                "bookings are paused for maintenance".to_owned(),
            ));
        }

        if req.scheduled_at.is_none() && req.time_preferences.is_empty() {
            return Err(Error::InvalidInput(
                "either a schedule or time preferences are required"
                    .to_owned(),
            ));
        }
        let now = Utc::now();
        if let Some(scheduled_at) = req.scheduled_at {
            self.validate_schedule(scheduled_at, now)?;
        }

        let address = self
            .addresses
            .get(req.address_id)
            .await?
            .ok_or_else(|| Error::not_found("address", req.address_id))?;

        // A client row only exists once a booking has completed; a missing
        // row is a brand-new client (and first-booking by definition). The
        // outer auth layer already ties the session user to the address,
        // so ownership is re-checked only when the row is present.
        let client = self.clients.get(req.client_id).await?;
        if let Some(client) = &client {
            if client.user_id != address.user_id {
                return Err(Error::Unauthorized(
                    "address does not belong to the booking client"
                        .to_owned(),
                ));
            }
        }
        let first_booking =
            self.clients.total_bookings(req.client_id).await? == 0;

        let pricing_input = PricingInput {
            service_type: req.service_type,
            estimated_hours: req.estimated_hours,
            area_sqm: req.area_sqm,
            addons: &req.addons,
            supplies: req.supplies,
            frequency: req.frequency,
            scheduled_at: req.scheduled_at,
            first_booking,
        };
        let rates =
            EffectiveRates::new(&self.config.pricing, settings.as_ref());
        let quote = pricing::quote(&pricing_input, &rates)?;

        // Insert under a fresh reservation code, regenerating on the rare
        // unique-index conflict.
        let year = now.year();
        let mut attempts = 0u32;
        let booking = loop {
            attempts += 1;
            let code = {
                let mut rng = self.rng.lock().expect("rng lock poisoned");
                reservation::generate(rng.as_mut(), year)
            };

            let booking = Booking {
                id: BookingId::generate(),
                reservation_code: code,
                client_id: req.client_id,
                cleaner_id: None,
                address_id: req.address_id,
                service_type: req.service_type,
                frequency: req.frequency,
                estimated_hours: req.estimated_hours,
                area_sqm: req.area_sqm,
                scheduled_at: req.scheduled_at,
                time_preferences: req.time_preferences.clone(),
                addons: req.addons.clone(),
                supplies: req.supplies,
                base_price: quote.base_price,
                addons_price: quote.addons_price,
                discount_applied: quote.discount_applied,
                total_price: quote.total_price,
                platform_fee: quote.platform_fee,
                cleaner_payout: quote.cleaner_payout,
                status: BookingStatus::Pending,
                confirmed_at: None,
                started_at: None,
                completed_at: None,
                cancelled_at: None,
                cancelled_by: None,
                cancellation_reason: None,
                client_rating: None,
                cleaner_rating: None,
                created_at: TimestampMs::now(),
            };

            match self.bookings.insert(&booking).await {
                Ok(()) => break booking,
                Err(Error::Conflict(_))
                    if attempts < reservation::MAX_ATTEMPTS =>
                {
                    warn!(
                        "Reservation code collision (attempt {attempts}); \
                         regenerating"
                    );
                }
                Err(Error::Conflict(_)) => {
                    return Err(Error::Conflict(
                        "reservation code space exhausted".to_owned(),
                    ));
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            code = %booking.reservation_code,
            "Created booking {}", booking.id
        );

        // Matching is an independent unit of work per booking; failures
        // must not fail the creation.
        if let Ok(matching) = self.matching.get() {
            let booking_id = booking.id;
            CbTask::spawn(
                format!("matching dispatch {booking_id}"),
                async move {
                    if let Err(e) = matching.dispatch(booking_id).await {
                        warn!(
                            "Matching dispatch for {booking_id} failed: \
                             {e:#}"
                        );
                    }
                },
            )
            .detach();
        }

        Ok(booking)
    }

    fn validate_schedule(
        &self,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        validate_schedule(&self.config.scheduling, scheduled_at, now)
    }

    // --- Assignment --- //

    /// A matched cleaner accepts a PENDING booking.
    #[instrument(skip(self))]
    pub async fn accept(
        &self,
        booking_id: BookingId,
        cleaner_id: CleanerId,
    ) -> Result<Booking, Error> {
        let cleaner = self
            .cleaners
            .get(cleaner_id)
            .await?
            .ok_or_else(|| Error::not_found("cleaner", cleaner_id))?;
        if !cleaner.is_matchable() {
            return Err(Error::Unauthorized(
                "cleaner is not approved and available".to_owned(),
            ));
        }

        self.confirm(booking_id, cleaner_id).await
    }

    /// An admin assigns a cleaner to a PENDING booking.
    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        booking_id: BookingId,
        cleaner_id: CleanerId,
        actor: Actor,
    ) -> Result<Booking, Error> {
        if !actor.is_admin() {
            return Err(Error::Unauthorized(
                "only admins may assign cleaners".to_owned(),
            ));
        }
        self.confirm(booking_id, cleaner_id).await
    }

    /// Auto-assign path used by the matching engine. A booking claimed by
    /// a concurrent path surfaces as a conflict rather than a stale
    /// write, since there is nothing for the engine to retry.
    pub(crate) async fn auto_assign(
        &self,
        booking_id: BookingId,
        cleaner_id: CleanerId,
    ) -> Result<Booking, Error> {
        match self.confirm(booking_id, cleaner_id).await {
            Err(Error::Stale { .. }) => Err(Error::Conflict(format!(
                "booking {booking_id} already assigned"
            ))),
            other => other,
        }
    }

    /// The shared PENDING -> CONFIRMED transition.
    async fn confirm(
        &self,
        booking_id: BookingId,
        cleaner_id: CleanerId,
    ) -> Result<Booking, Error> {
        let mut booking = self.load(booking_id).await?;

        let observed = booking.status;
        if !observed.can_transition_to(BookingStatus::Confirmed) {
            return Err(observed.transition_error(BookingStatus::Confirmed));
        }

        booking.status = BookingStatus::Confirmed;
        booking.cleaner_id = Some(cleaner_id);
        booking.confirmed_at = Some(TimestampMs::now());
        self.bookings.update(&booking, observed).await?;

        info!("Confirmed booking {booking_id} with cleaner {cleaner_id}");
        self.notify_confirmed(&booking).await;

        Ok(booking)
    }

    // --- Cancellation --- //

    /// Cancels a booking. Who may cancel depends on the current status;
    /// reasons inside the cancellation-fee window are tagged late. System
    /// cancellations leave the attribution empty; admin cancellations use
    /// the reserved sentinel.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: String,
    ) -> Result<Booking, Error> {
        let mut booking = self.load(booking_id).await?;

        let observed = booking.status;
        if !observed.can_transition_to(BookingStatus::Cancelled) {
            return Err(observed.transition_error(BookingStatus::Cancelled));
        }

        let cancelled_by = self.authorize_cancel(&booking, actor)?;

        let mut reason = reason;
        if let Some(scheduled_at) = booking.scheduled_at {
            let free_hours =
                self.config.scheduling.cancellation_free_hours as i64;
            if Utc::now() + ChronoDuration::hours(free_hours) > scheduled_at
            {
                reason = format!("{LATE_CANCELLATION_TAG} {reason}");
            }
        }

        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(TimestampMs::now());
        booking.cancelled_by = cancelled_by;
        booking.cancellation_reason = Some(reason);
        self.bookings.update(&booking, observed).await?;

        info!("Cancelled booking {booking_id}");
        self.notify_cancelled(&booking).await;

        Ok(booking)
    }

    /// Maps the acting party onto the recorded attribution, enforcing the
    /// per-status authorization table.
    fn authorize_cancel(
        &self,
        booking: &Booking,
        actor: Actor,
    ) -> Result<Option<CancelActor>, Error> {
        match actor {
            Actor::Admin(_) => Ok(Some(CancelActor::Admin)),
            Actor::System => Ok(None),
            Actor::Client(client_id) => {
                if booking.client_id != client_id {
                    return Err(Error::Unauthorized(
                        "not the booking client".to_owned(),
                    ));
                }
                Ok(Some(CancelActor::Client(client_id)))
            }
            Actor::Cleaner(cleaner_id) => {
                // Cleaners may only cancel once assigned, i.e. never from
                // PENDING.
                if booking.status == BookingStatus::Pending
                    || booking.cleaner_id != Some(cleaner_id)
                {
                    return Err(Error::Unauthorized(
                        "not the assigned cleaner".to_owned(),
                    ));
                }
                Ok(Some(CancelActor::Cleaner(cleaner_id)))
            }
        }
    }

    // --- Check-in driven transitions --- //

    /// CONFIRMED -> IN_PROGRESS, on behalf of the check-in flow. The
    /// check-in service has already verified the cleaner and GPS gate.
    pub(crate) async fn start_from_checkin(
        &self,
        booking: &Booking,
    ) -> Result<Booking, Error> {
        let mut booking = booking.clone();
        let observed = booking.status;
        if !observed.can_transition_to(BookingStatus::InProgress) {
            return Err(
                observed.transition_error(BookingStatus::InProgress)
            );
        }

        booking.status = BookingStatus::InProgress;
        booking.started_at = Some(TimestampMs::now());
        self.bookings.update(&booking, observed).await?;
        Ok(booking)
    }

    /// IN_PROGRESS -> COMPLETED, on behalf of the check-out flow. Triggers
    /// the completion side effects on a detached task.
    pub(crate) async fn complete_from_checkout(
        &self,
        booking: &Booking,
    ) -> Result<Booking, Error> {
        let mut booking = booking.clone();
        let observed = booking.status;
        if !observed.can_transition_to(BookingStatus::Completed) {
            return Err(observed.transition_error(BookingStatus::Completed));
        }

        booking.status = BookingStatus::Completed;
        booking.completed_at = Some(TimestampMs::now());
        self.bookings.update(&booking, observed).await?;

        info!("Completed booking {}", booking.id);
        self.spawn_completion_side_effects(booking.clone());

        Ok(booking)
    }

    // --- Dispute-driven transitions --- //

    /// COMPLETED -> DISPUTED, on behalf of dispute creation.
    pub(crate) async fn mark_disputed(
        &self,
        booking: &Booking,
    ) -> Result<Booking, Error> {
        let mut booking = booking.clone();
        let observed = booking.status;
        if !observed.can_transition_to(BookingStatus::Disputed) {
            return Err(observed.transition_error(BookingStatus::Disputed));
        }
        booking.status = BookingStatus::Disputed;
        self.bookings.update(&booking, observed).await?;
        Ok(booking)
    }

    /// DISPUTED -> REFUNDED | COMPLETED, on behalf of dispute resolution.
    pub(crate) async fn resolve_disputed(
        &self,
        booking_id: BookingId,
        to: BookingStatus,
    ) -> Result<Booking, Error> {
        let mut booking = self.load(booking_id).await?;
        let observed = booking.status;
        if !observed.can_transition_to(to) {
            return Err(observed.transition_error(to));
        }
        booking.status = to;
        self.bookings.update(&booking, observed).await?;
        Ok(booking)
    }

    // --- Expiration sweep --- //

    /// One pass of the PENDING auto-expiration sweep: every booking older
    /// than the configured expiration window is cancelled with the fixed
    /// reason and empty attribution. A failure on one booking never aborts
    /// the sweep.
    pub async fn expire_pending(&self, now: TimestampMs) -> usize {
        let max_age = std::time::Duration::from_secs(
            self.config.scheduling.pending_expiration_hours * 3600,
        );
        let cutoff = match now
            .as_i64()
            .checked_sub(max_age.as_millis() as i64)
        {
            Some(millis) if millis >= 0 =>
                TimestampMs::try_from_i64(millis).expect("checked above"),
            _ => return 0,
        };

        let stale = match self
            .bookings
            .list_pending_created_before(cutoff)
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                warn!("Expiration sweep listing failed: {e:#}");
                return 0;
            }
        };

        let mut expired = 0usize;
        for booking in stale {
            let result = self
                .cancel(
                    booking.id,
                    Actor::System,
                    EXPIRATION_REASON.to_owned(),
                )
                .await;
            match result {
                Ok(_) => expired += 1,
                Err(e) => {
                    warn!("Failed to expire booking {}: {e:#}", booking.id)
                }
            }
        }

        if expired > 0 {
            info!("Expired {expired} stale PENDING bookings");
        }
        expired
    }

    // --- Side effects --- //

    async fn notify_confirmed(&self, booking: &Booking) {
        let props = json!({
            "reservationCode": booking.reservation_code.as_str(),
            "scheduledAt": booking.scheduled_at,
        });

        if let Ok(Some(client)) = self.clients.get(booking.client_id).await
        {
            self.notifier.send_detached(
                client.email.as_deref(),
                EmailTemplate::BookingConfirmation,
                props.clone(),
            );
        }
        if let Some(cleaner_id) = booking.cleaner_id {
            if let Ok(Some(cleaner)) = self.cleaners.get(cleaner_id).await {
                self.notifier.send_detached(
                    cleaner.email.as_deref(),
                    EmailTemplate::BookingAccepted,
                    props,
                );
            }
        }
    }

    async fn notify_cancelled(&self, booking: &Booking) {
        let attribution = match booking.cancelled_by {
            Some(CancelActor::Client(_)) => "client",
            Some(CancelActor::Cleaner(_)) => "cleaner",
            Some(CancelActor::Admin) => "admin",
            None => "system",
        };
        let props = json!({
            "reservationCode": booking.reservation_code.as_str(),
            "cancelledBy": attribution,
            "reason": booking.cancellation_reason,
        });

        if let Ok(Some(client)) = self.clients.get(booking.client_id).await
        {
            self.notifier.send_detached(
                client.email.as_deref(),
                EmailTemplate::BookingCancelled,
                props.clone(),
            );
        }
        if let Some(cleaner_id) = booking.cleaner_id {
            if let Ok(Some(cleaner)) = self.cleaners.get(cleaner_id).await {
                self.notifier.send_detached(
                    cleaner.email.as_deref(),
                    EmailTemplate::BookingCancelled,
                    props,
                );
            }
        }
    }

    /// Invoice, capture, stats and emails. All best-effort: each failure
    /// is logged and the rest still run.
    fn spawn_completion_side_effects(&self, booking: Booking) {
        let invoices = self.invoices.clone();
        let payments = self.payments.clone();
        let cleaners = self.cleaners.clone();
        let clients = self.clients.clone();
        let notifier = self.notifier.clone();

        CbTask::spawn(
            format!("booking completion effects {}", booking.id),
            async move {
                if let Err(e) = invoices.create_for_booking(&booking).await
                {
                    warn!(
                        "Invoice creation for {} failed: {e:#}",
                        booking.id
                    );
                }

                match payments
                    .capture_authorized_for_booking(booking.id)
                    .await
                {
                    Ok(Some(payment)) => info!(
                        "Captured payment {} for booking {}",
                        payment.id, booking.id
                    ),
                    Ok(None) => (),
                    Err(e) => warn!(
                        "Capture for booking {} failed: {e:#}",
                        booking.id
                    ),
                }

                if let Some(cleaner_id) = booking.cleaner_id {
                    if let Err(e) = cleaners
                        .record_completed_job(
                            cleaner_id,
                            booking.cleaner_payout,
                        )
                        .await
                    {
                        warn!("Cleaner stats update failed: {e:#}");
                    }
                }
                if let Err(e) = clients
                    .record_completed_booking(
                        booking.client_id,
                        booking.total_price,
                    )
                    .await
                {
                    warn!("Client stats update failed: {e:#}");
                }

                if let Ok(Some(client)) =
                    clients.get(booking.client_id).await
                {
                    notifier
                        .send_logged(
                            client.email.as_deref(),
                            EmailTemplate::BookingCompleted,
                            json!({
                                "reservationCode":
                                    booking.reservation_code.as_str(),
                                "total": booking.total_price,
                            }),
                        )
                        .await;
                }
            },
        )
        .detach();
    }

    // --- Helpers --- //

    pub async fn get(&self, booking_id: BookingId) -> Result<Booking, Error> {
        self.load(booking_id).await
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, Error> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))
    }
}

/// The scheduling bounds, applied only when the booking carries a concrete
/// schedule (never for time_preferences-only bookings). The service-hours
/// window is half-open: the start hour itself is accepted, the end hour is
/// not.
fn validate_schedule(
    bounds: &crate::config::SchedulingConfig,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let min = now + ChronoDuration::hours(bounds.min_advance_hours as i64);
    if scheduled_at < min {
        return Err(Error::PolicyViolation(format!(
            "bookings require at least {}h advance notice",
            bounds.min_advance_hours
        )));
    }

    let max = now + ChronoDuration::days(bounds.max_advance_days as i64);
    if scheduled_at > max {
        return Err(Error::PolicyViolation(format!(
            "bookings cannot be scheduled more than {} days ahead",
            bounds.max_advance_days
        )));
    }

    let hour = scheduled_at.hour();
    if hour < bounds.service_start_hour || hour >= bounds.service_end_hour {
        return Err(Error::PolicyViolation(format!(
            "service hours are {:02}:00 to {:02}:00",
            bounds.service_start_hour, bounds.service_end_hour
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn bounds() -> crate::config::SchedulingConfig {
        crate::config::Config::default().scheduling
    }

    #[test]
    fn schedule_bounds() {
        let bounds = bounds();
        // Tuesday, mid-month, nowhere near a holiday.
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap();

        // Exactly min_advance ahead is accepted; a second earlier is not.
        let min = now + ChronoDuration::hours(bounds.min_advance_hours as i64);
        assert!(validate_schedule(&bounds, min, now).is_ok());
        assert!(validate_schedule(
            &bounds,
            min - ChronoDuration::seconds(1),
            now
        )
        .is_err());

        // Beyond max_advance_days is rejected.
        let too_far = now
            + ChronoDuration::days(bounds.max_advance_days as i64)
            + ChronoDuration::seconds(1);
        assert!(validate_schedule(&bounds, too_far, now).is_err());
    }

    #[test]
    fn service_hours_window_is_half_open() {
        let bounds = bounds();
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap();

        // Exactly at service_start_hour:00 is accepted.
        let at_open = Utc
            .with_ymd_and_hms(2026, 8, 5, bounds.service_start_hour, 0, 0)
            .unwrap();
        assert!(validate_schedule(&bounds, at_open, now).is_ok());

        // Exactly at service_end_hour:00 is rejected.
        let at_close = Utc
            .with_ymd_and_hms(2026, 8, 5, bounds.service_end_hour, 0, 0)
            .unwrap();
        assert!(validate_schedule(&bounds, at_close, now).is_err());

        // One hour before close is still fine.
        let before_close = Utc
            .with_ymd_and_hms(
                2026,
                8,
                5,
                bounds.service_end_hour - 1,
                0,
                0,
            )
            .unwrap();
        assert!(validate_schedule(&bounds, before_close, now).is_ok());
    }
}
