//! Store and provider contracts.
//!
//! The relational store is the sole shared state; services hold ids and
//! load on demand through these traits. Every state-bearing update takes
//! the caller's last-observed status and must be applied as a row-level
//! conditional write (`UPDATE … WHERE id = $1 AND status = <expected>`); a
//! zero-row result surfaces as [`Error::Stale`] and the caller may refetch
//! and retry. Implementations must never hold long-running transactions
//! across provider calls.

use async_trait::async_trait;
use cb_common::{
    amount::Amount,
    ids::{
        AddressId, AvailabilitySlotId, BookingId, CheckinId, CleanerId,
        ClientId, DisputeId, InvoiceId, PaymentId, PayoutId,
    },
    time::TimestampMs,
};

use crate::{
    error::Error,
    geo::GeoPoint,
    models::{
        address::Address,
        availability::AvailabilitySlot,
        booking::{Booking, BookingStatus},
        checkin::Checkin,
        cleaner::Cleaner,
        client::Client,
        dispute::{Dispute, DisputeStatus},
        invoice::Invoice,
        payment::{Payment, PaymentStatus},
        payout::{Payout, PayoutStatus},
        review::Review,
        settings::PlatformSettings,
    },
};

// --- Stores --- //

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persists a new booking. Fails with [`Error::Conflict`] when the
    /// reservation code collides with an existing row.
    async fn insert(&self, booking: &Booking) -> Result<(), Error>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, Error>;

    /// Conditional write: persists `booking` only while the stored row
    /// still has `expected_status`.
    async fn update(
        &self,
        booking: &Booking,
        expected_status: BookingStatus,
    ) -> Result<(), Error>;

    /// PENDING bookings created before `cutoff`, for the expiration sweep.
    async fn list_pending_created_before(
        &self,
        cutoff: TimestampMs,
    ) -> Result<Vec<Booking>, Error>;

    /// COMPLETED bookings with `completed_at` in `[start, end]`.
    async fn list_completed_between(
        &self,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<Booking>, Error>;

    /// PENDING + CONFIRMED + IN_PROGRESS bookings assigned to the cleaner.
    async fn count_active_for_cleaner(
        &self,
        cleaner_id: CleanerId,
    ) -> Result<usize, Error>;

    /// COMPLETED bookings of `client_id` with `completed_at` strictly
    /// before `before`. Drives the repeat-customer payout fee tier.
    async fn count_completed_for_client_before(
        &self,
        client_id: ClientId,
        before: TimestampMs,
    ) -> Result<usize, Error>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(&self, id: ClientId) -> Result<Option<Client>, Error>;

    /// The client's completed-bookings aggregate; zero when no client row
    /// exists yet (new clients are first-booking by definition).
    async fn total_bookings(&self, id: ClientId) -> Result<u32, Error>;

    /// Applies the on-completion aggregate bump: `total_bookings += 1`,
    /// `total_spent += spent`.
    async fn record_completed_booking(
        &self,
        id: ClientId,
        spent: Amount,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait CleanerStore: Send + Sync {
    async fn get(&self, id: CleanerId) -> Result<Option<Cleaner>, Error>;

    /// All APPROVED and active and available cleaners, in insertion order
    /// (matching breaks score ties by this order).
    async fn list_matchable(&self) -> Result<Vec<Cleaner>, Error>;

    /// Applies the on-completion stats bump: `total_jobs += 1`,
    /// `total_earnings += earnings`.
    async fn record_completed_job(
        &self,
        id: CleanerId,
        earnings: Amount,
    ) -> Result<(), Error>;

}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn get(&self, id: AddressId) -> Result<Option<Address>, Error>;

    /// Persists an address. When `address.is_default`, clears the default
    /// flag on the owner's other addresses in the same write.
    async fn upsert(&self, address: &Address) -> Result<(), Error>;

    /// Backfills lazily-geocoded coordinates.
    async fn set_coordinates(
        &self,
        id: AddressId,
        coordinates: GeoPoint,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<(), Error>;

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, Error>;

    /// Conditional write keyed on the payment's `expected_status`.
    async fn update(
        &self,
        payment: &Payment,
        expected_status: PaymentStatus,
    ) -> Result<(), Error>;

    async fn list_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, Error>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Allocates the next number in the year's monotonic sequence,
    /// starting at 1000.
    async fn next_invoice_sequence(&self, year: i32) -> Result<u32, Error>;

    /// Persists a new invoice. Fails with [`Error::Conflict`] when the
    /// booking already has one (unique(booking_id)).
    async fn insert(&self, invoice: &Invoice) -> Result<(), Error>;

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, Error>;

    async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Invoice>, Error>;

    /// Unconditional update of the tax-submission bookkeeping fields.
    async fn update(&self, invoice: &Invoice) -> Result<(), Error>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Persists a payout with its line items. Fails with
    /// [`Error::Conflict`] when a payout already exists for the same
    /// (cleaner, period_start, period_end).
    async fn insert(&self, payout: &Payout) -> Result<(), Error>;

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>, Error>;

    /// Conditional write keyed on the payout's `expected_status`.
    async fn update(
        &self,
        payout: &Payout,
        expected_status: PayoutStatus,
    ) -> Result<(), Error>;

    /// Whether a payout exists for this (cleaner, period) key.
    async fn exists_for_period(
        &self,
        cleaner_id: CleanerId,
        period_start: TimestampMs,
        period_end: TimestampMs,
    ) -> Result<bool, Error>;
}

#[async_trait]
pub trait DisputeStore: Send + Sync {
    /// Persists a new dispute. Fails with [`Error::Conflict`] when the
    /// booking already has one (unique(booking_id)).
    async fn insert(&self, dispute: &Dispute) -> Result<(), Error>;

    async fn get(&self, id: DisputeId) -> Result<Option<Dispute>, Error>;

    async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Dispute>, Error>;

    /// Conditional write keyed on the dispute's `expected_status`.
    async fn update(
        &self,
        dispute: &Dispute,
        expected_status: DisputeStatus,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Persists a new review. Fails with [`Error::Conflict`] when the
    /// (booking, reviewer_role) pair already has one.
    async fn insert(&self, review: &Review) -> Result<(), Error>;

    /// Persists a new CLIENT review and folds its rating into the
    /// cleaner's `average_rating` / `total_reviews` aggregates in the
    /// same transaction.
    async fn insert_client_review(
        &self,
        review: &Review,
        cleaner_id: CleanerId,
    ) -> Result<(), Error>;

    async fn list_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Review>, Error>;
}

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn insert(&self, slot: &AvailabilitySlot) -> Result<(), Error>;

    async fn list_for_cleaner(
        &self,
        cleaner_id: CleanerId,
    ) -> Result<Vec<AvailabilitySlot>, Error>;

    async fn delete(
        &self,
        cleaner_id: CleanerId,
        slot_id: AvailabilitySlotId,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait CheckinStore: Send + Sync {
    /// Persists a new check-in. Fails with [`Error::Conflict`] when the
    /// booking already has one.
    async fn insert(&self, checkin: &Checkin) -> Result<(), Error>;

    async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Checkin>, Error>;

    /// Records the check-out half of an existing row.
    async fn update(&self, checkin: &Checkin) -> Result<(), Error>;

    async fn get(&self, id: CheckinId) -> Result<Option<Checkin>, Error>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The singleton settings row, if one has been written.
    async fn get(&self) -> Result<Option<PlatformSettings>, Error>;

    async fn put(&self, settings: &PlatformSettings) -> Result<(), Error>;
}

// --- Providers --- //

/// How a provider call failed; decides retry behavior.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProviderErrorKind {
    /// 4xx-class: the request itself is wrong. Never retried.
    Validation,
    /// 5xx-class / transport: the provider is unavailable. Retried with
    /// exponential backoff up to the configured attempts.
    Unavailable,
}

/// A failed outbound provider call.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?} provider failure: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ProviderErrorKind::Unavailable
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::Validation =>
                Error::InvalidInput(err.message),
            ProviderErrorKind::Unavailable =>
                Error::External(anyhow::Error::new(err)),
        }
    }
}

/// What every successful payment-provider call returns.
#[derive(Clone, Debug)]
pub struct ProviderReceipt {
    pub transaction_id: String,
    pub order_id: String,
    /// The serialized response blob, persisted verbatim on the payment
    /// row.
    pub raw_response: serde_json::Value,
}

/// The payment-provider RPC surface (Netopia in production). Wire formats
/// and OAuth live in the outer layer's client implementation.
#[async_trait]
pub trait PaymentProviderApi: Send + Sync {
    async fn preauthorize(
        &self,
        booking_id: BookingId,
        amount: Amount,
        currency: &str,
    ) -> Result<ProviderReceipt, ProviderError>;

    async fn capture(
        &self,
        transaction_id: &str,
        amount: Amount,
    ) -> Result<ProviderReceipt, ProviderError>;

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Amount,
    ) -> Result<ProviderReceipt, ProviderError>;

    async fn cancel_preauthorization(
        &self,
        transaction_id: &str,
    ) -> Result<ProviderReceipt, ProviderError>;
}

/// An outbound email, either template-based or raw.
#[derive(Clone, Debug)]
pub enum EmailMessage {
    Template {
        to: String,
        template: crate::notify::EmailTemplate,
        props: serde_json::Value,
    },
    Raw {
        to: String,
        subject: String,
        html: String,
        text: String,
    },
}

/// The outbound email transport.
#[async_trait]
pub trait EmailApi: Send + Sync {
    async fn send(&self, message: &EmailMessage)
        -> Result<(), ProviderError>;
}

/// The tax authority's answer to an invoice submission.
#[derive(Clone, Debug)]
pub struct TaxSubmissionOutcome {
    pub status: crate::models::invoice::TaxSubmissionStatus,
    pub upload_index: Option<String>,
    pub errors: Vec<crate::models::invoice::TaxError>,
}

/// The tax-authority submission RPC surface. XML rendering is the outer
/// layer's concern; the engine submits the structured invoice.
#[async_trait]
pub trait TaxAuthorityApi: Send + Sync {
    async fn submit(
        &self,
        invoice: &Invoice,
    ) -> Result<TaxSubmissionOutcome, ProviderError>;
}

/// Best-effort address geocoding.
#[async_trait]
pub trait GeocodeApi: Send + Sync {
    async fn geocode(
        &self,
        address: &Address,
    ) -> Result<Option<GeoPoint>, ProviderError>;
}
