//! Payment-provider interaction rows.

use std::fmt::{self, Display};

use cb_common::{
    amount::Amount,
    ids::{BookingId, PaymentId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

/// The upstream processor for a payment row.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Netopia,
    /// Recorded by back-office staff for bank transfers and the like; no
    /// provider round-trip.
    Manual,
}

/// What the row represents.
///
/// A capture transitions the preauthorization row in place (the row's type
/// becomes `Capture`), preserving "a CAPTURE is only ever produced from an
/// AUTHORIZED preauthorization on the same booking". Refunds are new rows
/// referencing the same booking.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Preauthorization,
    Capture,
    Refund,
    Cancellation,
}

/// Payment row states. `PENDING -> AUTHORIZED -> CAPTURED` is the happy
/// path; `FAILED`, `REFUNDED` and `CANCELLED` are terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Authorized => "AUTHORIZED",
            Self::Captured => "CAPTURED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded | Self::Cancelled)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider interaction attached to a booking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,

    pub provider: PaymentProvider,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,

    pub amount: Amount,
    /// ISO 4217; always "RON" today.
    pub currency: String,

    pub provider_transaction_id: Option<String>,
    pub provider_order_id: Option<String>,
    /// The provider's serialized response blob, persisted verbatim.
    pub provider_response: Option<serde_json::Value>,

    /// Present on `Refund` rows.
    pub refund_reason: Option<String>,

    pub authorized_at: Option<TimestampMs>,
    pub captured_at: Option<TimestampMs>,
    pub refunded_at: Option<TimestampMs>,
    pub created_at: TimestampMs,
}

impl Payment {
    /// A fresh PENDING preauthorization row, before the provider call.
    pub fn new_preauthorization(
        booking_id: BookingId,
        amount: Amount,
        provider: PaymentProvider,
    ) -> Self {
        Self {
            id: PaymentId::generate(),
            booking_id,
            provider,
            payment_type: PaymentType::Preauthorization,
            status: PaymentStatus::Pending,
            amount,
            currency: "RON".to_owned(),
            provider_transaction_id: None,
            provider_order_id: None,
            provider_response: None,
            refund_reason: None,
            authorized_at: None,
            captured_at: None,
            refunded_at: None,
            created_at: TimestampMs::now(),
        }
    }

    /// A REFUND row for part of a captured payment, already settled with
    /// the provider.
    pub fn new_refund(
        booking_id: BookingId,
        amount: Amount,
        provider: PaymentProvider,
        reason: String,
    ) -> Self {
        let mut refund =
            Self::new_preauthorization(booking_id, amount, provider);
        refund.payment_type = PaymentType::Refund;
        refund.status = PaymentStatus::Refunded;
        refund.refund_reason = Some(reason);
        refund.refunded_at = Some(TimestampMs::now());
        refund
    }
}
