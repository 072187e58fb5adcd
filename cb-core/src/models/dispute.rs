//! Disputes over completed bookings.

use cb_common::{
    amount::Amount,
    ids::{BookingId, ClientId, DisputeId, UserId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

/// Dispute lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Closed,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }
}

/// How an admin resolved a dispute.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeResolution {
    PartialRefund,
    FullRefund,
    Reclean,
    Rejected,
}

/// At most one dispute per booking, created by the booking's client within
/// 7 days of completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub booking_id: BookingId,
    pub client_id: ClientId,

    pub reason: String,
    pub status: DisputeStatus,

    /// The assigned cleaner may append a single response, moving the
    /// dispute `OPEN -> UNDER_REVIEW`.
    pub cleaner_response: Option<String>,

    pub resolution_type: Option<DisputeResolution>,
    pub resolution_notes: Option<String>,
    pub refund_amount: Option<Amount>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<TimestampMs>,

    pub created_at: TimestampMs,
}

/// The window after completion during which a dispute may be opened.
pub const DISPUTE_WINDOW_DAYS: u64 = 7;
