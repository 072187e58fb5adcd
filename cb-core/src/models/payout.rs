//! Monthly cleaner payouts.

use cb_common::{
    amount::Amount,
    ids::{BookingId, CleanerId, PayoutId, PayoutLineItemId},
    time::TimestampMs,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payout lifecycle. Transitioning to `Sent` requires the cleaner's IBAN to
/// be present and well-formed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// A single booking's contribution within a payout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayoutLineItem {
    pub id: PayoutLineItemId,
    pub payout_id: PayoutId,
    pub booking_id: BookingId,

    /// The booking's total price.
    pub booking_amount: Amount,
    /// Percent retained by the platform for this booking: 10 by default,
    /// 2 for repeat-customer bookings.
    pub platform_fee_rate: Decimal,
    pub platform_fee: Amount,
    pub cleaner_earnings: Amount,
}

/// One row per (cleaner, period_start, period_end); re-runs for the same
/// period must not duplicate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub cleaner_id: CleanerId,

    /// First instant of the covered month, UTC.
    pub period_start: TimestampMs,
    /// Last second of the covered month, UTC.
    pub period_end: TimestampMs,

    pub status: PayoutStatus,

    /// Gross booking volume in the period.
    pub total_amount: Amount,
    /// Sum of line item platform fees.
    pub platform_fees: Amount,
    /// Sum of line item cleaner earnings; what actually gets transferred.
    pub net_amount: Amount,
    pub currency: String,

    pub transfer_reference: Option<String>,
    pub paid_at: Option<TimestampMs>,

    pub line_items: Vec<PayoutLineItem>,

    pub created_at: TimestampMs,
}

impl Payout {
    /// Checks the aggregate invariants against the line items.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        let net: Amount = self
            .line_items
            .iter()
            .map(|line| line.cleaner_earnings)
            .sum();
        anyhow::ensure!(
            net.approx_eq(self.net_amount),
            "net {} != sum of line earnings {}",
            self.net_amount,
            net,
        );

        let fees: Amount =
            self.line_items.iter().map(|line| line.platform_fee).sum();
        anyhow::ensure!(
            fees.approx_eq(self.platform_fees),
            "fees {} != sum of line fees {}",
            self.platform_fees,
            fees,
        );

        for line in &self.line_items {
            let recomposed = line
                .platform_fee
                .checked_add(line.cleaner_earnings)
                .ok_or_else(|| anyhow::anyhow!("line item overflow"))?;
            anyhow::ensure!(
                recomposed.approx_eq(line.booking_amount),
                "line {}: fee {} + earnings {} != amount {}",
                line.id,
                line.platform_fee,
                line.cleaner_earnings,
                line.booking_amount,
            );

            let expected_fee =
                line.booking_amount.percent(line.platform_fee_rate).round2();
            anyhow::ensure!(
                expected_fee.approx_eq(line.platform_fee),
                "line {}: fee {} != {}% of {}",
                line.id,
                line.platform_fee,
                line.platform_fee_rate,
                line.booking_amount,
            );
        }

        Ok(())
    }
}
