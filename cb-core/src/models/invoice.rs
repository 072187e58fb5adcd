//! Invoices and tax-authority submission state.

use std::fmt::{self, Display};
use std::str::FromStr;

use cb_common::{
    amount::Amount,
    ids::{BookingId, InvoiceId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Invoice lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Cancelled,
}

/// Submission status at the tax authority.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxSubmissionStatus {
    Pending,
    Processing,
    Accepted,
    Rejected,
    Failed,
}

/// One entry of the tax-authority error array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// The monotonic invoice number, shape `INV-<YYYY>-<NNNN>`, starting at
/// 1000 each year.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn from_parts(year: i32, sequence: u32) -> Self {
        Self(format!("INV-{year:04}-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InvoiceNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let ok = parts.next() == Some("INV")
            && parts
                .next()
                .is_some_and(|y| y.len() == 4 && y.parse::<u32>().is_ok())
            && parts
                .next()
                .is_some_and(|n| !n.is_empty() && n.parse::<u32>().is_ok());
        if ok {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::InvalidInput(format!(
                "malformed invoice number: {s}"
            )))
        }
    }
}

/// At most one invoice per completed booking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub booking_id: BookingId,
    pub invoice_number: InvoiceNumber,

    pub issue_date: TimestampMs,
    /// Issue date + 14 days.
    pub due_date: TimestampMs,

    pub subtotal: Amount,
    pub total: Amount,

    pub status: InvoiceStatus,

    // Tax-authority submission state.
    pub external_status: TaxSubmissionStatus,
    pub retry_count: u32,
    pub last_retry_at: Option<TimestampMs>,
    pub external_errors: Vec<TaxError>,

    pub created_at: TimestampMs,
}

/// How long after issuing an invoice falls due.
pub const INVOICE_DUE_DAYS: u64 = 14;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invoice_number_shape() {
        let number = InvoiceNumber::from_parts(2026, 1000);
        assert_eq!(number.as_str(), "INV-2026-1000");
        assert!(InvoiceNumber::from_str("INV-2026-1000").is_ok());
        assert!(InvoiceNumber::from_str("INV-2026-").is_err());
        assert!(InvoiceNumber::from_str("INV-26-1000").is_err());
        assert!(InvoiceNumber::from_str("FAC-2026-1000").is_err());
    }
}
