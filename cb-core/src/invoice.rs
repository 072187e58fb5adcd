//! Invoice issuing and tax-authority submission policy.

use std::sync::Arc;
use std::time::Duration;

use cb_common::{
    ids::{BookingId, InvoiceId},
    time::TimestampMs,
};
use cb_tokio::notify_once::NotifyOnce;
use chrono::Datelike;
use tracing::{info, instrument, warn};

use crate::{
    error::Error,
    models::{
        booking::Booking,
        invoice::{
            Invoice, InvoiceNumber, InvoiceStatus, TaxSubmissionStatus,
            INVOICE_DUE_DAYS,
        },
    },
    retry,
    traits::{InvoiceStore, TaxAuthorityApi},
};

pub struct InvoiceService {
    invoices: Arc<dyn InvoiceStore>,
    tax_api: Arc<dyn TaxAuthorityApi>,
    /// Maximum submission attempts per invoice, from config.
    tax_max_attempts: u32,
    /// Per-call retry attempts, from config.
    max_attempts: u32,
    shutdown: NotifyOnce,
}

impl InvoiceService {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        tax_api: Arc<dyn TaxAuthorityApi>,
        tax_max_attempts: u32,
        max_attempts: u32,
        shutdown: NotifyOnce,
    ) -> Self {
        Self {
            invoices,
            tax_api,
            tax_max_attempts,
            max_attempts,
            shutdown,
        }
    }

    /// Issues the invoice for a completed booking. Idempotent: at most one
    /// invoice exists per booking, and a concurrent issuer losing the
    /// unique-index race simply returns the winner's row.
    #[instrument(skip_all, fields(booking = %booking.id))]
    pub async fn create_for_booking(
        &self,
        booking: &Booking,
    ) -> Result<Invoice, Error> {
        if let Some(existing) =
            self.invoices.get_by_booking(booking.id).await?
        {
            return Ok(existing);
        }

        let issued_at = booking.completed_at.unwrap_or_else(TimestampMs::now);
        let year = issued_at.to_utc().year();
        let sequence = self.invoices.next_invoice_sequence(year).await?;

        let invoice = Invoice {
            id: InvoiceId::generate(),
            booking_id: booking.id,
            invoice_number: InvoiceNumber::from_parts(year, sequence),
            issue_date: issued_at,
            due_date: issued_at.saturating_add(Duration::from_secs(
                INVOICE_DUE_DAYS * 24 * 3600,
            )),
            subtotal: booking.total_price,
            total: booking.total_price,
            status: InvoiceStatus::Issued,
            external_status: TaxSubmissionStatus::Pending,
            retry_count: 0,
            last_retry_at: None,
            external_errors: Vec::new(),
            created_at: TimestampMs::now(),
        };

        match self.invoices.insert(&invoice).await {
            Ok(()) => {
                info!("Issued invoice {}", invoice.invoice_number);
                Ok(invoice)
            }
            // Lost the unique(booking_id) race; return the winner.
            Err(Error::Conflict(_)) => self
                .invoices
                .get_by_booking(booking.id)
                .await?
                .ok_or_else(|| {
                    Error::Internal(anyhow::anyhow!(
                        "invoice insert conflicted but no row exists for \
                         booking {}",
                        booking.id
                    ))
                }),
            Err(e) => Err(e),
        }
    }

    /// Submits an issued invoice to the tax authority, recording the
    /// submission bookkeeping either way. At most `tax_max_attempts`
    /// submissions are ever made per invoice.
    #[instrument(skip(self))]
    pub async fn submit_to_tax_authority(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, Error> {
        let mut invoice = self
            .invoices
            .get(invoice_id)
            .await?
            .ok_or_else(|| Error::not_found("invoice", invoice_id))?;

        match invoice.external_status {
            TaxSubmissionStatus::Accepted =>
                return Ok(invoice),
            TaxSubmissionStatus::Processing =>
                return Err(Error::Conflict(format!(
                    "invoice {invoice_id} submission is in flight"
                ))),
            TaxSubmissionStatus::Pending
            | TaxSubmissionStatus::Rejected
            | TaxSubmissionStatus::Failed => (),
        }
        if invoice.retry_count >= self.tax_max_attempts {
            return Err(Error::PolicyViolation(format!(
                "invoice {invoice_id} exhausted its {} submission attempts",
                self.tax_max_attempts
            )));
        }

        invoice.retry_count += 1;
        invoice.last_retry_at = Some(TimestampMs::now());

        let outcome = retry::with_retries(
            "tax submission",
            self.max_attempts,
            &self.shutdown,
            || self.tax_api.submit(&invoice),
        )
        .await;

        match outcome {
            Ok(outcome) => {
                invoice.external_status = outcome.status;
                invoice.external_errors = outcome.errors;
                self.invoices.update(&invoice).await?;
                info!(
                    "Invoice {} submission status: {:?}",
                    invoice.invoice_number, invoice.external_status
                );
                Ok(invoice)
            }
            Err(e) => {
                invoice.external_status = TaxSubmissionStatus::Failed;
                if let Err(update_err) =
                    self.invoices.update(&invoice).await
                {
                    warn!(
                        "Failed to record failed submission: {update_err:#}"
                    );
                }
                Err(e.into())
            }
        }
    }

    pub async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Invoice>, Error> {
        self.invoices.get_by_booking(booking_id).await
    }
}
