//! Monthly payout reconciliation.
//!
//! An admin-initiated or scheduled run groups the month's COMPLETED
//! bookings per cleaner and produces one payout with per-booking line
//! items. The per-line fee rate is 10% by default and 2% for
//! repeat-customer bookings (the client had completed at least one
//! earlier booking). Re-runs for the same (cleaner, period) are no-ops
//! thanks to the store's unique period key.

use std::collections::BTreeMap;
use std::sync::Arc;

use cb_common::{
    amount::Amount,
    iban,
    ids::{CleanerId, PayoutId},
    seal::SealKey,
    time::TimestampMs,
};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    error::Error,
    models::{
        booking::Booking,
        payout::{Payout, PayoutLineItem, PayoutStatus},
    },
    notify::{EmailTemplate, Notifier},
    traits::{BookingStore, CleanerStore, PayoutStore},
};

pub struct PayoutReconciler {
    bookings: Arc<dyn BookingStore>,
    cleaners: Arc<dyn CleanerStore>,
    payouts: Arc<dyn PayoutStore>,
    notifier: Notifier,
    seal_key: Arc<SealKey>,
    default_fee_pct: Decimal,
    repeat_fee_pct: Decimal,
}

/// The UTC bounds of a calendar month: first instant and last second.
pub fn month_period(
    year: i32,
    month: u32,
) -> Result<(TimestampMs, TimestampMs), Error> {
    if !(1..=12).contains(&month) {
        return Err(Error::InvalidInput(format!(
            "month out of range: {month}"
        )));
    }

    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| {
            Error::InvalidInput(format!("invalid period {year}-{month:02}"))
        })?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("The month after a valid month is valid")
        - chrono::Duration::seconds(1);

    let start = TimestampMs::try_from_utc(start)
        .map_err(Error::Internal)?;
    let end = TimestampMs::try_from_utc(end).map_err(Error::Internal)?;
    Ok((start, end))
}

impl PayoutReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        cleaners: Arc<dyn CleanerStore>,
        payouts: Arc<dyn PayoutStore>,
        notifier: Notifier,
        seal_key: Arc<SealKey>,
        default_fee_pct: Decimal,
        repeat_fee_pct: Decimal,
    ) -> Self {
        Self {
            bookings,
            cleaners,
            payouts,
            notifier,
            seal_key,
            default_fee_pct,
            repeat_fee_pct,
        }
    }

    /// Runs reconciliation for one calendar month, returning the payouts
    /// created by *this* run. Cleaners whose period key already exists are
    /// skipped, so a re-run is a no-op. Payout generation for distinct
    /// cleaners is independent: one failed group is logged and the run
    /// continues.
    #[instrument(skip(self))]
    pub async fn run_monthly(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<Payout>, Error> {
        let (period_start, period_end) = month_period(year, month)?;

        let completed = self
            .bookings
            .list_completed_between(period_start, period_end)
            .await?;

        // Group by cleaner; bookings without one never reached COMPLETED
        // legitimately, but skip them defensively all the same.
        let mut groups: BTreeMap<CleanerId, Vec<Booking>> = BTreeMap::new();
        for booking in completed {
            let Some(cleaner_id) = booking.cleaner_id else {
                warn!(
                    "Completed booking {} has no cleaner; skipped",
                    booking.id
                );
                continue;
            };
            groups.entry(cleaner_id).or_default().push(booking);
        }

        let mut created = Vec::new();
        for (cleaner_id, group) in groups {
            if self
                .payouts
                .exists_for_period(cleaner_id, period_start, period_end)
                .await?
            {
                continue;
            }

            match self
                .build_payout(cleaner_id, period_start, period_end, &group)
                .await
            {
                Ok(payout) => match self.payouts.insert(&payout).await {
                    Ok(()) => {
                        info!(
                            "Created payout {} for cleaner {cleaner_id}: \
                             net {}",
                            payout.id, payout.net_amount
                        );
                        created.push(payout);
                    }
                    // A concurrent run won the period key; that's the
                    // idempotency working as intended.
                    Err(Error::Conflict(_)) => (),
                    Err(e) => warn!(
                        "Failed to persist payout for {cleaner_id}: {e:#}"
                    ),
                },
                Err(e) => {
                    warn!("Failed to build payout for {cleaner_id}: {e:#}")
                }
            }
        }

        Ok(created)
    }

    async fn build_payout(
        &self,
        cleaner_id: CleanerId,
        period_start: TimestampMs,
        period_end: TimestampMs,
        bookings: &[Booking],
    ) -> Result<Payout, Error> {
        let payout_id = PayoutId::generate();

        let mut line_items = Vec::with_capacity(bookings.len());
        let mut total_amount = Amount::ZERO;
        let mut platform_fees = Amount::ZERO;
        let mut net_amount = Amount::ZERO;

        for booking in bookings {
            let completed_at = booking.completed_at.ok_or_else(|| {
                Error::Internal(anyhow::anyhow!(
                    "completed booking {} has no completed_at",
                    booking.id
                ))
            })?;

            // Repeat customer: the client completed an earlier booking
            // before this one.
            let prior = self
                .bookings
                .count_completed_for_client_before(
                    booking.client_id,
                    completed_at,
                )
                .await?;
            let fee_rate = if prior > 0 {
                self.repeat_fee_pct
            } else {
                self.default_fee_pct
            };

            let amount = booking.total_price;
            let fee = amount.percent(fee_rate).round2();
            let earnings =
                amount.checked_sub(fee).ok_or_else(|| {
                    Error::Internal(anyhow::anyhow!(
                        "fee exceeds booking amount on {}",
                        booking.id
                    ))
                })?;

            total_amount = total_amount + amount;
            platform_fees = platform_fees + fee;
            net_amount = net_amount + earnings;

            line_items.push(PayoutLineItem {
                id: cb_common::ids::PayoutLineItemId::generate(),
                payout_id,
                booking_id: booking.id,
                booking_amount: amount,
                platform_fee_rate: fee_rate,
                platform_fee: fee,
                cleaner_earnings: earnings,
            });
        }

        Ok(Payout {
            id: payout_id,
            cleaner_id,
            period_start,
            period_end,
            status: PayoutStatus::Pending,
            total_amount,
            platform_fees,
            net_amount,
            currency: "RON".to_owned(),
            transfer_reference: None,
            paid_at: None,
            line_items,
            created_at: TimestampMs::now(),
        })
    }

    /// PENDING -> PROCESSING, when the transfer batch is picked up.
    pub async fn mark_processing(
        &self,
        payout_id: PayoutId,
    ) -> Result<Payout, Error> {
        let mut payout = self.load(payout_id).await?;
        if payout.status != PayoutStatus::Pending {
            return Err(payout_transition_error(
                payout.status,
                PayoutStatus::Processing,
            ));
        }
        payout.status = PayoutStatus::Processing;
        self.payouts.update(&payout, PayoutStatus::Pending).await?;
        Ok(payout)
    }

    /// Marks the transfer as sent. Requires the cleaner's payout IBAN to
    /// be present and well-formed; records the transfer reference and
    /// paid_at, and emits the payout-processed notification.
    #[instrument(skip(self, transfer_reference))]
    pub async fn mark_sent(
        &self,
        payout_id: PayoutId,
        transfer_reference: String,
    ) -> Result<Payout, Error> {
        let mut payout = self.load(payout_id).await?;
        let observed = payout.status;
        if !matches!(
            observed,
            PayoutStatus::Pending | PayoutStatus::Processing
        ) {
            return Err(payout_transition_error(
                observed,
                PayoutStatus::Sent,
            ));
        }

        let cleaner = self
            .cleaners
            .get(payout.cleaner_id)
            .await?
            .ok_or_else(|| {
                Error::not_found("cleaner", payout.cleaner_id)
            })?;
        let sealed = cleaner.payout_account.as_deref().ok_or_else(|| {
            Error::PolicyViolation(format!(
                "cleaner {} has no payout IBAN on file",
                payout.cleaner_id
            ))
        })?;
        let plaintext = self.seal_key.unseal_or_plaintext(sealed);
        iban::validate_romanian(&iban::normalize(&plaintext)).map_err(
            |e| Error::PolicyViolation(format!("payout IBAN invalid: {e}")),
        )?;

        payout.status = PayoutStatus::Sent;
        payout.transfer_reference = Some(transfer_reference);
        payout.paid_at = Some(TimestampMs::now());
        self.payouts.update(&payout, observed).await?;

        info!("Payout {payout_id} sent to cleaner {}", payout.cleaner_id);
        self.notifier.send_detached(
            cleaner.email.as_deref(),
            EmailTemplate::PayoutProcessed,
            json!({
                "netAmount": payout.net_amount,
                "currency": payout.currency,
                "periodStart": payout.period_start.as_i64(),
                "periodEnd": payout.period_end.as_i64(),
            }),
        );

        Ok(payout)
    }

    /// PENDING | PROCESSING -> FAILED.
    pub async fn mark_failed(
        &self,
        payout_id: PayoutId,
    ) -> Result<Payout, Error> {
        let mut payout = self.load(payout_id).await?;
        let observed = payout.status;
        if !matches!(
            observed,
            PayoutStatus::Pending | PayoutStatus::Processing
        ) {
            return Err(payout_transition_error(
                observed,
                PayoutStatus::Failed,
            ));
        }
        payout.status = PayoutStatus::Failed;
        self.payouts.update(&payout, observed).await?;
        Ok(payout)
    }

    async fn load(&self, payout_id: PayoutId) -> Result<Payout, Error> {
        self.payouts
            .get(payout_id)
            .await?
            .ok_or_else(|| Error::not_found("payout", payout_id))
    }
}

fn payout_transition_error(from: PayoutStatus, to: PayoutStatus) -> Error {
    Error::InvalidStateTransition {
        entity: "payout",
        from: from.as_str().to_owned(),
        to: to.as_str().to_owned(),
    }
}
