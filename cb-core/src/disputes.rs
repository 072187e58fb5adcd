//! Dispute resolution.
//!
//! A client may dispute a completed booking within 7 days of completion;
//! the booking forks COMPLETED -> DISPUTED. The assigned cleaner may append
//! a single response, and an admin resolves with a refund, a reclean, or a
//! rejection.

use std::sync::Arc;
use std::time::Duration;

use cb_common::{
    amount::Amount,
    ids::{BookingId, DisputeId},
    time::TimestampMs,
};
use tracing::{info, instrument, warn};

use crate::{
    booking::BookingService,
    error::Error,
    models::{
        booking::BookingStatus,
        dispute::{
            Dispute, DisputeResolution, DisputeStatus, DISPUTE_WINDOW_DAYS,
        },
        payment::{PaymentStatus, PaymentType},
        user::Actor,
    },
    payments::PaymentService,
    traits::{BookingStore, DisputeStore, PaymentStore},
};

/// Operational follow-ups a resolution can leave behind for the admin
/// queue. The RECLEAN path deliberately does not auto-create the follow-up
/// booking; it surfaces this marker instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AdminFollowUp {
    CreateRecleanBooking,
    /// The refund RPC failed after the dispute was already resolved;
    /// someone has to re-issue it manually.
    ManualRefundRequired,
}

/// How an admin wants a dispute settled.
#[derive(Clone, Debug)]
pub struct ResolutionRequest {
    pub resolution: DisputeResolution,
    pub notes: Option<String>,
    /// Required for PARTIAL_REFUND; defaults to the captured amount for
    /// FULL_REFUND.
    pub refund_amount: Option<Amount>,
}

/// What a resolution produced.
#[derive(Clone, Debug)]
pub struct ResolutionOutcome {
    pub dispute: Dispute,
    pub follow_up: Option<AdminFollowUp>,
}

pub struct DisputeService {
    disputes: Arc<dyn DisputeStore>,
    bookings: Arc<dyn BookingStore>,
    payment_store: Arc<dyn PaymentStore>,
    booking_service: Arc<BookingService>,
    payments: Arc<PaymentService>,
}

impl DisputeService {
    pub fn new(
        disputes: Arc<dyn DisputeStore>,
        bookings: Arc<dyn BookingStore>,
        payment_store: Arc<dyn PaymentStore>,
        booking_service: Arc<BookingService>,
        payments: Arc<PaymentService>,
    ) -> Self {
        Self {
            disputes,
            bookings,
            payment_store,
            booking_service,
            payments,
        }
    }

    // --- Creation --- //

    /// Opens a dispute. Only the booking's client, only while the booking
    /// is COMPLETED, only within the 7-day window (the boundary instant
    /// itself is accepted), and only once per booking.
    #[instrument(skip(self, actor, reason))]
    pub async fn open(
        &self,
        actor: Actor,
        booking_id: BookingId,
        reason: String,
    ) -> Result<Dispute, Error> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))?;

        let Actor::Client(client_id) = actor else {
            return Err(Error::Unauthorized(
                "only the booking client may open a dispute".to_owned(),
            ));
        };
        if booking.client_id != client_id {
            return Err(Error::Unauthorized(
                "not the booking client".to_owned(),
            ));
        }

        if booking.status != BookingStatus::Completed {
            return Err(
                booking.status.transition_error(BookingStatus::Disputed)
            );
        }
        let completed_at = booking.completed_at.ok_or_else(|| {
            Error::Internal(anyhow::anyhow!(
                "completed booking {booking_id} has no completed_at"
            ))
        })?;
        let window = Duration::from_secs(DISPUTE_WINDOW_DAYS * 24 * 3600);
        if TimestampMs::now() > completed_at.saturating_add(window) {
            return Err(Error::PolicyViolation(format!(
                "disputes must be opened within {DISPUTE_WINDOW_DAYS} days \
                 of completion"
            )));
        }

        if self.disputes.get_by_booking(booking_id).await?.is_some() {
            return Err(Error::Conflict(format!(
                "booking {booking_id} already has a dispute"
            )));
        }

        // The COMPLETED -> DISPUTED conditional write doubles as the race
        // guard: only one creator can win it.
        self.booking_service.mark_disputed(&booking).await?;

        let dispute = Dispute {
            id: DisputeId::generate(),
            booking_id,
            client_id,
            reason,
            status: DisputeStatus::Open,
            cleaner_response: None,
            resolution_type: None,
            resolution_notes: None,
            refund_amount: None,
            resolved_by: None,
            resolved_at: None,
            created_at: TimestampMs::now(),
        };
        self.disputes.insert(&dispute).await?;

        info!("Opened dispute {} on booking {booking_id}", dispute.id);
        Ok(dispute)
    }

    // --- Cleaner response --- //

    /// The assigned cleaner appends their single response, moving the
    /// dispute OPEN -> UNDER_REVIEW.
    #[instrument(skip(self, actor, response))]
    pub async fn respond(
        &self,
        actor: Actor,
        dispute_id: DisputeId,
        response: String,
    ) -> Result<Dispute, Error> {
        let mut dispute = self.load(dispute_id).await?;

        let Actor::Cleaner(cleaner_id) = actor else {
            return Err(Error::Unauthorized(
                "only the assigned cleaner may respond".to_owned(),
            ));
        };
        let booking = self
            .bookings
            .get(dispute.booking_id)
            .await?
            .ok_or_else(|| {
                Error::not_found("booking", dispute.booking_id)
            })?;
        if booking.cleaner_id != Some(cleaner_id) {
            return Err(Error::Unauthorized(
                "not the assigned cleaner".to_owned(),
            ));
        }

        if dispute.status != DisputeStatus::Open {
            return Err(dispute_transition_error(
                dispute.status,
                DisputeStatus::UnderReview,
            ));
        }

        dispute.cleaner_response = Some(response);
        dispute.status = DisputeStatus::UnderReview;
        self.disputes.update(&dispute, DisputeStatus::Open).await?;

        Ok(dispute)
    }

    // --- Admin resolution --- //

    /// Resolves a dispute.
    ///
    /// - PARTIAL_REFUND / FULL_REFUND: refunds the booking's captured
    ///   payment. A refund RPC failure is logged and the dispute is still
    ///   marked RESOLVED, with a manual-refund follow-up for operations.
    ///   The booking stays DISPUTED; the admin subsequently marks it
    ///   REFUNDED via [`mark_booking_refunded`](Self::mark_booking_refunded).
    /// - RECLEAN: resolved, with a follow-up marker to create the reclean
    ///   booking; the booking returns to COMPLETED.
    /// - REJECTED: resolved, no monetary action; the booking returns to
    ///   COMPLETED.
    #[instrument(skip(self, actor, request))]
    pub async fn resolve(
        &self,
        actor: Actor,
        dispute_id: DisputeId,
        request: ResolutionRequest,
    ) -> Result<ResolutionOutcome, Error> {
        let Actor::Admin(admin_id) = actor else {
            return Err(Error::Unauthorized(
                "only admins may resolve disputes".to_owned(),
            ));
        };

        let mut dispute = self.load(dispute_id).await?;
        let observed = dispute.status;
        if !matches!(
            observed,
            DisputeStatus::Open | DisputeStatus::UnderReview
        ) {
            return Err(dispute_transition_error(
                observed,
                DisputeStatus::Resolved,
            ));
        }

        let mut follow_up = None;
        let mut refund_applied = None;

        match request.resolution {
            DisputeResolution::PartialRefund
            | DisputeResolution::FullRefund => {
                let captured = self
                    .captured_payment(dispute.booking_id)
                    .await?
                    .ok_or_else(|| {
                        Error::PolicyViolation(format!(
                            "booking {} has no captured payment to refund",
                            dispute.booking_id
                        ))
                    })?;

                let amount = match request.resolution {
                    DisputeResolution::PartialRefund => request
                        .refund_amount
                        .ok_or_else(|| {
                            Error::InvalidInput(
                                "partial refunds require an amount"
                                    .to_owned(),
                            )
                        })?,
                    _ => request.refund_amount.unwrap_or(captured.amount),
                };

                match self
                    .payments
                    .refund(
                        actor,
                        captured.id,
                        amount,
                        format!("Dispute {dispute_id} resolution"),
                    )
                    .await
                {
                    Ok(_) => refund_applied = Some(amount),
                    // Invalid refunds (e.g. exceeding the captured
                    // amount) are the admin's mistake and abort the
                    // resolution; provider failures resolve anyway with
                    // an operational follow-up.
                    Err(e @ Error::InvalidInput(_)) => return Err(e),
                    Err(e) => {
                        warn!(
                            "Refund for dispute {dispute_id} failed: {e:#}"
                        );
                        follow_up =
                            Some(AdminFollowUp::ManualRefundRequired);
                        refund_applied = Some(amount);
                    }
                }
            }
            DisputeResolution::Reclean => {
                follow_up = Some(AdminFollowUp::CreateRecleanBooking);
            }
            DisputeResolution::Rejected => (),
        }

        dispute.status = DisputeStatus::Resolved;
        dispute.resolution_type = Some(request.resolution);
        dispute.resolution_notes = request.notes;
        dispute.refund_amount = refund_applied;
        dispute.resolved_by = Some(admin_id);
        dispute.resolved_at = Some(TimestampMs::now());
        self.disputes.update(&dispute, observed).await?;

        // RECLEAN and REJECTED return the booking to COMPLETED; the
        // refund paths leave it DISPUTED until the admin marks it
        // REFUNDED.
        if matches!(
            request.resolution,
            DisputeResolution::Reclean | DisputeResolution::Rejected
        ) {
            if let Err(e) = self
                .booking_service
                .resolve_disputed(
                    dispute.booking_id,
                    BookingStatus::Completed,
                )
                .await
            {
                warn!(
                    "Failed to restore booking {} to COMPLETED: {e:#}",
                    dispute.booking_id
                );
            }
        }

        info!(
            "Resolved dispute {dispute_id} as {:?}",
            request.resolution
        );
        Ok(ResolutionOutcome { dispute, follow_up })
    }

    /// DISPUTED -> REFUNDED, the admin's final step after a refund
    /// resolution.
    pub async fn mark_booking_refunded(
        &self,
        actor: Actor,
        booking_id: BookingId,
    ) -> Result<(), Error> {
        if !actor.is_admin() {
            return Err(Error::Unauthorized(
                "only admins may mark bookings refunded".to_owned(),
            ));
        }
        self.booking_service
            .resolve_disputed(booking_id, BookingStatus::Refunded)
            .await?;
        Ok(())
    }

    // --- Helpers --- //

    async fn captured_payment(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<crate::models::payment::Payment>, Error> {
        let payments =
            self.payment_store.list_for_booking(booking_id).await?;
        Ok(payments.into_iter().find(|p| {
            p.status == PaymentStatus::Captured
                && p.payment_type == PaymentType::Capture
        }))
    }

    async fn load(&self, dispute_id: DisputeId) -> Result<Dispute, Error> {
        self.disputes
            .get(dispute_id)
            .await?
            .ok_or_else(|| Error::not_found("dispute", dispute_id))
    }
}

fn dispute_transition_error(
    from: DisputeStatus,
    to: DisputeStatus,
) -> Error {
    Error::InvalidStateTransition {
        entity: "dispute",
        from: from.as_str().to_owned(),
        to: to.as_str().to_owned(),
    }
}
