//! The payment state machine.
//!
//! One row per provider interaction. `PENDING -> AUTHORIZED -> CAPTURED` on
//! the happy path; a capture transitions the preauthorization row in
//! place, a refund adds a new row referencing the same booking. At most
//! one AUTHORIZED payment exists per booking at a time, and refunds may
//! accumulate but never exceed the captured amount.

use std::sync::Arc;

use cb_common::{
    amount::Amount,
    ids::{BookingId, PaymentId},
    time::TimestampMs,
};
use cb_tokio::notify_once::NotifyOnce;
use tracing::{info, instrument};

use crate::{
    error::Error,
    models::{
        booking::Booking,
        payment::{Payment, PaymentProvider, PaymentStatus, PaymentType},
        user::Actor,
    },
    retry,
    traits::{
        BookingStore, PaymentProviderApi, PaymentStore, ProviderReceipt,
    },
};

pub struct PaymentService {
    bookings: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentStore>,
    provider_api: Arc<dyn PaymentProviderApi>,
    /// Total provider-call attempts, from config.
    max_attempts: u32,
    shutdown: NotifyOnce,
}

impl PaymentService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentStore>,
        provider_api: Arc<dyn PaymentProviderApi>,
        max_attempts: u32,
        shutdown: NotifyOnce,
    ) -> Self {
        Self {
            bookings,
            payments,
            provider_api,
            max_attempts,
            shutdown,
        }
    }

    // --- Preauthorize --- //

    /// Places a provider hold for the booking's total. Only the booking's
    /// client (or an admin) may preauthorize, and only while no other
    /// authorized hold exists for the booking.
    #[instrument(skip(self, actor))]
    pub async fn preauthorize(
        &self,
        actor: Actor,
        booking_id: BookingId,
        provider: PaymentProvider,
    ) -> Result<Payment, Error> {
        let booking = self.load_booking(booking_id).await?;
        self.authorize_payer(&booking, actor)?;

        let existing = self.payments.list_for_booking(booking_id).await?;
        if existing
            .iter()
            .any(|p| p.status == PaymentStatus::Authorized)
        {
            return Err(Error::Conflict(format!(
                "booking {booking_id} already has an authorized payment"
            )));
        }

        let mut payment = Payment::new_preauthorization(
            booking_id,
            booking.total_price,
            provider,
        );
        self.payments.insert(&payment).await?;

        let receipt = retry::with_retries(
            "payment preauthorize",
            self.max_attempts,
            &self.shutdown,
            || {
                self.provider_api.preauthorize(
                    booking_id,
                    payment.amount,
                    &payment.currency,
                )
            },
        )
        .await;

        match receipt {
            Ok(receipt) => {
                apply_receipt(&mut payment, receipt);
                payment.status = PaymentStatus::Authorized;
                payment.authorized_at = Some(TimestampMs::now());
                self.payments
                    .update(&payment, PaymentStatus::Pending)
                    .await?;
                info!("Authorized payment {}", payment.id);
                Ok(payment)
            }
            Err(provider_err) => {
                payment.status = PaymentStatus::Failed;
                // Best-effort bookkeeping; the provider error is what the
                // caller needs to see.
                let _ = self
                    .payments
                    .update(&payment, PaymentStatus::Pending)
                    .await;
                Err(provider_err.into())
            }
        }
    }

    // --- Capture --- //

    /// Converts an authorized hold into a charge.
    #[instrument(skip(self))]
    pub async fn capture(
        &self,
        payment_id: PaymentId,
    ) -> Result<Payment, Error> {
        let payment = self.load_payment(payment_id).await?;
        self.capture_inner(payment).await
    }

    /// Captures the booking's single AUTHORIZED payment if one exists.
    /// Used by the booking completion side effects.
    pub async fn capture_authorized_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>, Error> {
        let payments = self.payments.list_for_booking(booking_id).await?;
        let authorized = payments
            .into_iter()
            .find(|p| p.status == PaymentStatus::Authorized);

        match authorized {
            Some(payment) =>
                self.capture_inner(payment).await.map(Some),
            None => Ok(None),
        }
    }

    async fn capture_inner(
        &self,
        mut payment: Payment,
    ) -> Result<Payment, Error> {
        if payment.status != PaymentStatus::Authorized {
            return Err(payment_transition_error(
                payment.status,
                PaymentStatus::Captured,
            ));
        }
        let transaction_id = provider_transaction_id(&payment)?;

        let receipt = retry::with_retries(
            "payment capture",
            self.max_attempts,
            &self.shutdown,
            || self.provider_api.capture(&transaction_id, payment.amount),
        )
        .await?;

        apply_receipt(&mut payment, receipt);
        payment.payment_type = PaymentType::Capture;
        payment.status = PaymentStatus::Captured;
        payment.captured_at = Some(TimestampMs::now());
        self.payments
            .update(&payment, PaymentStatus::Authorized)
            .await?;

        info!("Captured payment {}", payment.id);
        Ok(payment)
    }

    // --- Refund --- //

    /// Refunds part or all of a captured payment, producing a new REFUND
    /// row. Accumulated refunds may never exceed the captured amount.
    #[instrument(skip(self, actor, reason))]
    pub async fn refund(
        &self,
        actor: Actor,
        payment_id: PaymentId,
        amount: Amount,
        reason: String,
    ) -> Result<Payment, Error> {
        if !actor.is_admin() && !actor.is_system() {
            return Err(Error::Unauthorized(
                "only admins may refund".to_owned(),
            ));
        }

        let source = self.load_payment(payment_id).await?;
        if source.status != PaymentStatus::Captured {
            return Err(payment_transition_error(
                source.status,
                PaymentStatus::Refunded,
            ));
        }

        let siblings =
            self.payments.list_for_booking(source.booking_id).await?;
        let already_refunded: Amount = siblings
            .iter()
            .filter(|p| {
                p.payment_type == PaymentType::Refund
                    && p.status == PaymentStatus::Refunded
            })
            .map(|p| p.amount)
            .sum();
        let requested = already_refunded
            .checked_add(amount)
            .ok_or_else(|| {
                Error::InvalidInput("refund amount overflowed".to_owned())
            })?;
        if requested > source.amount {
            return Err(Error::InvalidInput(format!(
                "refund total {requested} exceeds captured amount {}",
                source.amount
            )));
        }

        let transaction_id = provider_transaction_id(&source)?;
        let receipt = retry::with_retries(
            "payment refund",
            self.max_attempts,
            &self.shutdown,
            || self.provider_api.refund(&transaction_id, amount),
        )
        .await?;

        let mut refund = Payment::new_refund(
            source.booking_id,
            amount,
            source.provider,
            reason,
        );
        apply_receipt(&mut refund, receipt);
        self.payments.insert(&refund).await?;

        info!(
            "Refunded {amount} of payment {} as {}",
            source.id, refund.id
        );
        Ok(refund)
    }

    // --- Cancel preauthorization --- //

    /// Releases an authorized hold without charging it.
    #[instrument(skip(self))]
    pub async fn cancel_preauthorization(
        &self,
        payment_id: PaymentId,
    ) -> Result<Payment, Error> {
        let mut payment = self.load_payment(payment_id).await?;
        if payment.status != PaymentStatus::Authorized {
            return Err(payment_transition_error(
                payment.status,
                PaymentStatus::Cancelled,
            ));
        }
        let transaction_id = provider_transaction_id(&payment)?;

        let receipt = retry::with_retries(
            "payment cancel",
            self.max_attempts,
            &self.shutdown,
            || self.provider_api.cancel_preauthorization(&transaction_id),
        )
        .await?;

        apply_receipt(&mut payment, receipt);
        payment.payment_type = PaymentType::Cancellation;
        payment.status = PaymentStatus::Cancelled;
        self.payments
            .update(&payment, PaymentStatus::Authorized)
            .await?;

        info!("Cancelled preauthorization {}", payment.id);
        Ok(payment)
    }

    // --- Helpers --- //

    fn authorize_payer(
        &self,
        booking: &Booking,
        actor: Actor,
    ) -> Result<(), Error> {
        match actor {
            Actor::Client(client_id) if client_id == booking.client_id =>
                Ok(()),
            Actor::Admin(_) => Ok(()),
            _ => Err(Error::Unauthorized(
                "payments may only be initiated by the booking client"
                    .to_owned(),
            )),
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

    async fn load_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Payment, Error> {
        self.payments
            .get(payment_id)
            .await?
            .ok_or_else(|| Error::not_found("payment", payment_id))
    }
}

fn apply_receipt(payment: &mut Payment, receipt: ProviderReceipt) {
    payment.provider_transaction_id = Some(receipt.transaction_id);
    payment.provider_order_id = Some(receipt.order_id);
    payment.provider_response = Some(receipt.raw_response);
}

/// The transaction id recorded at authorization time. Its absence on an
/// AUTHORIZED row is an invariant violation.
fn provider_transaction_id(payment: &Payment) -> Result<String, Error> {
    payment.provider_transaction_id.clone().ok_or_else(|| {
        Error::Internal(anyhow::anyhow!(
            "payment {} is {} but has no provider transaction id",
            payment.id,
            payment.status,
        ))
    })
}

fn payment_transition_error(
    from: PaymentStatus,
    to: PaymentStatus,
) -> Error {
    Error::InvalidStateTransition {
        entity: "payment",
        from: from.as_str().to_owned(),
        to: to.as_str().to_owned(),
    }
}
