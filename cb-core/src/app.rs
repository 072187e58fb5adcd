//! Composition root and late-bound service collaborator slots.
//!
//! The services form a dependency DAG with one genuine cycle
//! (booking <-> matching: creation dispatches matching, auto-assign
//! transitions the booking). The cycle is resolved without construction
//! gymnastics by a post-construction setter on each side, backed by
//! [`LateBound`]; [`Services::init`] constructs leaves first and binds the
//! collaborators in a fixed order before returning, so an unbound slot is
//! unreachable in practice.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use cb_common::{rng::Crng, seal::SealKey};
use cb_tokio::{
    notify_once::NotifyOnce,
    task::{self, CbTask},
};

use crate::{
    availability::AvailabilityService,
    booking::{sweeper, BookingService},
    checkin::CheckinService,
    config::Config,
    disputes::DisputeService,
    error::Error,
    invoice::InvoiceService,
    matching::MatchingEngine,
    notify::Notifier,
    payments::PaymentService,
    payouts::PayoutReconciler,
    reviews::ReviewService,
    traits::{
        AddressStore, AvailabilityStore, BookingStore, CheckinStore,
        CleanerStore, ClientStore, DisputeStore, EmailApi, GeocodeApi,
        InvoiceStore, PaymentProviderApi, PaymentStore, PayoutStore,
        ReviewStore, SettingsStore, TaxAuthorityApi,
    },
};

/// A read-mostly slot for a collaborator that can only be bound after
/// construction.
pub struct LateBound<T> {
    slot: ArcSwapOption<T>,
}

impl<T> LateBound<T> {
    pub fn unset() -> Self {
        Self {
            slot: ArcSwapOption::const_empty(),
        }
    }

    /// Binds the collaborator. Last bind wins; the composition root binds
    /// exactly once.
    pub fn bind(&self, value: Arc<T>) {
        self.slot.store(Some(value));
    }

    /// The bound collaborator. An unbound slot is a wiring bug in the
    /// composition root, surfaced as an internal error rather than a
    /// panic.
    pub fn get(&self) -> Result<Arc<T>, Error> {
        self.slot.load_full().ok_or_else(|| {
            Error::Internal(anyhow::anyhow!(
                "late-bound {} was never bound",
                std::any::type_name::<T>(),
            ))
        })
    }
}

/// Every store the engine reads or writes.
#[derive(Clone)]
pub struct Stores {
    pub bookings: Arc<dyn BookingStore>,
    pub clients: Arc<dyn ClientStore>,
    pub cleaners: Arc<dyn CleanerStore>,
    pub addresses: Arc<dyn AddressStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub payouts: Arc<dyn PayoutStore>,
    pub disputes: Arc<dyn DisputeStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub availability: Arc<dyn AvailabilityStore>,
    pub checkins: Arc<dyn CheckinStore>,
    pub settings: Arc<dyn SettingsStore>,
}

/// Every external collaborator the engine calls out to.
#[derive(Clone)]
pub struct Providers {
    pub payment: Arc<dyn PaymentProviderApi>,
    pub email: Arc<dyn EmailApi>,
    pub tax: Arc<dyn TaxAuthorityApi>,
    pub geocode: Arc<dyn GeocodeApi>,
}

/// The wired-up engine.
pub struct Services {
    pub config: Arc<Config>,
    pub bookings: Arc<BookingService>,
    pub matching: Arc<MatchingEngine>,
    pub payments: Arc<PaymentService>,
    pub invoices: Arc<InvoiceService>,
    pub payouts: Arc<PayoutReconciler>,
    pub disputes: Arc<DisputeService>,
    pub checkins: Arc<CheckinService>,
    pub availability: Arc<AvailabilityService>,
    pub reviews: Arc<ReviewService>,
    pub shutdown: NotifyOnce,
}

impl Services {
    /// Constructs and wires the full service graph. Binding order is
    /// fixed: payment and invoice services first (no engine
    /// dependencies), then booking, then matching, then the two
    /// late-bound setters, then everything downstream.
    pub fn init(
        config: Config,
        stores: Stores,
        providers: Providers,
        seal_key: SealKey,
        rng: Box<dyn Crng + Send>,
        shutdown: NotifyOnce,
    ) -> Arc<Services> {
        let config = Arc::new(config);
        let notifier = Notifier::new(providers.email.clone());
        let seal_key = Arc::new(seal_key);

        let payments = Arc::new(PaymentService::new(
            stores.bookings.clone(),
            stores.payments.clone(),
            providers.payment.clone(),
            config.provider.max_attempts,
            shutdown.clone(),
        ));
        let invoices = Arc::new(InvoiceService::new(
            stores.invoices.clone(),
            providers.tax.clone(),
            config.provider.tax_max_attempts,
            config.provider.max_attempts,
            shutdown.clone(),
        ));

        let bookings = Arc::new(BookingService::new(
            config.clone(),
            stores.bookings.clone(),
            stores.clients.clone(),
            stores.cleaners.clone(),
            stores.addresses.clone(),
            stores.settings.clone(),
            notifier.clone(),
            payments.clone(),
            invoices.clone(),
            rng,
        ));
        let matching = Arc::new(MatchingEngine::new(
            config.matching,
            stores.bookings.clone(),
            stores.cleaners.clone(),
            stores.addresses.clone(),
            stores.availability.clone(),
            providers.email.clone(),
        ));

        // Resolve the booking <-> matching cycle.
        bookings.bind_matching(matching.clone());
        matching.bind_booking_service(bookings.clone());

        let payouts = Arc::new(PayoutReconciler::new(
            stores.bookings.clone(),
            stores.cleaners.clone(),
            stores.payouts.clone(),
            notifier.clone(),
            seal_key,
            config.pricing.platform_fee_pct,
            config.pricing.repeat_client_fee_pct,
        ));
        let disputes = Arc::new(DisputeService::new(
            stores.disputes.clone(),
            stores.bookings.clone(),
            stores.payments.clone(),
            bookings.clone(),
            payments.clone(),
        ));
        let checkins = Arc::new(CheckinService::new(
            stores.checkins.clone(),
            stores.bookings.clone(),
            stores.addresses.clone(),
            providers.geocode.clone(),
            bookings.clone(),
        ));
        let availability = Arc::new(AvailabilityService::new(
            stores.availability.clone(),
            stores.cleaners.clone(),
        ));
        let reviews = Arc::new(ReviewService::new(
            stores.reviews.clone(),
            stores.bookings.clone(),
        ));

        Arc::new(Services {
            config,
            bookings,
            matching,
            payments,
            invoices,
            payouts,
            disputes,
            checkins,
            availability,
            reviews,
            shutdown,
        })
    }

    /// Spawns the engine's long-running background tasks. The caller owns
    /// the handles and should join them on shutdown;
    /// [`run_until_shutdown`](Self::run_until_shutdown) does both.
    pub fn spawn_background_tasks(&self) -> Vec<CbTask<()>> {
        vec![sweeper::spawn_expiration_sweeper(
            self.bookings.clone(),
            self.config.scheduling.sweep_interval,
            self.shutdown.clone(),
        )]
    }

    /// Spawns the background tasks and joins them until the shutdown
    /// signal, logging their outcomes. A task that dies early triggers a
    /// shutdown of the rest; stragglers get a grace period before being
    /// reported as hung.
    pub async fn run_until_shutdown(&self) {
        let tasks = self.spawn_background_tasks();
        task::join_tasks_and_shutdown(
            "engine",
            tasks,
            self.shutdown.clone(),
            SHUTDOWN_GRACE,
        )
        .await;
    }
}

/// How long remaining tasks get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn late_bound_surfaces_wiring_bugs() {
        let slot = LateBound::<u32>::unset();
        assert!(slot.get().is_err());

        slot.bind(Arc::new(7));
        assert_eq!(*slot.get().unwrap(), 7);
    }
}
