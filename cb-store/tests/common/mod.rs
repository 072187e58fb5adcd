//! Shared harness for the end-to-end tests: provider fakes, a composed
//! service graph over `MemStore`, and entity builders.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use cb_common::{
    amount::Amount,
    ids::{AddressId, BookingId, CleanerId, ClientId, UserId},
    rng::WeakRng,
    seal::SealKey,
    time::TimestampMs,
};
use cb_core::{
    app::{Providers, Services, Stores},
    config::Config,
    geo::GeoPoint,
    models::{
        address::Address,
        booking::{
            AddOns, Booking, BookingStatus, Frequency, ReservationCode,
            ServiceType, SuppliesBy,
        },
        cleaner::{ApprovalStatus, Cleaner, Specialization},
        client::Client,
        invoice::{TaxError, TaxSubmissionStatus},
    },
    pricing::holidays,
    traits::{
        EmailApi, EmailMessage, GeocodeApi, PaymentProviderApi,
        ProviderError, ProviderReceipt, TaxAuthorityApi,
        TaxSubmissionOutcome,
    },
};
use cb_store::MemStore;
use cb_tokio::notify_once::NotifyOnce;
use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc, Weekday,
};
use serde_json::json;

// --- Provider fakes --- //

/// Answers every call with a fresh receipt; individual operations can be
/// toggled to fail.
#[derive(Default)]
pub struct FakePaymentProvider {
    counter: AtomicU64,
    pub fail_refunds: AtomicBool,
}

impl FakePaymentProvider {
    fn receipt(&self, op: &str) -> ProviderReceipt {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ProviderReceipt {
            transaction_id: format!("tx-{n}"),
            order_id: format!("ord-{n}"),
            raw_response: json!({ "op": op, "n": n }),
        }
    }
}

#[async_trait]
impl PaymentProviderApi for FakePaymentProvider {
    async fn preauthorize(
        &self,
        _booking_id: BookingId,
        _amount: Amount,
        _currency: &str,
    ) -> Result<ProviderReceipt, ProviderError> {
        Ok(self.receipt("preauthorize"))
    }

    async fn capture(
        &self,
        _transaction_id: &str,
        _amount: Amount,
    ) -> Result<ProviderReceipt, ProviderError> {
        Ok(self.receipt("capture"))
    }

    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Amount,
    ) -> Result<ProviderReceipt, ProviderError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(ProviderError::unavailable("refund endpoint 503"));
        }
        Ok(self.receipt("refund"))
    }

    async fn cancel_preauthorization(
        &self,
        _transaction_id: &str,
    ) -> Result<ProviderReceipt, ProviderError> {
        Ok(self.receipt("cancel"))
    }
}

/// Records every outbound email instead of sending it.
#[derive(Default)]
pub struct RecordingEmail {
    /// (recipient, template name or subject)
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingEmail {
    pub fn sent_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, what)| what.clone())
            .collect()
    }
}

#[async_trait]
impl EmailApi for RecordingEmail {
    async fn send(
        &self,
        message: &EmailMessage,
    ) -> Result<(), ProviderError> {
        let record = match message {
            EmailMessage::Template { to, template, .. } =>
                (to.clone(), template.as_str().to_owned()),
            EmailMessage::Raw { to, subject, .. } =>
                (to.clone(), subject.clone()),
        };
        self.sent.lock().unwrap().push(record);
        Ok(())
    }
}

/// Accepts every submitted invoice.
#[derive(Default)]
pub struct FakeTaxAuthority {
    pub reject_all: AtomicBool,
}

#[async_trait]
impl TaxAuthorityApi for FakeTaxAuthority {
    async fn submit(
        &self,
        invoice: &cb_core::models::invoice::Invoice,
    ) -> Result<TaxSubmissionOutcome, ProviderError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Ok(TaxSubmissionOutcome {
                status: TaxSubmissionStatus::Rejected,
                upload_index: None,
                errors: vec![TaxError {
                    code: "E001".to_owned(),
                    message: "rejected by test".to_owned(),
                    field: None,
                }],
            });
        }
        Ok(TaxSubmissionOutcome {
            status: TaxSubmissionStatus::Accepted,
            upload_index: Some(format!(
                "upl-{}",
                invoice.invoice_number
            )),
            errors: Vec::new(),
        })
    }
}

/// Returns a fixed point, or nothing.
#[derive(Default)]
pub struct FakeGeocode {
    pub point: Option<GeoPoint>,
}

#[async_trait]
impl GeocodeApi for FakeGeocode {
    async fn geocode(
        &self,
        _address: &Address,
    ) -> Result<Option<GeoPoint>, ProviderError> {
        Ok(self.point)
    }
}

// --- The composed harness --- //

pub struct Harness {
    pub services: Arc<Services>,
    pub store: Arc<MemStore>,
    pub email: Arc<RecordingEmail>,
    pub provider: Arc<FakePaymentProvider>,
    pub shutdown: NotifyOnce,
}

pub fn seal_key() -> SealKey {
    SealKey::new([7u8; 32])
}

pub fn harness_with_config(config: Config) -> Harness {
    cb_logger::init_for_testing();

    let store = Arc::new(MemStore::new());
    let email = Arc::new(RecordingEmail::default());
    let provider = Arc::new(FakePaymentProvider::default());
    let shutdown = NotifyOnce::new();

    let stores = Stores {
        bookings: store.clone(),
        clients: store.clone(),
        cleaners: store.clone(),
        addresses: store.clone(),
        payments: store.clone(),
        invoices: store.clone(),
        payouts: store.clone(),
        disputes: store.clone(),
        reviews: store.clone(),
        availability: store.clone(),
        checkins: store.clone(),
        settings: store.clone(),
    };
    let providers = Providers {
        payment: provider.clone(),
        email: email.clone(),
        tax: Arc::new(FakeTaxAuthority::default()),
        geocode: Arc::new(FakeGeocode::default()),
    };

    let services = Services::init(
        config,
        stores,
        providers,
        seal_key(),
        Box::new(WeakRng::new()),
        shutdown.clone(),
    );

    Harness {
        services,
        store,
        email,
        provider,
        shutdown,
    }
}

pub fn harness() -> Harness {
    harness_with_config(Config::default())
}

/// Polls `probe` until it returns `Some`, for the detached side-effect
/// tasks the engine spawns. Panics after 5 seconds.
pub async fn wait_for<T, F, Fut>(mut probe: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe().await {
            return value;
        }
        if std::time::Instant::now() > deadline {
            panic!("condition not reached within 5s");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// --- Entity builders --- //

pub fn make_client(email: &str) -> Client {
    Client {
        id: ClientId::generate(),
        user_id: UserId::generate(),
        email: Some(email.to_owned()),
        phone: None,
        total_bookings: 0,
        total_spent: Amount::ZERO,
        created_at: TimestampMs::now(),
    }
}

pub fn make_address(user_id: UserId, coordinates: Option<GeoPoint>) -> Address {
    Address {
        id: AddressId::generate(),
        user_id,
        street: "Strada Exemplu 10".to_owned(),
        city: "București".to_owned(),
        county: "Ilfov".to_owned(),
        postal_code: Some("010101".to_owned()),
        is_default: true,
        coordinates,
        created_at: TimestampMs::now(),
    }
}

pub fn make_cleaner(email: &str) -> Cleaner {
    Cleaner {
        id: CleanerId::generate(),
        user_id: UserId::generate(),
        email: Some(email.to_owned()),
        display_name: "Maria Pop".to_owned(),
        approval_status: ApprovalStatus::Approved,
        is_active: true,
        is_available: true,
        specializations: vec![Specialization::Standard],
        languages: vec!["ro".to_owned()],
        total_jobs: 0,
        total_earnings: Amount::ZERO,
        average_rating: None,
        total_reviews: 0,
        location: None,
        city: Some("București".to_owned()),
        county: Some("Ilfov".to_owned()),
        payout_account: None,
        created_at: TimestampMs::now(),
    }
}

/// A COMPLETED booking row seeded directly into the store, for
/// reconciliation and dispute-window tests.
pub fn make_completed_booking(
    client_id: ClientId,
    cleaner_id: CleanerId,
    address_id: AddressId,
    total: Amount,
    completed_at: TimestampMs,
    code_suffix: &str,
) -> Booking {
    let fee = total.percent(rust_decimal::Decimal::TEN).round2();
    Booking {
        id: BookingId::generate(),
        reservation_code: ReservationCode::from_parts(2026, code_suffix),
        client_id,
        cleaner_id: Some(cleaner_id),
        address_id,
        service_type: ServiceType::Standard,
        frequency: Frequency::OneTime,
        estimated_hours: rust_decimal::Decimal::TWO,
        area_sqm: rust_decimal::Decimal::ZERO,
        scheduled_at: None,
        time_preferences: Vec::new(),
        addons: AddOns::default(),
        supplies: SuppliesBy::ClientProvides,
        base_price: total,
        addons_price: Amount::ZERO,
        discount_applied: Amount::ZERO,
        total_price: total,
        platform_fee: fee,
        cleaner_payout: total - fee,
        status: BookingStatus::Completed,
        confirmed_at: Some(completed_at),
        started_at: Some(completed_at),
        completed_at: Some(completed_at),
        cancelled_at: None,
        cancelled_by: None,
        cancellation_reason: None,
        client_rating: None,
        cleaner_rating: None,
        created_at: completed_at,
    }
}

// --- Scheduling helpers --- //

/// The next Wednesday 10:00 UTC that is at least 48 h away and not a
/// public holiday; satisfies every default scheduling bound.
pub fn upcoming_quiet_wednesday(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut date = (now + ChronoDuration::days(3)).date_naive();
    loop {
        if date.weekday() == Weekday::Wed
            && !holidays::is_public_holiday(date)
        {
            let at = date
                .and_hms_opt(10, 0, 0)
                .expect("10:00 is a valid time")
                .and_utc();
            if at >= now + ChronoDuration::hours(48) {
                return at;
            }
        }
        date += ChronoDuration::days(1);
    }
}

/// The next instant with hour in `[10, 20)` that is 3-24 h away: inside
/// the service window and the default scheduling bounds, but within the
/// 24 h cancellation-fee window.
pub fn upcoming_slot_within_cancellation_window(
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut at = (now + ChronoDuration::hours(3))
        .date_naive()
        .and_hms_opt((now + ChronoDuration::hours(3)).hour(), 0, 0)
        .expect("truncated hour is valid")
        .and_utc();
    loop {
        if (10..20).contains(&at.hour())
            && at >= now + ChronoDuration::hours(3)
        {
            return at;
        }
        at += ChronoDuration::hours(1);
    }
}
