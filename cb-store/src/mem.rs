//! `MemStore`: every store contract over in-memory tables.
//!
//! A single `RwLock` guards all tables; no method holds the lock across an
//! await point. Status-bearing updates compare the stored row's status
//! against the caller's expectation and fail with `Stale` on a mismatch,
//! mirroring the production store's `UPDATE … WHERE id = $1 AND status =
//! <expected>` writes. Unique indexes (reservation codes, one invoice per
//! booking, one payout per period, one dispute per booking) are enforced
//! the same way the schema enforces them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use cb_common::{
    amount::Amount,
    ids::{
        AddressId, AvailabilitySlotId, BookingId, CheckinId, CleanerId,
        ClientId, DisputeId, InvoiceId, PaymentId, PayoutId,
    },
    time::TimestampMs,
};
use cb_core::{
    error::Error,
    geo::GeoPoint,
    models::{
        address::Address,
        availability::AvailabilitySlot,
        booking::{Booking, BookingStatus},
        checkin::Checkin,
        cleaner::Cleaner,
        client::Client,
        dispute::{Dispute, DisputeStatus},
        invoice::Invoice,
        payment::{Payment, PaymentStatus},
        payout::{Payout, PayoutStatus},
        review::Review,
        settings::PlatformSettings,
    },
    traits::{
        AddressStore, AvailabilityStore, BookingStore, CheckinStore,
        CleanerStore, ClientStore, DisputeStore, InvoiceStore,
        PaymentStore, PayoutStore, ReviewStore, SettingsStore,
    },
};
use rust_decimal::Decimal;

/// The first invoice number allocated each year.
const INVOICE_SEQUENCE_START: u32 = 1000;

#[derive(Default)]
struct Tables {
    bookings: HashMap<BookingId, Booking>,
    clients: HashMap<ClientId, Client>,
    // Vecs where the engine depends on insertion order (matching ties) or
    // the tables are small scan-everything sets anyway.
    cleaners: Vec<Cleaner>,
    addresses: HashMap<AddressId, Address>,
    payments: Vec<Payment>,
    invoices: Vec<Invoice>,
    invoice_sequences: HashMap<i32, u32>,
    payouts: Vec<Payout>,
    disputes: Vec<Dispute>,
    reviews: Vec<Review>,
    availability: Vec<AvailabilitySlot>,
    checkins: Vec<Checkin>,
    settings: Option<PlatformSettings>,
}

/// See the module docs.
#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding helpers for tests and local composition --- //

    pub fn seed_client(&self, client: Client) {
        self.write().clients.insert(client.id, client);
    }

    pub fn seed_cleaner(&self, cleaner: Cleaner) {
        self.write().cleaners.push(cleaner);
    }

    pub fn seed_address(&self, address: Address) {
        self.write().addresses.insert(address.id, address);
    }

    /// Seeds a booking row verbatim, bypassing the service layer. Tests
    /// use this to construct historical states (completed months, prior
    /// client bookings).
    pub fn seed_booking(&self, booking: Booking) {
        self.write().bookings.insert(booking.id, booking);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("mem store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("mem store lock poisoned")
    }
}

// --- BookingStore --- //

#[async_trait]
impl BookingStore for MemStore {
    async fn insert(&self, booking: &Booking) -> Result<(), Error> {
        let mut tables = self.write();
        let code_taken = tables.bookings.values().any(|existing| {
            existing.reservation_code == booking.reservation_code
        });
        if code_taken {
            return Err(Error::Conflict(format!(
                "reservation code {} already exists",
                booking.reservation_code
            )));
        }
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, Error> {
        Ok(self.read().bookings.get(&id).cloned())
    }

    async fn update(
        &self,
        booking: &Booking,
        expected_status: BookingStatus,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let stored = tables
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| Error::not_found("booking", booking.id))?;
        if stored.status != expected_status {
            return Err(Error::stale("booking", booking.id));
        }
        *stored = booking.clone();
        Ok(())
    }

    async fn list_pending_created_before(
        &self,
        cutoff: TimestampMs,
    ) -> Result<Vec<Booking>, Error> {
        let mut stale = self
            .read()
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Pending && b.created_at < cutoff
            })
            .cloned()
            .collect::<Vec<_>>();
        stale.sort_by_key(|b| b.created_at);
        Ok(stale)
    }

    async fn list_completed_between(
        &self,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<Booking>, Error> {
        let mut completed = self
            .read()
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Completed
                    && b.completed_at
                        .is_some_and(|at| at >= start && at <= end)
            })
            .cloned()
            .collect::<Vec<_>>();
        completed.sort_by_key(|b| b.completed_at);
        Ok(completed)
    }

    async fn count_active_for_cleaner(
        &self,
        cleaner_id: CleanerId,
    ) -> Result<usize, Error> {
        let active = self
            .read()
            .bookings
            .values()
            .filter(|b| {
                b.cleaner_id == Some(cleaner_id)
                    && matches!(
                        b.status,
                        BookingStatus::Pending
                            | BookingStatus::Confirmed
                            | BookingStatus::InProgress
                    )
            })
            .count();
        Ok(active)
    }

    async fn count_completed_for_client_before(
        &self,
        client_id: ClientId,
        before: TimestampMs,
    ) -> Result<usize, Error> {
        let count = self
            .read()
            .bookings
            .values()
            .filter(|b| {
                b.client_id == client_id
                    && b.status == BookingStatus::Completed
                    && b.completed_at.is_some_and(|at| at < before)
            })
            .count();
        Ok(count)
    }
}

// --- ClientStore --- //

#[async_trait]
impl ClientStore for MemStore {
    async fn get(&self, id: ClientId) -> Result<Option<Client>, Error> {
        Ok(self.read().clients.get(&id).cloned())
    }

    async fn total_bookings(&self, id: ClientId) -> Result<u32, Error> {
        Ok(self
            .read()
            .clients
            .get(&id)
            .map(|c| c.total_bookings)
            .unwrap_or(0))
    }

    async fn record_completed_booking(
        &self,
        id: ClientId,
        spent: Amount,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let client = tables
            .clients
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("client", id))?;
        client.total_bookings += 1;
        client.total_spent = client.total_spent + spent;
        Ok(())
    }
}

// --- CleanerStore --- //

#[async_trait]
impl CleanerStore for MemStore {
    async fn get(&self, id: CleanerId) -> Result<Option<Cleaner>, Error> {
        Ok(self
            .read()
            .cleaners
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_matchable(&self) -> Result<Vec<Cleaner>, Error> {
        Ok(self
            .read()
            .cleaners
            .iter()
            .filter(|c| c.is_matchable())
            .cloned()
            .collect())
    }

    async fn record_completed_job(
        &self,
        id: CleanerId,
        earnings: Amount,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let cleaner = tables
            .cleaners
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("cleaner", id))?;
        cleaner.total_jobs += 1;
        cleaner.total_earnings = cleaner.total_earnings + earnings;
        Ok(())
    }

}

// --- AddressStore --- //

#[async_trait]
impl AddressStore for MemStore {
    async fn get(&self, id: AddressId) -> Result<Option<Address>, Error> {
        Ok(self.read().addresses.get(&id).cloned())
    }

    async fn upsert(&self, address: &Address) -> Result<(), Error> {
        let mut tables = self.write();
        // Pre-write rule: at most one default per user.
        if address.is_default {
            for other in tables.addresses.values_mut() {
                if other.user_id == address.user_id
                    && other.id != address.id
                {
                    other.is_default = false;
                }
            }
        }
        tables.addresses.insert(address.id, address.clone());
        Ok(())
    }

    async fn set_coordinates(
        &self,
        id: AddressId,
        coordinates: GeoPoint,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let address = tables
            .addresses
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("address", id))?;
        address.coordinates = Some(coordinates);
        Ok(())
    }
}

// --- PaymentStore --- //

#[async_trait]
impl PaymentStore for MemStore {
    async fn insert(&self, payment: &Payment) -> Result<(), Error> {
        self.write().payments.push(payment.clone());
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, Error> {
        Ok(self
            .read()
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn update(
        &self,
        payment: &Payment,
        expected_status: PaymentStatus,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let stored = tables
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| Error::not_found("payment", payment.id))?;
        if stored.status != expected_status {
            return Err(Error::stale("payment", payment.id));
        }
        *stored = payment.clone();
        Ok(())
    }

    async fn list_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, Error> {
        Ok(self
            .read()
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

// --- InvoiceStore --- //

#[async_trait]
impl InvoiceStore for MemStore {
    async fn next_invoice_sequence(&self, year: i32) -> Result<u32, Error> {
        let mut tables = self.write();
        let next = tables
            .invoice_sequences
            .entry(year)
            .or_insert(INVOICE_SEQUENCE_START);
        let allocated = *next;
        *next += 1;
        Ok(allocated)
    }

    async fn insert(&self, invoice: &Invoice) -> Result<(), Error> {
        let mut tables = self.write();
        if tables
            .invoices
            .iter()
            .any(|i| i.booking_id == invoice.booking_id)
        {
            return Err(Error::Conflict(format!(
                "booking {} already has an invoice",
                invoice.booking_id
            )));
        }
        tables.invoices.push(invoice.clone());
        Ok(())
    }

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, Error> {
        Ok(self
            .read()
            .invoices
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Invoice>, Error> {
        Ok(self
            .read()
            .invoices
            .iter()
            .find(|i| i.booking_id == booking_id)
            .cloned())
    }

    async fn update(&self, invoice: &Invoice) -> Result<(), Error> {
        let mut tables = self.write();
        let stored = tables
            .invoices
            .iter_mut()
            .find(|i| i.id == invoice.id)
            .ok_or_else(|| Error::not_found("invoice", invoice.id))?;
        *stored = invoice.clone();
        Ok(())
    }
}

// --- PayoutStore --- //

#[async_trait]
impl PayoutStore for MemStore {
    async fn insert(&self, payout: &Payout) -> Result<(), Error> {
        let mut tables = self.write();
        let duplicate = tables.payouts.iter().any(|p| {
            p.cleaner_id == payout.cleaner_id
                && p.period_start == payout.period_start
                && p.period_end == payout.period_end
        });
        if duplicate {
            return Err(Error::Conflict(format!(
                "cleaner {} already has a payout for this period",
                payout.cleaner_id
            )));
        }
        tables.payouts.push(payout.clone());
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>, Error> {
        Ok(self
            .read()
            .payouts
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn update(
        &self,
        payout: &Payout,
        expected_status: PayoutStatus,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let stored = tables
            .payouts
            .iter_mut()
            .find(|p| p.id == payout.id)
            .ok_or_else(|| Error::not_found("payout", payout.id))?;
        if stored.status != expected_status {
            return Err(Error::stale("payout", payout.id));
        }
        *stored = payout.clone();
        Ok(())
    }

    async fn exists_for_period(
        &self,
        cleaner_id: CleanerId,
        period_start: TimestampMs,
        period_end: TimestampMs,
    ) -> Result<bool, Error> {
        Ok(self.read().payouts.iter().any(|p| {
            p.cleaner_id == cleaner_id
                && p.period_start == period_start
                && p.period_end == period_end
        }))
    }
}

// --- DisputeStore --- //

#[async_trait]
impl DisputeStore for MemStore {
    async fn insert(&self, dispute: &Dispute) -> Result<(), Error> {
        let mut tables = self.write();
        if tables
            .disputes
            .iter()
            .any(|d| d.booking_id == dispute.booking_id)
        {
            return Err(Error::Conflict(format!(
                "booking {} already has a dispute",
                dispute.booking_id
            )));
        }
        tables.disputes.push(dispute.clone());
        Ok(())
    }

    async fn get(&self, id: DisputeId) -> Result<Option<Dispute>, Error> {
        Ok(self
            .read()
            .disputes
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Dispute>, Error> {
        Ok(self
            .read()
            .disputes
            .iter()
            .find(|d| d.booking_id == booking_id)
            .cloned())
    }

    async fn update(
        &self,
        dispute: &Dispute,
        expected_status: DisputeStatus,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let stored = tables
            .disputes
            .iter_mut()
            .find(|d| d.id == dispute.id)
            .ok_or_else(|| Error::not_found("dispute", dispute.id))?;
        if stored.status != expected_status {
            return Err(Error::stale("dispute", dispute.id));
        }
        *stored = dispute.clone();
        Ok(())
    }
}

// --- ReviewStore --- //

/// Shared duplicate check; the tables lock makes insert + aggregate fold
/// atomic, standing in for the production transaction.
fn insert_review(tables: &mut Tables, review: &Review) -> Result<(), Error> {
    let duplicate = tables.reviews.iter().any(|r| {
        r.booking_id == review.booking_id
            && r.reviewer_role == review.reviewer_role
    });
    if duplicate {
        return Err(Error::Conflict(format!(
            "booking {} already reviewed by this role",
            review.booking_id
        )));
    }
    tables.reviews.push(review.clone());
    Ok(())
}

#[async_trait]
impl ReviewStore for MemStore {
    async fn insert(&self, review: &Review) -> Result<(), Error> {
        insert_review(&mut self.write(), review)
    }

    async fn insert_client_review(
        &self,
        review: &Review,
        cleaner_id: CleanerId,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        insert_review(&mut tables, review)?;

        let cleaner = tables
            .cleaners
            .iter_mut()
            .find(|c| c.id == cleaner_id)
            .ok_or_else(|| Error::not_found("cleaner", cleaner_id))?;
        let reviews = Decimal::from(cleaner.total_reviews);
        let sum = cleaner.average_rating.unwrap_or(Decimal::ZERO) * reviews
            + Decimal::from(review.rating.stars());
        cleaner.total_reviews += 1;
        cleaner.average_rating =
            Some(sum / Decimal::from(cleaner.total_reviews));
        Ok(())
    }

    async fn list_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Review>, Error> {
        Ok(self
            .read()
            .reviews
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

// --- AvailabilityStore --- //

#[async_trait]
impl AvailabilityStore for MemStore {
    async fn insert(&self, slot: &AvailabilitySlot) -> Result<(), Error> {
        self.write().availability.push(slot.clone());
        Ok(())
    }

    async fn list_for_cleaner(
        &self,
        cleaner_id: CleanerId,
    ) -> Result<Vec<AvailabilitySlot>, Error> {
        Ok(self
            .read()
            .availability
            .iter()
            .filter(|s| s.cleaner_id == cleaner_id)
            .cloned()
            .collect())
    }

    async fn delete(
        &self,
        cleaner_id: CleanerId,
        slot_id: AvailabilitySlotId,
    ) -> Result<(), Error> {
        let mut tables = self.write();
        let before = tables.availability.len();
        tables
            .availability
            .retain(|s| !(s.cleaner_id == cleaner_id && s.id == slot_id));
        if tables.availability.len() == before {
            return Err(Error::not_found("availability slot", slot_id));
        }
        Ok(())
    }
}

// --- CheckinStore --- //

#[async_trait]
impl CheckinStore for MemStore {
    async fn insert(&self, checkin: &Checkin) -> Result<(), Error> {
        let mut tables = self.write();
        if tables
            .checkins
            .iter()
            .any(|c| c.booking_id == checkin.booking_id)
        {
            return Err(Error::Conflict(format!(
                "booking {} already has a check-in",
                checkin.booking_id
            )));
        }
        tables.checkins.push(checkin.clone());
        Ok(())
    }

    async fn get_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Checkin>, Error> {
        Ok(self
            .read()
            .checkins
            .iter()
            .find(|c| c.booking_id == booking_id)
            .cloned())
    }

    async fn update(&self, checkin: &Checkin) -> Result<(), Error> {
        let mut tables = self.write();
        let stored = tables
            .checkins
            .iter_mut()
            .find(|c| c.id == checkin.id)
            .ok_or_else(|| Error::not_found("checkin", checkin.id))?;
        *stored = checkin.clone();
        Ok(())
    }

    async fn get(&self, id: CheckinId) -> Result<Option<Checkin>, Error> {
        Ok(self
            .read()
            .checkins
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }
}

// --- SettingsStore --- //

#[async_trait]
impl SettingsStore for MemStore {
    async fn get(&self) -> Result<Option<PlatformSettings>, Error> {
        Ok(self.read().settings.clone())
    }

    async fn put(&self, settings: &PlatformSettings) -> Result<(), Error> {
        self.write().settings = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use cb_common::ids::UserId;
    use cb_core::models::booking::{
        AddOns, Frequency, ReservationCode, ServiceType, SuppliesBy,
    };
    use rust_decimal::Decimal;

    use super::*;

    fn test_booking(code: &str) -> Booking {
        Booking {
            id: BookingId::generate(),
            reservation_code: ReservationCode::from_parts(2026, code),
            client_id: ClientId::generate(),
            cleaner_id: None,
            address_id: AddressId::generate(),
            service_type: ServiceType::Standard,
            frequency: Frequency::OneTime,
            estimated_hours: Decimal::TWO,
            area_sqm: Decimal::ZERO,
            scheduled_at: None,
            time_preferences: Vec::new(),
            addons: AddOns::default(),
            supplies: SuppliesBy::ClientProvides,
            base_price: Amount::from_ron_u32(100),
            addons_price: Amount::ZERO,
            discount_applied: Amount::ZERO,
            total_price: Amount::from_ron_u32(100),
            platform_fee: Amount::from_ron_u32(10),
            cleaner_payout: Amount::from_ron_u32(90),
            status: BookingStatus::Pending,
            confirmed_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            client_rating: None,
            cleaner_rating: None,
            created_at: TimestampMs::now(),
        }
    }

    #[tokio::test]
    async fn conditional_update_returns_stale_on_status_mismatch() {
        let store = MemStore::new();
        let mut booking = test_booking("AAAAAA");
        BookingStore::insert(&store, &booking).await.unwrap();

        // A transition keyed on the observed status succeeds once.
        booking.status = BookingStatus::Confirmed;
        BookingStore::update(&store, &booking, BookingStatus::Pending)
            .await
            .unwrap();

        // Replaying the same transition is a stale write.
        let result =
            BookingStore::update(&store, &booking, BookingStatus::Pending)
                .await;
        assert!(matches!(result, Err(Error::Stale { .. })));
    }

    #[tokio::test]
    async fn reservation_code_unique_index() {
        let store = MemStore::new();
        let booking = test_booking("AAAAAA");
        BookingStore::insert(&store, &booking).await.unwrap();

        let mut duplicate = test_booking("AAAAAA");
        duplicate.id = BookingId::generate();
        let result = BookingStore::insert(&store, &duplicate).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn invoice_sequence_starts_at_1000_per_year() {
        let store = MemStore::new();
        assert_eq!(store.next_invoice_sequence(2026).await.unwrap(), 1000);
        assert_eq!(store.next_invoice_sequence(2026).await.unwrap(), 1001);
        assert_eq!(store.next_invoice_sequence(2027).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn default_address_clears_siblings() {
        let store = MemStore::new();
        let user_id = UserId::generate();

        let mut first = Address {
            id: AddressId::generate(),
            user_id,
            street: "Strada A 1".to_owned(),
            city: "București".to_owned(),
            county: "Ilfov".to_owned(),
            postal_code: None,
            is_default: true,
            coordinates: None,
            created_at: TimestampMs::now(),
        };
        store.upsert(&first).await.unwrap();

        let mut second = first.clone();
        second.id = AddressId::generate();
        second.street = "Strada B 2".to_owned();
        store.upsert(&second).await.unwrap();

        first = AddressStore::get(&store, first.id).await.unwrap().unwrap();
        assert!(!first.is_default);
        let second = AddressStore::get(&store, second.id)
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_default);
    }

    #[tokio::test]
    async fn client_review_folds_cleaner_aggregate() {
        use cb_common::ids::ReviewId;
        use cb_core::models::review::{Rating, Review, ReviewerRole};

        let store = MemStore::new();
        let cleaner = Cleaner {
            id: CleanerId::generate(),
            user_id: UserId::generate(),
            email: None,
            display_name: "Ioana".to_owned(),
            approval_status:
                cb_core::models::cleaner::ApprovalStatus::Approved,
            is_active: true,
            is_available: true,
            specializations: Vec::new(),
            languages: Vec::new(),
            total_jobs: 0,
            total_earnings: Amount::ZERO,
            average_rating: None,
            total_reviews: 0,
            location: None,
            city: None,
            county: None,
            payout_account: None,
            created_at: TimestampMs::now(),
        };
        let id = cleaner.id;
        store.seed_cleaner(cleaner);

        let review = |booking_id, stars| Review {
            id: ReviewId::generate(),
            booking_id,
            reviewer_role: ReviewerRole::Client,
            rating: Rating::new(stars).unwrap(),
            comment: None,
            created_at: TimestampMs::now(),
        };

        let b1 = BookingId::generate();
        let b2 = BookingId::generate();
        store
            .insert_client_review(&review(b1, 5), id)
            .await
            .unwrap();
        store
            .insert_client_review(&review(b2, 4), id)
            .await
            .unwrap();

        let cleaner =
            CleanerStore::get(&store, id).await.unwrap().unwrap();
        assert_eq!(cleaner.total_reviews, 2);
        assert_eq!(
            cleaner.average_rating,
            Some(Decimal::new(45, 1)) // 4.5
        );

        // One review per (booking, role).
        let result = store.insert_client_review(&review(b1, 3), id).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
