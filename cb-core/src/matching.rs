//! Cleaner matching and dispatch.
//!
//! Given a booking, produce a ranked list of APPROVED and available cleaners
//! scored in `[0, 100]` across five capped dimensions, then either notify
//! the top candidates or auto-assign the best one. Matching is invoked
//! asynchronously from booking creation; each booking is an independent
//! unit of work with no cross-booking ordering, and the notification
//! fanout is parallel per candidate.

use std::sync::Arc;

use cb_common::ids::BookingId;
use futures::future;
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, instrument, warn};

use crate::{
    app::LateBound,
    booking::BookingService,
    config::MatchingConfig,
    error::Error,
    geo::haversine_km,
    models::{
        address::Address,
        availability::{AvailabilitySlot, ScheduleType},
        booking::{Booking, BookingStatus},
        cleaner::{Cleaner, Specialization},
    },
    traits::{
        AddressStore, AvailabilityStore, BookingStore, CleanerStore,
        EmailApi, EmailMessage,
    },
};

// --- Scores --- //

/// Per-dimension breakdown of a candidate's score. The dimension maxima
/// are fixed: distance 30, availability 25, skill 20, performance 15,
/// workload 10.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MatchScore {
    pub distance: f64,
    pub availability: f64,
    pub skill: f64,
    pub performance: f64,
    pub workload: f64,
}

impl MatchScore {
    pub fn total(&self) -> f64 {
        self.distance
            + self.availability
            + self.skill
            + self.performance
            + self.workload
    }
}

/// A scored candidate. Ranking is descending by total score; ties keep
/// the store's insertion order.
#[derive(Clone, Debug)]
pub struct RankedCandidate {
    pub cleaner: Cleaner,
    pub score: MatchScore,
}

/// Scores one cleaner against a booking, or `None` when the cleaner is
/// excluded (no usable availability for the requested time).
pub fn score_candidate(
    booking: &Booking,
    address: &Address,
    cleaner: &Cleaner,
    slots: &[AvailabilitySlot],
    active_bookings: usize,
) -> Option<MatchScore> {
    let availability = availability_score(booking, slots)?;

    Some(MatchScore {
        distance: distance_score(address, cleaner),
        availability,
        skill: skill_score(booking, cleaner),
        performance: performance_score(cleaner),
        workload: workload_score(active_bookings, cleaner.has_history()),
    })
}

/// Distance dimension (max 30): haversine buckets when both sides have
/// coordinates, otherwise a city/county fallback.
fn distance_score(address: &Address, cleaner: &Cleaner) -> f64 {
    if let (Some(a), Some(b)) = (address.coordinates, cleaner.location) {
        let km = haversine_km(a, b);
        return match km {
            km if km <= 5.0 => 30.0,
            km if km <= 10.0 => 25.0,
            km if km <= 15.0 => 20.0,
            km if km <= 25.0 => 15.0,
            km if km <= 40.0 => 10.0,
            _ => 5.0,
        };
    }

    let same = |lhs: &str, rhs: &Option<String>| {
        rhs.as_deref()
            .is_some_and(|rhs| rhs.eq_ignore_ascii_case(lhs))
    };
    if same(&address.city, &cleaner.city) {
        25.0
    } else if same(&address.county, &cleaner.county) {
        15.0
    } else {
        5.0
    }
}

/// Availability dimension (max 25). `None` excludes the cleaner: either
/// there are no slots at all, or a BLOCKED window covers the scheduled
/// time.
fn availability_score(
    booking: &Booking,
    slots: &[AvailabilitySlot],
) -> Option<f64> {
    if slots.is_empty() {
        return None;
    }

    let Some(scheduled_at) = booking.scheduled_at else {
        // Preference-only bookings can't be matched against concrete
        // windows yet; having any availability scores the baseline.
        return Some(10.0);
    };

    let blocked = slots.iter().any(|slot| {
        slot.schedule_type == ScheduleType::Blocked
            && slot.covers(scheduled_at)
    });
    if blocked {
        return None;
    }

    let one_time_match = slots.iter().any(|slot| {
        slot.schedule_type == ScheduleType::OneTime
            && slot.covers(scheduled_at)
    });
    if one_time_match {
        return Some(25.0);
    }

    let recurring_match = slots.iter().any(|slot| {
        slot.schedule_type == ScheduleType::Recurring
            && slot.covers(scheduled_at)
    });
    if recurring_match {
        return Some(20.0);
    }

    Some(10.0)
}

/// Skill dimension (max 20): base 10 for any approved cleaner, +10 for
/// the service type's canonical specialization, +2 for a windows
/// specialization on window bookings, +2 versatility bonus at three or
/// more specializations.
fn skill_score(booking: &Booking, cleaner: &Cleaner) -> f64 {
    let mut score: f64 = 10.0;

    let canonical = Specialization::canonical_for(booking.service_type);
    if cleaner.specializations.contains(&canonical) {
        score += 10.0;
    }
    if booking.addons.windows
        && cleaner.specializations.contains(&Specialization::Windows)
    {
        score += 2.0;
    }
    if cleaner.specializations.len() >= 3 {
        score += 2.0;
    }

    score.min(20.0)
}

/// Performance dimension (max 15): rating component `(avg/5)*10` with a
/// neutral 5 when unrated, plus experience steps.
fn performance_score(cleaner: &Cleaner) -> f64 {
    let rating = cleaner
        .average_rating
        .and_then(|avg| avg.to_f64())
        .map(|avg| avg / 5.0 * 10.0)
        .unwrap_or(5.0);

    let experience = match cleaner.total_jobs {
        jobs if jobs >= 100 => 5.0,
        jobs if jobs >= 50 => 4.0,
        jobs if jobs >= 20 => 3.0,
        jobs if jobs >= 10 => 2.0,
        jobs if jobs >= 5 => 1.0,
        _ => 0.5,
    };

    (rating + experience).min(15.0)
}

/// Workload dimension (max 10), favoring idle cleaners with history.
fn workload_score(active_bookings: usize, has_history: bool) -> f64 {
    match (active_bookings, has_history) {
        (0, true) => 10.0,
        (0, false) => 8.0,
        (1, _) => 9.0,
        (2, _) => 7.0,
        (3, _) => 5.0,
        (4, _) => 3.0,
        _ => 1.0,
    }
}

// --- The engine --- //

pub struct MatchingEngine {
    config: MatchingConfig,
    bookings: Arc<dyn BookingStore>,
    cleaners: Arc<dyn CleanerStore>,
    addresses: Arc<dyn AddressStore>,
    availability: Arc<dyn AvailabilityStore>,
    email_api: Arc<dyn EmailApi>,
    /// Late-bound: the booking service holds this engine in turn. Bound
    /// once by the composition root before any dispatch runs.
    booking_service: LateBound<BookingService>,
}

impl MatchingEngine {
    pub fn new(
        config: MatchingConfig,
        bookings: Arc<dyn BookingStore>,
        cleaners: Arc<dyn CleanerStore>,
        addresses: Arc<dyn AddressStore>,
        availability: Arc<dyn AvailabilityStore>,
        email_api: Arc<dyn EmailApi>,
    ) -> Self {
        Self {
            config,
            bookings,
            cleaners,
            addresses,
            availability,
            email_api,
            booking_service: LateBound::unset(),
        }
    }

    /// Binds the booking service. Called once by the composition root.
    pub fn bind_booking_service(&self, service: Arc<BookingService>) {
        self.booking_service.bind(service);
    }

    /// Produces the ranked candidate list for a booking.
    #[instrument(skip(self))]
    pub async fn match_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<RankedCandidate>, Error> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))?;
        let address = self
            .addresses
            .get(booking.address_id)
            .await?
            .ok_or_else(|| {
                Error::not_found("address", booking.address_id)
            })?;

        let mut ranked = Vec::new();
        for cleaner in self.cleaners.list_matchable().await? {
            let slots =
                self.availability.list_for_cleaner(cleaner.id).await?;
            let active =
                self.bookings.count_active_for_cleaner(cleaner.id).await?;

            if let Some(score) = score_candidate(
                &booking, &address, &cleaner, &slots, active,
            ) {
                ranked.push(RankedCandidate { cleaner, score });
            }
        }

        // Stable sort keeps insertion order among equal scores.
        ranked.sort_by(|a, b| {
            b.score
                .total()
                .partial_cmp(&a.score.total())
                .expect("Scores are never NaN")
        });

        Ok(ranked)
    }

    /// The dispatch entrypoint invoked after booking creation: auto-assign
    /// when the best candidate clears the threshold, otherwise notify the
    /// top N candidates.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, booking_id: BookingId) -> Result<(), Error> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))?;
        if booking.status != BookingStatus::Pending {
            // Claimed or cancelled since creation; nothing to dispatch.
            return Ok(());
        }

        let ranked = self.match_booking(booking_id).await?;
        let Some(best) = ranked.first() else {
            info!("No eligible cleaners for booking {booking_id}");
            return Ok(());
        };

        if best.score.total() >= self.config.auto_assign_threshold {
            let cleaner_id = best.cleaner.id;
            let booking_service = self.booking_service.get()?;
            match booking_service.auto_assign(booking_id, cleaner_id).await
            {
                Ok(_) => {
                    info!(
                        "Auto-assigned cleaner {cleaner_id} to booking \
                         {booking_id} (score {:.1})",
                        best.score.total()
                    );
                    return Ok(());
                }
                Err(Error::Conflict(_)) => {
                    // Another path claimed the booking first; that's fine.
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        self.notify_candidates(&booking, &ranked).await;
        Ok(())
    }

    /// Fire-and-forget notification fanout, parallel per candidate.
    async fn notify_candidates(
        &self,
        booking: &Booking,
        ranked: &[RankedCandidate],
    ) {
        let sends = ranked
            .iter()
            .take(self.config.notify_top_n)
            .filter_map(|candidate| {
                let email = candidate.cleaner.email.as_deref()?;
                let subject = format!(
                    "New {} job: {}",
                    booking.service_type.as_str(),
                    booking.reservation_code,
                );
                let text = format!(
                    "A new booking ({}) matching your profile is \
                     available. Open the app to accept it.",
                    booking.reservation_code,
                );
                let html = format!("<p>{text}</p>");
                let message = EmailMessage::Raw {
                    to: email.to_owned(),
                    subject,
                    html,
                    text,
                };
                let cleaner_id = candidate.cleaner.id;
                let email_api = self.email_api.clone();
                Some(async move {
                    if let Err(e) = email_api.send(&message).await {
                        warn!(
                            "Failed to notify cleaner {cleaner_id}: {e:#}"
                        );
                    }
                })
            })
            .collect::<Vec<_>>();

        let notified = sends.len();
        future::join_all(sends).await;
        info!(
            "Notified {notified} candidates for booking {}",
            booking.id
        );
    }
}

#[cfg(test)]
mod test {
    use cb_common::{
        amount::Amount,
        ids::{
            AddressId, BookingId, CleanerId, ClientId, UserId,
        },
        time::TimestampMs,
    };
    use chrono::{NaiveTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        geo::GeoPoint,
        models::booking::{
            AddOns, Frequency, ReservationCode, ServiceType, SuppliesBy,
        },
        models::cleaner::ApprovalStatus,
    };

    fn test_booking(scheduled: Option<chrono::DateTime<Utc>>) -> Booking {
        Booking {
            id: BookingId::generate(),
            reservation_code: ReservationCode::from_parts(2026, "TESTAA"),
            client_id: ClientId::generate(),
            cleaner_id: None,
            address_id: AddressId::generate(),
            service_type: ServiceType::Standard,
            frequency: Frequency::OneTime,
            estimated_hours: dec!(2),
            area_sqm: dec!(0),
            scheduled_at: scheduled,
            time_preferences: Vec::new(),
            addons: AddOns::default(),
            supplies: SuppliesBy::ClientProvides,
            base_price: Amount::from_ron_u32(100),
            addons_price: Amount::ZERO,
            discount_applied: Amount::ZERO,
            total_price: Amount::from_ron_u32(100),
            platform_fee: Amount::from_ron_u32(10),
            cleaner_payout: Amount::from_ron_u32(90),
            status: crate::models::booking::BookingStatus::Pending,
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

    fn test_address(coordinates: Option<GeoPoint>) -> Address {
        Address {
            id: AddressId::generate(),
            user_id: UserId::generate(),
            street: "Strada Exemplu 1".to_owned(),
            city: "București".to_owned(),
            county: "Ilfov".to_owned(),
            postal_code: None,
            is_default: true,
            coordinates,
            created_at: TimestampMs::now(),
        }
    }

    fn test_cleaner() -> Cleaner {
        Cleaner {
            id: CleanerId::generate(),
            user_id: UserId::generate(),
            email: Some("cleaner@example.ro".to_owned()),
            display_name: "Maria".to_owned(),
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

    fn wed_10() -> chrono::DateTime<Utc> {
        // 2026-08-05 is a Wednesday.
        Utc.with_ymd_and_hms(2026, 8, 5, 10, 0, 0).unwrap()
    }

    #[test]
    fn no_availability_excludes_cleaner() {
        let booking = test_booking(Some(wed_10()));
        let address = test_address(None);
        let cleaner = test_cleaner();

        let score =
            score_candidate(&booking, &address, &cleaner, &[], 0);
        assert!(score.is_none());
    }

    #[test]
    fn recurring_coverage_scores_twenty() {
        let booking = test_booking(Some(wed_10()));
        let address = test_address(None);
        let cleaner = test_cleaner();
        let slot = AvailabilitySlot::recurring(
            cleaner.id,
            3, // Wednesday
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
        .unwrap();

        let score =
            score_candidate(&booking, &address, &cleaner, &[slot], 0)
                .unwrap();
        assert_eq!(score.availability, 20.0);
    }

    #[test]
    fn one_time_coverage_beats_recurring() {
        let booking = test_booking(Some(wed_10()));
        let address = test_address(None);
        let cleaner = test_cleaner();
        let slot = AvailabilitySlot::one_time(
            cleaner.id,
            wed_10().date_naive(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        )
        .unwrap();

        let score =
            score_candidate(&booking, &address, &cleaner, &[slot], 0)
                .unwrap();
        assert_eq!(score.availability, 25.0);
    }

    #[test]
    fn blocked_window_excludes_cleaner() {
        let booking = test_booking(Some(wed_10()));
        let address = test_address(None);
        let cleaner = test_cleaner();
        let working = AvailabilitySlot::recurring(
            cleaner.id,
            3,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
        .unwrap();
        let blocked = AvailabilitySlot::blocked(
            cleaner.id,
            wed_10().date_naive(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        )
        .unwrap();

        let score = score_candidate(
            &booking,
            &address,
            &cleaner,
            &[working, blocked],
            0,
        );
        assert!(score.is_none());
    }

    #[test]
    fn distance_buckets() {
        let cluj = GeoPoint::new(46.7712, 23.6236);
        let mut address = test_address(Some(cluj));
        let mut cleaner = test_cleaner();

        // ~1 km away.
        cleaner.location = Some(GeoPoint::new(46.7800, 23.6236));
        assert_eq!(distance_score(&address, &cleaner), 30.0);

        // ~33 km away.
        cleaner.location = Some(GeoPoint::new(47.0712, 23.6236));
        assert_eq!(distance_score(&address, &cleaner), 10.0);

        // City fallback: same city / same county / neither.
        address.coordinates = None;
        cleaner.location = None;
        cleaner.city = Some("bucurești".to_owned());
        assert_eq!(distance_score(&address, &cleaner), 25.0);
        cleaner.city = Some("Cluj-Napoca".to_owned());
        assert_eq!(distance_score(&address, &cleaner), 15.0);
        cleaner.county = Some("Cluj".to_owned());
        assert_eq!(distance_score(&address, &cleaner), 5.0);
    }

    #[test]
    fn skill_score_components() {
        let mut booking = test_booking(Some(wed_10()));
        let mut cleaner = test_cleaner();

        // Base + canonical specialization.
        assert_eq!(skill_score(&booking, &cleaner), 20.0);

        // Base only.
        cleaner.specializations = vec![Specialization::Office];
        assert_eq!(skill_score(&booking, &cleaner), 10.0);

        // Windows bonus requires both the addon and the specialization.
        booking.addons.windows = true;
        booking.addons.window_count = 3;
        cleaner.specializations =
            vec![Specialization::Office, Specialization::Windows];
        assert_eq!(skill_score(&booking, &cleaner), 12.0);

        // Versatility bonus, capped at 20 overall.
        cleaner.specializations = vec![
            Specialization::Standard,
            Specialization::Office,
            Specialization::Windows,
        ];
        assert_eq!(skill_score(&booking, &cleaner), 20.0);
    }

    #[test]
    fn performance_score_components() {
        let mut cleaner = test_cleaner();

        // Unrated newcomer: neutral 5 + 0.5 experience.
        assert_eq!(performance_score(&cleaner), 5.5);

        // 4.5 stars, 60 jobs: 9 + 4.
        cleaner.average_rating = Some(dec!(4.5));
        cleaner.total_jobs = 60;
        assert_eq!(performance_score(&cleaner), 13.0);

        // Cap at 15.
        cleaner.average_rating = Some(dec!(5));
        cleaner.total_jobs = 150;
        assert_eq!(performance_score(&cleaner), 15.0);
    }

    #[test]
    fn workload_table() {
        assert_eq!(workload_score(0, true), 10.0);
        assert_eq!(workload_score(0, false), 8.0);
        assert_eq!(workload_score(1, false), 9.0);
        assert_eq!(workload_score(2, true), 7.0);
        assert_eq!(workload_score(3, true), 5.0);
        assert_eq!(workload_score(4, false), 3.0);
        assert_eq!(workload_score(5, true), 1.0);
        assert_eq!(workload_score(9, false), 1.0);
    }

    #[test]
    fn score_is_deterministic() {
        let booking = test_booking(Some(wed_10()));
        let address = test_address(None);
        let cleaner = test_cleaner();
        let slot = AvailabilitySlot::recurring(
            cleaner.id,
            3,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
        .unwrap();
        let slots = vec![slot];

        let score1 =
            score_candidate(&booking, &address, &cleaner, &slots, 1)
                .unwrap();
        let score2 =
            score_candidate(&booking, &address, &cleaner, &slots, 1)
                .unwrap();
        assert_eq!(score1, score2);
        assert!(score1.total() <= 100.0);
    }
}
