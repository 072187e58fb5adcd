//! Bidirectional booking reviews.
//!
//! `reviews` is the authoritative rating surface. A client review updates
//! the cleaner's denormalized `average_rating` / `total_reviews`
//! aggregates atomically with the insert (the store contract carries
//! both in one transaction); cleaner reviews have no aggregate to fold.

use std::sync::Arc;

use cb_common::{
    ids::{BookingId, ReviewId},
    time::TimestampMs,
};
use tracing::{info, instrument};

use crate::{
    error::Error,
    models::{
        booking::BookingStatus,
        review::{Rating, Review, ReviewerRole},
        user::Actor,
    },
    traits::{BookingStore, ReviewStore},
};

pub struct ReviewService {
    reviews: Arc<dyn ReviewStore>,
    bookings: Arc<dyn BookingStore>,
}

impl ReviewService {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        bookings: Arc<dyn BookingStore>,
    ) -> Self {
        Self { reviews, bookings }
    }

    /// Submits a review for a finished booking. Each side of the booking
    /// may review at most once; only the booking's own client and the
    /// assigned cleaner qualify.
    #[instrument(skip(self, actor, comment))]
    pub async fn submit(
        &self,
        actor: Actor,
        booking_id: BookingId,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<Review, Error> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))?;

        // Reviews are only meaningful once the job actually ran; a
        // refunded booking still had a job performed.
        if !matches!(
            booking.status,
            BookingStatus::Completed
                | BookingStatus::Disputed
                | BookingStatus::Refunded
        ) {
            return Err(Error::PolicyViolation(format!(
                "booking {booking_id} cannot be reviewed in status {}",
                booking.status
            )));
        }

        let reviewer_role = match actor {
            Actor::Client(client_id) if client_id == booking.client_id =>
                ReviewerRole::Client,
            Actor::Cleaner(cleaner_id)
                if booking.cleaner_id == Some(cleaner_id) =>
                ReviewerRole::Cleaner,
            _ => {
                return Err(Error::Unauthorized(
                    "only the booking parties may review it".to_owned(),
                ))
            }
        };

        let review = Review {
            id: ReviewId::generate(),
            booking_id,
            reviewer_role,
            rating,
            comment,
            created_at: TimestampMs::now(),
        };

        match reviewer_role {
            ReviewerRole::Client => {
                let cleaner_id = booking.cleaner_id.ok_or_else(|| {
                    Error::Internal(anyhow::anyhow!(
                        "finished booking {booking_id} has no cleaner"
                    ))
                })?;
                self.reviews
                    .insert_client_review(&review, cleaner_id)
                    .await?;
            }
            ReviewerRole::Cleaner => {
                self.reviews.insert(&review).await?;
            }
        }

        info!(
            "Recorded {:?} review ({} stars) for booking {booking_id}",
            reviewer_role,
            rating.stars()
        );
        Ok(review)
    }

    pub async fn list_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Review>, Error> {
        self.reviews.list_for_booking(booking_id).await
    }
}
