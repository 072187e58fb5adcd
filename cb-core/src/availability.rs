//! Availability slot management.
//!
//! Thin CRUD over the availability store; all shape validation (exactly
//! one of day-of-week / specific-date per type, start before end) lives in
//! the [`AvailabilitySlot`] constructors. The coverage logic the matching
//! engine consumes lives on the model as well.

use std::sync::Arc;

use cb_common::ids::{AvailabilitySlotId, CleanerId};
use chrono::{NaiveDate, NaiveTime};

use crate::{
    error::Error,
    models::{availability::AvailabilitySlot, cleaner::ApprovalStatus},
    traits::{AvailabilityStore, CleanerStore},
};

pub struct AvailabilityService {
    availability: Arc<dyn AvailabilityStore>,
    cleaners: Arc<dyn CleanerStore>,
}

impl AvailabilityService {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        cleaners: Arc<dyn CleanerStore>,
    ) -> Self {
        Self {
            availability,
            cleaners,
        }
    }

    pub async fn add_recurring(
        &self,
        cleaner_id: CleanerId,
        day_of_week: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<AvailabilitySlot, Error> {
        self.require_approved(cleaner_id).await?;
        let slot = AvailabilitySlot::recurring(
            cleaner_id, day_of_week, start_time, end_time,
        )?;
        self.availability.insert(&slot).await?;
        Ok(slot)
    }

    pub async fn add_one_time(
        &self,
        cleaner_id: CleanerId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<AvailabilitySlot, Error> {
        self.require_approved(cleaner_id).await?;
        let slot = AvailabilitySlot::one_time(
            cleaner_id, date, start_time, end_time,
        )?;
        self.availability.insert(&slot).await?;
        Ok(slot)
    }

    pub async fn add_blocked(
        &self,
        cleaner_id: CleanerId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<AvailabilitySlot, Error> {
        self.require_approved(cleaner_id).await?;
        let slot = AvailabilitySlot::blocked(
            cleaner_id, date, start_time, end_time,
        )?;
        self.availability.insert(&slot).await?;
        Ok(slot)
    }

    pub async fn list(
        &self,
        cleaner_id: CleanerId,
    ) -> Result<Vec<AvailabilitySlot>, Error> {
        self.availability.list_for_cleaner(cleaner_id).await
    }

    pub async fn remove(
        &self,
        cleaner_id: CleanerId,
        slot_id: AvailabilitySlotId,
    ) -> Result<(), Error> {
        self.availability.delete(cleaner_id, slot_id).await
    }

    /// Only approved cleaner profiles may manage availability.
    async fn require_approved(
        &self,
        cleaner_id: CleanerId,
    ) -> Result<(), Error> {
        let cleaner = self
            .cleaners
            .get(cleaner_id)
            .await?
            .ok_or_else(|| Error::not_found("cleaner", cleaner_id))?;
        if cleaner.approval_status != ApprovalStatus::Approved {
            return Err(Error::Unauthorized(
                "cleaner profile is not approved".to_owned(),
            ));
        }
        Ok(())
    }
}
