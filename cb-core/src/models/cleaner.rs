//! Cleaner profiles.

use cb_common::{
    amount::Amount,
    ids::{CleanerId, UserId},
    time::TimestampMs,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::{error::Error, geo::GeoPoint, models::booking::ServiceType};

/// Moderation state of a cleaner application. Only `Approved` cleaners are
/// eligible for matching.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A validated entry of the JSON-bearing `specializations` column.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[derive(EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Specialization {
    Standard,
    DeepCleaning,
    Office,
    PostRenovation,
    MoveInOut,
    Windows,
}

impl Specialization {
    /// The canonical specialization credited by the matching skill
    /// dimension for each service type.
    pub fn canonical_for(service_type: ServiceType) -> Self {
        match service_type {
            ServiceType::Standard => Self::Standard,
            ServiceType::DeepCleaning => Self::DeepCleaning,
            ServiceType::Office => Self::Office,
            ServiceType::PostRenovation => Self::PostRenovation,
            ServiceType::MoveInOut => Self::MoveInOut,
        }
    }
}

/// Parse and validate a raw `specializations` JSON array from the store.
pub fn parse_specializations(
    raw: &[String],
) -> Result<Vec<Specialization>, Error> {
    raw.iter()
        .map(|s| {
            s.parse::<Specialization>().map_err(|_| {
                Error::InvalidInput(format!("unknown specialization: {s}"))
            })
        })
        .collect()
}

/// An approved worker profile eligible for matching and assignment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cleaner {
    pub id: CleanerId,
    /// The owning user. Exactly one cleaner profile per user.
    pub user_id: UserId,
    /// Contact snapshot materialized from the owning user row.
    pub email: Option<String>,
    pub display_name: String,

    pub approval_status: ApprovalStatus,
    pub is_active: bool,
    pub is_available: bool,

    pub specializations: Vec<Specialization>,
    pub languages: Vec<String>,

    // Aggregated stats, denormalized from completed bookings and reviews.
    pub total_jobs: u32,
    pub total_earnings: Amount,
    /// Average of client review ratings, 1.0..=5.0; empty until the first
    /// review lands.
    pub average_rating: Option<Decimal>,
    pub total_reviews: u32,

    pub location: Option<GeoPoint>,
    pub city: Option<String>,
    pub county: Option<String>,

    /// Sealed payout account identifier (see `cb_common::seal`); validated
    /// as a Romanian IBAN on plaintext before sealing.
    pub payout_account: Option<String>,

    pub created_at: TimestampMs,
}

impl Cleaner {
    /// Whether this cleaner may appear in matching results at all.
    pub fn is_matchable(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
            && self.is_active
            && self.is_available
    }

    /// Whether this cleaner has completed at least one job.
    pub fn has_history(&self) -> bool {
        self.total_jobs > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn specializations_parse_from_store_strings() {
        let raw = vec![
            "deep_cleaning".to_owned(),
            "windows".to_owned(),
        ];
        let parsed = parse_specializations(&raw).unwrap();
        assert_eq!(
            parsed,
            vec![Specialization::DeepCleaning, Specialization::Windows]
        );

        let bad = vec!["chimney_sweeping".to_owned()];
        assert!(parse_specializations(&bad).is_err());
    }

    #[test]
    fn canonical_specialization_per_service_type() {
        assert_eq!(
            Specialization::canonical_for(ServiceType::MoveInOut),
            Specialization::MoveInOut
        );
    }
}
