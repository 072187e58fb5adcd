//! The startup configuration surface.
//!
//! Configuration is a single structured value loaded at startup. The
//! singleton [`PlatformSettings`] row may override base price and
//! multipliers at runtime; runtime reads prefer the row when present (see
//! [`crate::pricing::EffectiveRates`]).
//!
//! [`PlatformSettings`]: crate::models::settings::PlatformSettings

use std::{str::FromStr, time::Duration};

use cb_common::amount::Amount;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::booking::ServiceType;

/// Which deployment environment we're running in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeployEnv {
    /// Local development. The canonical OTP code is always accepted and no
    /// transport is exercised.
    Dev,
    Staging,
    Prod,
}

impl DeployEnv {
    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

impl FromStr for DeployEnv {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "dev" | "development" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Prod),
            _ => Err(anyhow::anyhow!("unknown deploy env: {s}")),
        }
    }
}

/// The per-service-type pricing table row.
#[derive(Copy, Clone, Debug)]
pub struct ServiceRates {
    pub base_per_hour: Amount,
    /// Bookings are charged for at least this many hours.
    pub min_hours: Decimal,
    /// Zero disables the area component.
    pub price_per_sqm: Amount,
}

/// Fixed add-on fees.
#[derive(Copy, Clone, Debug)]
pub struct AddonFees {
    pub per_window: Amount,
    pub carpet_per_sqm: Amount,
    pub fridge: Amount,
    pub oven: Amount,
    pub balcony: Amount,
    /// Charged when the cleaner brings the supplies.
    pub cleaner_supplies: Amount,
}

/// Discount percentages.
#[derive(Copy, Clone, Debug)]
pub struct DiscountConfig {
    pub first_booking_pct: Decimal,
    pub weekly_pct: Decimal,
    pub biweekly_pct: Decimal,
    pub monthly_pct: Decimal,
}

/// Everything the pricing engine reads.
#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub standard: ServiceRates,
    pub deep_cleaning: ServiceRates,
    pub office: ServiceRates,
    pub post_renovation: ServiceRates,
    pub move_in_out: ServiceRates,

    pub addons: AddonFees,

    pub weekend_multiplier: Decimal,
    pub evening_multiplier: Decimal,
    /// Hour of day (UTC) from which the evening multiplier applies.
    pub evening_start_hour: u32,
    pub holiday_multiplier: Decimal,

    pub discounts: DiscountConfig,

    /// Percent of the discounted total retained by the platform.
    pub platform_fee_pct: Decimal,
    /// Payout fee tier for repeat-customer bookings.
    pub repeat_client_fee_pct: Decimal,
}

impl PricingConfig {
    pub fn rates(&self, service_type: ServiceType) -> &ServiceRates {
        match service_type {
            ServiceType::Standard => &self.standard,
            ServiceType::DeepCleaning => &self.deep_cleaning,
            ServiceType::Office => &self.office,
            ServiceType::PostRenovation => &self.post_renovation,
            ServiceType::MoveInOut => &self.move_in_out,
        }
    }
}

/// Scheduling bounds for booking creation and cancellation.
#[derive(Copy, Clone, Debug)]
pub struct SchedulingConfig {
    /// A concrete schedule must be at least this far in the future.
    pub min_advance_hours: u64,
    /// ... and at most this far.
    pub max_advance_days: u64,
    /// Service-hours window: `[service_start_hour, service_end_hour)`.
    pub service_start_hour: u32,
    pub service_end_hour: u32,
    /// Cancellations closer to the schedule than this are tagged late.
    pub cancellation_free_hours: u64,
    /// PENDING bookings older than this are swept to CANCELLED.
    pub pending_expiration_hours: u64,
    /// How often the expiration sweeper wakes up.
    pub sweep_interval: Duration,
}

/// Matching and dispatch knobs.
#[derive(Copy, Clone, Debug)]
pub struct MatchingConfig {
    /// How many top candidates get notified in notify dispatch mode.
    pub notify_top_n: usize,
    /// Auto-assign fires when the best candidate scores at least this.
    pub auto_assign_threshold: f64,
}

/// Outbound provider call policy.
#[derive(Copy, Clone, Debug)]
pub struct ProviderConfig {
    pub http_timeout: Duration,
    /// Total attempts (first try + retries) per provider call.
    pub max_attempts: u32,
    /// Maximum tax-authority submission attempts per invoice.
    pub tax_max_attempts: u32,
}

/// The complete startup configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub deploy_env: DeployEnv,
    pub pricing: PricingConfig,
    pub scheduling: SchedulingConfig,
    pub matching: MatchingConfig,
    pub provider: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deploy_env: DeployEnv::Dev,
            pricing: PricingConfig {
                standard: ServiceRates {
                    base_per_hour: Amount::from_ron_u32(50),
                    min_hours: dec!(2),
                    price_per_sqm: Amount::ZERO,
                },
                deep_cleaning: ServiceRates {
                    base_per_hour: Amount::from_ron_u32(70),
                    min_hours: dec!(3),
                    price_per_sqm: Amount::from_ron_u32(2),
                },
                office: ServiceRates {
                    base_per_hour: Amount::from_ron_u32(60),
                    min_hours: dec!(3),
                    price_per_sqm: Amount::from_ron_u32(1),
                },
                post_renovation: ServiceRates {
                    base_per_hour: Amount::from_ron_u32(80),
                    min_hours: dec!(4),
                    price_per_sqm: Amount::from_ron_u32(3),
                },
                move_in_out: ServiceRates {
                    base_per_hour: Amount::from_ron_u32(75),
                    min_hours: dec!(3),
                    price_per_sqm: Amount::from_ron_u32(2),
                },
                addons: AddonFees {
                    per_window: Amount::from_ron_u32(10),
                    carpet_per_sqm: Amount::from_ron_u32(5),
                    fridge: Amount::from_ron_u32(40),
                    oven: Amount::from_ron_u32(50),
                    balcony: Amount::from_ron_u32(30),
                    cleaner_supplies: Amount::from_ron_u32(25),
                },
                weekend_multiplier: dec!(1.2),
                evening_multiplier: dec!(1.15),
                evening_start_hour: 18,
                holiday_multiplier: dec!(1.5),
                discounts: DiscountConfig {
                    first_booking_pct: dec!(10),
                    weekly_pct: dec!(15),
                    biweekly_pct: dec!(10),
                    monthly_pct: dec!(5),
                },
                platform_fee_pct: dec!(10),
                repeat_client_fee_pct: dec!(2),
            },
            scheduling: SchedulingConfig {
                min_advance_hours: 2,
                max_advance_days: 30,
                service_start_hour: 8,
                service_end_hour: 20,
                cancellation_free_hours: 24,
                pending_expiration_hours: 24,
                sweep_interval: Duration::from_secs(15 * 60),
            },
            matching: MatchingConfig {
                notify_top_n: 5,
                auto_assign_threshold: 85.0,
            },
            provider: ProviderConfig {
                http_timeout: Duration::from_secs(30),
                max_attempts: 3,
                tax_max_attempts: 3,
            },
        }
    }
}

impl Config {
    /// The production defaults with `CLEANBOOK_*` env overrides applied.
    /// Call once at startup; reads a `.env` file if present.
    pub fn from_env() -> anyhow::Result<Self> {
        // Tolerate a missing .env file; env vars may be set directly.
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(raw) = std::env::var("CLEANBOOK_ENV") {
            config.deploy_env = DeployEnv::from_str(&raw)?;
        }
        if let Some(hours) = env_u64("CLEANBOOK_MIN_ADVANCE_HOURS")? {
            config.scheduling.min_advance_hours = hours;
        }
        if let Some(days) = env_u64("CLEANBOOK_MAX_ADVANCE_DAYS")? {
            config.scheduling.max_advance_days = days;
        }
        if let Some(hours) = env_u64("CLEANBOOK_CANCELLATION_FREE_HOURS")? {
            config.scheduling.cancellation_free_hours = hours;
        }
        if let Some(hours) = env_u64("CLEANBOOK_PENDING_EXPIRATION_HOURS")? {
            config.scheduling.pending_expiration_hours = hours;
        }

        Ok(config)
    }
}

fn env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("{name} must be an integer, got {raw:?}")
            })?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
