//! The singleton platform settings row.

use cb_common::{amount::Amount, time::TimestampMs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Runtime-editable configuration. A single row with a fixed primary key;
/// when present, its populated fields override the startup
/// [`Config`](crate::config::Config) defaults. Runtime reads prefer the
/// row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Overrides the STANDARD base price per hour.
    pub base_price_per_hour: Option<Amount>,
    pub weekend_multiplier: Option<Decimal>,
    pub evening_multiplier: Option<Decimal>,
    pub holiday_multiplier: Option<Decimal>,
    pub platform_fee_percent: Option<Decimal>,

    /// Feature flags.
    pub maintenance_mode: bool,

    pub updated_at: Option<TimestampMs>,
}
