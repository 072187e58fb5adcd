//! The pricing engine.
//!
//! A deterministic, pure function of its inputs and the config surface;
//! the only I/O in the whole flow is the caller's first-booking lookup.
//! The composition order is fixed so tests can pin the output:
//!
//! 1. per-service rates table
//! 2. `hours_charged = max(estimated_hours, min_hours)`;
//!    `base = base_per_hour * hours_charged`
//! 3. area component when both area and per-sqm rate are positive
//! 4. add-ons sum
//! 5. time multiplier (weekend * evening * public holiday)
//! 6. `subtotal = (base + area + addons) * time_multiplier`
//! 7. discount percent = first-booking + frequency
//! 8. `after_discount = subtotal - discount`
//! 9. `platform_fee = after_discount * platform_fee_pct / 100`
//! 10. `total = after_discount`; `cleaner_payout = total - platform_fee`
//!
//! All outputs are rounded to two decimal places; `total == platform_fee +
//! cleaner_payout` holds exactly on the rounded values.

use cb_common::amount::Amount;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    config::PricingConfig,
    error::Error,
    models::{
        booking::{AddOns, Frequency, ServiceType, SuppliesBy},
        settings::PlatformSettings,
    },
};

pub mod holidays;

/// The pricing view over startup config plus the optional runtime settings
/// row; reads prefer the row when its field is populated.
#[derive(Copy, Clone)]
pub struct EffectiveRates<'a> {
    config: &'a PricingConfig,
    overrides: Option<&'a PlatformSettings>,
}

impl<'a> EffectiveRates<'a> {
    pub fn new(
        config: &'a PricingConfig,
        overrides: Option<&'a PlatformSettings>,
    ) -> Self {
        Self { config, overrides }
    }

    fn base_per_hour(&self, service_type: ServiceType) -> Amount {
        // The runtime override only redefines the STANDARD hourly rate.
        if service_type == ServiceType::Standard {
            if let Some(base) =
                self.overrides.and_then(|s| s.base_price_per_hour)
            {
                return base;
            }
        }
        self.config.rates(service_type).base_per_hour
    }

    fn weekend_multiplier(&self) -> Decimal {
        self.overrides
            .and_then(|s| s.weekend_multiplier)
            .unwrap_or(self.config.weekend_multiplier)
    }

    fn evening_multiplier(&self) -> Decimal {
        self.overrides
            .and_then(|s| s.evening_multiplier)
            .unwrap_or(self.config.evening_multiplier)
    }

    fn holiday_multiplier(&self) -> Decimal {
        self.overrides
            .and_then(|s| s.holiday_multiplier)
            .unwrap_or(self.config.holiday_multiplier)
    }

    fn platform_fee_pct(&self) -> Decimal {
        self.overrides
            .and_then(|s| s.platform_fee_percent)
            .unwrap_or(self.config.platform_fee_pct)
    }
}

/// Everything the quote depends on besides config.
#[derive(Clone, Debug)]
pub struct PricingInput<'a> {
    pub service_type: ServiceType,
    pub estimated_hours: Decimal,
    pub area_sqm: Decimal,
    pub addons: &'a AddOns,
    pub supplies: SuppliesBy,
    pub frequency: Frequency,
    /// Empty for time_preferences-only bookings; no time multiplier then.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Whether the client counts as first-booking (zero prior bookings of
    /// any status in the client aggregate; no client row counts too).
    pub first_booking: bool,
}

/// The derived monetary fields of a booking, rounded for persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct Quote {
    pub base_price: Amount,
    pub addons_price: Amount,
    pub discount_applied: Amount,
    pub total_price: Amount,
    pub platform_fee: Amount,
    pub cleaner_payout: Amount,
    pub discount_pct: Decimal,
    pub time_multiplier: Decimal,
}

/// Composes a booking price. Pure; identical inputs and identical rates
/// produce identical outputs.
pub fn quote(
    input: &PricingInput<'_>,
    rates: &EffectiveRates<'_>,
) -> Result<Quote, Error> {
    if input.estimated_hours <= Decimal::ZERO {
        return Err(Error::InvalidInput(
            "estimated_hours must be positive".to_owned(),
        ));
    }
    input.addons.validate()?;

    let service_rates = rates.config.rates(input.service_type);

    // 2. Hourly base, charging at least the per-service minimum.
    let hours_charged = input.estimated_hours.max(service_rates.min_hours);
    let base = rates.base_per_hour(input.service_type) * hours_charged;

    // 3. Area component.
    let per_sqm = service_rates.price_per_sqm;
    let area = if input.area_sqm > Decimal::ZERO && !per_sqm.is_zero() {
        per_sqm * input.area_sqm
    } else {
        Amount::ZERO
    };

    // 4. Add-ons.
    let addons = addons_sum(input, &rates.config.addons);

    // 5. Time multiplier.
    let time_multiplier = input
        .scheduled_at
        .map(|at| time_multiplier(at, rates))
        .unwrap_or(Decimal::ONE);

    // 6. Subtotal.
    let base_and_area = base.checked_add(area).ok_or_else(money_overflow)?;
    let subtotal = base_and_area
        .checked_add(addons)
        .and_then(|sum| sum.checked_mul(time_multiplier))
        .ok_or_else(money_overflow)?;

    // 7. Discount.
    let discount_pct = discount_pct(input, rates.config);
    let discount = subtotal.percent(discount_pct);

    // 8.-10. Total, fee, payout.
    let after_discount =
        subtotal.checked_sub(discount).ok_or_else(money_overflow)?;
    let platform_fee = after_discount.percent(rates.platform_fee_pct());

    // Round once at the boundary. The payout is derived from the rounded
    // total and fee so `total == fee + payout` holds exactly.
    let base_price = base_and_area
        .checked_mul(time_multiplier)
        .ok_or_else(money_overflow)?
        .round2();
    let addons_price = addons
        .checked_mul(time_multiplier)
        .ok_or_else(money_overflow)?
        .round2();
    let discount_applied = discount.round2();
    let total_price = after_discount.round2();
    let platform_fee = platform_fee.round2();
    let cleaner_payout = total_price
        .checked_sub(platform_fee)
        .ok_or_else(money_overflow)?;

    Ok(Quote {
        base_price,
        addons_price,
        discount_applied,
        total_price,
        platform_fee,
        cleaner_payout,
        discount_pct,
        time_multiplier,
    })
}

fn money_overflow() -> Error {
    Error::InvalidInput("price composition overflowed".to_owned())
}

fn addons_sum(
    input: &PricingInput<'_>,
    fees: &crate::config::AddonFees,
) -> Amount {
    let addons = input.addons;
    let mut sum = Amount::ZERO;

    if addons.windows {
        sum = sum + fees.per_window * Decimal::from(addons.window_count);
    }
    if addons.carpet {
        sum = sum + fees.carpet_per_sqm * addons.carpet_area_sqm;
    }
    if addons.fridge {
        sum = sum + fees.fridge;
    }
    if addons.oven {
        sum = sum + fees.oven;
    }
    if addons.balcony {
        sum = sum + fees.balcony;
    }
    if input.supplies == SuppliesBy::CleanerProvides {
        sum = sum + fees.cleaner_supplies;
    }

    sum
}

fn time_multiplier(
    at: DateTime<Utc>,
    rates: &EffectiveRates<'_>,
) -> Decimal {
    let mut multiplier = Decimal::ONE;

    let weekday = at.weekday();
    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        multiplier *= rates.weekend_multiplier();
    }
    if at.hour() >= rates.config.evening_start_hour {
        multiplier *= rates.evening_multiplier();
    }
    if holidays::is_public_holiday(at.date_naive()) {
        multiplier *= rates.holiday_multiplier();
    }

    multiplier
}

fn discount_pct(input: &PricingInput<'_>, config: &PricingConfig) -> Decimal {
    let first = if input.first_booking {
        config.discounts.first_booking_pct
    } else {
        dec!(0)
    };
    let frequency = match input.frequency {
        Frequency::OneTime => dec!(0),
        Frequency::Weekly => config.discounts.weekly_pct,
        Frequency::Biweekly => config.discounts.biweekly_pct,
        Frequency::Monthly => config.discounts.monthly_pct,
    };
    first + frequency
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::config::Config;

    fn input(addons: &AddOns) -> PricingInput<'_> {
        PricingInput {
            service_type: ServiceType::Standard,
            estimated_hours: dec!(2),
            area_sqm: dec!(0),
            addons,
            supplies: SuppliesBy::ClientProvides,
            frequency: Frequency::OneTime,
            scheduled_at: None,
            first_booking: false,
        }
    }

    #[test]
    fn first_booking_standard_weekday() {
        let config = Config::default();
        let rates = EffectiveRates::new(&config.pricing, None);
        let addons = AddOns::default();

        // Wednesday 2026-08-05 10:00, no holiday.
        let mut input = input(&addons);
        input.scheduled_at =
            Some(Utc.with_ymd_and_hms(2026, 8, 5, 10, 0, 0).unwrap());
        input.first_booking = true;

        let quote = super::quote(&input, &rates).unwrap();
        assert_eq!(quote.base_price, Amount::from_ron_u32(100));
        assert_eq!(quote.addons_price, Amount::ZERO);
        assert_eq!(quote.discount_applied, Amount::from_ron_u32(10));
        assert_eq!(quote.total_price, Amount::from_ron_u32(90));
        assert_eq!(quote.platform_fee, Amount::from_ron_u32(9));
        assert_eq!(quote.cleaner_payout, Amount::from_ron_u32(81));
    }

    #[test]
    fn weekend_evening_repeat_customer() {
        let config = Config::default();
        let rates = EffectiveRates::new(&config.pricing, None);
        let addons = AddOns::default();

        // Saturday 2026-08-08 19:00: weekend 1.2 and evening 1.15 stack.
        let mut input = input(&addons);
        input.estimated_hours = dec!(3);
        input.scheduled_at =
            Some(Utc.with_ymd_and_hms(2026, 8, 8, 19, 0, 0).unwrap());

        let quote = super::quote(&input, &rates).unwrap();
        assert_eq!(quote.time_multiplier, dec!(1.38));
        assert_eq!(
            quote.base_price,
            Amount::try_from_ron(dec!(207.00)).unwrap()
        );
        assert_eq!(quote.discount_applied, Amount::ZERO);
        assert_eq!(
            quote.total_price,
            Amount::try_from_ron(dec!(207.00)).unwrap()
        );
        assert_eq!(
            quote.platform_fee,
            Amount::try_from_ron(dec!(20.70)).unwrap()
        );
        assert_eq!(
            quote.cleaner_payout,
            Amount::try_from_ron(dec!(186.30)).unwrap()
        );
    }

    #[test]
    fn quote_is_deterministic() {
        let config = Config::default();
        let rates = EffectiveRates::new(&config.pricing, None);
        let addons = AddOns {
            windows: true,
            window_count: 4,
            carpet: true,
            carpet_area_sqm: dec!(12),
            fridge: true,
            oven: false,
            balcony: true,
        };

        let mut input = input(&addons);
        input.service_type = ServiceType::DeepCleaning;
        input.estimated_hours = dec!(4.5);
        input.area_sqm = dec!(85);
        input.supplies = SuppliesBy::CleanerProvides;
        input.frequency = Frequency::Biweekly;
        input.scheduled_at =
            Some(Utc.with_ymd_and_hms(2026, 12, 25, 18, 30, 0).unwrap());

        let quote1 = super::quote(&input, &rates).unwrap();
        let quote2 = super::quote(&input, &rates).unwrap();
        assert_eq!(quote1, quote2);

        // total = fee + payout holds exactly on the rounded values.
        assert_eq!(
            quote1.total_price,
            quote1.platform_fee + quote1.cleaner_payout
        );
    }

    #[test]
    fn min_hours_floor_applies() {
        let config = Config::default();
        let rates = EffectiveRates::new(&config.pricing, None);
        let addons = AddOns::default();

        let mut input = input(&addons);
        input.estimated_hours = dec!(1);

        // Charged for 2 hours despite the 1-hour estimate.
        let quote = super::quote(&input, &rates).unwrap();
        assert_eq!(quote.base_price, Amount::from_ron_u32(100));
    }

    #[test]
    fn settings_row_overrides_config() {
        let config = Config::default();
        let settings = PlatformSettings {
            base_price_per_hour: Some(Amount::from_ron_u32(60)),
            weekend_multiplier: Some(dec!(1.5)),
            ..PlatformSettings::default()
        };
        let rates = EffectiveRates::new(&config.pricing, Some(&settings));

        // Saturday morning.
        let addons = AddOns::default();
        let mut input = input(&addons);
        input.scheduled_at =
            Some(Utc.with_ymd_and_hms(2026, 8, 8, 10, 0, 0).unwrap());

        let quote = super::quote(&input, &rates).unwrap();
        // 60/h * 2h * 1.5 weekend
        assert_eq!(quote.base_price, Amount::from_ron_u32(180));
    }

    #[test]
    fn no_schedule_means_no_time_multiplier() {
        let config = Config::default();
        let rates = EffectiveRates::new(&config.pricing, None);
        let addons = AddOns::default();
        let quote = super::quote(&input(&addons), &rates).unwrap();
        assert_eq!(quote.time_multiplier, Decimal::ONE);
    }
}
