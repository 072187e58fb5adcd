//! Common [`proptest`] strategies.

use proptest::{
    arbitrary::any,
    strategy::Strategy,
};
use rust_decimal::Decimal;

/// An arbitrary `String` quickly sampled from a few representative shapes,
/// instead of proptest's default fully-general (and slow) `any::<String>()`.
pub fn any_string() -> impl Strategy<Value = String> {
    proptest::prop_oneof![
        // The vast majority of strings we see are human-readable ASCII.
        "[A-Za-z0-9 .,-]{0,32}",
        // Occasionally throw in some unicode to keep everyone honest.
        any::<String>(),
    ]
}

/// An arbitrary `Option<String>` biased towards `Some`.
pub fn any_option_string() -> impl Strategy<Value = Option<String>> {
    proptest::option::weighted(0.8, any_string())
}

/// An arbitrary two-decimal-place non-negative [`Decimal`], i.e. the shape of
/// every persisted monetary value.
pub fn any_money_decimal() -> impl Strategy<Value = Decimal> {
    (0i64..=999_999_999_999)
        .prop_map(|bani| Decimal::new(bani, 2))
}

/// An arbitrary latitude/longitude pair on the globe.
pub fn any_lat_lng() -> impl Strategy<Value = (f64, f64)> {
    (-90.0f64..=90.0, -180.0f64..=180.0)
}
