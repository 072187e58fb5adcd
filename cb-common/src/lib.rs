//! The `cb-common` crate contains leaf types and utilities shared across the
//! CleanBook core engine crates.

/// RON money amounts with fixed-precision decimal semantics.
pub mod amount;
/// Exponential backoff.
pub mod backoff;
/// Romanian IBAN shape validation.
pub mod iban;
/// Opaque UUID v4 text identifiers for every entity.
pub mod ids;
/// Random number generation.
pub mod rng;
/// AES-256-GCM sealing for payout account identifiers.
pub mod seal;
/// `TimestampMs`.
pub mod time;

/// Feature-gated test utilities that can be shared across crate boundaries.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Assert at compile time that a boolean expression evaluates to true.
#[macro_export]
macro_rules! const_assert {
    ($x:expr $(,)?) => {
        #[allow(clippy::const_is_empty, clippy::eq_op, unknown_lints)]
        const _: [(); 0 - !{
            const CONST_ASSERT: bool = $x;
            CONST_ASSERT
        } as usize] = [];
    };
}

/// A trait which allows us to apply functions (including tuple enum variants)
/// to non-[`Iterator`]/[`Result`]/[`Option`] values for cleaner iterator-like
/// chains. It exposes an [`apply`] method and is implemented for all `T`.
///
/// [`apply`]: Self::apply
pub trait Apply<F, T> {
    fn apply(self, f: F) -> T;
}

impl<F, T, U> Apply<F, U> for T
where
    F: FnOnce(T) -> U,
{
    #[inline]
    fn apply(self, f: F) -> U {
        f(self)
    }
}
