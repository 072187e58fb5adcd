//! Opaque entity identifiers.
//!
//! Production identifiers are UUID v4 text generated DB-side; the newtypes
//! here keep the different id spaces from being confused in service code.
//! All ids serialize as plain hyphenated strings.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }

        #[cfg(any(test, feature = "test-utils"))]
        impl proptest::arbitrary::Arbitrary for $name {
            type Parameters = ();
            type Strategy = proptest::strategy::BoxedStrategy<Self>;
            fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
                use proptest::strategy::Strategy;
                proptest::arbitrary::any::<[u8; 16]>()
                    .prop_map(|bytes| Self(Uuid::from_bytes(bytes)))
                    .boxed()
            }
        }
    };
}

uuid_id_newtype!(
    /// A platform user (any role).
    UserId
);
uuid_id_newtype!(
    /// A client profile.
    ClientId
);
uuid_id_newtype!(
    /// A cleaner profile.
    CleanerId
);
uuid_id_newtype!(
    /// An address owned by a user.
    AddressId
);
uuid_id_newtype!(
    /// A booking, the central entity.
    BookingId
);
uuid_id_newtype!(
    /// A single payment-provider interaction row.
    PaymentId
);
uuid_id_newtype!(
    /// An invoice issued for a completed booking.
    InvoiceId
);
uuid_id_newtype!(
    /// A monthly payout for one cleaner.
    PayoutId
);
uuid_id_newtype!(
    /// One booking's contribution within a payout.
    PayoutLineItemId
);
uuid_id_newtype!(
    /// A dispute opened against a completed booking.
    DisputeId
);
uuid_id_newtype!(
    /// A review left by one party of a booking.
    ReviewId
);
uuid_id_newtype!(
    /// A GPS check-in/check-out record for a booking.
    CheckinId
);
uuid_id_newtype!(
    /// A cleaner availability slot.
    AvailabilitySlotId
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::roundtrip;

    #[test]
    fn id_serde_roundtrips() {
        roundtrip::json_string_roundtrip_proptest::<BookingId>();
        roundtrip::json_string_roundtrip_proptest::<CleanerId>();
        roundtrip::json_string_roundtrip_proptest::<PayoutId>();
    }

    #[test]
    fn display_from_str_roundtrip() {
        let id = BookingId::generate();
        let parsed = BookingId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }
}
