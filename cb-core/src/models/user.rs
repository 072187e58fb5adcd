use cb_common::{
    ids::{CleanerId, ClientId, UserId},
    time::TimestampMs,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A platform user's role. Users are created with `Client` on first
/// successful OTP login; the role may be elevated to `Cleaner` only via an
/// approved application.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Client,
    Cleaner,
    CompanyAdmin,
    PlatformAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Cleaner => "CLEANER",
            Self::CompanyAdmin => "COMPANY_ADMIN",
            Self::PlatformAdmin => "PLATFORM_ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::CompanyAdmin | Self::PlatformAdmin)
    }
}

/// An identity with contact channels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub created_at: TimestampMs,
}

impl User {
    /// At least one contact channel is required.
    pub fn validate(&self) -> Result<(), Error> {
        if self.email.is_none() && self.phone.is_none() {
            return Err(Error::InvalidInput(
                "user requires at least one of email or phone".to_owned(),
            ));
        }
        Ok(())
    }
}

/// The party performing an engine operation, as established by the outer
/// auth layer. Authorization inside the engine is by party role and
/// ownership, never by raw user id comparison.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Actor {
    Client(ClientId),
    Cleaner(CleanerId),
    Admin(UserId),
    /// Internal callers: the expiration sweeper, reconciliation runs.
    System,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}
