//! The engine error type.
//!
//! Every caller-surfaceable failure maps to a stable [`ErrorKind`]; the
//! `External` and `Internal` variants additionally carry an [`anyhow`] cause
//! chain. Collaborator failures in best-effort side channels (notifications,
//! non-critical aggregate updates) are logged and swallowed at the call
//! site; failures in the critical path are surfaced as one of these.

use std::fmt;

/// The stable kind attached to every surfaced error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Target entity does not exist.
    NotFound,
    /// The actor lacks the role or ownership for the operation.
    Unauthorized,
    /// Validation failure: bad enum, out-of-range rating, malformed IBAN,
    /// missing required field.
    InvalidInput,
    /// Current entity state forbids the requested transition.
    InvalidStateTransition,
    /// Unique-key violation: duplicate dispute, duplicate payout period,
    /// reservation-code exhaustion.
    Conflict,
    /// Optimistic concurrency miss; the caller may refetch and retry.
    Stale,
    /// Policy failure: dispute outside the 7-day window, booking below
    /// min-advance, IBAN missing at payout-send.
    PolicyViolation,
    /// Downstream provider unavailable; retried internally where policy
    /// allows.
    External,
    /// Invariant violation. Logged with full context; callers receive a
    /// generic message.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput => "invalid input",
            Self::InvalidStateTransition => "invalid state transition",
            Self::Conflict => "conflict",
            Self::Stale => "stale state",
            Self::PolicyViolation => "policy violation",
            Self::External => "external failure",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned by every fallible engine operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stale {entity} state: {id}; refetch and retry")]
    Stale { entity: &'static str, id: String },

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("external service failure; try again")]
    External(#[source] anyhow::Error),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidStateTransition { .. } =>
                ErrorKind::InvalidStateTransition,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Stale { .. } => ErrorKind::Stale,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::External(_) => ErrorKind::External,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a [`Error::NotFound`] with a displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`Error::Stale`] with a displayable id.
    pub fn stale(entity: &'static str, id: impl ToString) -> Self {
        Self::Stale {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may meaningfully retry after refetching.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Stale | ErrorKind::External)
    }
}
