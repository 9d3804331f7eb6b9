use thiserror::Error;

use crate::domain::session::SessionStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidSessionTransition { from: SessionStatus, to: SessionStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Everything here is recoverable by the caller; none of these variants is
/// fatal to the process.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("listing `{listing_id}` was not found")]
    ListingNotFound { listing_id: String },
    #[error("listing `{listing_id}` is not open to offers")]
    ListingUnavailable { listing_id: String },
    #[error("offer amount is not usable: {0}")]
    InvalidOfferInput(String),
    #[error("concurrent update detected for session `{session_id}`")]
    ConcurrentAppendConflict { session_id: String },
    #[error("persistence failure: {0}")]
    Repository(String),
}

impl NegotiationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ListingNotFound { .. } => "That item could not be found.",
            Self::ListingUnavailable { .. } => "That item is no longer available for offers.",
            Self::InvalidOfferInput(_) | Self::Domain(_) => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ConcurrentAppendConflict { .. } | Self::Repository(_) => {
                "The service is temporarily busy. Please retry shortly."
            }
        }
    }

    /// Transient failures the caller may retry verbatim.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrentAppendConflict { .. } | Self::Repository(_))
    }
}
