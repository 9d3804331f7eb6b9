use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use haggle_core::domain::listing::{Listing, ListingId};
use haggle_core::domain::session::{
    BuyerId, NegotiationSession, Round, SessionId, SessionStatus,
};

pub mod listing;
pub mod memory;
pub mod session;

pub use listing::SqlListingRepository;
pub use memory::{InMemoryListingRepository, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stale version for session `{session_id}`")]
    VersionConflict { session_id: String },
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError>;
    async fn save(&self, listing: Listing) -> Result<(), RepositoryError>;
}

/// Per-(listing, buyer) negotiation state. Round rows are immutable and the
/// sole input for round counting; the session row carries an optimistic
/// version so concurrent turns cannot both append against the same history.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError>;

    /// Idempotent lookup-or-create. Reopens a resolved session, and replaces
    /// a session whose TTL has lapsed with a fresh one (marking the old one
    /// expired).
    async fn get_or_create(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<NegotiationSession, RepositoryError>;

    /// Atomic append: the session row update and the round insert commit
    /// together, guarded by `expected_version`. A stale version yields
    /// `VersionConflict` and leaves the store untouched.
    async fn append_round(
        &self,
        session_id: &SessionId,
        expected_version: i64,
        round: Round,
        new_status: SessionStatus,
        current_offer: Decimal,
    ) -> Result<NegotiationSession, RepositoryError>;

    /// Lazy sweep for the operator job: open sessions untouched before the
    /// cutoff are marked expired. Returns how many were swept.
    async fn mark_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
