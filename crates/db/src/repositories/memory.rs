use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use haggle_core::domain::listing::{Listing, ListingId};
use haggle_core::domain::session::{
    BuyerId, NegotiationSession, Round, SessionId, SessionStatus,
};

use super::{ListingRepository, RepositoryError, SessionRepository};

#[derive(Default)]
pub struct InMemoryListingRepository {
    listings: RwLock<HashMap<String, Listing>>,
}

#[async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError> {
        let listings = self.listings.read().await;
        Ok(listings.get(&id.0).cloned())
    }

    async fn save(&self, listing: Listing) -> Result<(), RepositoryError> {
        let mut listings = self.listings.write().await;
        listings.insert(listing.id.0.clone(), listing);
        Ok(())
    }
}

/// Mirrors the SQL store's semantics, including the optimistic version check,
/// so orchestrator tests exercise the same contract.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, NegotiationSession>>,
}

impl InMemorySessionRepository {
    async fn latest_for_pair(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
    ) -> Option<NegotiationSession> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|session| {
                session.listing_id == *listing_id && session.buyer_id == *buyer_id
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)))
            .cloned()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn get_or_create(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<NegotiationSession, RepositoryError> {
        if let Some(mut existing) = self.latest_for_pair(listing_id, buyer_id).await {
            if existing.is_stale(now, ttl) {
                let mut sessions = self.sessions.write().await;
                if let Some(stored) = sessions.get_mut(&existing.id.0) {
                    stored.status = SessionStatus::Expired;
                    stored.version += 1;
                    stored.updated_at = now;
                }
            } else {
                match existing.status {
                    SessionStatus::Active | SessionStatus::Negotiating => return Ok(existing),
                    SessionStatus::OfferAccepted | SessionStatus::Declined => {
                        existing.status = SessionStatus::Active;
                        existing.version += 1;
                        existing.updated_at = now;
                        let mut sessions = self.sessions.write().await;
                        sessions.insert(existing.id.0.clone(), existing.clone());
                        return Ok(existing);
                    }
                    SessionStatus::Expired => {}
                }
            }
        }

        let session = NegotiationSession::new(listing_id.clone(), buyer_id.clone(), now);
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session.clone());
        Ok(session)
    }

    async fn append_round(
        &self,
        session_id: &SessionId,
        expected_version: i64,
        round: Round,
        new_status: SessionStatus,
        current_offer: Decimal,
    ) -> Result<NegotiationSession, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id.0).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown session {}", session_id.0))
        })?;

        if session.version != expected_version {
            return Err(RepositoryError::VersionConflict { session_id: session_id.0.clone() });
        }

        session.updated_at = round.occurred_at;
        session.rounds.push(round);
        session.status = new_status;
        session.current_offer = Some(current_offer);
        session.version += 1;

        Ok(session.clone())
    }

    async fn mark_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let mut swept = 0;
        for session in sessions.values_mut() {
            if session.status.is_open() && session.updated_at < cutoff {
                session.status = SessionStatus::Expired;
                session.version += 1;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
