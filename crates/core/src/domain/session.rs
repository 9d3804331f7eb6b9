use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::listing::ListingId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuyerId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Negotiating,
    OfferAccepted,
    Declined,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Negotiating => "negotiating",
            Self::OfferAccepted => "offer_accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "negotiating" => Some(Self::Negotiating),
            "offer_accepted" => Some(Self::OfferAccepted),
            "declined" => Some(Self::Declined),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Negotiating)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundDecision {
    Accepted,
    Countered,
    Declined,
}

impl RoundDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Countered => "countered",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(Self::Accepted),
            "countered" => Some(Self::Countered),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// One buyer-offer / engine-decision pair. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub occurred_at: DateTime<Utc>,
    pub buyer_offer: Decimal,
    pub decision: RoundDecision,
    pub counter_amount: Option<Decimal>,
    pub counter_expires_at: Option<DateTime<Utc>>,
    pub is_final: bool,
}

/// A standing counter reconstructed from round history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandingCounter {
    pub amount: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Most recent counter in a round trail, if any.
pub fn standing_counter(rounds: &[Round]) -> Option<StandingCounter> {
    rounds.iter().rev().find_map(|round| {
        round
            .counter_amount
            .map(|amount| StandingCounter { amount, expires_at: round.counter_expires_at })
    })
}

pub fn countered_round_count(rounds: &[Round]) -> usize {
    rounds.iter().filter(|round| round.decision == RoundDecision::Countered).count()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub id: SessionId,
    pub listing_id: ListingId,
    pub buyer_id: BuyerId,
    pub status: SessionStatus,
    pub current_offer: Option<Decimal>,
    pub rounds: Vec<Round>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn new(listing_id: ListingId, buyer_id: BuyerId, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            listing_id,
            buyer_id,
            status: SessionStatus::Active,
            current_offer: None,
            rounds: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Round history is the sole source of truth for cap counting; there is
    /// no denormalized counter that could drift.
    pub fn countered_rounds(&self) -> usize {
        countered_round_count(&self.rounds)
    }

    pub fn has_final_round(&self) -> bool {
        self.rounds.iter().any(|round| round.is_final)
    }

    /// Most recent counter-offer the engine issued, if any.
    pub fn last_counter(&self) -> Option<StandingCounter> {
        standing_counter(&self.rounds)
    }

    /// A session untouched past the TTL is resolved lazily at the next read.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.status.is_open() && now - self.updated_at > ttl
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (&self.status, next),
            (SessionStatus::Active, SessionStatus::Negotiating)
                | (SessionStatus::Active, SessionStatus::OfferAccepted)
                | (SessionStatus::Active, SessionStatus::Declined)
                | (SessionStatus::Negotiating, SessionStatus::Negotiating)
                | (SessionStatus::Negotiating, SessionStatus::OfferAccepted)
                | (SessionStatus::Negotiating, SessionStatus::Declined)
                | (SessionStatus::OfferAccepted, SessionStatus::Active)
                | (SessionStatus::Declined, SessionStatus::Active)
                | (SessionStatus::Expired, SessionStatus::Active)
                | (_, SessionStatus::Expired)
        )
    }

    pub fn transition_to(&mut self, next: SessionStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidSessionTransition { from: self.status, to: next })
    }

    /// A fresh buyer offer on a resolved session reopens it in place rather
    /// than creating a duplicate; the round trail is kept.
    pub fn reopen(&mut self) -> Result<(), DomainError> {
        self.transition_to(SessionStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::listing::ListingId;

    use super::{BuyerId, NegotiationSession, Round, RoundDecision, SessionStatus};

    fn session() -> NegotiationSession {
        NegotiationSession::new(
            ListingId("lst-1".to_string()),
            BuyerId("buyer@example.com".to_string()),
            Utc::now(),
        )
    }

    fn countered_round(counter: i64, is_final: bool) -> Round {
        Round {
            occurred_at: Utc::now(),
            buyer_offer: Decimal::new(counter - 10, 0),
            decision: RoundDecision::Countered,
            counter_amount: Some(Decimal::new(counter, 0)),
            counter_expires_at: None,
            is_final,
        }
    }

    #[test]
    fn round_counting_scans_the_trail_only() {
        let mut session = session();
        session.rounds.push(countered_round(94, false));
        session.rounds.push(Round {
            occurred_at: Utc::now(),
            buyer_offer: Decimal::new(95, 0),
            decision: RoundDecision::Accepted,
            counter_amount: None,
            counter_expires_at: None,
            is_final: false,
        });
        session.rounds.push(countered_round(92, true));

        assert_eq!(session.countered_rounds(), 2);
        assert!(session.has_final_round());
        assert_eq!(session.last_counter().map(|counter| counter.amount), Some(Decimal::new(92, 0)));
    }

    #[test]
    fn resolved_sessions_can_reopen() {
        let mut session = session();
        session.transition_to(SessionStatus::OfferAccepted).expect("active -> accepted");
        session.reopen().expect("accepted -> active");
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[test]
    fn open_sessions_cannot_jump_back_to_active() {
        let mut session = session();
        session.transition_to(SessionStatus::Negotiating).expect("active -> negotiating");
        let error = session.reopen().expect_err("negotiating -> active should fail");
        assert!(matches!(error, crate::errors::DomainError::InvalidSessionTransition { .. }));
    }

    #[test]
    fn staleness_applies_to_open_sessions_only() {
        let ttl = Duration::days(7);
        let now = Utc::now();

        let mut stale = session();
        stale.updated_at = now - Duration::days(8);
        assert!(stale.is_stale(now, ttl));

        stale.status = SessionStatus::Declined;
        assert!(!stale.is_stale(now, ttl));

        let mut fresh = session();
        fresh.updated_at = now - Duration::days(6);
        assert!(!fresh.is_stale(now, ttl));
    }
}
