use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use haggle_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use haggle_core::config::{CounterStrategyKind, NegotiationConfig};
use haggle_core::domain::listing::ListingId;
use haggle_core::domain::session::{BuyerId, RoundDecision, SessionId, SessionStatus};
use haggle_core::errors::NegotiationError;
use haggle_core::policy::{
    AggressivenessWeightedStrategy, DecisionInput, NegotiationPolicy, PolicyEngine,
    RandomizedBandStrategy,
};
use haggle_db::repositories::{ListingRepository, RepositoryError, SessionRepository};

use crate::directive::{ReplyComposer, ReplyDirective};
use crate::extract::OfferExtractor;

#[derive(Clone, Copy, Debug)]
pub struct RuntimeSettings {
    pub session_ttl: Duration,
    pub floor_ratio: Decimal,
}

impl RuntimeSettings {
    pub fn from_config(config: &NegotiationConfig) -> Self {
        Self {
            session_ttl: Duration::days(config.session_ttl_days),
            floor_ratio: Decimal::new(i64::from(config.floor_ratio_percent), 2),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { session_ttl: Duration::days(7), floor_ratio: Decimal::new(70, 2) }
    }
}

/// Wire the configured counter strategy into a policy engine. Exactly one
/// strategy is active per deployment.
pub fn build_policy(config: &NegotiationConfig) -> Arc<dyn PolicyEngine> {
    let round_cap = config.round_cap as usize;
    let increment = Decimal::from(config.counter_increment);
    let validity = Duration::minutes(config.counter_validity_minutes);

    match config.strategy {
        CounterStrategyKind::RandomizedBand => {
            let strategy = match config.counter_seed {
                Some(seed) => RandomizedBandStrategy::seeded(seed),
                None => RandomizedBandStrategy::new(),
            };
            Arc::new(NegotiationPolicy::with_limits(strategy, round_cap, increment, validity))
        }
        CounterStrategyKind::AggressivenessWeighted => Arc::new(NegotiationPolicy::with_limits(
            AggressivenessWeightedStrategy,
            round_cap,
            increment,
            validity,
        )),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub session_id: Option<SessionId>,
    pub decision: Option<RoundDecision>,
    pub offer_amount: Option<Decimal>,
    pub counter_amount: Option<Decimal>,
    pub counter_expires_at: Option<DateTime<Utc>>,
    pub reply: String,
}

impl TurnOutcome {
    pub fn offer_accepted(&self) -> bool {
        self.decision == Some(RoundDecision::Accepted)
    }

    pub fn offer_countered(&self) -> bool {
        self.decision == Some(RoundDecision::Countered)
    }
}

/// Drives one negotiation turn: extract the offer, load price facts, run the
/// policy engine against the session's round history, append the round, and
/// hand the decision to the reply composer. This runtime is the only
/// component that mutates sessions; the policy engine stays pure.
pub struct NegotiationRuntime {
    listings: Arc<dyn ListingRepository>,
    sessions: Arc<dyn SessionRepository>,
    policy: Arc<dyn PolicyEngine>,
    extractor: OfferExtractor,
    composer: Arc<dyn ReplyComposer>,
    audit: Arc<dyn AuditSink>,
    settings: RuntimeSettings,
}

impl NegotiationRuntime {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        sessions: Arc<dyn SessionRepository>,
        policy: Arc<dyn PolicyEngine>,
        composer: Arc<dyn ReplyComposer>,
        audit: Arc<dyn AuditSink>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            listings,
            sessions,
            policy,
            extractor: OfferExtractor::new(),
            composer,
            audit,
            settings,
        }
    }

    pub async fn handle_message(
        &self,
        listing_id: &ListingId,
        buyer_id: &BuyerId,
        raw_message: &str,
        correlation_id: &str,
    ) -> Result<TurnOutcome, NegotiationError> {
        let extracted = self.extractor.extract(raw_message);

        let usable_amount = extracted
            .amount
            .filter(|amount| *amount > Decimal::ZERO && amount.scale() <= 4);
        let offer = match (extracted.is_offer, usable_amount) {
            (true, Some(amount)) => amount,
            (true, None) => {
                // A trigger word fired but the number is unusable; treated as
                // general conversation, never as an engine input.
                tracing::warn!(
                    event_name = "negotiation.extraction.invalid_amount",
                    correlation_id,
                    listing_id = %listing_id.0,
                    "extracted amount rejected before the policy engine"
                );
                return self.not_an_offer(listing_id, correlation_id).await;
            }
            (false, _) => return self.not_an_offer(listing_id, correlation_id).await,
        };

        let listing = self
            .listings
            .find_by_id(listing_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| NegotiationError::ListingNotFound {
                listing_id: listing_id.0.clone(),
            })?;
        if !listing.is_negotiable() {
            return Err(NegotiationError::ListingUnavailable { listing_id: listing_id.0.clone() });
        }
        let facts = listing.price_facts(self.settings.floor_ratio)?;

        let now = Utc::now();
        let mut session = self
            .sessions
            .get_or_create(listing_id, buyer_id, now, self.settings.session_ttl)
            .await
            .map_err(repository_error)?;

        let mut retried = false;
        loop {
            let decision = self.policy.decide(&DecisionInput {
                offer,
                asking: facts.asking,
                minimum: facts.minimum,
                aggressiveness: facts.aggressiveness,
                prior_rounds: &session.rounds,
                now,
            });
            let new_status = match decision.outcome {
                RoundDecision::Accepted => SessionStatus::OfferAccepted,
                RoundDecision::Countered => SessionStatus::Negotiating,
                RoundDecision::Declined => SessionStatus::Declined,
            };

            match self
                .sessions
                .append_round(
                    &session.id,
                    session.version,
                    decision.into_round(offer, now),
                    new_status,
                    offer,
                )
                .await
            {
                Ok(updated) => {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(updated.id.clone()),
                            Some(listing_id.clone()),
                            correlation_id,
                            "negotiation.turn_decided",
                            AuditCategory::Policy,
                            "negotiation-runtime",
                            AuditOutcome::Success,
                        )
                        .with_metadata("decision", decision.outcome.as_str())
                        .with_metadata("offer", offer.to_string())
                        .with_metadata("round", updated.rounds.len().to_string()),
                    );
                    tracing::info!(
                        event_name = "negotiation.turn_decided",
                        correlation_id,
                        session_id = %updated.id.0,
                        listing_id = %listing_id.0,
                        decision = decision.outcome.as_str(),
                        round = updated.rounds.len(),
                        "negotiation turn decided"
                    );

                    let directive = match decision.outcome {
                        RoundDecision::Accepted => ReplyDirective::Accept { amount: offer },
                        RoundDecision::Countered => ReplyDirective::Counter {
                            amount: decision
                                .counter_amount
                                .unwrap_or(facts.asking),
                            expires_at: decision.counter_expires_at,
                            is_final: decision.is_final,
                        },
                        RoundDecision::Declined => ReplyDirective::Decline,
                    };
                    let reply = self.compose(&directive, correlation_id).await;

                    return Ok(TurnOutcome {
                        session_id: Some(updated.id),
                        decision: Some(decision.outcome),
                        offer_amount: Some(offer),
                        counter_amount: decision.counter_amount,
                        counter_expires_at: decision.counter_expires_at,
                        reply,
                    });
                }
                Err(RepositoryError::VersionConflict { .. }) if !retried => {
                    // A concurrent turn won the append. Re-decide once against
                    // the refreshed round history.
                    retried = true;
                    session = self
                        .sessions
                        .find_by_id(&session.id)
                        .await
                        .map_err(repository_error)?
                        .ok_or_else(|| {
                            NegotiationError::Repository(format!(
                                "session {} disappeared during retry",
                                session.id.0
                            ))
                        })?;
                }
                Err(error) => return Err(repository_error(error)),
            }
        }
    }

    async fn not_an_offer(
        &self,
        listing_id: &ListingId,
        correlation_id: &str,
    ) -> Result<TurnOutcome, NegotiationError> {
        self.audit.emit(
            AuditEvent::new(
                None,
                Some(listing_id.clone()),
                correlation_id,
                "negotiation.message_without_offer",
                AuditCategory::Extraction,
                "negotiation-runtime",
                AuditOutcome::Rejected,
            ),
        );

        let reply = self.compose(&ReplyDirective::NotAnOffer, correlation_id).await;
        Ok(TurnOutcome {
            session_id: None,
            decision: None,
            offer_amount: None,
            counter_amount: None,
            counter_expires_at: None,
            reply,
        })
    }

    async fn compose(&self, directive: &ReplyDirective, correlation_id: &str) -> String {
        match self.composer.compose(directive).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(
                    event_name = "negotiation.compose_failed",
                    correlation_id,
                    error = %error,
                    "reply composer failed, using deterministic fallback"
                );
                directive.fallback_text()
            }
        }
    }
}

fn repository_error(error: RepositoryError) -> NegotiationError {
    match error {
        RepositoryError::VersionConflict { session_id } => {
            NegotiationError::ConcurrentAppendConflict { session_id }
        }
        other => NegotiationError::Repository(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use haggle_core::audit::InMemoryAuditSink;
    use haggle_core::domain::listing::{Aggressiveness, Listing, ListingId, ListingStatus};
    use haggle_core::domain::session::{
        BuyerId, NegotiationSession, Round, RoundDecision, SessionId, SessionStatus,
    };
    use haggle_core::errors::NegotiationError;
    use haggle_core::policy::{FixedRateStrategy, NegotiationPolicy};
    use haggle_db::repositories::{
        InMemoryListingRepository, InMemorySessionRepository, ListingRepository, RepositoryError,
        SessionRepository,
    };

    use crate::directive::TemplateComposer;

    use super::{NegotiationRuntime, RuntimeSettings};

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    async fn runtime_with_listing(
        listing: Listing,
    ) -> (NegotiationRuntime, Arc<InMemorySessionRepository>, InMemoryAuditSink) {
        let listings = Arc::new(InMemoryListingRepository::default());
        listings.save(listing).await.expect("seed listing");
        let sessions = Arc::new(InMemorySessionRepository::default());
        let audit = InMemoryAuditSink::default();

        let runtime = NegotiationRuntime::new(
            listings,
            sessions.clone(),
            Arc::new(NegotiationPolicy::with_limits(
                FixedRateStrategy(Decimal::new(70, 2)),
                3,
                Decimal::TEN,
                Duration::minutes(10),
            )),
            Arc::new(TemplateComposer),
            Arc::new(audit.clone()),
            RuntimeSettings::default(),
        );
        (runtime, sessions, audit)
    }

    fn bike_listing() -> Listing {
        Listing {
            id: ListingId("lst-bike".to_string()),
            title: "Road bike".to_string(),
            asking_price: dec(100),
            minimum_price: Some(dec(70)),
            aggressiveness: Aggressiveness::Balanced,
            status: ListingStatus::Active,
        }
    }

    fn buyer() -> BuyerId {
        BuyerId("buyer@example.com".to_string())
    }

    #[tokio::test]
    async fn non_offer_message_mutates_nothing() {
        let (runtime, sessions, audit) = runtime_with_listing(bike_listing()).await;

        let outcome = runtime
            .handle_message(&ListingId("lst-bike".to_string()), &buyer(), "is this still available?", "req-1")
            .await
            .expect("handle message");

        assert_eq!(outcome.session_id, None);
        assert_eq!(outcome.decision, None);
        assert!(!outcome.reply.is_empty());
        assert_eq!(
            audit.events().first().map(|event| event.event_type.clone()),
            Some("negotiation.message_without_offer".to_string())
        );

        // No session record was created for the pair.
        let session = sessions
            .get_or_create(
                &ListingId("lst-bike".to_string()),
                &buyer(),
                Utc::now(),
                Duration::days(7),
            )
            .await
            .expect("get_or_create");
        assert!(session.rounds.is_empty());
    }

    #[tokio::test]
    async fn full_negotiation_settles_at_the_standing_counter() {
        let (runtime, _sessions, audit) = runtime_with_listing(bike_listing()).await;
        let listing = ListingId("lst-bike".to_string());

        let countered = runtime
            .handle_message(&listing, &buyer(), "would you take $80?", "req-1")
            .await
            .expect("first turn");
        assert!(countered.offer_countered());
        assert_eq!(countered.counter_amount, Some(dec(94)));
        assert!(countered.counter_expires_at.is_some());
        assert!(countered.reply.contains("94"));

        let accepted = runtime
            .handle_message(&listing, &buyer(), "ok, I'll pay 94", "req-2")
            .await
            .expect("second turn");
        assert!(accepted.offer_accepted());
        assert_eq!(accepted.session_id, countered.session_id);
        assert_eq!(accepted.counter_amount, None);

        let decisions: Vec<String> = audit
            .events()
            .iter()
            .filter_map(|event| event.metadata.get("decision").cloned())
            .collect();
        assert_eq!(decisions, vec!["countered".to_string(), "accepted".to_string()]);
    }

    #[tokio::test]
    async fn lowball_offer_is_declined_and_the_floor_stays_hidden() {
        let (runtime, _sessions, _audit) = runtime_with_listing(bike_listing()).await;

        let outcome = runtime
            .handle_message(&ListingId("lst-bike".to_string()), &buyer(), "i can pay 50", "req-1")
            .await
            .expect("handle message");

        assert_eq!(outcome.decision, Some(RoundDecision::Declined));
        assert_eq!(outcome.counter_amount, None);
        assert!(!outcome.reply.contains("70"), "floor leaked into the reply");
    }

    #[tokio::test]
    async fn unknown_listing_is_a_not_found_error() {
        let (runtime, _sessions, _audit) = runtime_with_listing(bike_listing()).await;

        let error = runtime
            .handle_message(&ListingId("lst-ghost".to_string()), &buyer(), "offer 80", "req-1")
            .await
            .expect_err("missing listing should fail");
        assert!(matches!(error, NegotiationError::ListingNotFound { .. }));
    }

    #[tokio::test]
    async fn sold_listing_rejects_offers_without_state_mutation() {
        let mut sold = bike_listing();
        sold.status = ListingStatus::Sold;
        let (runtime, sessions, _audit) = runtime_with_listing(sold).await;

        let error = runtime
            .handle_message(&ListingId("lst-bike".to_string()), &buyer(), "offer 80", "req-1")
            .await
            .expect_err("sold listing should fail");
        assert!(matches!(error, NegotiationError::ListingUnavailable { .. }));

        let session = sessions
            .get_or_create(
                &ListingId("lst-bike".to_string()),
                &buyer(),
                Utc::now(),
                Duration::days(7),
            )
            .await
            .expect("get_or_create");
        assert!(session.rounds.is_empty());
    }

    #[tokio::test]
    async fn accepted_session_reopens_for_a_follow_up_offer() {
        let (runtime, _sessions, _audit) = runtime_with_listing(bike_listing()).await;
        let listing = ListingId("lst-bike".to_string());

        let accepted = runtime
            .handle_message(&listing, &buyer(), "i'll pay 100", "req-1")
            .await
            .expect("first turn");
        assert!(accepted.offer_accepted());

        let follow_up = runtime
            .handle_message(&listing, &buyer(), "actually, how about 90?", "req-2")
            .await
            .expect("second turn");
        assert_eq!(follow_up.session_id, accepted.session_id);
        assert!(follow_up.offer_countered());
    }

    struct ConflictingSessions {
        inner: InMemorySessionRepository,
        conflicts_left: AtomicBool,
        always_conflict: bool,
    }

    impl ConflictingSessions {
        fn once() -> Self {
            Self {
                inner: InMemorySessionRepository::default(),
                conflicts_left: AtomicBool::new(true),
                always_conflict: false,
            }
        }

        fn always() -> Self {
            Self {
                inner: InMemorySessionRepository::default(),
                conflicts_left: AtomicBool::new(true),
                always_conflict: true,
            }
        }
    }

    #[async_trait]
    impl SessionRepository for ConflictingSessions {
        async fn find_by_id(
            &self,
            id: &SessionId,
        ) -> Result<Option<NegotiationSession>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn get_or_create(
            &self,
            listing_id: &ListingId,
            buyer_id: &BuyerId,
            now: DateTime<Utc>,
            ttl: Duration,
        ) -> Result<NegotiationSession, RepositoryError> {
            self.inner.get_or_create(listing_id, buyer_id, now, ttl).await
        }

        async fn append_round(
            &self,
            session_id: &SessionId,
            expected_version: i64,
            round: Round,
            new_status: SessionStatus,
            current_offer: Decimal,
        ) -> Result<NegotiationSession, RepositoryError> {
            if self.always_conflict || self.conflicts_left.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::VersionConflict {
                    session_id: session_id.0.clone(),
                });
            }
            self.inner
                .append_round(session_id, expected_version, round, new_status, current_offer)
                .await
        }

        async fn mark_expired_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            self.inner.mark_expired_before(cutoff).await
        }
    }

    async fn runtime_with_sessions(
        sessions: Arc<dyn SessionRepository>,
    ) -> NegotiationRuntime {
        let listings = Arc::new(InMemoryListingRepository::default());
        listings.save(bike_listing()).await.expect("seed listing");

        NegotiationRuntime::new(
            listings,
            sessions,
            Arc::new(NegotiationPolicy::with_limits(
                FixedRateStrategy(Decimal::new(70, 2)),
                3,
                Decimal::TEN,
                Duration::minutes(10),
            )),
            Arc::new(TemplateComposer),
            Arc::new(InMemoryAuditSink::default()),
            RuntimeSettings::default(),
        )
    }

    #[test]
    fn build_policy_honors_the_configured_strategy_and_seed() {
        use haggle_core::config::{CounterStrategyKind, NegotiationConfig};
        use haggle_core::domain::listing::Aggressiveness;
        use haggle_core::policy::{DecisionInput, PolicyEngine};

        let seeded = NegotiationConfig {
            strategy: CounterStrategyKind::RandomizedBand,
            round_cap: 3,
            counter_increment: 10,
            counter_validity_minutes: 10,
            session_ttl_days: 7,
            floor_ratio_percent: 70,
            counter_seed: Some(99),
        };
        let input = DecisionInput {
            offer: dec(80),
            asking: dec(200),
            minimum: dec(70),
            aggressiveness: Aggressiveness::VeryAggressive,
            prior_rounds: &[],
            now: chrono::Utc::now(),
        };

        let first = super::build_policy(&seeded).decide(&input);
        let second = super::build_policy(&seeded).decide(&input);
        assert_eq!(first.counter_amount, second.counter_amount, "same seed, same counter");

        let weighted = NegotiationConfig {
            strategy: CounterStrategyKind::AggressivenessWeighted,
            counter_seed: None,
            ..seeded
        };
        let decision = super::build_policy(&weighted).decide(&input);
        // 80 + (200 - 80) * 0.8 = 176 for a very aggressive seller.
        assert_eq!(decision.counter_amount, Some(dec(176)));
    }

    #[tokio::test]
    async fn append_conflict_is_retried_once_against_fresh_history() {
        let runtime = runtime_with_sessions(Arc::new(ConflictingSessions::once())).await;

        let outcome = runtime
            .handle_message(&ListingId("lst-bike".to_string()), &buyer(), "offer 80", "req-1")
            .await
            .expect("retried turn should succeed");
        assert!(outcome.offer_countered());
    }

    #[tokio::test]
    async fn persistent_conflict_surfaces_as_transient_error() {
        let runtime = runtime_with_sessions(Arc::new(ConflictingSessions::always())).await;

        let error = runtime
            .handle_message(&ListingId("lst-bike".to_string()), &buyer(), "offer 80", "req-1")
            .await
            .expect_err("double conflict should surface");
        assert!(matches!(error, NegotiationError::ConcurrentAppendConflict { .. }));
        assert!(error.is_transient());
    }
}
