mod strategy;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::listing::Aggressiveness;
use crate::domain::session::{
    countered_round_count, standing_counter, Round, RoundDecision,
};

pub use strategy::{
    AggressivenessWeightedStrategy, CounterStrategy, FixedRateStrategy, RandomizedBandStrategy,
};

use strategy::round_currency;

#[derive(Clone, Copy, Debug)]
pub struct DecisionInput<'a> {
    pub offer: Decimal,
    pub asking: Decimal,
    pub minimum: Decimal,
    pub aggressiveness: Aggressiveness,
    pub prior_rounds: &'a [Round],
    pub now: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OfferDecision {
    pub outcome: RoundDecision,
    pub counter_amount: Option<Decimal>,
    pub counter_expires_at: Option<DateTime<Utc>>,
    pub is_final: bool,
}

impl OfferDecision {
    pub fn into_round(self, buyer_offer: Decimal, occurred_at: DateTime<Utc>) -> Round {
        Round {
            occurred_at,
            buyer_offer,
            decision: self.outcome,
            counter_amount: self.counter_amount,
            counter_expires_at: self.counter_expires_at,
            is_final: self.is_final,
        }
    }
}

pub trait PolicyEngine: Send + Sync {
    fn decide(&self, input: &DecisionInput<'_>) -> OfferDecision;
}

/// Deterministic decision tree over a session's round history. Branches are
/// evaluated in a fixed order; the first match wins. The floor is never
/// undercut and never surfaced: declines carry no counter at all.
pub struct NegotiationPolicy<S = RandomizedBandStrategy> {
    strategy: S,
    round_cap: usize,
    counter_increment: Decimal,
    counter_validity: Duration,
}

impl<S> NegotiationPolicy<S>
where
    S: CounterStrategy,
{
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            round_cap: 3,
            counter_increment: Decimal::TEN,
            counter_validity: Duration::minutes(10),
        }
    }

    pub fn with_limits(
        strategy: S,
        round_cap: usize,
        counter_increment: Decimal,
        counter_validity: Duration,
    ) -> Self {
        Self { strategy, round_cap: round_cap.max(1), counter_increment, counter_validity }
    }

    pub fn counter_validity(&self) -> Duration {
        self.counter_validity
    }

    fn accepted() -> OfferDecision {
        OfferDecision {
            outcome: RoundDecision::Accepted,
            counter_amount: None,
            counter_expires_at: None,
            is_final: false,
        }
    }

    fn declined() -> OfferDecision {
        OfferDecision {
            outcome: RoundDecision::Declined,
            counter_amount: None,
            counter_expires_at: None,
            is_final: false,
        }
    }

    fn countered(&self, amount: Decimal, now: DateTime<Utc>, is_final: bool) -> OfferDecision {
        OfferDecision {
            outcome: RoundDecision::Countered,
            counter_amount: Some(amount),
            counter_expires_at: Some(now + self.counter_validity),
            is_final,
        }
    }
}

impl<S> PolicyEngine for NegotiationPolicy<S>
where
    S: CounterStrategy,
{
    fn decide(&self, input: &DecisionInput<'_>) -> OfferDecision {
        if input.offer >= input.asking {
            return Self::accepted();
        }

        if input.offer < input.minimum {
            return Self::declined();
        }

        let countered_rounds = countered_round_count(input.prior_rounds);
        let has_final = input.prior_rounds.iter().any(|round| round.is_final);
        if countered_rounds >= self.round_cap || has_final {
            // Forced settlement. Below-floor offers were already declined
            // above, so whatever remains is acceptable.
            return OfferDecision { is_final: true, ..Self::accepted() };
        }

        if let Some(standing) = standing_counter(input.prior_rounds) {
            let honored = standing.expires_at.map_or(true, |deadline| input.now <= deadline);
            if honored && input.offer >= standing.amount {
                return Self::accepted();
            }

            let counter = if honored {
                // Split the remaining difference against the standing counter.
                round_currency(
                    input.offer + (standing.amount - input.offer) * Decimal::new(5, 1),
                )
            } else {
                // The counter's validity window lapsed: its amount no longer
                // anchors the split, so re-counter from the asking gap. The
                // lapsed round still counts toward the cap.
                self.strategy.counter(input.offer, input.asking, input.aggressiveness)
            };
            let counter = counter.max(input.minimum);
            return self.countered(counter, input.now, true);
        }

        let counter = self.strategy.counter(input.offer, input.asking, input.aggressiveness);
        let counter = counter.max(input.offer + self.counter_increment).max(input.minimum);
        self.countered(counter, input.now, false)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::listing::Aggressiveness;
    use crate::domain::session::{Round, RoundDecision};

    use super::{
        AggressivenessWeightedStrategy, DecisionInput, FixedRateStrategy, NegotiationPolicy,
        PolicyEngine, RandomizedBandStrategy,
    };

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn input<'a>(offer: i64, prior_rounds: &'a [Round]) -> DecisionInput<'a> {
        DecisionInput {
            offer: dec(offer),
            asking: dec(100),
            minimum: dec(70),
            aggressiveness: Aggressiveness::Balanced,
            prior_rounds,
            now: Utc::now(),
        }
    }

    fn counter_round(amount: i64, is_final: bool) -> Round {
        Round {
            occurred_at: Utc::now(),
            buyer_offer: dec(amount - 10),
            decision: RoundDecision::Countered,
            counter_amount: Some(dec(amount)),
            counter_expires_at: Some(Utc::now() + Duration::minutes(10)),
            is_final,
        }
    }

    fn pinned_policy() -> NegotiationPolicy<FixedRateStrategy> {
        NegotiationPolicy::new(FixedRateStrategy(Decimal::new(70, 2)))
    }

    #[test]
    fn offer_at_asking_is_accepted_without_counter() {
        let decision = pinned_policy().decide(&input(100, &[]));
        assert_eq!(decision.outcome, RoundDecision::Accepted);
        assert_eq!(decision.counter_amount, None);
    }

    #[test]
    fn acceptance_above_asking_ignores_round_history() {
        let history = vec![counter_round(94, false), counter_round(92, true)];
        let decision = pinned_policy().decide(&input(120, &history));
        assert_eq!(decision.outcome, RoundDecision::Accepted);
    }

    #[test]
    fn offer_below_floor_is_declined_without_counter() {
        let decision = pinned_policy().decide(&input(50, &[]));
        assert_eq!(decision.outcome, RoundDecision::Declined);
        assert_eq!(decision.counter_amount, None);
        assert_eq!(decision.counter_expires_at, None);
    }

    #[test]
    fn first_negotiation_counters_from_the_asking_gap() {
        // 80 + (100 - 80) * 0.70 = 94; above both the floor and offer + 10.
        let decision = pinned_policy().decide(&input(80, &[]));
        assert_eq!(decision.outcome, RoundDecision::Countered);
        assert_eq!(decision.counter_amount, Some(dec(94)));
        assert!(!decision.is_final);
        assert!(decision.counter_expires_at.is_some());
    }

    #[test]
    fn first_negotiation_counter_exceeds_offer_by_the_minimum_increment() {
        // 95 + 0.70 * 5 rounds to 99, but the increment clamp lifts it to 105.
        let decision = pinned_policy().decide(&input(95, &[]));
        assert_eq!(decision.counter_amount, Some(dec(105)));
    }

    #[test]
    fn repeat_negotiation_splits_the_difference_and_goes_final() {
        let history = vec![counter_round(94, false)];
        // 90 + (94 - 90) * 0.5 = 92
        let decision = pinned_policy().decide(&input(90, &history));
        assert_eq!(decision.outcome, RoundDecision::Countered);
        assert_eq!(decision.counter_amount, Some(dec(92)));
        assert!(decision.is_final);
    }

    #[test]
    fn offer_matching_the_standing_counter_is_accepted() {
        let history = vec![counter_round(94, false)];
        let decision = pinned_policy().decide(&input(94, &history));
        assert_eq!(decision.outcome, RoundDecision::Accepted);
    }

    #[test]
    fn split_counter_never_undercuts_the_floor() {
        let policy = pinned_policy();
        let history = vec![counter_round(71, false)];
        let mut case = input(70, &history);
        case.minimum = dec(70);
        let decision = policy.decide(&case);
        assert_eq!(decision.outcome, RoundDecision::Countered);
        assert!(decision.counter_amount.expect("counter") >= dec(70));
    }

    #[test]
    fn final_round_forces_settlement_on_the_next_offer() {
        let history = vec![counter_round(94, false), counter_round(92, true)];
        let decision = pinned_policy().decide(&input(91, &history));
        assert_eq!(decision.outcome, RoundDecision::Accepted);
        assert!(decision.is_final);
    }

    #[test]
    fn round_cap_forces_settlement_even_without_a_final_flag() {
        let history =
            vec![counter_round(96, false), counter_round(94, false), counter_round(93, false)];
        let decision = pinned_policy().decide(&input(85, &history));
        assert_eq!(decision.outcome, RoundDecision::Accepted);
        assert!(decision.is_final);
        assert_eq!(decision.counter_amount, None);
    }

    #[test]
    fn lapsed_counter_no_longer_auto_accepts_at_its_amount() {
        let mut lapsed = counter_round(94, false);
        lapsed.counter_expires_at = Some(Utc::now() - Duration::minutes(1));
        let history = vec![lapsed];

        // 95 beats the lapsed 94, but that amount is no longer guaranteed;
        // the engine re-counters from the asking gap instead.
        let decision = pinned_policy().decide(&input(95, &history));
        assert_eq!(decision.outcome, RoundDecision::Countered);
        assert!(decision.is_final);
        // 95 + (100 - 95) * 0.70 rounds to 99.
        assert_eq!(decision.counter_amount, Some(dec(99)));
    }

    #[test]
    fn lapsed_counter_still_counts_toward_the_cap() {
        let mut lapsed: Vec<Round> = (0..3).map(|i| counter_round(96 - i, false)).collect();
        for round in &mut lapsed {
            round.counter_expires_at = Some(Utc::now() - Duration::minutes(30));
        }
        let decision = pinned_policy().decide(&input(85, &lapsed));
        assert_eq!(decision.outcome, RoundDecision::Accepted);
        assert!(decision.is_final);
    }

    #[test]
    fn randomized_band_decisions_respect_the_floor() {
        let policy = NegotiationPolicy::new(RandomizedBandStrategy::seeded(11));
        for offer in 70..100 {
            let case = input(offer, &[]);
            let decision = policy.decide(&case);
            if let Some(counter) = decision.counter_amount {
                assert!(counter >= case.minimum, "counter {counter} under floor");
                assert!(counter > case.offer, "counter {counter} not above offer {offer}");
            }
        }
    }

    #[test]
    fn weighted_policy_uses_the_listing_profile() {
        let policy = NegotiationPolicy::new(AggressivenessWeightedStrategy);
        let mut case = input(80, &[]);
        case.aggressiveness = Aggressiveness::Passive;
        // 80 + 20 * 0.3 = 86, below offer + 10, so the increment clamp wins.
        assert_eq!(policy.decide(&case).counter_amount, Some(dec(90)));

        case.aggressiveness = Aggressiveness::VeryAggressive;
        assert_eq!(policy.decide(&case).counter_amount, Some(dec(96)));
    }

    #[test]
    fn worked_example_full_session() {
        let policy = pinned_policy();
        let now = Utc::now();

        // Round 1: 80 against 100/70 is countered at 94.
        let first = policy.decide(&input(80, &[]));
        assert_eq!(first.counter_amount, Some(dec(94)));

        // Round 2: 90 against the standing 94 splits to 92, final.
        let history = vec![first.into_round(dec(80), now)];
        let second = policy.decide(&input(90, &history));
        assert_eq!(second.counter_amount, Some(dec(92)));
        assert!(second.is_final);

        // Round 3: 91 settles because the final round forces resolution.
        let history = vec![first.into_round(dec(80), now), second.into_round(dec(90), now)];
        let third = policy.decide(&input(91, &history));
        assert_eq!(third.outcome, RoundDecision::Accepted);
    }
}
