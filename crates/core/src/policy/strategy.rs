use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::listing::Aggressiveness;

/// Computes the raw counter-offer for a first-round negotiation. Clamping
/// against the floor and the minimum increment happens in the policy engine;
/// a strategy only decides how much of the gap to asking it tries to recover.
pub trait CounterStrategy: Send + Sync {
    fn counter(&self, offer: Decimal, asking: Decimal, aggressiveness: Aggressiveness) -> Decimal;
}

pub(crate) fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Canonical strategy: recover a uniformly random fraction of the remaining
/// gap, sampled in [0.65, 0.75]. The RNG is injected so tests can pin the
/// band.
pub struct RandomizedBandStrategy {
    rng: Mutex<StdRng>,
}

impl RandomizedBandStrategy {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    fn draw_basis_points(&self) -> i64 {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(6_500..=7_500)
    }
}

impl Default for RandomizedBandStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStrategy for RandomizedBandStrategy {
    fn counter(&self, offer: Decimal, asking: Decimal, _aggressiveness: Aggressiveness) -> Decimal {
        let fraction = Decimal::new(self.draw_basis_points(), 4);
        round_currency(offer + (asking - offer) * fraction)
    }
}

/// Alternative strategy: the recovered fraction is a pure function of the
/// seller's aggressiveness profile. The result stays strictly below asking.
#[derive(Clone, Copy, Debug, Default)]
pub struct AggressivenessWeightedStrategy;

impl AggressivenessWeightedStrategy {
    fn fraction(aggressiveness: Aggressiveness) -> Decimal {
        match aggressiveness {
            Aggressiveness::Passive => Decimal::new(30, 2),
            Aggressiveness::Balanced => Decimal::new(50, 2),
            Aggressiveness::Aggressive => Decimal::new(70, 2),
            Aggressiveness::VeryAggressive => Decimal::new(80, 2),
        }
    }
}

impl CounterStrategy for AggressivenessWeightedStrategy {
    fn counter(&self, offer: Decimal, asking: Decimal, aggressiveness: Aggressiveness) -> Decimal {
        let fraction = Self::fraction(aggressiveness);
        let counter = round_currency(offer + (asking - offer) * fraction);
        if counter >= asking {
            asking - Decimal::ONE
        } else {
            counter
        }
    }
}

/// Pins the recovered fraction to a constant. Used by tests and anywhere a
/// reproducible counter sequence is required.
#[derive(Clone, Copy, Debug)]
pub struct FixedRateStrategy(pub Decimal);

impl CounterStrategy for FixedRateStrategy {
    fn counter(&self, offer: Decimal, asking: Decimal, _aggressiveness: Aggressiveness) -> Decimal {
        round_currency(offer + (asking - offer) * self.0)
    }
}
