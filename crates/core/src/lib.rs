pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::listing::{Aggressiveness, Listing, ListingId, ListingStatus, PriceFacts};
pub use domain::session::{
    BuyerId, NegotiationSession, Round, RoundDecision, SessionId, SessionStatus,
};
pub use errors::NegotiationError;
pub use policy::{
    AggressivenessWeightedStrategy, CounterStrategy, DecisionInput, FixedRateStrategy,
    NegotiationPolicy, OfferDecision, PolicyEngine, RandomizedBandStrategy,
};
