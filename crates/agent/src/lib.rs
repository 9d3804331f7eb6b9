pub mod directive;
pub mod extract;
pub mod llm;
pub mod runtime;

pub use directive::{ReplyComposer, ReplyDirective, TemplateComposer};
pub use extract::{ExtractedOffer, OfferExtractor};
pub use llm::{LlmClient, LlmComposer};
pub use runtime::{build_policy, NegotiationRuntime, RuntimeSettings, TurnOutcome};
