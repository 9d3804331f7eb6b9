use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Summary of the engine's decision, handed to the text-generation step as
/// an instruction. It deliberately carries no price bound other than the
/// amounts already visible to the buyer: the seller's floor must never be
/// representable here.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyDirective {
    Accept { amount: Decimal },
    Counter { amount: Decimal, expires_at: Option<DateTime<Utc>>, is_final: bool },
    Decline,
    NotAnOffer,
}

impl ReplyDirective {
    /// Instruction text for the prose model.
    pub fn as_instruction(&self) -> String {
        match self {
            Self::Accept { amount } => format!(
                "The seller accepts the buyer's offer of {amount}. Confirm the deal warmly and \
                 suggest arranging payment and pickup. Do not mention any other amount."
            ),
            Self::Counter { amount, expires_at, is_final } => {
                let mut instruction = format!(
                    "Counter the buyer at {amount}. Do not reveal or hint at any lower amount \
                     the seller might accept."
                );
                if let Some(deadline) = expires_at {
                    instruction.push_str(&format!(
                        " Mention that this counter-offer stands until {}.",
                        deadline.format("%H:%M UTC")
                    ));
                }
                if *is_final {
                    instruction.push_str(" Make clear this is the seller's final counter-offer.");
                }
                instruction
            }
            Self::Decline => "Politely decline the buyer's offer. Do not name any price the \
                              seller would accept, and do not invite a specific higher number."
                .to_string(),
            Self::NotAnOffer => "The message is not a price offer. Answer it helpfully as a \
                                 seller would, without volunteering a discount."
                .to_string(),
        }
    }

    /// Deterministic buyer-facing text used when no prose model is wired in
    /// or the model call fails.
    pub fn fallback_text(&self) -> String {
        match self {
            Self::Accept { amount } => {
                format!("Deal — {amount} works. Let's sort out payment and pickup.")
            }
            Self::Counter { amount, is_final, .. } => {
                if *is_final {
                    format!("The best I can do is {amount}. That's my final counter.")
                } else {
                    format!("I can't do that price, but how about {amount}?")
                }
            }
            Self::Decline => "Thanks for the offer, but I can't go that low.".to_string(),
            Self::NotAnOffer => {
                "Happy to answer any questions about the listing.".to_string()
            }
        }
    }
}

/// Phrases the buyer-facing reply from a directive. The deterministic
/// template composer is the in-tree default; an LLM-backed composer is the
/// production collaborator.
#[async_trait]
pub trait ReplyComposer: Send + Sync {
    async fn compose(&self, directive: &ReplyDirective) -> anyhow::Result<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateComposer;

#[async_trait]
impl ReplyComposer for TemplateComposer {
    async fn compose(&self, directive: &ReplyDirective) -> anyhow::Result<String> {
        Ok(directive.fallback_text())
    }
}
