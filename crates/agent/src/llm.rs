use anyhow::Result;
use async_trait::async_trait;

use crate::directive::{ReplyComposer, ReplyDirective};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Routes directives through a prose model. The directive text is the whole
/// prompt; the model owns the phrasing, the engine owns the numbers.
pub struct LlmComposer<C> {
    client: C,
}

impl<C> LlmComposer<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ReplyComposer for LlmComposer<C>
where
    C: LlmClient,
{
    async fn compose(&self, directive: &ReplyDirective) -> Result<String> {
        self.client.complete(&directive.as_instruction()).await
    }
}
