pub mod chat;
pub mod classify;

use crate::error::Result;

pub use chat::ChatCompletionsClient;
pub use classify::{classifier_for, Classifier, KeywordScan, SentimentSplit, WordBoundaryScan};

/// A text-completion service: one prompt in, the raw reply text out.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}
