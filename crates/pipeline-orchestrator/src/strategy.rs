//! Prompt-generation seam
//!
//! Family-specific prompt wording lives outside this crate. The orchestrator
//! only asks a [`PromptStrategy`] for prompt text and optional sampler
//! recommendations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::family::ModelFamily;

/// What a strategy is asked to write a prompt for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRequest {
    pub description: String,
    pub family: ModelFamily,
}

/// Sampler settings a strategy recommends for its family
///
/// Step counts are not recommended; the quality tier always decides them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendations {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub cfg: Option<f64>,
    pub sampler_name: Option<String>,
    pub scheduler: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutput {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub recommended: Recommendations,
}

/// Writes family-tuned prompt text
#[async_trait]
pub trait PromptStrategy: Send + Sync {
    async fn generate(&self, request: &StrategyRequest) -> Result<StrategyOutput>;
}

/// Uses the description verbatim and recommends nothing
pub struct PassthroughStrategy;

#[async_trait]
impl PromptStrategy for PassthroughStrategy {
    async fn generate(&self, request: &StrategyRequest) -> Result<StrategyOutput> {
        Ok(StrategyOutput {
            prompt: request.description.clone(),
            negative_prompt: None,
            recommended: Recommendations::default(),
        })
    }
}
