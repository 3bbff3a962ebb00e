//! High-level generation entry point
//!
//! Detects the model family, asks the prompt strategy for wording and
//! recommendations, resolves every sampler setting and delegates to
//! [`PipelineOrchestrator::execute_pipeline`].
//!
//! Each setting is taken from the first source that has it:
//! explicit request field, then quality tier, then strategy recommendation,
//! then the family's architecture default. Every tier carries a step count,
//! so steps never fall through to the strategy or the architecture.

use graph_compiler::{LoraConfig, PromptParams, SamplerSettings, Txt2ImgParams};
use serde::{Deserialize, Serialize};

use crate::client::ExecutionClient;
use crate::error::PipelineFailure;
use crate::events::EventSink;
use crate::executor::{PipelineOrchestrator, PipelineRun, PipelineState};
use crate::family::{detect_family, FamilyDetection};
use crate::quality::QualityTier;
use crate::request::{BaseGeneration, HiresFix, PipelineRequest, UpscaleOptions};
use crate::strategy::{PromptStrategy, StrategyOutput, StrategyRequest};

/// A generation described at the highest level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagineRequest {
    pub description: String,
    /// Checkpoint file name; also drives family detection
    pub model: String,
    pub quality: QualityTier,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub cfg: Option<f64>,
    pub sampler_name: Option<String>,
    pub scheduler: Option<String>,
    pub seed: Option<u64>,
    /// Overrides the tier's refine-pass choice
    pub hires_fix: Option<bool>,
    /// Overrides the tier's upscale-pass choice
    pub upscale: Option<bool>,
    pub upscale_model: Option<String>,
    pub loras: Vec<LoraConfig>,
}

impl ImagineRequest {
    pub fn new(description: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Settings after precedence resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagineSettings {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub hires_fix: bool,
    pub upscale: bool,
}

/// Successful result of [`PipelineOrchestrator::imagine`]
#[derive(Debug, Clone, PartialEq)]
pub struct ImagineOutcome {
    pub run: PipelineRun,
    pub family: FamilyDetection,
    pub settings: ImagineSettings,
}

/// Apply the precedence rules to one request
pub fn resolve_settings(
    request: &ImagineRequest,
    detection: &FamilyDetection,
    strategy: &StrategyOutput,
) -> ImagineSettings {
    let tier = request.quality.settings();
    let arch = detection.family.defaults();
    let rec = &strategy.recommended;

    let prompt = if strategy.prompt.trim().is_empty() {
        request.description.clone()
    } else {
        strategy.prompt.clone()
    };

    ImagineSettings {
        prompt,
        negative_prompt: request
            .negative_prompt
            .clone()
            .or_else(|| strategy.negative_prompt.clone()),
        width: request.width.or(rec.width).unwrap_or(arch.width),
        height: request.height.or(rec.height).unwrap_or(arch.height),
        steps: request.steps.unwrap_or(tier.steps),
        cfg: request.cfg.or(rec.cfg).unwrap_or(arch.cfg),
        sampler_name: request
            .sampler_name
            .clone()
            .or_else(|| rec.sampler_name.clone())
            .unwrap_or_else(|| arch.sampler_name.to_string()),
        scheduler: request
            .scheduler
            .clone()
            .or_else(|| rec.scheduler.clone())
            .unwrap_or_else(|| arch.scheduler.to_string()),
        hires_fix: request.hires_fix.unwrap_or(tier.hires_fix),
        upscale: request.upscale.unwrap_or(tier.upscale),
    }
}

fn pipeline_request(request: &ImagineRequest, settings: &ImagineSettings) -> PipelineRequest {
    let base = Txt2ImgParams {
        base: PromptParams {
            prompt: settings.prompt.clone(),
            negative_prompt: settings.negative_prompt.clone(),
            model: Some(request.model.clone()),
            sampler: SamplerSettings {
                steps: Some(settings.steps),
                cfg: Some(settings.cfg),
                sampler_name: Some(settings.sampler_name.clone()),
                scheduler: Some(settings.scheduler.clone()),
                seed: request.seed,
            },
            loras: request.loras.clone(),
            filename_prefix: None,
        },
        width: Some(settings.width),
        height: Some(settings.height),
    };

    PipelineRequest {
        base: BaseGeneration::Txt2Img(base),
        hires_fix: settings.hires_fix.then(HiresFix::default),
        upscale: settings.upscale.then(|| UpscaleOptions {
            upscale_model: request.upscale_model.clone(),
            ..Default::default()
        }),
    }
}

impl<C: ExecutionClient> PipelineOrchestrator<C> {
    /// Generate from a description with family- and tier-tuned settings
    pub async fn imagine(
        &self,
        request: &ImagineRequest,
        strategy: &dyn PromptStrategy,
        events: &dyn EventSink,
    ) -> std::result::Result<ImagineOutcome, PipelineFailure> {
        let family = detect_family(&request.model);
        let output = strategy
            .generate(&StrategyRequest {
                description: request.description.clone(),
                family: family.family,
            })
            .await
            .map_err(|error| {
                log::error!("Prompt strategy failed: {}", error);
                let mut run = PipelineRun::new(format!("pipe-{}", uuid::Uuid::new_v4()));
                run.state = PipelineState::Failed;
                PipelineFailure { run, error }
            })?;

        let settings = resolve_settings(request, &family, &output);
        log::info!(
            "Imagine with {} ({:?}): {} steps, hires {}, upscale {}",
            family.family.as_str(),
            request.quality,
            settings.steps,
            settings.hires_fix,
            settings.upscale
        );

        let run = self
            .execute_pipeline(&pipeline_request(request, &settings), events)
            .await?;
        Ok(ImagineOutcome {
            run,
            family,
            settings,
        })
    }
}
