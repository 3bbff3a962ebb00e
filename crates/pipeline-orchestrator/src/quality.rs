//! Quality tiers
//!
//! A coarse knob mapping to step count and which refinement passes run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Draft,
    #[default]
    Standard,
    High,
    Ultra,
}

/// Concrete settings a tier stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSettings {
    pub steps: u32,
    pub hires_fix: bool,
    pub upscale: bool,
}

impl QualityTier {
    pub fn settings(&self) -> TierSettings {
        let (steps, hires_fix, upscale) = match self {
            QualityTier::Draft => (12, false, false),
            QualityTier::Standard => (25, false, false),
            QualityTier::High => (35, true, false),
            QualityTier::Ultra => (45, true, true),
        };
        TierSettings {
            steps,
            hires_fix,
            upscale,
        }
    }
}
