//! Model-family detection
//!
//! Guesses the architecture family of a checkpoint from its file name using
//! an ordered table of case-insensitive patterns, each with a confidence.
//! The highest-confidence match wins; on a tie the earlier row wins.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Checkpoint architecture families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Flux,
    Sd3,
    Pony,
    Illustrious,
    Sdxl,
    Sd15,
}

/// Settings an architecture works well with when nothing else says otherwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchitectureDefaults {
    pub width: u32,
    pub height: u32,
    pub cfg: f64,
    pub sampler_name: &'static str,
    pub scheduler: &'static str,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Flux => "flux",
            ModelFamily::Sd3 => "sd3",
            ModelFamily::Pony => "pony",
            ModelFamily::Illustrious => "illustrious",
            ModelFamily::Sdxl => "sdxl",
            ModelFamily::Sd15 => "sd15",
        }
    }

    pub fn defaults(&self) -> ArchitectureDefaults {
        match self {
            ModelFamily::Flux => ArchitectureDefaults {
                width: 1024,
                height: 1024,
                cfg: 1.0,
                sampler_name: "euler",
                scheduler: "simple",
            },
            ModelFamily::Sd3 => ArchitectureDefaults {
                width: 1024,
                height: 1024,
                cfg: 4.5,
                sampler_name: "dpmpp_2m",
                scheduler: "sgm_uniform",
            },
            ModelFamily::Pony => ArchitectureDefaults {
                width: 832,
                height: 1216,
                cfg: 7.0,
                sampler_name: "euler_ancestral",
                scheduler: "normal",
            },
            ModelFamily::Illustrious => ArchitectureDefaults {
                width: 832,
                height: 1216,
                cfg: 6.0,
                sampler_name: "euler_ancestral",
                scheduler: "normal",
            },
            ModelFamily::Sdxl => ArchitectureDefaults {
                width: 1024,
                height: 1024,
                cfg: 7.0,
                sampler_name: "dpmpp_2m",
                scheduler: "karras",
            },
            ModelFamily::Sd15 => ArchitectureDefaults {
                width: 512,
                height: 768,
                cfg: 7.0,
                sampler_name: "euler_ancestral",
                scheduler: "normal",
            },
        }
    }
}

/// Result of family detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyDetection {
    pub family: ModelFamily,
    /// 0.0 when nothing matched and the fallback family was used
    pub confidence: f32,
    /// Pattern that decided the family
    pub matched_pattern: Option<String>,
}

/// Detection rules, in priority order
const FAMILY_RULES: &[(ModelFamily, &str, f32)] = &[
    (ModelFamily::Flux, r"flux", 0.95),
    (ModelFamily::Sd3, r"sd3|sd_3|stable[-_ ]?diffusion[-_ ]?3", 0.9),
    (ModelFamily::Pony, r"pony", 0.9),
    (ModelFamily::Illustrious, r"illustrious|noob", 0.85),
    (ModelFamily::Sdxl, r"sdxl|[-_ ]xl\b|xl[-_ ]|juggernaut", 0.7),
    (ModelFamily::Sd15, r"sd[-_ ]?1[._]?5|v1-5|realistic[-_ ]?vision|dreamshaper", 0.6),
];

const FALLBACK_FAMILY: ModelFamily = ModelFamily::Sd15;

static FAMILY_PATTERNS: Lazy<Vec<(ModelFamily, Regex, f32)>> = Lazy::new(|| {
    FAMILY_RULES
        .iter()
        .filter_map(|(family, pattern, confidence)| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => Some((*family, regex, *confidence)),
                Err(e) => {
                    log::error!("Invalid family pattern '{}': {}", pattern, e);
                    None
                }
            }
        })
        .collect()
});

/// Detect the family of a checkpoint from its file name
pub fn detect_family(model_filename: &str) -> FamilyDetection {
    let mut best: Option<&(ModelFamily, Regex, f32)> = None;
    for rule in FAMILY_PATTERNS.iter() {
        if rule.1.is_match(model_filename) && best.map_or(true, |b| rule.2 > b.2) {
            best = Some(rule);
        }
    }

    let detection = match best {
        Some((family, regex, confidence)) => FamilyDetection {
            family: *family,
            confidence: *confidence,
            matched_pattern: Some(regex.as_str().to_string()),
        },
        None => FamilyDetection {
            family: FALLBACK_FAMILY,
            confidence: 0.0,
            matched_pattern: None,
        },
    };
    log::debug!(
        "Model '{}' detected as {} ({:.2})",
        model_filename,
        detection.family.as_str(),
        detection.confidence
    );
    detection
}
