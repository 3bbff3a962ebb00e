//! Request parameters for each compile mode
//!
//! Every optional field falls back to a default from
//! [`crate::constants::defaults`] when the graph is compiled.

use serde::{Deserialize, Serialize};

use crate::constants::{defaults, media};
use crate::preprocessor::PreprocessorOptions;

/// One entry of a LoRA stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    /// LoRA file name as known to the engine
    pub name: String,
    #[serde(default = "default_lora_strength")]
    pub strength_model: f64,
    #[serde(default = "default_lora_strength")]
    pub strength_clip: f64,
}

fn default_lora_strength() -> f64 {
    defaults::LORA_STRENGTH
}

impl LoraConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strength_model: defaults::LORA_STRENGTH,
            strength_clip: defaults::LORA_STRENGTH,
        }
    }

    pub fn with_strength(mut self, model: f64, clip: f64) -> Self {
        self.strength_model = model;
        self.strength_clip = clip;
        self
    }
}

/// Sampler knobs shared by every diffusion mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    pub steps: Option<u32>,
    pub cfg: Option<f64>,
    pub sampler_name: Option<String>,
    pub scheduler: Option<String>,
    /// Exact seed; sampled uniformly from [0, 2^31 - 1) when absent
    pub seed: Option<u64>,
}

/// Prompt, model and sampler settings shared by every diffusion mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Checkpoint file name; falls back to the compiler's default checkpoint
    pub model: Option<String>,
    #[serde(flatten)]
    pub sampler: SamplerSettings,
    /// LoRA stack, applied in order
    pub loras: Vec<LoraConfig>,
    pub filename_prefix: Option<String>,
}

impl PromptParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampler.seed = Some(seed);
        self
    }
}

/// Text-to-image request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Txt2ImgParams {
    #[serde(flatten)]
    pub base: PromptParams,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Txt2ImgParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            base: PromptParams::new(prompt),
            ..Default::default()
        }
    }

    /// Width and height after defaults
    pub fn resolved_size(&self) -> (u32, u32) {
        (
            self.width.unwrap_or(defaults::WIDTH),
            self.height.unwrap_or(defaults::HEIGHT),
        )
    }
}

/// Optional resize applied to a source image before it is encoded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resize {
    /// Scale to exact dimensions
    To { width: u32, height: u32 },
    /// Scale by a factor
    By { scale: f64 },
}

/// Image-to-image request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Img2ImgParams {
    #[serde(flatten)]
    pub base: PromptParams,
    /// Source image, as named in the engine's input folder
    pub image: String,
    pub denoise: Option<f64>,
    pub resize: Option<Resize>,
}

/// Model-based upscale request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleParams {
    pub image: String,
    /// Upscaler file name; falls back to the compiler's default upscaler
    pub upscale_model: Option<String>,
    /// Target width; the resize node is omitted when both dimensions are absent
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub method: Option<String>,
    pub filename_prefix: Option<String>,
}

/// One control signal applied during sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCondition {
    /// Signal type name, e.g. "canny", "depth", "openpose"
    pub signal_type: String,
    /// Control image, as named in the engine's input folder
    pub image: String,
    /// Falls back to the per-signal default strength
    #[serde(default)]
    pub strength: Option<f64>,
    /// Fraction of the sampling run during which the condition applies
    #[serde(default = "default_activation_window")]
    pub activation_window: [f64; 2],
    /// Caller intent; ignored for signals that must stay pixel-exact
    #[serde(default = "default_preprocess")]
    pub preprocess: bool,
    /// Falls back to the per-signal default model
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub preprocessor_options: PreprocessorOptions,
}

fn default_activation_window() -> [f64; 2] {
    [0.0, 1.0]
}

fn default_preprocess() -> bool {
    true
}

impl ControlCondition {
    pub fn new(signal_type: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            signal_type: signal_type.into(),
            image: image.into(),
            strength: None,
            activation_window: default_activation_window(),
            preprocess: true,
            model: None,
            preprocessor_options: PreprocessorOptions::default(),
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.activation_window = [start, end];
        self
    }
}

/// Control-conditioned generation request (one or more conditions)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlNetParams {
    #[serde(flatten)]
    pub base: PromptParams,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub conditions: Vec<ControlCondition>,
}

impl ControlNetParams {
    /// Width and height after defaults
    pub fn resolved_size(&self) -> (u32, u32) {
        (
            self.width.unwrap_or(defaults::WIDTH),
            self.height.unwrap_or(defaults::HEIGHT),
        )
    }
}

/// Inpaint request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintParams {
    #[serde(flatten)]
    pub base: PromptParams,
    pub image: String,
    /// Mask image; white marks the region to repaint
    pub mask: String,
    pub denoise: Option<f64>,
    /// Grow the mask by this many pixels before sampling
    pub grow_mask_by: Option<u32>,
}

/// Outpaint request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutpaintParams {
    #[serde(flatten)]
    pub base: PromptParams,
    pub image: String,
    pub left: Option<u32>,
    pub top: Option<u32>,
    pub right: Option<u32>,
    pub bottom: Option<u32>,
    pub feathering: Option<u32>,
    pub denoise: Option<f64>,
}

/// Named mask targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPreset {
    Face,
    Person,
    Hair,
    Clothes,
    Background,
}

impl MaskPreset {
    /// Detection phrase handed to the text segmenter
    pub fn phrase(&self) -> &'static str {
        match self {
            MaskPreset::Face => "face",
            MaskPreset::Person => "person",
            MaskPreset::Hair => "hair",
            MaskPreset::Clothes => "clothes",
            MaskPreset::Background => "person",
        }
    }

    /// Whether the detected region must be inverted
    pub fn inverted(&self) -> bool {
        matches!(self, MaskPreset::Background)
    }
}

/// Rectangular mask region on a canvas of known size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

/// Mask extraction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    pub image: String,
    pub preset: Option<MaskPreset>,
    /// Free-text description of what to mask
    pub text: Option<String>,
    pub region: Option<MaskRegion>,
    pub threshold: Option<f64>,
    /// Grow (positive) or shrink (negative) the mask in pixels
    pub expand: Option<i32>,
    pub invert: bool,
    pub filename_prefix: Option<String>,
}

/// Voice-cloning text-to-speech request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsParams {
    pub text: Option<String>,
    pub voice_sample: Option<String>,
    /// Transcript of the voice sample, if known
    pub sample_text: Option<String>,
    pub speed: Option<f64>,
    pub seed: Option<u64>,
    pub model: Option<String>,
    pub vocoder: Option<String>,
}

/// Portrait lip-sync video request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncParams {
    pub portrait_image: String,
    pub audio: String,
    /// Audio duration in seconds
    pub duration: f64,
    pub svd_checkpoint: Option<String>,
    pub sonic_unet: Option<String>,
    pub inference_steps: Option<u32>,
    pub fps: Option<f64>,
    pub seed: Option<u64>,
}

impl LipSyncParams {
    pub(crate) fn checkpoint(&self) -> String {
        format!(
            "video/{}",
            self.svd_checkpoint
                .as_deref()
                .unwrap_or(media::LIPSYNC_CHECKPOINT)
        )
    }
}
