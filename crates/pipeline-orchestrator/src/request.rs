//! Pipeline request types

use graph_compiler::{
    CompileError, CompiledGraph, ControlNetParams, GraphCompiler, Img2ImgParams, PromptParams,
    Resize, Txt2ImgParams,
};
use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// The generation that opens every pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BaseGeneration {
    Txt2Img(Txt2ImgParams),
    Img2Img(Img2ImgParams),
    ControlNet(ControlNetParams),
}

impl BaseGeneration {
    /// Prompt, model and sampler settings of the base stage
    pub fn prompt(&self) -> &PromptParams {
        match self {
            BaseGeneration::Txt2Img(p) => &p.base,
            BaseGeneration::Img2Img(p) => &p.base,
            BaseGeneration::ControlNet(p) => &p.base,
        }
    }

    /// Output size of the base stage, when it can be known before running it
    pub fn known_size(&self) -> Option<(u32, u32)> {
        match self {
            BaseGeneration::Txt2Img(p) => Some(p.resolved_size()),
            BaseGeneration::ControlNet(p) => Some(p.resolved_size()),
            BaseGeneration::Img2Img(p) => match p.resize {
                Some(Resize::To { width, height }) => Some((width, height)),
                _ => None,
            },
        }
    }

    pub(crate) fn compile(&self, compiler: &GraphCompiler) -> graph_compiler::Result<CompiledGraph> {
        match self {
            BaseGeneration::Txt2Img(p) => compiler.compile_txt2img(p),
            BaseGeneration::Img2Img(p) => compiler.compile_img2img(p),
            BaseGeneration::ControlNet(p) => compiler.compile_controlnet(p),
        }
    }
}

/// Refine pass settings; unset fields use the orchestrator's hi-res defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiresFix {
    pub scale: Option<f64>,
    pub denoise: Option<f64>,
    pub steps: Option<u32>,
}

/// Final upscale pass settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleOptions {
    pub upscale_model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub method: Option<String>,
}

/// A full pipeline: base generation, then optional refine and upscale passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub base: BaseGeneration,
    /// Refine pass; disabled when absent
    #[serde(default)]
    pub hires_fix: Option<HiresFix>,
    /// Upscale pass; disabled when absent
    #[serde(default)]
    pub upscale: Option<UpscaleOptions>,
}

impl PipelineRequest {
    pub fn new(base: BaseGeneration) -> Self {
        Self {
            base,
            hires_fix: None,
            upscale: None,
        }
    }

    pub fn with_hires_fix(mut self, hires: HiresFix) -> Self {
        self.hires_fix = Some(hires);
        self
    }

    pub fn with_upscale(mut self, upscale: UpscaleOptions) -> Self {
        self.upscale = Some(upscale);
        self
    }

    /// Number of stages this request will run
    pub fn stage_count(&self) -> usize {
        1 + usize::from(self.hires_fix.is_some()) + usize::from(self.upscale.is_some())
    }
}

/// Scale one side for the refine pass: nearest multiple of 8, at least 64
///
/// Sizes above the engine's maximum resolution are rejected.
pub fn hires_dimension(side: u32, scale: f64) -> graph_compiler::Result<u32> {
    let multiple = f64::from(defaults::SIZE_MULTIPLE);
    let scaled = (f64::from(side) * scale / multiple).round() * multiple;
    if !(scaled <= f64::from(defaults::MAX_SIZE)) {
        return Err(CompileError::invalid(
            "hires_fix.scale",
            format!(
                "{} x {} exceeds the maximum size of {}",
                side,
                scale,
                defaults::MAX_SIZE
            ),
        ));
    }
    Ok((scaled as u32).max(defaults::MIN_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hires_dimension() {
        assert_eq!(hires_dimension(512, 1.5).unwrap(), 768);
        assert_eq!(hires_dimension(768, 1.5).unwrap(), 1152);
        assert_eq!(hires_dimension(100, 1.3).unwrap(), 128);
        assert_eq!(hires_dimension(40, 1.0).unwrap(), 64);
        assert_eq!(hires_dimension(8192, 2.0).unwrap(), 16384);
    }

    #[test]
    fn test_hires_dimension_rejects_oversized() {
        let err = hires_dimension(1024, 1e12).unwrap_err();
        assert!(matches!(err, CompileError::InvalidParameter { ref name, .. } if name == "hires_fix.scale"));
        assert!(hires_dimension(1024, f64::INFINITY).is_err());
    }

    #[test]
    fn test_known_size() {
        let txt = BaseGeneration::Txt2Img(Txt2ImgParams::new("a cat"));
        assert_eq!(txt.known_size(), Some((512, 768)));

        let img = BaseGeneration::Img2Img(Img2ImgParams {
            image: "in.png".into(),
            ..Default::default()
        });
        assert_eq!(img.known_size(), None);
    }

    #[test]
    fn test_request_wire_form() {
        let json = serde_json::json!({
            "base": {"mode": "txt2img", "prompt": "a cat", "model": "m.safetensors", "steps": 30},
            "hires_fix": {"denoise": 0.35}
        });
        let request: PipelineRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.base.prompt().sampler.steps, Some(30));
        assert_eq!(request.hires_fix.as_ref().unwrap().denoise, Some(0.35));
        assert!(request.upscale.is_none());
        assert_eq!(request.stage_count(), 2);
    }

    #[test]
    fn test_mode_tags() {
        let json = serde_json::to_value(BaseGeneration::Img2Img(Img2ImgParams::default())).unwrap();
        assert_eq!(json["mode"], "img2img");
    }
}
