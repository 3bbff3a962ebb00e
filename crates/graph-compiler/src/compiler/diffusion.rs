//! Text-to-image, image-to-image, inpaint and outpaint templates

use super::{check_dimension, CompileKind, CompiledGraph, GraphCompiler};
use crate::builder::GraphBuilder;
use crate::constants::{defaults, ids, ops, slots};
use crate::error::{CompileError, Result};
use crate::params::{Img2ImgParams, InpaintParams, OutpaintParams, Resize, Txt2ImgParams};

impl GraphCompiler {
    /// Empty latent of the requested size fed straight to the sampler
    pub fn compile_txt2img(&self, params: &Txt2ImgParams) -> Result<CompiledGraph> {
        let (width, height) = params.resolved_size();
        check_dimension("width", width)?;
        check_dimension("height", height)?;

        let sources = GraphBuilder::new()
            .add_node(ids::LATENT, ops::EMPTY_LATENT)
            .with_literal("width", width)
            .with_literal("height", height)
            .with_literal("batch_size", 1);

        let (graph, seed) = self.diffusion_template(
            CompileKind::Txt2Img,
            &params.base,
            sources,
            ids::LATENT,
            1.0,
        )?;
        self.finish_diffusion(graph, &params.base.loras, seed, CompileKind::Txt2Img)
    }

    /// Source image (optionally resized) encoded into the sampler's latent
    pub fn compile_img2img(&self, params: &Img2ImgParams) -> Result<CompiledGraph> {
        require_input("image", &params.image)?;
        let denoise = params.denoise.unwrap_or(defaults::IMG2IMG_DENOISE);

        let mut sources = GraphBuilder::new()
            .add_node(ids::SOURCE_IMAGE, ops::LOAD_IMAGE)
            .with_literal("image", params.image.clone());

        let mut pixels = ids::SOURCE_IMAGE;
        match params.resize {
            Some(Resize::To { width, height }) => {
                check_dimension("resize.width", width)?;
                check_dimension("resize.height", height)?;
                sources = sources
                    .add_node(ids::RESIZE, ops::IMAGE_SCALE)
                    .with_literal("upscale_method", defaults::UPSCALE_METHOD)
                    .with_literal("width", width)
                    .with_literal("height", height)
                    .with_literal("crop", "disabled")
                    .with_ref("image", ids::SOURCE_IMAGE, 0);
                pixels = ids::RESIZE;
            }
            Some(Resize::By { scale }) => {
                if !(scale > 0.0 && scale.is_finite()) {
                    return Err(CompileError::invalid("resize.scale", "must be a positive number"));
                }
                sources = sources
                    .add_node(ids::RESIZE, ops::IMAGE_SCALE_BY)
                    .with_literal("upscale_method", defaults::UPSCALE_METHOD)
                    .with_literal("scale_by", scale)
                    .with_ref("image", ids::SOURCE_IMAGE, 0);
                pixels = ids::RESIZE;
            }
            None => {}
        }

        let sources = sources
            .add_node(ids::ENCODE, ops::VAE_ENCODE)
            .with_ref("pixels", pixels, 0)
            .with_ref("vae", ids::CHECKPOINT, slots::VAE);

        let (graph, seed) = self.diffusion_template(
            CompileKind::Img2Img,
            &params.base,
            sources,
            ids::ENCODE,
            denoise,
        )?;
        self.finish_diffusion(graph, &params.base.loras, seed, CompileKind::Img2Img)
    }

    /// Image and mask loaders feeding a latent noise mask ahead of the sampler
    pub fn compile_inpaint(&self, params: &InpaintParams) -> Result<CompiledGraph> {
        require_input("image", &params.image)?;
        require_input("mask", &params.mask)?;
        let denoise = params.denoise.unwrap_or(defaults::INPAINT_DENOISE);
        let grow = params.grow_mask_by.filter(|px| *px > 0);

        let sources = GraphBuilder::new()
            .add_node(ids::SOURCE_IMAGE, ops::LOAD_IMAGE)
            .with_literal("image", params.image.clone())
            .add_node(ids::SOURCE_MASK, ops::LOAD_IMAGE_MASK)
            .with_literal("image", params.mask.clone())
            .with_literal("channel", "red")
            .add_node_if(grow.is_some(), |b| {
                b.add_node(ids::GROW, ops::GROW_MASK)
                    .with_literal("expand", grow.unwrap_or_default())
                    .with_literal("tapered_corners", true)
                    .with_ref("mask", ids::SOURCE_MASK, 0)
            })
            .add_node(ids::ENCODE, ops::VAE_ENCODE)
            .with_ref("pixels", ids::SOURCE_IMAGE, 0)
            .with_ref("vae", ids::CHECKPOINT, slots::VAE)
            .add_node(ids::NOISE_MASK, ops::LATENT_NOISE_MASK)
            .with_ref("samples", ids::ENCODE, 0)
            .with_ref(
                "mask",
                if grow.is_some() { ids::GROW } else { ids::SOURCE_MASK },
                0,
            );

        let (graph, seed) = self.diffusion_template(
            CompileKind::Inpaint,
            &params.base,
            sources,
            ids::NOISE_MASK,
            denoise,
        )?;
        self.finish_diffusion(graph, &params.base.loras, seed, CompileKind::Inpaint)
    }

    /// Pad the source canvas and sample only the padded border
    pub fn compile_outpaint(&self, params: &OutpaintParams) -> Result<CompiledGraph> {
        let extents = [params.left, params.top, params.right, params.bottom].map(|e| e.unwrap_or(0));
        if extents.iter().all(|e| *e == 0) {
            return Err(CompileError::NoOutpaintExtent);
        }
        require_input("image", &params.image)?;
        let [left, top, right, bottom] = extents;
        let denoise = params.denoise.unwrap_or(defaults::OUTPAINT_DENOISE);

        let sources = GraphBuilder::new()
            .add_node(ids::SOURCE_IMAGE, ops::LOAD_IMAGE)
            .with_literal("image", params.image.clone())
            .add_node(ids::PAD, ops::PAD_FOR_OUTPAINT)
            .with_literal("left", left)
            .with_literal("top", top)
            .with_literal("right", right)
            .with_literal("bottom", bottom)
            .with_literal(
                "feathering",
                params.feathering.unwrap_or(defaults::OUTPAINT_FEATHERING),
            )
            .with_ref("image", ids::SOURCE_IMAGE, 0)
            .add_node(ids::ENCODE, ops::VAE_ENCODE)
            .with_ref("pixels", ids::PAD, slots::PADDED_IMAGE)
            .with_ref("vae", ids::CHECKPOINT, slots::VAE)
            .add_node(ids::NOISE_MASK, ops::LATENT_NOISE_MASK)
            .with_ref("samples", ids::ENCODE, 0)
            .with_ref("mask", ids::PAD, slots::PADDED_MASK);

        let (graph, seed) = self.diffusion_template(
            CompileKind::Outpaint,
            &params.base,
            sources,
            ids::NOISE_MASK,
            denoise,
        )?;
        self.finish_diffusion(graph, &params.base.loras, seed, CompileKind::Outpaint)
    }
}

pub(super) fn require_input(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CompileError::invalid(name, "an input image name is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerConfig;
    use crate::params::{LoraConfig, PromptParams};
    use crate::types::NodeRef;
    use crate::validation::validate_graph;

    fn base() -> PromptParams {
        PromptParams::new("a cat").with_model("m.safetensors")
    }

    #[test]
    fn test_txt2img_defaults() {
        let compiled = GraphCompiler::default()
            .compile_txt2img(&Txt2ImgParams {
                base: base(),
                ..Default::default()
            })
            .unwrap();
        let graph = &compiled.graph;

        let latent = graph.node(ids::LATENT).unwrap();
        assert_eq!(latent.literal("width").unwrap(), 512);
        assert_eq!(latent.literal("height").unwrap(), 768);

        let sampler = graph.node(ids::SAMPLER).unwrap();
        assert_eq!(sampler.operation, "KSampler");
        assert_eq!(sampler.literal("steps").unwrap(), 28);
        assert_eq!(sampler.literal("cfg").unwrap(), 7.0);
        assert_eq!(sampler.literal("sampler_name").unwrap(), "euler_ancestral");
        assert_eq!(sampler.literal("scheduler").unwrap(), "normal");
        assert_eq!(
            graph.node(ids::NEGATIVE).unwrap().literal("text").unwrap(),
            "bad quality, blurry, ugly, deformed"
        );
        assert_eq!(
            graph.node(ids::CHECKPOINT).unwrap().literal("ckpt_name").unwrap(),
            "m.safetensors"
        );

        let seed = compiled.seed.unwrap();
        assert!(seed < defaults::MAX_SEED);
        assert_eq!(sampler.literal("seed").unwrap(), seed);
        assert_eq!(compiled.output_node, ids::SAVE);
        assert_eq!(compiled.kind, CompileKind::Txt2Img);
    }

    #[test]
    fn test_txt2img_wire_shape() {
        let compiled = GraphCompiler::default()
            .compile_txt2img(&Txt2ImgParams {
                base: base().with_seed(7),
                ..Default::default()
            })
            .unwrap();
        let wire = compiled.to_wire().unwrap();
        assert_eq!(wire["3"]["operation_name"], "KSampler");
        assert_eq!(wire["3"]["inputs"]["seed"], 7);
        assert_eq!(wire["3"]["inputs"]["model"], serde_json::json!(["4", 0]));
        assert_eq!(wire["9"]["inputs"]["images"], serde_json::json!(["8", 0]));
    }

    #[test]
    fn test_txt2img_requires_model() {
        let err = GraphCompiler::default()
            .compile_txt2img(&Txt2ImgParams::new("a cat"))
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingModel(_)));

        let compiler = GraphCompiler::new(CompilerConfig {
            default_checkpoint: Some("d.safetensors".into()),
            ..Default::default()
        });
        assert!(compiler.compile_txt2img(&Txt2ImgParams::new("a cat")).is_ok());
    }

    #[test]
    fn test_txt2img_with_lora_stack() {
        let mut base = base();
        base.loras = vec![LoraConfig::new("a"), LoraConfig::new("b").with_strength(0.5, 0.4)];
        let compiled = GraphCompiler::default()
            .compile_txt2img(&Txt2ImgParams {
                base,
                ..Default::default()
            })
            .unwrap();
        let graph = &compiled.graph;

        assert_eq!(graph.nodes_with_operation("LoraLoader").len(), 2);
        let tail = &graph.chains()[0].nodes[1];
        assert_eq!(
            graph.node(ids::SAMPLER).unwrap().reference("model"),
            Some(&NodeRef::new(tail.clone(), 0))
        );
        assert_eq!(
            graph.node(ids::POSITIVE).unwrap().reference("clip"),
            Some(&NodeRef::new(tail.clone(), 1))
        );
        assert_eq!(graph.node(tail).unwrap().literal("strength_model").unwrap(), 0.5);
    }

    #[test]
    fn test_img2img_encodes_source() {
        let compiled = GraphCompiler::default()
            .compile_img2img(&Img2ImgParams {
                base: base(),
                image: "in.png".into(),
                ..Default::default()
            })
            .unwrap();
        let graph = &compiled.graph;
        let sampler = graph.node(ids::SAMPLER).unwrap();
        assert_eq!(sampler.reference("latent_image").unwrap().node, ids::ENCODE);
        assert_eq!(sampler.literal("denoise").unwrap(), 0.75);
        assert_eq!(graph.node(ids::ENCODE).unwrap().reference("pixels").unwrap().node, ids::SOURCE_IMAGE);
        assert!(!graph.contains(ids::RESIZE));
    }

    #[test]
    fn test_img2img_resize_by_scale() {
        let compiled = GraphCompiler::default()
            .compile_img2img(&Img2ImgParams {
                base: base(),
                image: "in.png".into(),
                denoise: Some(0.4),
                resize: Some(Resize::By { scale: 1.5 }),
            })
            .unwrap();
        let graph = &compiled.graph;
        assert_eq!(graph.node(ids::RESIZE).unwrap().operation, "ImageScaleBy");
        assert_eq!(graph.node(ids::ENCODE).unwrap().reference("pixels").unwrap().node, ids::RESIZE);
        assert_eq!(graph.node(ids::SAMPLER).unwrap().literal("denoise").unwrap(), 0.4);
    }

    #[test]
    fn test_img2img_rejects_bad_denoise() {
        let err = GraphCompiler::default()
            .compile_img2img(&Img2ImgParams {
                base: base(),
                image: "in.png".into(),
                denoise: Some(1.5),
                resize: None,
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidParameter { name, .. } if name == "denoise"));
    }

    #[test]
    fn test_inpaint_template() {
        let compiled = GraphCompiler::default()
            .compile_inpaint(&InpaintParams {
                base: base(),
                image: "in.png".into(),
                mask: "mask.png".into(),
                grow_mask_by: Some(6),
                ..Default::default()
            })
            .unwrap();
        let graph = &compiled.graph;
        let noise_mask = graph.node(ids::NOISE_MASK).unwrap();
        assert_eq!(noise_mask.reference("mask").unwrap().node, ids::GROW);
        assert_eq!(graph.node(ids::SAMPLER).unwrap().reference("latent_image").unwrap().node, ids::NOISE_MASK);
        assert_eq!(graph.node(ids::SAMPLER).unwrap().literal("denoise").unwrap(), 0.75);
        assert!(validate_graph(graph).is_empty());
    }

    #[test]
    fn test_inpaint_without_grow_reads_mask_loader() {
        let compiled = GraphCompiler::default()
            .compile_inpaint(&InpaintParams {
                base: base(),
                image: "in.png".into(),
                mask: "mask.png".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(!compiled.graph.contains(ids::GROW));
        assert_eq!(
            compiled.graph.node(ids::NOISE_MASK).unwrap().reference("mask").unwrap().node,
            ids::SOURCE_MASK
        );
    }

    #[test]
    fn test_outpaint_defaults() {
        let compiled = GraphCompiler::default()
            .compile_outpaint(&OutpaintParams {
                base: base(),
                image: "in.png".into(),
                right: Some(128),
                ..Default::default()
            })
            .unwrap();
        let graph = &compiled.graph;
        let pad = graph.node(ids::PAD).unwrap();
        assert_eq!(pad.literal("left").unwrap(), 0);
        assert_eq!(pad.literal("right").unwrap(), 128);
        assert_eq!(pad.literal("feathering").unwrap(), 40);
        assert_eq!(graph.node(ids::NOISE_MASK).unwrap().reference("mask"), Some(&NodeRef::new(ids::PAD, 1)));
        assert_eq!(graph.node(ids::SAMPLER).unwrap().literal("denoise").unwrap(), 0.8);
    }

    #[test]
    fn test_outpaint_requires_an_extent() {
        for extents in [
            [None, None, None, None],
            [Some(0), Some(0), Some(0), Some(0)],
            [Some(0), None, Some(0), None],
        ] {
            let [left, top, right, bottom] = extents;
            let err = GraphCompiler::default()
                .compile_outpaint(&OutpaintParams {
                    base: base(),
                    image: "in.png".into(),
                    left,
                    top,
                    right,
                    bottom,
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, CompileError::NoOutpaintExtent));
        }
    }
}
