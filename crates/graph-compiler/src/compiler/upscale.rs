//! Model-based upscale template

use super::diffusion::require_input;
use super::{seal, CompileKind, CompiledGraph, GraphCompiler};
use crate::builder::GraphBuilder;
use crate::constants::{defaults, ids, ops};
use crate::error::{CompileError, Result};
use crate::params::UpscaleParams;

impl GraphCompiler {
    /// Loader, upscaler, optional resize, saver
    ///
    /// The resize node only exists when a target width or height is given;
    /// without one the saver reads the upscaler's output directly. A single
    /// missing dimension is passed as 0, which the engine treats as "keep
    /// aspect ratio".
    pub fn compile_upscale(&self, params: &UpscaleParams) -> Result<CompiledGraph> {
        require_input("image", &params.image)?;
        let model = params
            .upscale_model
            .as_deref()
            .or(self.config().default_upscale_model.as_deref())
            .ok_or_else(|| CompileError::MissingModel(CompileKind::Upscale.as_str().to_string()))?;

        let resize = params.width.is_some() || params.height.is_some();
        if resize && params.width.unwrap_or(0) == 0 && params.height.unwrap_or(0) == 0 {
            return Err(CompileError::invalid("width", "target size must not be 0x0"));
        }
        let saver_source = if resize { ids::RESIZE } else { ids::UPSCALER };

        let graph = GraphBuilder::new()
            .add_node(ids::UPSCALE_LOADER, ops::UPSCALE_MODEL_LOADER)
            .with_literal("model_name", model)
            .add_node(ids::SOURCE_IMAGE, ops::LOAD_IMAGE)
            .with_literal("image", params.image.clone())
            .add_node(ids::UPSCALER, ops::UPSCALE_WITH_MODEL)
            .with_ref("upscale_model", ids::UPSCALE_LOADER, 0)
            .with_ref("image", ids::SOURCE_IMAGE, 0)
            .add_node_if(resize, |b| {
                b.add_node(ids::RESIZE, ops::IMAGE_SCALE)
                    .with_literal(
                        "upscale_method",
                        params.method.as_deref().unwrap_or(defaults::UPSCALE_METHOD),
                    )
                    .with_literal("width", params.width.unwrap_or(0))
                    .with_literal("height", params.height.unwrap_or(0))
                    .with_literal("crop", "disabled")
                    .with_ref("image", ids::UPSCALER, 0)
            })
            .add_node(ids::SAVE, ops::SAVE_IMAGE)
            .with_literal(
                "filename_prefix",
                self.filename_prefix(params.filename_prefix.as_deref()),
            )
            .with_ref("images", saver_source, 0)
            .build_validated()?;

        seal(graph, ids::SAVE, None, CompileKind::Upscale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerConfig;
    use crate::types::NodeRef;

    fn params() -> UpscaleParams {
        UpscaleParams {
            image: "base.png".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_target_size_omits_resize() {
        let compiled = GraphCompiler::default().compile_upscale(&params()).unwrap();
        let graph = &compiled.graph;
        assert!(!graph.contains(ids::RESIZE));
        assert!(graph.nodes_with_operation(ops::IMAGE_SCALE).is_empty());
        assert_eq!(graph.len(), 4);
        assert_eq!(
            graph.node(ids::SAVE).unwrap().reference("images"),
            Some(&NodeRef::new(ids::UPSCALER, 0))
        );
        assert_eq!(
            graph.node(ids::UPSCALE_LOADER).unwrap().literal("model_name").unwrap(),
            "4x-UltraSharp.pth"
        );
        assert_eq!(compiled.seed, None);
    }

    #[test]
    fn test_target_size_adds_resize() {
        let compiled = GraphCompiler::default()
            .compile_upscale(&UpscaleParams {
                width: Some(2048),
                height: Some(3072),
                ..params()
            })
            .unwrap();
        let graph = &compiled.graph;
        let resize = graph.node(ids::RESIZE).unwrap();
        assert_eq!(resize.operation, ops::IMAGE_SCALE);
        assert_eq!(resize.literal("width").unwrap(), 2048);
        assert_eq!(resize.reference("image"), Some(&NodeRef::new(ids::UPSCALER, 0)));
        assert_eq!(
            graph.node(ids::SAVE).unwrap().reference("images"),
            Some(&NodeRef::new(ids::RESIZE, 0))
        );
    }

    #[test]
    fn test_single_dimension_keeps_aspect() {
        let compiled = GraphCompiler::default()
            .compile_upscale(&UpscaleParams {
                width: Some(1024),
                ..params()
            })
            .unwrap();
        let resize = compiled.graph.node(ids::RESIZE).unwrap();
        assert_eq!(resize.literal("height").unwrap(), 0);
    }

    #[test]
    fn test_missing_upscaler_is_configuration_error() {
        let compiler = GraphCompiler::new(CompilerConfig {
            default_upscale_model: None,
            ..Default::default()
        });
        let err = compiler.compile_upscale(&params()).unwrap_err();
        assert!(matches!(err, CompileError::MissingModel(_)));
    }
}
