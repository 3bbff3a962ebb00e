//! Mask extraction
//!
//! Produces a black/white mask image from one of three sources, in order of
//! precedence: an explicit rectangle, a free-text description, a preset.

use std::collections::BTreeMap;

use super::diffusion::require_input;
use super::{check_fraction, seal, CompileKind, CompiledGraph, GraphCompiler};
use crate::constants::{defaults, ops};
use crate::error::{CompileError, Result};
use crate::params::{MaskParams, MaskRegion};
use crate::types::{Graph, Input, NodeId};

fn inputs<const N: usize>(pairs: [(&str, Input); N]) -> BTreeMap<String, Input> {
    pairs
        .into_iter()
        .map(|(name, input)| (name.to_string(), input))
        .collect()
}

/// Segmenter output slot carrying the mask
const SEGMENT_MASK_SLOT: u32 = 1;

fn region_mask(graph: &mut Graph, region: &MaskRegion) -> Result<(NodeId, u32)> {
    if region.width == 0 || region.height == 0 {
        return Err(CompileError::invalid("region", "width and height must be non-zero"));
    }
    let fits_x = region.x.checked_add(region.width).is_some_and(|r| r <= region.canvas_width);
    let fits_y = region.y.checked_add(region.height).is_some_and(|b| b <= region.canvas_height);
    if !fits_x || !fits_y {
        return Err(CompileError::invalid("region", "rectangle extends past the canvas"));
    }

    let canvas = graph.add(
        ops::SOLID_MASK,
        inputs([
            ("value", Input::literal(0.0)),
            ("width", Input::literal(region.canvas_width)),
            ("height", Input::literal(region.canvas_height)),
        ]),
    );
    let fill = graph.add(
        ops::SOLID_MASK,
        inputs([
            ("value", Input::literal(1.0)),
            ("width", Input::literal(region.width)),
            ("height", Input::literal(region.height)),
        ]),
    );
    let composite = graph.add(
        ops::MASK_COMPOSITE,
        inputs([
            ("destination", Input::link(canvas, 0)),
            ("source", Input::link(fill, 0)),
            ("x", Input::literal(region.x)),
            ("y", Input::literal(region.y)),
            ("operation", Input::literal("add")),
        ]),
    );
    Ok((composite, 0))
}

fn segment_mask(graph: &mut Graph, image: &str, phrase: &str, threshold: f64) -> Result<(NodeId, u32)> {
    require_input("image", image)?;
    let sam = graph.add(
        ops::SAM_MODEL_LOADER,
        inputs([("model_name", Input::literal(defaults::SAM_MODEL))]),
    );
    let dino = graph.add(
        ops::GROUNDING_DINO_LOADER,
        inputs([("model_name", Input::literal(defaults::GROUNDING_DINO_MODEL))]),
    );
    let loaded = graph.add(ops::LOAD_IMAGE, inputs([("image", Input::literal(image))]));
    let segment = graph.add(
        ops::SEGMENT_BY_TEXT,
        inputs([
            ("sam_model", Input::link(sam, 0)),
            ("grounding_dino_model", Input::link(dino, 0)),
            ("image", Input::link(loaded, 0)),
            ("prompt", Input::literal(phrase)),
            ("threshold", Input::literal(threshold)),
        ]),
    );
    Ok((segment, SEGMENT_MASK_SLOT))
}

impl GraphCompiler {
    /// Mask extraction, rendered to an image and saved
    pub fn compile_mask(&self, params: &MaskParams) -> Result<CompiledGraph> {
        let threshold = params.threshold.unwrap_or(defaults::MASK_THRESHOLD);
        check_fraction("threshold", threshold)?;

        let mut graph = Graph::new();
        let text = params.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let ((mut mask, mut slot), preset_inverts) = if let Some(region) = &params.region {
            (region_mask(&mut graph, region)?, false)
        } else if let Some(text) = text {
            (segment_mask(&mut graph, &params.image, text, threshold)?, false)
        } else if let Some(preset) = params.preset {
            (
                segment_mask(&mut graph, &params.image, preset.phrase(), threshold)?,
                preset.inverted(),
            )
        } else {
            return Err(CompileError::MissingMaskSource);
        };

        if let Some(expand) = params.expand.filter(|px| *px != 0) {
            mask = graph.add(
                ops::GROW_MASK,
                inputs([
                    ("mask", Input::link(mask, slot)),
                    ("expand", Input::literal(expand)),
                    ("tapered_corners", Input::literal(true)),
                ]),
            );
            slot = 0;
        }

        if preset_inverts != params.invert {
            mask = graph.add(ops::INVERT_MASK, inputs([("mask", Input::link(mask, slot))]));
            slot = 0;
        }

        let image = graph.add(ops::MASK_TO_IMAGE, inputs([("mask", Input::link(mask, slot))]));
        let save = graph.add(
            ops::SAVE_IMAGE,
            inputs([
                ("images", Input::link(image, 0)),
                (
                    "filename_prefix",
                    Input::literal(self.filename_prefix(params.filename_prefix.as_deref())),
                ),
            ]),
        );

        seal(graph, &save, None, CompileKind::Mask)
    }
}
