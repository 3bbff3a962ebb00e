//! Control-signal preprocessing
//!
//! Maps each control-signal type to the detector operation that turns a
//! plain photo into the signal image the control model expects, plus the
//! per-signal default model and strength.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::types::{Graph, Input, NodeId};

/// Control-signal types understood by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Canny,
    Depth,
    Openpose,
    Lineart,
    Scribble,
    Softedge,
    Normal,
    Seg,
    Mlsd,
    Tile,
    Qrcode,
    Shuffle,
}

impl SignalType {
    pub const ALL: [SignalType; 12] = [
        SignalType::Canny,
        SignalType::Depth,
        SignalType::Openpose,
        SignalType::Lineart,
        SignalType::Scribble,
        SignalType::Softedge,
        SignalType::Normal,
        SignalType::Seg,
        SignalType::Mlsd,
        SignalType::Tile,
        SignalType::Qrcode,
        SignalType::Shuffle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Canny => "canny",
            SignalType::Depth => "depth",
            SignalType::Openpose => "openpose",
            SignalType::Lineart => "lineart",
            SignalType::Scribble => "scribble",
            SignalType::Softedge => "softedge",
            SignalType::Normal => "normal",
            SignalType::Seg => "seg",
            SignalType::Mlsd => "mlsd",
            SignalType::Tile => "tile",
            SignalType::Qrcode => "qrcode",
            SignalType::Shuffle => "shuffle",
        }
    }

    /// Control model used when the condition does not name one
    pub fn default_model(&self) -> &'static str {
        match self {
            SignalType::Canny => "control_v11p_sd15_canny.pth",
            SignalType::Depth => "control_v11f1p_sd15_depth.pth",
            SignalType::Openpose => "control_v11p_sd15_openpose.pth",
            SignalType::Lineart => "control_v11p_sd15_lineart.pth",
            SignalType::Scribble => "control_v11p_sd15_scribble.pth",
            SignalType::Softedge => "control_v11p_sd15_softedge.pth",
            SignalType::Normal => "control_v11p_sd15_normalbae.pth",
            SignalType::Seg => "control_v11p_sd15_seg.pth",
            SignalType::Mlsd => "control_v11p_sd15_mlsd.pth",
            SignalType::Tile => "control_v11f1e_sd15_tile.pth",
            SignalType::Qrcode => "control_v1p_sd15_qrcode_monster.safetensors",
            SignalType::Shuffle => "control_v11e_sd15_shuffle.pth",
        }
    }

    /// Conditioning strength used when the condition does not set one
    pub fn default_strength(&self) -> f64 {
        match self {
            SignalType::Canny | SignalType::Depth | SignalType::Openpose => 1.0,
            SignalType::Lineart => 0.9,
            SignalType::Scribble => 0.8,
            SignalType::Softedge | SignalType::Normal | SignalType::Seg | SignalType::Mlsd => 0.9,
            SignalType::Tile => 0.6,
            SignalType::Qrcode => 1.3,
            SignalType::Shuffle => 0.7,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        SignalType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| CompileError::UnknownSignalType(s.to_string()))
    }
}

/// Caller overrides for detector parameters
///
/// Unset fields fall back to per-detector defaults; `extra` is forwarded
/// verbatim and wins over everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorOptions {
    pub resolution: Option<u32>,
    pub low_threshold: Option<u32>,
    pub high_threshold: Option<u32>,
    pub detect_body: Option<bool>,
    pub detect_face: Option<bool>,
    pub detect_hand: Option<bool>,
    /// Smallest line segment or region kept by the detector, in pixels
    pub min_region_size: Option<u32>,
    pub extra: BTreeMap<String, Value>,
}

const DEFAULT_RESOLUTION: u32 = 512;

/// Detector operation for a signal type
///
/// `None` means the control image is used pixel for pixel and must never be
/// preprocessed, whatever the caller asked for.
pub fn resolve_detector(signal: SignalType) -> Option<&'static str> {
    match signal {
        SignalType::Canny => Some("CannyEdgePreprocessor"),
        SignalType::Depth => Some("MiDaS-DepthMapPreprocessor"),
        SignalType::Openpose => Some("OpenposePreprocessor"),
        SignalType::Lineart => Some("LineArtPreprocessor"),
        SignalType::Scribble => Some("ScribblePreprocessor"),
        SignalType::Softedge => Some("HEDPreprocessor"),
        SignalType::Normal => Some("BAE-NormalMapPreprocessor"),
        SignalType::Seg => Some("OneFormer-ADE20K-SemSegPreprocessor"),
        SignalType::Mlsd => Some("M-LSDPreprocessor"),
        SignalType::Shuffle => Some("ShufflePreprocessor"),
        SignalType::Tile | SignalType::Qrcode => None,
    }
}

fn toggle(value: Option<bool>) -> Value {
    Value::from(if value.unwrap_or(true) { "enable" } else { "disable" })
}

/// Signal-specific defaults merged with caller overrides
fn detector_settings(signal: SignalType, options: &PreprocessorOptions) -> BTreeMap<String, Value> {
    let mut settings = BTreeMap::new();
    settings.insert(
        "resolution".to_string(),
        Value::from(options.resolution.unwrap_or(DEFAULT_RESOLUTION)),
    );

    match signal {
        SignalType::Canny => {
            settings.insert("low_threshold".into(), options.low_threshold.unwrap_or(100).into());
            settings.insert("high_threshold".into(), options.high_threshold.unwrap_or(200).into());
        }
        SignalType::Openpose => {
            settings.insert("detect_body".into(), toggle(options.detect_body));
            settings.insert("detect_face".into(), toggle(options.detect_face));
            settings.insert("detect_hand".into(), toggle(options.detect_hand));
        }
        SignalType::Mlsd => {
            settings.insert("score_threshold".into(), Value::from(0.1));
            settings.insert("distance_threshold".into(), Value::from(0.1));
            if let Some(size) = options.min_region_size {
                settings.insert("min_line_length".into(), size.into());
            }
        }
        SignalType::Lineart => {
            settings.insert("coarse".into(), Value::from("disable"));
        }
        SignalType::Softedge => {
            settings.insert("safe".into(), Value::from("enable"));
        }
        _ => {}
    }

    for (key, value) in &options.extra {
        settings.insert(key.clone(), value.clone());
    }
    settings
}

/// Emit the detector node for `signal` reading image output 0 of `source`
///
/// Returns the id of the new upstream image source: the detector, or
/// `source` itself (with nothing emitted) when the signal has no detector.
pub fn build_preprocessor_node(
    graph: &mut Graph,
    signal: SignalType,
    source: &str,
    options: &PreprocessorOptions,
) -> Result<NodeId> {
    graph.require(source)?;
    let Some(detector) = resolve_detector(signal) else {
        log::debug!("No detector for '{}', using '{}' as is", signal, source);
        return Ok(source.to_string());
    };

    let mut inputs: BTreeMap<String, Input> = detector_settings(signal, options)
        .into_iter()
        .map(|(k, v)| (k, Input::Literal(v)))
        .collect();
    inputs.insert("image".to_string(), Input::link(source, 0));

    let id = graph.add(detector, inputs);
    log::debug!("Added {} detector '{}' reading '{}'", signal, id, source);
    Ok(id)
}
