//! Audio and video templates: voice-cloning speech and portrait lip-sync

use super::diffusion::require_input;
use super::{resolve_seed, seal, CompileKind, CompiledGraph, GraphCompiler};
use crate::builder::GraphBuilder;
use crate::constants::{defaults, media, ops};
use crate::error::{CompileError, Result};
use crate::params::{LipSyncParams, TtsParams};

impl GraphCompiler {
    /// Reference voice loader, speech synthesis, audio saver
    pub fn compile_tts(&self, params: &TtsParams) -> Result<CompiledGraph> {
        let text = params.text.as_deref().unwrap_or(media::TTS_TEXT);
        require_input("text", text)?;
        let speed = params.speed.unwrap_or(media::TTS_SPEED);
        if !(speed > 0.0 && speed.is_finite()) {
            return Err(CompileError::invalid("speed", "must be a positive number"));
        }
        let seed = resolve_seed(params.seed);

        let graph = GraphBuilder::new()
            .add_node("1", ops::LOAD_AUDIO)
            .with_literal(
                "audio",
                params.voice_sample.as_deref().unwrap_or(media::TTS_VOICE_SAMPLE),
            )
            .add_node("2", ops::TTS)
            .with_ref("sample_audio", "1", 0)
            .with_literal("sample_text", params.sample_text.clone().unwrap_or_default())
            .with_literal("speech", text)
            .with_literal("seed", seed)
            .with_literal("model", params.model.as_deref().unwrap_or(media::TTS_MODEL))
            .with_literal(
                "vocoder",
                params.vocoder.as_deref().unwrap_or(media::TTS_VOCODER),
            )
            .with_literal("speed", speed)
            .with_literal("model_type", "F5-TTS")
            .add_node("3", ops::SAVE_AUDIO)
            .with_ref("audio", "2", 0)
            .with_literal("filename_prefix", media::TTS_PREFIX)
            .build_validated()?;

        seal(graph, "3", Some(seed), CompileKind::Tts)
    }

    /// Talking-portrait video driven by an audio clip
    ///
    /// Seeds are reduced modulo 2^31 - 1 so they fit the engine's signed
    /// 32-bit seed input.
    pub fn compile_lipsync(&self, params: &LipSyncParams) -> Result<CompiledGraph> {
        require_input("portrait_image", &params.portrait_image)?;
        require_input("audio", &params.audio)?;
        if !(params.duration > 0.0 && params.duration.is_finite()) {
            return Err(CompileError::invalid("duration", "audio duration must be positive"));
        }
        let steps = params.inference_steps.unwrap_or(media::LIPSYNC_STEPS);
        if steps == 0 {
            return Err(CompileError::invalid("inference_steps", "must be at least 1"));
        }
        let seed = resolve_seed(params.seed) % defaults::MAX_SEED;

        let graph = GraphBuilder::new()
            .add_node("1", ops::IMAGE_ONLY_CHECKPOINT_LOADER)
            .with_literal("ckpt_name", params.checkpoint())
            .add_node("2", ops::LOAD_IMAGE)
            .with_literal("image", params.portrait_image.clone())
            .add_node("3", ops::LOAD_AUDIO)
            .with_literal("audio", params.audio.clone())
            .add_node("4", ops::LIPSYNC_LOADER)
            .with_ref("model", "1", 0)
            .with_literal(
                "sonic_unet",
                params.sonic_unet.as_deref().unwrap_or(media::LIPSYNC_UNET),
            )
            .with_literal("ip_audio_scale", 1.0)
            .with_literal("use_interframe", true)
            .with_literal("dtype", media::LIPSYNC_DTYPE)
            .add_node("5", ops::LIPSYNC_PREDATA)
            .with_ref("clip_vision", "1", 1)
            .with_ref("vae", "1", 2)
            .with_ref("audio", "3", 0)
            .with_ref("image", "2", 0)
            .with_ref("weight_dtype", "4", 1)
            .with_literal("min_resolution", media::LIPSYNC_MIN_RESOLUTION)
            .with_literal("duration", params.duration)
            .with_literal("expand_ratio", 1)
            .add_node("6", ops::LIPSYNC_SAMPLER)
            .with_ref("model", "4", 0)
            .with_ref("data_dict", "5", 0)
            .with_literal("seed", seed)
            .with_literal("randomize", "randomize")
            .with_literal("inference_steps", steps)
            .with_literal("dynamic_scale", 1.0)
            .with_literal("fps", params.fps.unwrap_or(media::LIPSYNC_FPS))
            .add_node("7", ops::VIDEO_COMBINE)
            .with_ref("images", "6", 0)
            .with_ref("audio", "3", 0)
            .with_ref("frame_rate", "6", 1)
            .with_literal("loop_count", 0)
            .with_literal("filename_prefix", media::LIPSYNC_PREFIX)
            .with_literal("format", media::LIPSYNC_FORMAT)
            .with_literal("pingpong", false)
            .with_literal("save_output", true)
            .build_validated()?;

        seal(graph, "7", Some(seed), CompileKind::LipSync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeRef;

    #[test]
    fn test_tts_defaults() {
        let compiled = GraphCompiler::default()
            .compile_tts(&TtsParams {
                seed: Some(99),
                ..Default::default()
            })
            .unwrap();
        let tts = compiled.graph.node("2").unwrap();
        assert_eq!(tts.operation, ops::TTS);
        assert_eq!(tts.literal("speech").unwrap(), "Hello world");
        assert_eq!(tts.literal("vocoder").unwrap(), "vocos");
        assert_eq!(tts.literal("seed").unwrap(), 99);
        assert_eq!(tts.reference("sample_audio"), Some(&NodeRef::new("1", 0)));
        assert_eq!(
            compiled.graph.node("1").unwrap().literal("audio").unwrap(),
            "voices/sample.wav"
        );
        assert_eq!(compiled.output_node, "3");
        assert_eq!(compiled.seed, Some(99));
    }

    #[test]
    fn test_lipsync_template() {
        let compiled = GraphCompiler::default()
            .compile_lipsync(&LipSyncParams {
                portrait_image: "face.png".into(),
                audio: "speech.wav".into(),
                duration: 4.5,
                seed: Some(defaults::MAX_SEED + 5),
                ..Default::default()
            })
            .unwrap();
        let graph = &compiled.graph;
        assert_eq!(compiled.seed, Some(5));
        assert_eq!(
            graph.node("1").unwrap().literal("ckpt_name").unwrap(),
            "video/svd_xt_1_1.safetensors"
        );
        let predata = graph.node("5").unwrap();
        assert_eq!(predata.literal("duration").unwrap(), 4.5);
        assert_eq!(predata.reference("weight_dtype"), Some(&NodeRef::new("4", 1)));
        assert_eq!(graph.node("6").unwrap().literal("inference_steps").unwrap(), 25);
        assert_eq!(
            graph.node("7").unwrap().reference("frame_rate"),
            Some(&NodeRef::new("6", 1))
        );
        assert_eq!(compiled.output_node, "7");
    }

    #[test]
    fn test_lipsync_requires_duration() {
        let err = GraphCompiler::default()
            .compile_lipsync(&LipSyncParams {
                portrait_image: "face.png".into(),
                audio: "speech.wav".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidParameter { name, .. } if name == "duration"));
    }
}
