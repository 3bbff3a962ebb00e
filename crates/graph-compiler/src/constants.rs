//! Engine operation names and compile defaults
//!
//! Single source of truth for the engine-side names the templates use and
//! the default parameter values applied when a request leaves them out.

/// Engine operation names
pub mod ops {
    pub const CHECKPOINT_LOADER: &str = "CheckpointLoaderSimple";
    pub const LORA_LOADER: &str = "LoraLoader";
    pub const TEXT_ENCODE: &str = "CLIPTextEncode";
    pub const EMPTY_LATENT: &str = "EmptyLatentImage";
    pub const SAMPLER: &str = "KSampler";
    pub const VAE_DECODE: &str = "VAEDecode";
    pub const VAE_ENCODE: &str = "VAEEncode";
    pub const SAVE_IMAGE: &str = "SaveImage";
    pub const LOAD_IMAGE: &str = "LoadImage";
    pub const LOAD_IMAGE_MASK: &str = "LoadImageMask";
    pub const IMAGE_SCALE: &str = "ImageScale";
    pub const IMAGE_SCALE_BY: &str = "ImageScaleBy";
    pub const UPSCALE_MODEL_LOADER: &str = "UpscaleModelLoader";
    pub const UPSCALE_WITH_MODEL: &str = "ImageUpscaleWithModel";
    pub const CONTROLNET_LOADER: &str = "ControlNetLoader";
    pub const CONTROLNET_APPLY: &str = "ControlNetApplyAdvanced";
    pub const LATENT_NOISE_MASK: &str = "SetLatentNoiseMask";
    pub const PAD_FOR_OUTPAINT: &str = "ImagePadForOutpaint";
    pub const GROW_MASK: &str = "GrowMask";
    pub const INVERT_MASK: &str = "InvertMask";
    pub const SOLID_MASK: &str = "SolidMask";
    pub const MASK_COMPOSITE: &str = "MaskComposite";
    pub const MASK_TO_IMAGE: &str = "MaskToImage";
    pub const SEGMENT_BY_TEXT: &str = "GroundingDinoSAMSegment (segment anything)";
    pub const SAM_MODEL_LOADER: &str = "SAMModelLoader (segment anything)";
    pub const GROUNDING_DINO_LOADER: &str = "GroundingDinoModelLoader (segment anything)";
    pub const LOAD_AUDIO: &str = "LoadAudio";
    pub const TTS: &str = "F5TTSAudioInputs";
    pub const SAVE_AUDIO: &str = "SaveAudioTensor";
    pub const IMAGE_ONLY_CHECKPOINT_LOADER: &str = "ImageOnlyCheckpointLoader";
    pub const LIPSYNC_LOADER: &str = "SONICTLoader";
    pub const LIPSYNC_PREDATA: &str = "SONIC_PreData";
    pub const LIPSYNC_SAMPLER: &str = "SONICSampler";
    pub const VIDEO_COMBINE: &str = "VHS_VideoCombine";
}

/// Output slot indices of the template nodes
pub mod slots {
    /// Checkpoint loader and LoRA loader
    pub const MODEL: u32 = 0;
    pub const CLIP: u32 = 1;
    /// Checkpoint loader only
    pub const VAE: u32 = 2;
    /// Control apply node
    pub const POSITIVE: u32 = 0;
    pub const NEGATIVE: u32 = 1;
    /// Outpaint padding node
    pub const PADDED_IMAGE: u32 = 0;
    pub const PADDED_MASK: u32 = 1;
}

/// Fixed node ids of the diffusion template
pub mod ids {
    pub const UPSCALE_LOADER: &str = "1";
    pub const UPSCALER: &str = "2";
    pub const SAMPLER: &str = "3";
    pub const CHECKPOINT: &str = "4";
    pub const LATENT: &str = "5";
    pub const POSITIVE: &str = "6";
    pub const NEGATIVE: &str = "7";
    pub const DECODE: &str = "8";
    pub const SAVE: &str = "9";
    pub const SOURCE_IMAGE: &str = "10";
    pub const SOURCE_MASK: &str = "11";
    pub const ENCODE: &str = "12";
    pub const NOISE_MASK: &str = "13";
    pub const PAD: &str = "14";
    pub const RESIZE: &str = "15";
    pub const GROW: &str = "16";
}

/// Default values for generation parameters
pub mod defaults {
    pub const WIDTH: u32 = 512;
    pub const HEIGHT: u32 = 768;
    pub const STEPS: u32 = 28;
    pub const CFG: f64 = 7.0;
    pub const SAMPLER: &str = "euler_ancestral";
    pub const SCHEDULER: &str = "normal";
    pub const NEGATIVE_PROMPT: &str = "bad quality, blurry, ugly, deformed";
    pub const IMG2IMG_DENOISE: f64 = 0.75;
    pub const INPAINT_DENOISE: f64 = 0.75;
    pub const OUTPAINT_DENOISE: f64 = 0.8;
    pub const OUTPAINT_FEATHERING: u32 = 40;
    pub const UPSCALE_METHOD: &str = "lanczos";
    pub const UPSCALE_MODEL: &str = "4x-UltraSharp.pth";
    pub const FILENAME_PREFIX: &str = "pipeline";
    pub const LORA_STRENGTH: f64 = 1.0;
    pub const MASK_THRESHOLD: f64 = 0.3;
    pub const SAM_MODEL: &str = "sam_vit_h (2.56GB)";
    pub const GROUNDING_DINO_MODEL: &str = "GroundingDINO_SwinT_OGC (694MB)";
    /// Exclusive upper bound of sampled seeds (2^31 - 1)
    pub const MAX_SEED: u64 = 2_147_483_647;
}

/// Defaults for the audio and video templates
pub mod media {
    pub const TTS_TEXT: &str = "Hello world";
    pub const TTS_VOICE_SAMPLE: &str = "voices/sample.wav";
    pub const TTS_MODEL: &str = "F5TTS_v1_Base";
    pub const TTS_VOCODER: &str = "vocos";
    pub const TTS_SPEED: f64 = 1.0;
    pub const TTS_PREFIX: &str = "ComfyUI_TTS";
    pub const LIPSYNC_CHECKPOINT: &str = "svd_xt_1_1.safetensors";
    pub const LIPSYNC_UNET: &str = "unet.pth";
    pub const LIPSYNC_STEPS: u32 = 25;
    pub const LIPSYNC_FPS: f64 = 25.0;
    pub const LIPSYNC_MIN_RESOLUTION: u32 = 512;
    pub const LIPSYNC_PREFIX: &str = "ComfyUI_LipSync";
    pub const LIPSYNC_FORMAT: &str = "video/h264-mp4";
    pub const LIPSYNC_DTYPE: &str = "fp16";
}
