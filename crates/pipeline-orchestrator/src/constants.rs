//! Pipeline constants and defaults

/// Stage names, in execution order
pub mod stages {
    pub const BASE: &str = "base";
    pub const REFINE: &str = "refine";
    pub const UPSCALE: &str = "upscale";
}

/// Default values for orchestrator configuration
pub mod defaults {
    /// Directory stage artifacts are written under
    pub const OUTPUT_DIR: &str = "output";
    /// Configuration file name inside the config directory
    pub const CONFIG_FILE: &str = "pipeline.json";
    pub const HIRES_SCALE: f64 = 1.5;
    pub const HIRES_DENOISE: f64 = 0.4;
    pub const HIRES_STEPS: u32 = 20;
    /// Refine sizes are rounded to a multiple of this
    pub const SIZE_MULTIPLE: u32 = 8;
    pub const MIN_SIZE: u32 = 64;
    /// Largest side the engine accepts
    pub const MAX_SIZE: u32 = 16384;
}
