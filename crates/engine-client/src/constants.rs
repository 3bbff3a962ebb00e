//! Engine endpoints and client defaults

/// Default engine address
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8188";

/// Delay between history polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How long a single job may run before the wait gives up
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Engine API paths
pub mod endpoints {
    pub const PROMPT: &str = "/prompt";
    pub const HISTORY: &str = "/history";
    pub const VIEW: &str = "/view";
    pub const UPLOAD_IMAGE: &str = "/upload/image";
    pub const SYSTEM_STATS: &str = "/system_stats";
}

/// Status string the engine reports for a job that ran to completion
pub const STATUS_SUCCESS: &str = "success";
