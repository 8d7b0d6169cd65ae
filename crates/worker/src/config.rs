use std::path::PathBuf;
use std::time::Duration;

use sdbot_core::CoreError;
use sdbot_pipeline::config::{parse_user_limits, QueueConfig, DEFAULT_CAPACITY, DEFAULT_USER_LIMIT};

/// Default base URL of the WebUI service.
pub const DEFAULT_WEBUI_URL: &str = "http://localhost:7860";

/// Default upscaler for composite jobs.
pub const DEFAULT_UPSCALER: &str = "R-ESRGAN 4x+";

/// Default directory for generated images.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the WebUI service.
    pub webui_url: String,
    /// HTTP timeout for WebUI calls. `None` waits indefinitely.
    pub webui_timeout: Option<Duration>,
    pub queue: QueueConfig,
    /// Upscaler name used by `!up` requests.
    pub upscaler: String,
    pub output_dir: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `WEBUI_URL`              | `http://localhost:7860` |
    /// | `WEBUI_TIMEOUT_SECS`     | unset (no timeout)      |
    /// | `QUEUE_LIMIT`            | `4`                     |
    /// | `QUEUE_USER_LIMITS`      | empty                   |
    /// | `QUEUE_CAPACITY`         | `10`                    |
    /// | `PROGRESS_INTERVAL_SECS` | `2`                     |
    /// | `JOB_TIMEOUT_SECS`       | unset (no timeout)      |
    /// | `UPSCALER`               | `R-ESRGAN 4x+`          |
    /// | `OUTPUT_DIR`             | `outputs`               |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let webui_url = var("WEBUI_URL").unwrap_or_else(|| DEFAULT_WEBUI_URL.into());
        let webui_timeout = var("WEBUI_TIMEOUT_SECS")
            .map(|v| parse_number::<u64>("WEBUI_TIMEOUT_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);

        let defaults = QueueConfig::default();
        let queue = QueueConfig {
            default_limit: var("QUEUE_LIMIT")
                .map(|v| parse_number("QUEUE_LIMIT", &v))
                .transpose()?
                .unwrap_or(DEFAULT_USER_LIMIT),
            user_limits: var("QUEUE_USER_LIMITS")
                .map(|v| parse_user_limits(&v))
                .transpose()?
                .unwrap_or_default(),
            capacity: var("QUEUE_CAPACITY")
                .map(|v| parse_number("QUEUE_CAPACITY", &v))
                .transpose()?
                .unwrap_or(DEFAULT_CAPACITY),
            progress_interval: var("PROGRESS_INTERVAL_SECS")
                .map(|v| parse_number("PROGRESS_INTERVAL_SECS", &v))
                .transpose()?
                .map(Duration::from_secs)
                .unwrap_or(defaults.progress_interval),
            job_timeout: var("JOB_TIMEOUT_SECS")
                .map(|v| parse_number("JOB_TIMEOUT_SECS", &v))
                .transpose()?
                .map(Duration::from_secs),
        };
        queue.validate()?;

        Ok(Self {
            webui_url,
            webui_timeout,
            queue,
            upscaler: var("UPSCALER").unwrap_or_else(|| DEFAULT_UPSCALER.into()),
            output_dir: var("OUTPUT_DIR")
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into())
                .into(),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CoreError> {
    value
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} must be a non-negative integer, got `{value}`")))
}
