use std::env;
use std::time::Duration;

/// Default upstream endpoint (OpenAI-compatible chat completions).
pub const DEFAULT_API_URL: &str = "https://api.deepseek.com";

/// Sampling defaults applied when the caller omits a parameter.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 500;
pub const DEFAULT_PRESENCE_PENALTY: f64 = 0.0;
pub const DEFAULT_FREQUENCY_PENALTY: f64 = 0.0;
pub const DEFAULT_TOP_P: f64 = 1.0;
pub const DEFAULT_N: u64 = 1;

/// Inserted when normalization would otherwise produce an empty conversation.
pub const PROMPT_PLACEHOLDER: &str = "Let's get started.";

/// Retry ceiling for rate-limited upstream responses.
pub const DEFAULT_RETRIES: u32 = 5;

/// First backoff wait after a 429; doubles on each retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(5000);

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    /// Provider credential. `None` is tolerated here; dispatch rejects a
    /// request without a credential unless it routes through a reverse proxy.
    pub api_key: Option<String>,
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let api_url =
            env::var("GALE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_key = env::var("API_KEY").ok().filter(|key| !key.is_empty());
        if api_key.is_none() {
            tracing::warn!("API_KEY not set — requests without a reverse proxy will fail");
        }

        let retries = env::var("GALE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRIES);
        let initial_backoff = env::var("GALE_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INITIAL_BACKOFF);

        Config {
            api_url,
            api_key,
            retries,
            initial_backoff,
        }
    }
}
