//! Server configuration, loaded from environment variables at startup.

use std::fmt;
use std::time::Duration;

/// Runtime configuration for campus-chat-server.
///
/// Every field except the provider credential has a default, so a bare
/// `OPENAI_API_KEY=... campus-chat-server` is a working setup.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily-rolling log file; stdout only when `None`.
    pub log_dir: Option<String>,

    /// Comma-separated list of allowed CORS origins. `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Mount Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// Credential for the hosted completion API (`OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API, without a trailing slash.
    pub openai_base_url: String,

    /// Model requested for every completion.
    pub model: String,

    /// Output bound passed to the provider with each request.
    pub max_tokens: u32,

    /// Whole-request timeout for provider calls. `None` keeps the HTTP
    /// client's default (no timeout).
    pub provider_timeout: Option<Duration>,

    /// Sessions idle for longer than this are evicted. `None` keeps every
    /// session for the lifetime of the process.
    pub session_ttl: Option<Duration>,

    /// How often the idle-session sweeper runs.
    pub session_sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            log_dir: None,
            cors_allowed_origins: None,
            enable_swagger: true,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-3.5-turbo".to_owned(),
            max_tokens: 4096,
            provider_timeout: None,
            session_ttl: None,
            session_sweep_interval: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("CAMPUS_CHAT_BIND", &defaults.bind_address),
            log_level: env_or("CAMPUS_CHAT_LOG", &defaults.log_level),
            log_json: env_flag("CAMPUS_CHAT_LOG_JSON", defaults.log_json),
            log_dir: env_opt("CAMPUS_CHAT_LOG_DIR"),
            cors_allowed_origins: env_opt("CAMPUS_CHAT_CORS_ORIGINS"),
            enable_swagger: env_flag("CAMPUS_CHAT_ENABLE_SWAGGER", defaults.enable_swagger),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_base_url: env_or("CAMPUS_CHAT_OPENAI_BASE_URL", &defaults.openai_base_url)
                .trim_end_matches('/')
                .to_owned(),
            model: env_or("CAMPUS_CHAT_MODEL", &defaults.model),
            max_tokens: parse_env("CAMPUS_CHAT_MAX_TOKENS", defaults.max_tokens),
            provider_timeout: secs_env("CAMPUS_CHAT_PROVIDER_TIMEOUT_SECS"),
            session_ttl: secs_env("CAMPUS_CHAT_SESSION_TTL_SECS"),
            session_sweep_interval: secs_env("CAMPUS_CHAT_SESSION_SWEEP_SECS")
                .unwrap_or(defaults.session_sweep_interval),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("log_dir", &self.log_dir)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("enable_swagger", &self.enable_swagger)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("provider_timeout", &self.provider_timeout)
            .field("session_ttl", &self.session_ttl)
            .field("session_sweep_interval", &self.session_sweep_interval)
            .finish()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Whole seconds from `key`; zero and unparsable values mean "unset".
fn secs_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}
