use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    pub groq_base_url: String,
    pub gemini_base_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub website_retry: RetryConfig,
    pub http_timeout: Duration,
    pub transcript_language: String,
    pub endpoints: ProviderEndpoints,
    pub groq_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = RetryConfig::default();
        let endpoints = ProviderEndpoints::default();

        Self {
            bind_addr: env::var("ORACULO_BIND").unwrap_or_else(|_| "127.0.0.1:8501".to_string()),
            upload_dir: env::var("ORACULO_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            max_upload_bytes: env::var("ORACULO_MAX_UPLOAD_MB")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(200)
                .saturating_mul(1024 * 1024),
            website_retry: RetryConfig {
                max_attempts: env::var("ORACULO_WEBSITE_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v: &usize| *v > 0)
                    .unwrap_or(defaults.max_attempts),
                delay: env::var("ORACULO_WEBSITE_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.delay),
            },
            http_timeout: env::var("ORACULO_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
            transcript_language: env::var("ORACULO_TRANSCRIPT_LANGUAGE")
                .unwrap_or_else(|_| "pt".to_string()),
            endpoints: ProviderEndpoints {
                groq_base_url: env::var("GROQ_BASE_URL").unwrap_or(endpoints.groq_base_url),
                gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or(endpoints.gemini_base_url),
            },
            groq_api_key: non_empty_var("GROQ_API_KEY"),
            google_api_key: non_empty_var("GOOGLE_API_KEY"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
