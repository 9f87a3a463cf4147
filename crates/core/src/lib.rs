pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod storage;

pub mod config {
    use crate::error::PipelineError;
    use std::path::PathBuf;

    pub const DEFAULT_DATA_DIR: &str = "data";
    pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";
    pub const DEFAULT_LLM_MODEL: &str = "mistral-tiny";
    pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_LLM_MAX_TOKENS: u32 = 512;
    pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
    pub const DEFAULT_LLM_MAX_ATTEMPTS: u32 = 1;
    pub const DEFAULT_LLM_CONCURRENCY: usize = 1;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MatcherKind {
        Substring,
        WordBoundary,
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_dir: PathBuf,
        pub llm_api_key: Option<String>,
        pub llm_endpoint: String,
        pub llm_model: String,
        pub llm_temperature: f32,
        pub llm_max_tokens: u32,
        pub llm_timeout_secs: u64,
        pub llm_max_attempts: u32,
        pub llm_concurrency: usize,
        pub matcher: MatcherKind,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
                llm_api_key: None,
                llm_endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
                llm_model: DEFAULT_LLM_MODEL.to_string(),
                llm_temperature: DEFAULT_LLM_TEMPERATURE,
                llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
                llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
                llm_max_attempts: DEFAULT_LLM_MAX_ATTEMPTS,
                llm_concurrency: DEFAULT_LLM_CONCURRENCY,
                matcher: MatcherKind::Substring,
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Builds settings from an arbitrary key lookup. Unparseable numbers fall back to
        /// their defaults; structurally invalid values are rejected.
        pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let defaults = Self::default();
            let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

            let matcher = match non_empty("RECOMMENDATION_MATCHER").as_deref().map(str::trim) {
                None | Some("substring") => MatcherKind::Substring,
                Some("word") => MatcherKind::WordBoundary,
                Some(other) => {
                    return Err(PipelineError::Configuration(format!(
                        "RECOMMENDATION_MATCHER must be 'substring' or 'word' (got {other})"
                    ))
                    .into())
                }
            };

            let settings = Self {
                data_dir: non_empty("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data_dir),
                llm_api_key: non_empty("LLM_API_KEY"),
                llm_endpoint: lookup("LLM_ENDPOINT").unwrap_or(defaults.llm_endpoint),
                llm_model: lookup("LLM_MODEL").unwrap_or(defaults.llm_model),
                llm_temperature: lookup("LLM_TEMPERATURE")
                    .and_then(|s| s.parse::<f32>().ok())
                    .unwrap_or(defaults.llm_temperature),
                llm_max_tokens: lookup("LLM_MAX_TOKENS")
                    .and_then(|s| s.parse::<u32>().ok())
                    .unwrap_or(defaults.llm_max_tokens),
                llm_timeout_secs: lookup("LLM_TIMEOUT_SECS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(defaults.llm_timeout_secs),
                llm_max_attempts: lookup("LLM_MAX_ATTEMPTS")
                    .and_then(|s| s.parse::<u32>().ok())
                    .unwrap_or(defaults.llm_max_attempts),
                llm_concurrency: lookup("LLM_CONCURRENCY")
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(defaults.llm_concurrency),
                matcher,
                sentry_dsn: non_empty("SENTRY_DSN"),
            };

            settings.validate()?;
            Ok(settings)
        }

        fn validate(&self) -> Result<(), PipelineError> {
            if self.llm_endpoint.trim().is_empty() {
                return Err(PipelineError::Configuration(
                    "LLM_ENDPOINT must be non-empty".to_string(),
                ));
            }
            if self.llm_model.trim().is_empty() {
                return Err(PipelineError::Configuration(
                    "LLM_MODEL must be non-empty".to_string(),
                ));
            }
            if self.llm_max_attempts == 0 {
                return Err(PipelineError::Configuration(
                    "LLM_MAX_ATTEMPTS must be >= 1".to_string(),
                ));
            }
            if self.llm_concurrency == 0 {
                return Err(PipelineError::Configuration(
                    "LLM_CONCURRENCY must be >= 1".to_string(),
                ));
            }
            Ok(())
        }

        pub fn require_llm_api_key(&self) -> Result<&str, PipelineError> {
            self.llm_api_key
                .as_deref()
                .ok_or_else(|| PipelineError::Configuration("LLM_API_KEY is required".to_string()))
        }
    }

}
