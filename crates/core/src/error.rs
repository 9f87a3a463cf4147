use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures surfaced by the recommendation pipeline. None of them are recovered locally
/// except transient transport errors, which the LLM client may retry.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ingestion failed for {}: {detail}", .path.display())]
    Ingestion { path: PathBuf, detail: String },

    #[error("LLM transport error{}: {detail}", .status.map(|s| format!(" (status={s})")).unwrap_or_default())]
    LlmTransport {
        status: Option<u16>,
        detail: String,
        body: Option<String>,
    },

    #[error("LLM response format error: {detail}")]
    LlmResponseFormat { detail: String, body: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn ingestion(path: impl Into<PathBuf>, detail: impl std::fmt::Display) -> Self {
        Self::Ingestion {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    /// Network failures, rate limiting and upstream 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LlmTransport { status: None, .. } => true,
            Self::LlmTransport {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_rate_limit_and_server_errors_are_transient() {
        let network = PipelineError::LlmTransport {
            status: None,
            detail: "connection reset".to_string(),
            body: None,
        };
        let throttled = PipelineError::LlmTransport {
            status: Some(429),
            detail: "status=429".to_string(),
            body: None,
        };
        let unauthorized = PipelineError::LlmTransport {
            status: Some(401),
            detail: "status=401".to_string(),
            body: Some("{\"message\":\"Unauthorized\"}".to_string()),
        };
        let malformed = PipelineError::LlmResponseFormat {
            detail: "missing choices".to_string(),
            body: "{}".to_string(),
        };

        assert!(network.is_transient());
        assert!(throttled.is_transient());
        assert!(!unauthorized.is_transient());
        assert!(!malformed.is_transient());
        assert!(!PipelineError::Configuration("x".to_string()).is_transient());
    }

    #[test]
    fn display_includes_status_and_path() {
        let err = PipelineError::LlmTransport {
            status: Some(503),
            detail: "upstream unavailable".to_string(),
            body: None,
        };
        assert_eq!(
            err.to_string(),
            "LLM transport error (status=503): upstream unavailable"
        );

        let err = PipelineError::ingestion("data/alice.xlsx", "not a workbook");
        assert_eq!(
            err.to_string(),
            "ingestion failed for data/alice.xlsx: not a workbook"
        );
    }
}
