use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::llm::CompletionClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a financial news analyst.";

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_attempts: u32,
}

impl ChatCompletionsClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_llm_api_key()?.to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("failed to build reqwest client: {e}"))
            })?;

        Ok(Self {
            http,
            endpoint: settings.llm_endpoint.clone(),
            api_key,
            model: settings.llm_model.clone(),
            temperature: settings.llm_temperature,
            max_tokens: settings.llm_max_tokens,
            max_attempts: settings.llm_max_attempts.max(1),
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| PipelineError::LlmTransport {
                status: e.status().map(|s| s.as_u16()),
                detail: format!("LLM request failed: {e}"),
                body: None,
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| PipelineError::LlmTransport {
            status: Some(status.as_u16()),
            detail: format!("failed to read LLM response body: {e}"),
            body: None,
        })?;

        if !status.is_success() {
            tracing::warn!(%status, body = %text, "LLM endpoint returned an error status");
            return Err(PipelineError::LlmTransport {
                status: Some(status.as_u16()),
                detail: format!("status={status}"),
                body: Some(text),
            });
        }

        parse_reply(&text)
    }
}

#[async_trait::async_trait]
impl CompletionClient for ChatCompletionsClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.complete_once(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    if attempt >= self.max_attempts || !err.is_transient() {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                    tracing::warn!(attempt, ?backoff, error = %err, "LLM call failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion response body.
pub fn parse_reply(body: &str) -> Result<String> {
    let format_err = |detail: String| PipelineError::LlmResponseFormat {
        detail,
        body: body.to_string(),
    };

    let parsed = serde_json::from_str::<ChatResponse>(body)
        .map_err(|e| format_err(format!("response is not a chat completion: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| format_err("response has no choices".to_string()))?
        .message
        .content
        .ok_or_else(|| format_err("choices[0].message.content is missing".to_string()))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Answers one connection per canned response and returns the raw requests seen.
    async fn spawn_server(
        responses: Vec<(u16, String)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut stream).await);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
            seen
        });
        (format!("http://{addr}/v1/chat/completions"), handle)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn client(endpoint: String, max_attempts: u32) -> ChatCompletionsClient {
        let settings = Settings {
            llm_endpoint: endpoint,
            llm_api_key: Some("test-key".to_string()),
            llm_max_attempts: max_attempts,
            llm_timeout_secs: 5,
            ..Settings::default()
        };
        ChatCompletionsClient::from_settings(&settings).unwrap()
    }

    fn ok_body(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    #[test]
    fn parse_reply_extracts_first_choice() {
        let body = json!({
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hold for now."}},
                {"index": 1, "message": {"role": "assistant", "content": "Ignored."}}
            ]
        })
        .to_string();
        assert_eq!(parse_reply(&body).unwrap(), "Hold for now.");
    }

    #[test]
    fn parse_reply_rejects_malformed_bodies() {
        for body in [
            "not json".to_string(),
            json!({"object": "error"}).to_string(),
            json!({"choices": []}).to_string(),
            json!({"choices": [{"message": {"role": "assistant"}}]}).to_string(),
            json!({"choices": [{"message": {"content": 42}}]}).to_string(),
        ] {
            let err = parse_reply(&body).unwrap_err();
            assert!(
                matches!(err, PipelineError::LlmResponseFormat { .. }),
                "body {body} gave {err}"
            );
        }
    }

    #[test]
    fn missing_api_key_fails_client_construction() {
        let err = ChatCompletionsClient::from_settings(&Settings::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn sends_chat_request_with_bearer_credentials() {
        let (endpoint, server) = spawn_server(vec![(200, ok_body("Positive outlook."))]).await;
        let reply = client(endpoint, 1).complete("What now?").await.unwrap();
        assert_eq!(reply, "Positive outlook.");

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 1);
        let raw = &requests[0];
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_lowercase().contains("authorization: bearer test-key"));

        let body_start = raw.find("\r\n\r\n").unwrap() + 4;
        let body: serde_json::Value = serde_json::from_str(&raw[body_start..]).unwrap();
        assert_eq!(body["model"], "mistral-tiny");
        assert_eq!(body["max_tokens"], 512);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What now?");
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error_without_retry() {
        let (endpoint, server) =
            spawn_server(vec![(401, json!({"message": "Unauthorized"}).to_string())]).await;
        let err = client(endpoint, 3).complete("x").await.unwrap_err();
        match err {
            PipelineError::LlmTransport { status, body, .. } => {
                assert_eq!(status, Some(401));
                assert!(body.unwrap().contains("Unauthorized"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_max_attempts() {
        let (endpoint, server) = spawn_server(vec![
            (503, json!({"message": "busy"}).to_string()),
            (200, ok_body("Buy.")),
        ])
        .await;
        let reply = client(endpoint, 2).complete("x").await.unwrap();
        assert_eq!(reply, "Buy.");
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let (endpoint, server) =
            spawn_server(vec![(503, json!({"message": "busy"}).to_string())]).await;
        let err = client(endpoint, 1).complete("x").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/v1/chat/completions"), 1)
            .complete("x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LlmTransport { status: None, .. }
        ));
    }

    #[tokio::test]
    async fn success_without_content_is_a_format_error() {
        let (endpoint, server) =
            spawn_server(vec![(200, json!({"choices": []}).to_string())]).await;
        let err = client(endpoint, 2).complete("x").await.unwrap_err();
        assert!(matches!(err, PipelineError::LlmResponseFormat { .. }));
        assert_eq!(server.await.unwrap().len(), 1);
    }
}
