use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AvatarfitError, AvatarfitResult};

/// BFL flux-kontext-pro endpoint used by the default transport.
pub const DEFAULT_ENDPOINT: &str = "https://api.bfl.ai/v1/flux-kontext-pro";

/// One generation submission: prompt plus base64-encoded input image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub input_image: String,
}

/// Opaque id + polling URL identifying one in-flight generation attempt.
/// Discarded once a terminal status is reached or the attempt cap is
/// exhausted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationHandle {
    pub id: String,
    pub polling_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollStatus {
    Processing,
    Ready,
    Error,
    Failed,
}

impl PollStatus {
    /// Ready, Error and Failed stop the poll loop; Processing continues it.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Ready => "Ready",
            Self::Error => "Error",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: PollStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PollResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollResult {
    /// URL of the generated image.
    pub sample: String,
}

/// Poll cadence and attempt cap, passed at construction so tests can run
/// with a zero interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 120,
        }
    }
}

/// Seam between the polling state machine and the wire. The HTTP
/// implementation talks to the BFL API; tests script responses directly.
#[allow(async_fn_in_trait)]
pub trait GenerationTransport {
    async fn submit(&self, request: &GenerationRequest) -> AvatarfitResult<GenerationHandle>;
    async fn poll(&self, handle: &GenerationHandle) -> AvatarfitResult<PollResponse>;
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    prompt: &'a str,
    input_image: &'a str,
    safety_tolerance: u8,
}

/// reqwest-backed transport for the BFL generation API.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn require_key(&self) -> AvatarfitResult<&str> {
        if self.api_key.is_empty() {
            return Err(AvatarfitError::api_key_missing(
                "configure a BFL api key before generating",
            ));
        }
        Ok(&self.api_key)
    }
}

impl GenerationTransport for HttpTransport {
    async fn submit(&self, request: &GenerationRequest) -> AvatarfitResult<GenerationHandle> {
        let key = self.require_key()?;
        let body = SubmitBody {
            prompt: &request.prompt,
            input_image: &request.input_image,
            safety_tolerance: 6,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .header("x-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AvatarfitError::upstream_http(format!("submit request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AvatarfitError::upstream_http(format!(
                "HTTP {status}: {text}"
            )));
        }

        response
            .json::<GenerationHandle>()
            .await
            .map_err(|e| AvatarfitError::upstream_http(format!("parse submit response: {e}")))
    }

    async fn poll(&self, handle: &GenerationHandle) -> AvatarfitResult<PollResponse> {
        let key = self.require_key()?;

        let response = self
            .client
            .get(&handle.polling_url)
            .header("accept", "application/json")
            .header("x-key", key)
            .send()
            .await
            .map_err(|e| AvatarfitError::upstream_http(format!("poll request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AvatarfitError::upstream_http(format!(
                "HTTP {status}: {text}"
            )));
        }

        response
            .json::<PollResponse>()
            .await
            .map_err(|e| AvatarfitError::upstream_http(format!("parse poll response: {e}")))
    }
}

/// Sequential polling client over a transport.
///
/// After submission the state is implicitly Processing; no status is
/// fetched before the first poll. Query failures propagate immediately and
/// are never retried.
pub struct GenerationClient<T> {
    transport: T,
    config: PollConfig,
}

impl<T: GenerationTransport> GenerationClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, PollConfig::default())
    }

    pub fn with_config(transport: T, config: PollConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn start(&self, request: &GenerationRequest) -> AvatarfitResult<GenerationHandle> {
        let handle = self.transport.submit(request).await?;
        tracing::info!(id = %handle.id, "generation submitted");
        Ok(handle)
    }

    /// Poll until a terminal status or the attempt cap. Resolves to the
    /// generated image URL on Ready; the cap is a hard ceiling, the final
    /// permitted query is never followed by another.
    pub async fn wait_for_completion(
        &self,
        handle: &GenerationHandle,
        mut on_progress: impl FnMut(PollStatus),
    ) -> AvatarfitResult<String> {
        let mut attempts = 0u32;
        while attempts < self.config.max_attempts {
            let response = self.transport.poll(handle).await?;
            on_progress(response.status);
            tracing::debug!(attempt = attempts + 1, status = response.status.as_str(), "poll");

            match response.status {
                PollStatus::Ready => {
                    let url = response.result.map(|r| r.sample).unwrap_or_default();
                    tracing::info!(id = %handle.id, "generation ready");
                    return Ok(url);
                }
                PollStatus::Error | PollStatus::Failed => {
                    return Err(AvatarfitError::generation_failed(
                        response.error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                PollStatus::Processing => {}
            }

            tokio::time::sleep(self.config.interval).await;
            attempts += 1;
        }

        Err(AvatarfitError::PollingTimeout {
            attempts: self.config.max_attempts,
        })
    }

    /// Submit and poll to completion in one call.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        on_progress: impl FnMut(PollStatus),
    ) -> AvatarfitResult<String> {
        let handle = self.start(request).await?;
        self.wait_for_completion(&handle, on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_response_parses_upstream_payloads() {
        let ready: PollResponse = serde_json::from_str(
            r#"{"status":"Ready","result":{"sample":"https://x/y.png"}}"#,
        )
        .unwrap();
        assert_eq!(ready.status, PollStatus::Ready);
        assert_eq!(ready.result.unwrap().sample, "https://x/y.png");

        let failed: PollResponse =
            serde_json::from_str(r#"{"status":"Failed","error":"bad input"}"#).unwrap();
        assert_eq!(failed.status, PollStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("bad input"));

        let processing: PollResponse = serde_json::from_str(r#"{"status":"Processing"}"#).unwrap();
        assert_eq!(processing.status, PollStatus::Processing);
        assert!(processing.result.is_none());
        assert!(processing.error.is_none());
    }

    #[test]
    fn terminal_states_are_ready_error_failed() {
        assert!(!PollStatus::Processing.is_terminal());
        assert!(PollStatus::Ready.is_terminal());
        assert!(PollStatus::Error.is_terminal());
        assert!(PollStatus::Failed.is_terminal());
    }

    #[test]
    fn poll_config_defaults_match_fixed_policy() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 120);
    }

    #[test]
    fn submit_body_includes_safety_tolerance() {
        let body = SubmitBody {
            prompt: "p",
            input_image: "b64",
            safety_tolerance: 6,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["safety_tolerance"], 6);
        assert_eq!(json["prompt"], "p");
        assert_eq!(json["input_image"], "b64");
    }
}
