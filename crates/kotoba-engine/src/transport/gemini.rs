use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use tracing::{debug, warn};

use super::{classify_status, GenerateRequest, GenerateResponse, GenerativeTransport};
use crate::config::{ApiKey, EngineConfig};
use crate::error::PipelineError;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` over HTTPS. The key travels in a header so that request
/// URLs, which reqwest embeds in its errors, never contain it.
pub struct GeminiTransport {
    api_base: String,
    http: HttpClient,
    transport_retries: usize,
    retry_backoff: Duration,
}

impl GeminiTransport {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http: HttpClient::new(),
            transport_retries: config.transport_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// Retries connection-level failures with linear backoff, never past the
    /// request deadline.
    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &ApiKey,
        payload: &Value,
        deadline: Instant,
        budget: Duration,
        warnings: &mut Vec<String>,
    ) -> Result<HttpResponse, PipelineError> {
        let mut attempt = 0usize;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PipelineError::Timeout(budget));
            }
            let response = self
                .http
                .post(endpoint)
                .header(API_KEY_HEADER, api_key.expose())
                .timeout(remaining)
                .json(payload)
                .send();

            let raw = match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => raw.without_url(),
            };
            if raw.is_timeout() {
                return Err(PipelineError::Timeout(budget));
            }
            let delay = self.retry_backoff.mul_f64(attempt as f64 + 1.0);
            let retryable = raw.is_connect() || raw.is_request();
            if !retryable
                || attempt >= self.transport_retries
                || Instant::now() + delay >= deadline
            {
                return Err(PipelineError::Transport(format!("Gemini request failed: {raw}")));
            }
            attempt += 1;
            warn!(
                attempt,
                max = self.transport_retries,
                error = %raw,
                "Gemini transport retry after transient request failure"
            );
            warnings.push(format!(
                "Gemini transport retry {attempt}/{} after transient request failure.",
                self.transport_retries
            ));
            thread::sleep(delay);
        }
    }
}

impl GenerativeTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, PipelineError> {
        let Some(api_key) = request.api_key.as_ref() else {
            return Err(PipelineError::Unauthorized(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            ));
        };
        let started = Instant::now();
        let deadline = started + request.timeout;
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = request.to_payload();
        let mut warnings = Vec::new();

        let response = self.post_with_transport_retries(
            &endpoint,
            api_key,
            &payload,
            deadline,
            request.timeout,
            &mut warnings,
        )?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| {
            let err = err.without_url();
            if err.is_timeout() {
                PipelineError::Timeout(request.timeout)
            } else {
                PipelineError::Transport(format!("Gemini response body read failed: {err}"))
            }
        })?;
        debug!(
            model = %request.model,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gemini response received"
        );
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| PipelineError::Upstream {
            status,
            message: format!("Gemini returned invalid JSON payload: {err}"),
        })?;
        let mut response = GenerateResponse::from_payload(&parsed);
        response.warnings = warnings;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Map;

    use super::GeminiTransport;
    use crate::config::EngineConfig;
    use crate::error::PipelineError;
    use crate::transport::{
        GenerateRequest, GenerationParams, GenerativeTransport, Part, ResponseModality,
    };

    fn transport() -> GeminiTransport {
        GeminiTransport::new(&EngineConfig {
            api_base: "https://example.test/v1beta/".to_string(),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() {
        let transport = transport();
        assert_eq!(
            transport.endpoint_for_model("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            transport.endpoint_for_model(" models/gemini-2.0-flash "),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn missing_key_is_unauthorized_without_a_network_call() {
        let request = GenerateRequest {
            model: "gemini-2.5-flash".to_string(),
            parts: vec![Part::text("hello")],
            params: GenerationParams::new(0.4, 0.95, 40, 256),
            modality: ResponseModality::Text,
            timeout: Duration::from_secs(1),
            api_key: None,
            metadata: Map::new(),
        };
        assert!(matches!(
            transport().generate(&request),
            Err(PipelineError::Unauthorized(_))
        ));
    }
}
