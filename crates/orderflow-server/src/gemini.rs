//! Gemini-backed document extractor.
//!
//! Sends the uploaded file inline (base64) with an extraction prompt and asks
//! for a JSON answer. Each call is bounded by a timeout, and a circuit breaker
//! short-circuits calls after repeated failures so uploads fall back to the
//! spreadsheet path quickly while the API is down.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use orderflow_core::ingestion::{parse_extraction_payload, ExtractedOrder};
use orderflow_core::ports::{DocumentExtractor, ExtractionError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const ERROR_BODY_CHARS: usize = 200;

const EXTRACTION_PROMPT: &str = r#"Eres un asistente que extrae ordenes de compra de documentos comerciales.
Lee el documento adjunto y responde UNICAMENTE con un objeto JSON con esta forma:
{
  "numeroOrden": "string o null",
  "cliente": {
    "nombre": "string o null",
    "nit": "string o null",
    "email": "string o null",
    "telefono": "string o null",
    "direccion": "string o null"
  },
  "productos": [
    {
      "sku": "string o null",
      "descripcion": "string o null",
      "cantidad": numero,
      "precioUnitario": numero,
      "subtotal": numero
    }
  ],
  "subtotal": numero o null,
  "impuestos": numero o null,
  "total": numero o null,
  "moneda": "codigo ISO 4217 o null",
  "fecha": "YYYY-MM-DD o null",
  "observaciones": "string o null"
}
Usa null cuando un dato no aparezca. No inventes productos. Los numeros van sin separadores de miles."#;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

// ── Circuit breaker ───────────────────────────────────────────

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Opens after `threshold` consecutive failures and stays open for
/// `cooldown`. The first call after the cooldown is let through; a failure
/// there re-opens it immediately.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// `Err(remaining)` while open.
    pub fn check(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.lock();
        match state.open_until {
            Some(until) if now < until => Err(until - now),
            Some(_) => {
                // Half-open: one more failure trips it again.
                state.open_until = None;
                state.consecutive_failures = self.threshold - 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self) {
        *self.lock() = BreakerState::default();
    }

    /// Returns true when this failure opened the breaker.
    pub fn record_failure(&self, now: Instant) -> bool {
        let mut state = self.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold && state.open_until.is_none() {
            state.open_until = Some(now + self.cooldown);
            return true;
        }
        false
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.lock().open_until.is_some_and(|until| now < until)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // A panic while holding the lock leaves plain counters behind.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ── Extractor ─────────────────────────────────────────────────

pub struct GeminiExtractor {
    config: GeminiConfig,
    client: Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl GeminiExtractor {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is empty");
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let breaker = CircuitBreaker::new(config.failure_threshold, config.cooldown);
        Ok(Self {
            config,
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            breaker,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn build_request(&self, content: &[u8], mime_type: &str) -> GeminiRequest {
        let data = base64::engine::general_purpose::STANDARD.encode(content);
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart {
                        text: Some(EXTRACTION_PROMPT.to_string()),
                        inline_data: None,
                    },
                    GeminiPart {
                        text: None,
                        inline_data: Some(GeminiInlineData {
                            mime_type: mime_type.to_string(),
                            data,
                        }),
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json",
            },
        }
    }

    async fn send_request(&self, request: &GeminiRequest) -> Result<String, ExtractionError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );
        debug!(
            "Sending extraction request to Gemini: {}",
            url.replace(&self.config.api_key, "***")
        );

        let transport = |e: reqwest::Error| {
            ExtractionError::Transport(e.to_string().replace(&self.config.api_key, "***"))
        };
        let call = async {
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(transport)?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(transport)?;
            Ok::<_, ExtractionError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| ExtractionError::Timeout(self.config.timeout.as_secs()))??;

        debug!(%status, "Gemini response received");
        if !status.is_success() {
            error!(%status, "Gemini API error");
            return Err(classify_status(status, &body));
        }

        candidate_text(&body)
    }
}

/// Map a non-success HTTP status to an extraction error.
fn classify_status(status: StatusCode, body: &str) -> ExtractionError {
    let detail = format!(
        "HTTP {status}: {}",
        body.chars().take(ERROR_BODY_CHARS).collect::<String>()
    );
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExtractionError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => ExtractionError::Quota(detail),
        s if s.is_server_error() => ExtractionError::Unavailable(detail),
        _ => ExtractionError::Transport(detail),
    }
}

/// First text part of the first candidate.
fn candidate_text(body: &str) -> Result<String, ExtractionError> {
    let malformed = |message: String| ExtractionError::Malformed {
        message,
        excerpt: body.chars().take(ERROR_BODY_CHARS).collect(),
    };
    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|e| malformed(format!("envelope: {e}")))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| malformed("no candidates in response".into()))
}

#[async_trait]
impl DocumentExtractor for GeminiExtractor {
    async fn extract(
        &self,
        content: &[u8],
        mime_type: &str,
    ) -> Result<ExtractedOrder, ExtractionError> {
        if let Err(remaining) = self.breaker.check(Instant::now()) {
            debug!(remaining_secs = remaining.as_secs(), "Gemini circuit open");
            return Err(ExtractionError::Unavailable(format!(
                "circuit open for another {}s",
                remaining.as_secs()
            )));
        }

        info!(
            mime_type,
            size = content.len(),
            model = %self.config.model,
            "Extracting order with Gemini"
        );
        let request = self.build_request(content, mime_type);
        match self.send_request(&request).await {
            Ok(text) => {
                // The API answered; a bad payload is not an outage.
                self.breaker.record_success();
                parse_extraction_payload(&text)
            }
            Err(e @ ExtractionError::Malformed { .. }) => {
                self.breaker.record_success();
                Err(e)
            }
            Err(e) => {
                if self.breaker.record_failure(Instant::now()) {
                    warn!(
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Gemini circuit opened after repeated failures: {e}"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeminiConfig {
        GeminiConfig::new("test-key", "gemini-2.5-flash", Duration::from_secs(5))
    }

    #[test]
    fn extractor_creation() {
        assert!(GeminiExtractor::new(config()).is_ok());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut cfg = config();
        cfg.api_key = "  ".into();
        assert!(GeminiExtractor::new(cfg).is_err());
    }

    #[test]
    fn request_carries_inline_file_and_json_mime() {
        let extractor = GeminiExtractor::new(config()).unwrap();
        let request = extractor.build_request(b"%PDF-1.4", "application/pdf");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        let parts = &json["contents"][0]["parts"];
        assert!(parts[0]["text"].as_str().unwrap().contains("numeroOrden"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[1]["inlineData"]["data"], "JVBERi0xLjQ=");
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            ExtractionError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "quota"),
            ExtractionError::Quota(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ExtractionError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, ""),
            ExtractionError::Transport(_)
        ));
    }

    #[test]
    fn candidate_text_reads_first_part() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"productos\":[]}"}]}}]}"#;
        assert_eq!(candidate_text(body).unwrap(), r#"{"productos":[]}"#);

        let err = candidate_text(r#"{"candidates":[]}"#).unwrap_err();
        assert!(err.is_parse_failure());
    }

    #[test]
    fn breaker_opens_after_threshold_and_half_opens() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(!breaker.record_failure(t0));
        assert!(!breaker.record_failure(t0));
        assert!(breaker.record_failure(t0));
        assert!(breaker.is_open(t0));
        assert!(breaker.check(t0 + Duration::from_secs(30)).is_err());

        let later = t0 + Duration::from_secs(61);
        assert!(breaker.check(later).is_ok());
        // One failure in half-open state trips it again.
        assert!(breaker.record_failure(later));
        assert!(breaker.check(later).is_err());
    }

    #[test]
    fn success_resets_breaker() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        breaker.record_failure(t0);
        breaker.record_failure(t0);
        breaker.record_success();
        assert!(!breaker.record_failure(t0));
        assert!(breaker.check(t0).is_ok());
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_network() {
        let extractor = GeminiExtractor::new(config())
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let now = Instant::now();
        for _ in 0..3 {
            extractor.breaker().record_failure(now);
        }
        let err = extractor.extract(b"x", "image/png").await.unwrap_err();
        match err {
            ExtractionError::Unavailable(msg) => assert!(msg.contains("circuit open")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
