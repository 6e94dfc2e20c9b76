use crate::config::{AiServerConfig, ConfidenceScale};
use crate::db::models::event_models::EventType;
use crate::error::Error;
use anyhow::Result;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Classification returned by the inference server, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub event_type: EventType,
    /// Always in the 0.0..=1.0 range
    pub confidence: f64,
    pub text: String,
    pub is_danger: bool,
}

/// Body of a `/predict` response as sent on the wire
#[derive(Debug, Deserialize)]
struct RawPrediction {
    label: Option<String>,
    confidence: Option<f64>,
    text: Option<String>,
    #[serde(rename = "isDanger", alias = "is_danger")]
    is_danger: Option<bool>,
}

/// HTTP client for the external inference server
#[derive(Clone)]
pub struct AiClient {
    client: reqwest::Client,
    base_url: Url,
    scale: ConfidenceScale,
}

impl AiClient {
    pub fn new(config: &AiServerConfig) -> Result<Self> {
        let mut base = config.url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("Invalid AI server URL {}: {}", config.url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.response_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build AI HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            scale: config.confidence_scale,
        })
    }

    /// Base URL as configured, without the trailing slash
    pub fn url(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid AI server endpoint {}: {}", path, e)))
    }

    /// Send a clip to `/predict` and validate the classification
    pub async fn predict(&self, filename: &str, data: Vec<u8>) -> Result<Prediction> {
        let url = self.endpoint("predict")?;
        info!("Sending {} ({} bytes) to {}", filename, data.len(), url);

        let form = Form::new().part("file", Part::bytes(data).file_name(filename.to_string()));

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("AI server request to {} failed: {}", url, e);
                Error::AiServerUnavailable(format!("AI server is unavailable: {}", describe(&e)))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("AI server returned {}: {}", status, body);
            return Err(Error::AiServerError(format!(
                "AI server returned status {}",
                status.as_u16()
            ))
            .into());
        }

        let body = response.text().await.map_err(|e| {
            Error::AiServerInvalidResponse(format!("Failed to read AI server response: {}", e))
        })?;
        debug!("AI server response: {}", body);

        let prediction = parse_prediction(&body, self.scale)?;

        info!(
            "AI classification: {} ({:.3}, danger={})",
            prediction.event_type, prediction.confidence, prediction.is_danger
        );

        Ok(prediction)
    }

    /// Probe `/health`, returning the response body
    pub async fn health(&self) -> Result<String> {
        let url = self.endpoint("health")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::AiServerUnavailable(format!("AI server is unavailable: {}", describe(&e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AiServerError(format!(
                "AI server returned status {}",
                status.as_u16()
            ))
            .into());
        }

        let body = response.text().await.map_err(|e| {
            Error::AiServerInvalidResponse(format!("Failed to read AI server response: {}", e))
        })?;

        Ok(body)
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    }
}

/// Validate a raw `/predict` body and convert it to the canonical form
fn parse_prediction(body: &str, scale: ConfidenceScale) -> Result<Prediction, Error> {
    if body.trim().is_empty() {
        return Err(Error::AiServerInvalidResponse(
            "AI server returned an empty response".to_string(),
        ));
    }

    let raw: RawPrediction = serde_json::from_str(body).map_err(|e| {
        Error::AiServerInvalidResponse(format!("AI server response is not valid JSON: {}", e))
    })?;

    let label = raw
        .label
        .as_deref()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .ok_or_else(|| Error::AiServerInvalidResponse("label is missing".to_string()))?;
    let event_type = parse_label(label)?;

    let confidence = raw
        .confidence
        .ok_or_else(|| Error::AiServerInvalidResponse("confidence is missing".to_string()))?;
    let confidence = match scale {
        ConfidenceScale::Unit if (0.0..=1.0).contains(&confidence) => confidence,
        ConfidenceScale::Percent if (0.0..=100.0).contains(&confidence) => confidence / 100.0,
        ConfidenceScale::Unit => {
            return Err(Error::AiServerInvalidResponse(format!(
                "confidence {} is outside 0-1",
                confidence
            )))
        }
        ConfidenceScale::Percent => {
            return Err(Error::AiServerInvalidResponse(format!(
                "confidence {} is outside 0-100",
                confidence
            )))
        }
    };

    Ok(Prediction {
        event_type,
        confidence,
        text: raw.text.unwrap_or_default(),
        is_danger: raw.is_danger.unwrap_or_else(|| event_type.is_emergency()),
    })
}

/// Labels are matched case-insensitively, with spaces and dashes treated as
/// underscores
fn parse_label(label: &str) -> Result<EventType, Error> {
    let normalized: String = label
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    normalized
        .parse::<EventType>()
        .map_err(|_| Error::AiServerInvalidResponse(format!("Unknown label: {}", label)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;

    /// Serve a fixed `/predict` reply on an ephemeral port, returning the base URL
    pub(crate) async fn mock_ai_server(status: StatusCode, body: &'static str) -> String {
        let app = Router::new()
            .route("/predict", post(move || async move { (status, body) }))
            .route("/health", get(|| async { r#"{"status":"ok"}"# }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn client(url: &str, scale: ConfidenceScale) -> AiClient {
        AiClient::new(&AiServerConfig {
            url: url.to_string(),
            connect_timeout_secs: 2,
            response_timeout_secs: 5,
            confidence_scale: scale,
        })
        .unwrap()
    }

    fn error_of(err: &anyhow::Error) -> &Error {
        err.downcast_ref::<Error>().expect("domain error")
    }

    #[test]
    fn labels_are_normalized() {
        assert_eq!(parse_label("Scream").unwrap(), EventType::Scream);
        assert_eq!(parse_label("help request").unwrap(), EventType::HelpRequest);
        assert_eq!(parse_label("help-request").unwrap(), EventType::HelpRequest);
        assert!(matches!(
            parse_label("Laughter"),
            Err(Error::AiServerInvalidResponse(_))
        ));
    }

    #[test]
    fn prediction_validation() {
        let ok = parse_prediction(
            r#"{"label":"SCREAM","confidence":0.92,"text":"scream detected","isDanger":true}"#,
            ConfidenceScale::Unit,
        )
        .unwrap();
        assert_eq!(ok.event_type, EventType::Scream);
        assert_eq!(ok.confidence, 0.92);
        assert!(ok.is_danger);

        let aliased = parse_prediction(
            r#"{"label":"normal","confidence":40,"is_danger":false}"#,
            ConfidenceScale::Percent,
        )
        .unwrap();
        assert_eq!(aliased.event_type, EventType::Normal);
        assert!((aliased.confidence - 0.4).abs() < 1e-9);
        assert_eq!(aliased.text, "");

        let defaulted =
            parse_prediction(r#"{"label":"HELP_REQUEST","confidence":0.5}"#, ConfidenceScale::Unit)
                .unwrap();
        assert!(defaulted.is_danger);

        for body in [
            "",
            "not json",
            r#"{"confidence":0.5}"#,
            r#"{"label":"SCREAM"}"#,
            r#"{"label":"SCREAM","confidence":92}"#,
            r#"{"label":"SCREAM","confidence":-0.1}"#,
        ] {
            assert!(
                matches!(
                    parse_prediction(body, ConfidenceScale::Unit),
                    Err(Error::AiServerInvalidResponse(_))
                ),
                "{:?} should be rejected",
                body
            );
        }
    }

    #[tokio::test]
    async fn predict_against_mock_server() {
        let url = mock_ai_server(
            StatusCode::OK,
            r#"{"label":"SCREAM","confidence":0.92,"text":"scream detected","isDanger":true}"#,
        )
        .await;

        let prediction = client(&url, ConfidenceScale::Unit)
            .predict("clip.wav", b"RIFF".to_vec())
            .await
            .unwrap();
        assert_eq!(prediction.event_type, EventType::Scream);
        assert_eq!(prediction.text, "scream detected");
    }

    #[tokio::test]
    async fn server_error_maps_to_bad_gateway_kind() {
        let url = mock_ai_server(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let err = client(&url, ConfidenceScale::Unit)
            .predict("clip.wav", b"RIFF".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(error_of(&err), Error::AiServerError(_)));
    }

    #[tokio::test]
    async fn empty_body_is_invalid_response() {
        let url = mock_ai_server(StatusCode::OK, "").await;
        let err = client(&url, ConfidenceScale::Unit)
            .predict("clip.wav", b"RIFF".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(error_of(&err), Error::AiServerInvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let client = client("http://127.0.0.1:1", ConfidenceScale::Unit);
        let err = client.predict("clip.wav", b"RIFF".to_vec()).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::AiServerUnavailable(_)));

        let err = client.health().await.unwrap_err();
        assert!(matches!(error_of(&err), Error::AiServerUnavailable(_)));
    }

    #[tokio::test]
    async fn health_returns_body() {
        let url = mock_ai_server(StatusCode::OK, "{}").await;
        let body = client(&url, ConfidenceScale::Unit).health().await.unwrap();
        assert!(body.contains("ok"));
    }

    #[test]
    fn url_keeps_base_path() {
        let client = client("http://ai.local:8001/v1", ConfidenceScale::Unit);
        assert_eq!(client.url(), "http://ai.local:8001/v1");
        assert_eq!(
            client.endpoint("predict").unwrap().as_str(),
            "http://ai.local:8001/v1/predict"
        );
    }
}
