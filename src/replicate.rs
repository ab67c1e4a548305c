// Minimal Replicate REST client: create a prediction, then poll its
// status URL until the model reports an output or an error.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ReplicateError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model error: {0}")]
    Model(String),
    #[error("malformed prediction: {0}")]
    Malformed(String),
    #[error("prediction still pending after {0:?}")]
    DeadlineExceeded(Duration),
}

/// Fixed-interval polling bounded by an overall deadline. The deadline is
/// explicit so a wedged prediction surfaces as an error instead of
/// holding the request open forever.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionUrls {
    pub get: String,
}

pub const BASE_URL: &str = "https://api.replicate.com";

pub struct Client {
    http: reqwest::Client,
    token: String,
    poll: PollPolicy,
    base_url: String,
}

impl Client {
    pub fn new(token: String, poll: PollPolicy) -> Self {
        Client::with_base_url(token, poll, BASE_URL)
    }

    /// Points the client at a different API host. The tests use this to
    /// run the pipeline against a local stand-in server.
    pub fn with_base_url(token: String, poll: PollPolicy, base_url: impl Into<String>) -> Self {
        Client {
            http: reqwest::Client::new(),
            token,
            poll,
            base_url: base_url.into(),
        }
    }

    /// Creates a prediction against a version-pinned model.
    pub async fn create(&self, version: &str, input: Value) -> Result<Prediction, ReplicateError> {
        let prediction = self
            .http
            .post(format!("{}/v1/predictions", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "version": version, "input": input }))
            .send()
            .await?
            .json()
            .await?;
        Ok(prediction)
    }

    /// Creates a prediction against a model addressed by owner/name.
    pub async fn create_for_model(
        &self,
        model: &str,
        input: Value,
    ) -> Result<Prediction, ReplicateError> {
        let url = format!("{}/v1/models/{model}/predictions", self.base_url);
        let prediction = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?
            .json()
            .await?;
        Ok(prediction)
    }

    /// Polls a prediction's status URL until it reaches a terminal state.
    pub async fn wait(&self, prediction: &Prediction) -> Result<Value, ReplicateError> {
        let url = prediction
            .urls
            .as_ref()
            .map(|u| u.get.clone())
            .ok_or_else(|| {
                match &prediction.error {
                    // Creation itself was rejected; surface the model's message.
                    Some(e) if !e.is_null() => ReplicateError::Model(error_text(e)),
                    _ => ReplicateError::Malformed("prediction has no status URL".into()),
                }
            })?;

        let start = Instant::now();
        loop {
            if start.elapsed() >= self.poll.deadline {
                return Err(ReplicateError::DeadlineExceeded(self.poll.deadline));
            }
            tokio::time::sleep(self.poll.interval).await;

            let snapshot: Prediction = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?
                .json()
                .await?;

            if let Some(output) = poll_outcome(&snapshot)? {
                return Ok(output);
            }
        }
    }
}

/// One poll-loop step: `Err` on a model-reported error, `Ok(Some)` once an
/// output exists, `Ok(None)` while the prediction is still running.
pub fn poll_outcome(p: &Prediction) -> Result<Option<Value>, ReplicateError> {
    if let Some(error) = &p.error {
        if !error.is_null() {
            return Err(ReplicateError::Model(error_text(error)));
        }
    }
    if let Some(output) = &p.output {
        if !output.is_null() {
            return Ok(Some(output.clone()));
        }
    }
    Ok(None)
}

/// Caption-style output: a bare string, or the first element of an array
/// of strings.
pub fn output_text(output: &Value) -> Result<String, ReplicateError> {
    match output {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => items
            .first()
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ReplicateError::Malformed("empty output array".into())),
        other => Err(ReplicateError::Malformed(format!(
            "unexpected output shape: {other}"
        ))),
    }
}

/// Image-generation output: the first URL of the output array.
pub fn first_output_url(output: &Value) -> Result<String, ReplicateError> {
    match output {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => items
            .first()
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ReplicateError::Malformed("no output URL".into())),
        other => Err(ReplicateError::Malformed(format!(
            "unexpected output shape: {other}"
        ))),
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(json: &str) -> Prediction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn running_prediction_yields_nothing() {
        let p = prediction(r#"{"id":"x","status":"processing","output":null,"error":null}"#);
        assert!(poll_outcome(&p).unwrap().is_none());
    }

    #[test]
    fn model_error_is_terminal() {
        let p = prediction(r#"{"id":"x","status":"failed","error":"NSFW content detected"}"#);
        match poll_outcome(&p) {
            Err(ReplicateError::Model(msg)) => assert_eq!(msg, "NSFW content detected"),
            other => panic!("expected model error, got {other:?}"),
        }
    }

    #[test]
    fn output_is_terminal_even_without_status() {
        let p = prediction(r#"{"output":"Caption: a red bicycle"}"#);
        let out = poll_outcome(&p).unwrap().unwrap();
        assert_eq!(output_text(&out).unwrap(), "Caption: a red bicycle");
    }

    #[test]
    fn error_takes_precedence_over_output() {
        let p = prediction(r#"{"output":["partial"],"error":"boom"}"#);
        assert!(matches!(poll_outcome(&p), Err(ReplicateError::Model(_))));
    }

    #[test]
    fn first_url_is_taken_from_array_output() {
        let out = serde_json::json!(["https://replicate.delivery/a.png", "https://x/b.png"]);
        assert_eq!(
            first_output_url(&out).unwrap(),
            "https://replicate.delivery/a.png"
        );
    }

    #[test]
    fn missing_status_url_is_malformed() {
        let p = prediction(r#"{"detail":"Invalid token"}"#);
        assert!(p.urls.is_none());
    }
}
