// The generation endpoint: image in, dreamed image out.
//
// One request is handled end-to-end on one task: decode the upload,
// maybe log it, caption it, clean the caption into a prompt, run the
// generation model, answer with the hosted URL and the caption. Upstream
// failures are reported in the body as `{"error": ...}` with a 200; the
// client treats absent success fields as the failure signal.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Json;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{Config, CAPTION_MODEL_VERSION, GENERATION_MODEL, NEGATIVE_PROMPT};
use crate::prompt;
use crate::replicate::{self, ReplicateError};

pub struct AppState {
    pub replicate: replicate::Client,
    pub config: Config,
}

// `dream` stays a string here so a malformed value still reaches the
// handler and comes back in the error-body shape instead of a plain-text
// query rejection.
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub dream: Option<String>,
    pub custom: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GenerateResponse {
    Success { image: String, caption: String },
    Failure { error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing dream parameter")]
    MissingStrength,
    #[error("invalid dream parameter")]
    InvalidStrength,
    #[error("empty image payload")]
    EmptyPayload,
    #[error("{0}")]
    Upstream(#[from] ReplicateError),
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<GenerateParams>,
    body: Bytes,
) -> Json<GenerateResponse> {
    let client = addr
        .map(|ConnectInfo(a)| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match run(&state, params, &body, &client).await {
        Ok((image, caption)) => {
            println!("✅ Dreamed for {client}: {caption}");
            Json(GenerateResponse::Success { image, caption })
        }
        Err(e) => {
            eprintln!("⚠️  Generation failed for {client}: {e}");
            Json(GenerateResponse::Failure { error: e.to_string() })
        }
    }
}

async fn run(
    state: &AppState,
    params: GenerateParams,
    body: &[u8],
    client: &str,
) -> Result<(String, String), GatewayError> {
    let dream = params
        .dream
        .as_deref()
        .ok_or(GatewayError::MissingStrength)?
        .trim()
        .parse::<f64>()
        .map_err(|_| GatewayError::InvalidStrength)?;
    let strength = strength_from_dream(dream);

    let (custom, suppress_log) = prompt::strip_sentinel(params.custom.as_deref().unwrap_or(""));

    let payload = ImagePayload::from_body(body).ok_or(GatewayError::EmptyPayload)?;

    if state.config.log_enabled && !suppress_log {
        if let Err(e) = write_capture_log(&state.config.log_dir, Local::now(), client, &payload) {
            eprintln!("⚠️  Capture log write failed: {e}");
        }
    }

    let raw_caption = caption_image(state, &payload).await?;
    let caption = prompt::clean_caption(&raw_caption);
    let final_prompt = prompt::compose_prompt(&caption, &custom, &state.config.prompt_addendum);
    println!("📝 Prompt: {final_prompt}");

    let image_url = generate_image(state, &payload, &final_prompt, strength).await?;
    Ok((image_url, caption))
}

/// Maps the wire-level `dream` integer (0-100) onto the model's
/// prompt-strength float in [0, 1].
pub fn strength_from_dream(dream: f64) -> f64 {
    (dream / 100.0).clamp(0.0, 1.0)
}

async fn caption_image(state: &AppState, payload: &ImagePayload) -> Result<String, GatewayError> {
    let prediction = state
        .replicate
        .create(
            CAPTION_MODEL_VERSION,
            json!({ "image": payload.data_uri(), "task": "image_captioning" }),
        )
        .await?;
    let output = state.replicate.wait(&prediction).await?;
    Ok(replicate::output_text(&output)?)
}

async fn generate_image(
    state: &AppState,
    payload: &ImagePayload,
    prompt: &str,
    strength: f64,
) -> Result<String, GatewayError> {
    let prediction = state
        .replicate
        .create_for_model(
            GENERATION_MODEL,
            json!({
                "prompt": prompt,
                "aspect_ratio": "1:1",
                "image": payload.data_uri(),
                "prompt_strength": strength,
                "num_outputs": 1,
                "num_inference_steps": 28,
                "guidance": 3.5,
                "output_format": "png",
                "output_quality": 100,
                "negative_prompt": NEGATIVE_PROMPT,
                "go_fast": true
            }),
        )
        .await?;
    let output = state.replicate.wait(&prediction).await?;
    Ok(replicate::first_output_url(&output)?)
}

/// The upload body as both the data URI the models want and the decoded
/// bytes the capture log wants. Accepts a data URI, bare base64 text, or
/// raw image bytes.
pub struct ImagePayload {
    data_uri: String,
    decoded: Vec<u8>,
}

impl ImagePayload {
    pub fn from_body(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        if let Ok(text) = std::str::from_utf8(body) {
            let text = text.trim();
            if text.starts_with("data:") {
                let (_, b64) = text.split_once(',')?;
                let decoded = general_purpose::STANDARD.decode(b64).ok()?;
                return Some(ImagePayload {
                    data_uri: text.to_string(),
                    decoded,
                });
            }
            if let Ok(decoded) = general_purpose::STANDARD.decode(text) {
                return Some(ImagePayload {
                    data_uri: format!("data:image/png;base64,{text}"),
                    decoded,
                });
            }
        }
        Some(ImagePayload {
            data_uri: format!(
                "data:image/png;base64,{}",
                general_purpose::STANDARD.encode(body)
            ),
            decoded: body.to_vec(),
        })
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn decoded(&self) -> &[u8] {
        &self.decoded
    }
}

/// `<YYYYMMDDHHMMSS>-<client address>.jpg` with `.` and `:` flattened to
/// `-` so IPv4 and IPv6 addresses are filesystem-safe.
pub fn log_filename(timestamp: DateTime<Local>, client: &str) -> String {
    let name = format!("{}-{}", timestamp.format("%Y%m%d%H%M%S"), client);
    format!("{}.jpg", name.replace(['.', ':'], "-"))
}

pub fn write_capture_log(
    dir: &Path,
    timestamp: DateTime<Local>,
    client: &str,
    payload: &ImagePayload,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_filename(timestamp, client));
    std::fs::write(&path, payload.decoded())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dream_85_becomes_exactly_0_85() {
        assert_eq!(strength_from_dream(85.0), 0.85);
        assert_eq!(strength_from_dream(0.0), 0.0);
        assert_eq!(strength_from_dream(100.0), 1.0);
        assert_eq!(strength_from_dream(250.0), 1.0);
    }

    #[test]
    fn log_filename_is_timestamp_dash_address() {
        let ts = Local::now();
        let name = log_filename(ts, "192.168.1.20");
        let stem = name.strip_suffix(".jpg").unwrap();
        let (digits, addr) = stem.split_at(14);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(addr, "-192-168-1-20");
    }

    #[test]
    fn ipv6_separators_are_flattened() {
        let name = log_filename(Local::now(), "::1");
        assert!(!name.trim_end_matches(".jpg").contains(':'));
        assert!(name.ends_with("---1.jpg"));
    }

    #[test]
    fn data_uri_bodies_are_decoded_for_the_log() {
        let uri = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(b"pixels")
        );
        let payload = ImagePayload::from_body(uri.as_bytes()).unwrap();
        assert_eq!(payload.decoded(), b"pixels");
        assert_eq!(payload.data_uri(), uri);
    }

    #[test]
    fn raw_bodies_are_wrapped_as_data_uris() {
        let payload = ImagePayload::from_body(&[0x89, b'P', b'N', b'G', 0x00]).unwrap();
        assert!(payload.data_uri().starts_with("data:image/png;base64,"));
        assert_eq!(payload.decoded(), &[0x89, b'P', b'N', b'G', 0x00]);
    }

    #[test]
    fn bare_base64_bodies_are_recognized() {
        let b64 = general_purpose::STANDARD.encode(b"pixels");
        let payload = ImagePayload::from_body(b64.as_bytes()).unwrap();
        assert_eq!(payload.decoded(), b"pixels");
        assert_eq!(payload.data_uri(), format!("data:image/png;base64,{b64}"));
    }

    #[test]
    fn empty_bodies_are_rejected() {
        assert!(ImagePayload::from_body(b"").is_none());
    }

    #[test]
    fn capture_log_lands_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let payload = ImagePayload::from_body(b"\x89PNG bytes").unwrap();
        let path =
            write_capture_log(dir.path(), Local::now(), "10.0.0.7", &payload).unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG bytes");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn error_response_serializes_the_error_shape() {
        let json = serde_json::to_string(&GenerateResponse::Failure {
            error: "model error: boom".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"error":"model error: boom"}"#);

        let json = serde_json::to_string(&GenerateResponse::Success {
            image: "https://x/a.png".into(),
            caption: "a red bicycle".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"image":"https://x/a.png","caption":"a red bicycle"}"#);
    }
}
