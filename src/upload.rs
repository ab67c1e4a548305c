// Client side of the gateway: one POST per capture, then the hosted
// result is pulled down and inlined so callers never hold a bare remote
// URL. Sharing dispatches over exactly two strategies: a native opener
// when the platform has one, a plain download directory otherwise.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};

/// Every failure mode of a generation round trip collapses into this one
/// outcome; the detail string is for operator logs only.
#[derive(Debug, thiserror::Error)]
#[error("generation failed: {0}")]
pub struct UploadError(pub String);

pub struct GenerationResult {
    /// Self-contained base64 PNG data URI, ready for direct display.
    pub picture: String,
    pub caption: String,
}

pub struct UploadClient {
    http: reqwest::Client,
    endpoint: String,
}

impl UploadClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        UploadClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Sends the corrected capture and waits for the generated picture.
    pub async fn generate(
        &self,
        image: &[u8],
        strength: u8,
        custom: Option<&str>,
    ) -> Result<GenerationResult, UploadError> {
        let mut query = vec![("dream", strength.to_string())];
        if let Some(custom) = custom {
            query.push(("custom", custom.to_string()));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "text/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| UploadError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError(format!("gateway returned {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UploadError(format!("malformed gateway response: {e}")))?;

        // Errors arrive in the body, not in the status code.
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(UploadError(error.to_string()));
        }

        let url = body
            .get("image")
            .and_then(|v| v.as_str())
            .ok_or_else(|| UploadError("response lacks an image URL".into()))?;
        let caption = body
            .get("caption")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let picture = self.fetch_inline(url).await?;
        Ok(GenerationResult { picture, caption })
    }

    /// Dereferences the hosted URL and inlines the bytes as a data URI.
    async fn fetch_inline(&self, url: &str) -> Result<String, UploadError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| UploadError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UploadError(format!(
                "fetching result image returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UploadError(e.to_string()))?;
        Ok(encode_data_uri(&bytes))
    }
}

pub fn encode_data_uri(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(bytes))
}

/// Decodes a base64 data URI back to raw bytes.
pub fn data_uri_bytes(uri: &str) -> Result<Vec<u8>> {
    let (_, payload) = uri
        .split_once(',')
        .context("not a data URI: missing comma")?;
    general_purpose::STANDARD
        .decode(payload.trim())
        .context("data URI payload is not valid base64")
}

/// The two ways a finished picture can leave the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareTarget {
    /// Hand the file to the platform's opener/share mechanism.
    Native(&'static str),
    /// Drop the file into a download directory.
    Download(PathBuf),
}

pub fn detect_share_target() -> ShareTarget {
    for opener in ["/usr/bin/open", "/usr/bin/xdg-open"] {
        if std::path::Path::new(opener).exists() {
            return ShareTarget::Native(opener);
        }
    }
    ShareTarget::Download(
        dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
    )
}

pub const SHARE_FILENAME: &str = "MadeWithDreamlens.png";

/// Writes the inline picture out and either opens it with the native
/// handler or leaves it in the download directory. Returns the file path.
pub fn share(picture: &str) -> Result<PathBuf> {
    share_to(picture, detect_share_target())
}

pub fn share_to(picture: &str, target: ShareTarget) -> Result<PathBuf> {
    let bytes = data_uri_bytes(picture)?;
    match target {
        ShareTarget::Native(opener) => {
            let path = std::env::temp_dir().join(SHARE_FILENAME);
            std::fs::write(&path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            Command::new(opener)
                .arg(&path)
                .spawn()
                .with_context(|| format!("launching {opener}"))?;
            Ok(path)
        }
        ShareTarget::Download(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(SHARE_FILENAME);
            std::fs::write(&path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            Ok(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trip() {
        let bytes = b"\x89PNG fake".to_vec();
        let uri = encode_data_uri(&bytes);
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(data_uri_bytes(&uri).unwrap(), bytes);
    }

    #[test]
    fn bare_strings_are_rejected() {
        assert!(data_uri_bytes("https://example.com/a.png").is_err());
    }

    #[test]
    fn download_share_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let uri = encode_data_uri(b"picture");
        let path = share_to(&uri, ShareTarget::Download(dir.path().to_path_buf())).unwrap();
        assert_eq!(path.file_name().unwrap(), SHARE_FILENAME);
        assert_eq!(std::fs::read(path).unwrap(), b"picture");
    }
}
