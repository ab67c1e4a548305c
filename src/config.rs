// Runtime configuration for the gateway and the native client.
//
// Everything tunable comes from the environment (a `.env` file is honored
// via dotenvy in main); the generation pipeline constants below are fixed.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Reserved character in the `custom` parameter that suppresses the
/// server-side capture log for a request. Stripped before prompt use.
pub const SENTINEL: char = '!';

/// Terms deleted from captions before they become prompts.
pub const BAN_TERMS: [&str; 4] = ["nude", "naked", "blood", "dead"];

pub const NEGATIVE_PROMPT: &str = "nsfw, naked";

/// BLIP captioning model, pinned by version hash.
pub const CAPTION_MODEL_VERSION: &str =
    "2e1dddc8621f72155f24cf2e0adbde548458d3cab9f00c0139eea840d0ac4746";

/// Image-to-image generation model, addressed by name.
pub const GENERATION_MODEL: &str = "black-forest-labs/flux-dev";

/// Strength used when the client has no persisted preference (0-100 scale).
pub const DEFAULT_DREAM: u8 = 73;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub log_enabled: bool,
    pub log_dir: PathBuf,
    pub prompt_addendum: String,
    pub poll_deadline_secs: u64,
    /// Gateway URL the `dream` subcommand posts to.
    pub endpoint: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            bind: env_or("DREAMLENS_BIND", "0.0.0.0:3000"),
            log_enabled: env_flag("DREAMLENS_LOG", true),
            log_dir: PathBuf::from(env_or("DREAMLENS_LOG_DIR", "logs")),
            prompt_addendum: env_or("DREAMLENS_ADDENDUM", ""),
            poll_deadline_secs: env_or("DREAMLENS_POLL_DEADLINE", "120")
                .parse()
                .unwrap_or(120),
            endpoint: env_or("DREAMLENS_ENDPOINT", "http://localhost:3000/generate"),
        }
    }
}

/// Replicate bearer token: `REPLICATE_API_TOKEN`, falling back to a local
/// `r8_token` credential file.
pub fn api_token() -> Result<String> {
    if let Ok(token) = std::env::var("REPLICATE_API_TOKEN") {
        return Ok(token.trim().to_string());
    }
    let token = std::fs::read_to_string("r8_token")
        .context("REPLICATE_API_TOKEN is unset and no r8_token file was found")?;
    Ok(token.trim().to_string())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
