// Dreamlens: point a camera at the world, get a dreamed version back.
//
// `serve` runs the generation gateway (and the in-browser camera client
// at /); `dream` pushes a local photo through a gateway from the
// command line.

mod capture;
mod config;
mod gateway;
mod page;
mod prompt;
mod replicate;
mod settings;
mod upload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;

use capture::CaptureSession;
use config::Config;
use gateway::AppState;
use replicate::PollPolicy;
use settings::Settings;
use upload::UploadClient;

#[derive(Parser)]
#[command(name = "dreamlens", about = "Camera-to-dream image generation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the generation gateway and the in-browser camera client
    Serve {
        /// Bind address, e.g. 0.0.0.0:3000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Send a photo through a gateway and keep the dreamed result
    Dream {
        /// Path to the source image
        image: PathBuf,
        /// One-line prompt entry, e.g. "73:make it blue" or "make it blue"
        #[arg(long, conflicts_with_all = ["strength", "custom"])]
        prompt: Option<String>,
        /// Strength 0-100 (how far the dream may drift from the photo)
        #[arg(long)]
        strength: Option<u8>,
        /// Custom prompt text appended to the caption
        #[arg(long)]
        custom: Option<String>,
        /// Gateway URL (defaults to the configured endpoint)
        #[arg(long)]
        endpoint: Option<String>,
        /// Treat the image as a front-camera capture (mirrored input)
        #[arg(long)]
        front: bool,
        /// Persist --strength/--custom as the new defaults
        #[arg(long)]
        remember: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => serve(bind).await,
        Command::Dream {
            image,
            prompt,
            strength,
            custom,
            endpoint,
            front,
            remember,
        } => {
            let (strength, custom) = match prompt {
                Some(entry) => {
                    let parsed = Settings::parse_entry(&entry);
                    (parsed.dream, parsed.custom)
                }
                None => (strength, custom),
            };
            dream(image, strength, custom, endpoint, front, remember).await
        }
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page::index))
        .route("/generate", post(gateway::generate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve(bind: Option<String>) -> Result<()> {
    let config = Config::from_env();
    let bind = bind.unwrap_or_else(|| config.bind.clone());
    let token = config::api_token()?;

    let poll = PollPolicy {
        interval: Duration::from_secs(1),
        deadline: Duration::from_secs(config.poll_deadline_secs),
    };
    let state = Arc::new(AppState {
        replicate: replicate::Client::new(token, poll),
        config,
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;

    println!("🚀 Gateway listening on http://{bind}");
    println!("📸 Open it in a browser to start dreaming!");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn dream(
    image: PathBuf,
    strength: Option<u8>,
    custom: Option<String>,
    endpoint: Option<String>,
    front: bool,
    remember: bool,
) -> Result<()> {
    let config = Config::from_env();
    let settings_path = Settings::default_path();
    let mut settings = Settings::load(&settings_path);

    if let Some(s) = strength {
        settings.dream = Some(s);
    }
    if let Some(c) = custom {
        settings.custom = if c.is_empty() { None } else { Some(c) };
    }
    if remember {
        settings.store(&settings_path)?;
        println!("💾 Saved defaults: {}", settings.entry());
    }

    let frame = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;

    let mut session = CaptureSession::new();
    if front {
        session.toggle_facing();
    }
    let corrected = session.capture(&frame)?.to_vec();

    let client = UploadClient::new(endpoint.unwrap_or_else(|| config.endpoint.clone()));
    println!("📤 Uploading capture ({} bytes)...", corrected.len());

    match client
        .generate(&corrected, settings.strength(), settings.custom.as_deref())
        .await
    {
        Ok(result) => {
            println!("📝 Caption: {}", result.caption);
            session.resolve(Some(upload::data_uri_bytes(&result.picture)?));
            let path = upload::share(&result.picture)?;
            println!("✅ Dream saved to {}", path.display());
            session.reset()?;
            Ok(())
        }
        Err(e) => {
            session.resolve(None);
            Err(e.into())
        }
    }
}
