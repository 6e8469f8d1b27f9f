//! # Speech Translate Backend - Main Application Entry Point
//!
//! HTTP service that turns an uploaded voice recording into a transcript and
//! a translation in one of four languages.
//!
//! ## Request flow:
//! upload → API-key check → target language check → ffmpeg normalization →
//! Whisper transcription → source language resolution → translation
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, TOML file, environment)
//! - **state**: shared application state and metrics
//! - **pipeline**: the transcribe-and-translate orchestration
//! - **audio**: ffmpeg normalization, WAV decoding, voice activity detection
//! - **transcription**: Whisper inference with a fixed pool of replicas
//! - **translation**: offline Marian packs or a remote translation API
//! - **health**: health and metrics endpoints
//! - **middleware**: API key, request logging, metrics
//! - **handlers**: HTTP request handlers
//! - **error**: error types and JSON error responses

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod language;
mod middleware;
mod pipeline;
mod state;
#[cfg(test)]
mod testing;
mod transcription;
mod translation;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use audio::FfmpegNormalizer;
use config::AppConfig;
use pipeline::Pipeline;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::TranscriptionEngine;

/// Set once a termination signal arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Loads the models** and builds the pipeline before binding, so the
///    first request never pays for startup work
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
///
/// Any startup failure (bad config, missing model, missing translation
/// packs) aborts the process with an error.
#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speech-translate-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let pipeline = build_pipeline(&config).await?;
    info!(
        speech = %pipeline.recognizer().describe(),
        translation = %pipeline.translator().describe(),
        "Models ready"
    );

    let api_key = config.api.api_key.clone();
    if api_key.is_none() {
        warn!("No API key configured, /v1 endpoints are unauthenticated");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, pipeline);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware runs in reverse registration order for requests
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/v1")
                    .wrap(middleware::ApiKeyAuth::new(api_key.clone()))
                    .route(
                        "/transcribe_translate",
                        web::post().to(handlers::transcribe_translate),
                    ),
            )
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/", web::get().to(handlers::landing_page))
            .route("/privacy-policy", web::get().to(handlers::privacy_policy))
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Build the process-wide collaborators and wire them into the pipeline.
///
/// The Whisper pool and translator are created exactly once here and
/// shared by every request through `Arc`.
async fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let engine = TranscriptionEngine::load(&config.models)
        .await
        .context("failed to load speech recognition model")?;

    let translator = translation::build_translator(&config.translation, &config.models)
        .await
        .context("failed to initialize translation backend")?;

    let mut normalizer = FfmpegNormalizer::new(
        config.audio.ffmpeg_path.clone(),
        Duration::from_secs(config.audio.conversion_timeout_secs),
        config.audio.min_audio_bytes,
    );
    if let Some(dir) = &config.audio.temp_dir {
        normalizer = normalizer.with_temp_root(dir);
    }

    Ok(Pipeline::new(
        Arc::new(normalizer),
        Arc::new(engine),
        translator,
        config.audio.min_audio_bytes,
    ))
}

/// Initialize the tracing (logging) system.
///
/// `RUST_LOG` controls what gets logged; without it the default is
/// "speech_translate_backend=debug,actix_web=info".
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_translate_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag.
///
/// If the SIGTERM handler can't be installed, Ctrl+C still works.
fn setup_signal_handlers() {
    tokio::spawn(async {
        #[cfg(unix)]
        let received = {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM");
                            true
                        }
                        result = tokio::signal::ctrl_c() => log_ctrl_c(result),
                    }
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    log_ctrl_c(tokio::signal::ctrl_c().await)
                }
            }
        };

        #[cfg(not(unix))]
        let received = log_ctrl_c(tokio::signal::ctrl_c().await);

        if received {
            SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
        }
    });
}

/// Returns whether Ctrl+C was actually received.
fn log_ctrl_c(result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => {
            info!("Received SIGINT");
            true
        }
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            false
        }
    }
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
