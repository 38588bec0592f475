//! Kokoro TTS API server entry point.

use std::sync::Arc;

use clap::Parser;

use kokoro_tts_server::engines::kokoro::{EspeakConfig, KokoroEngine, KokoroModelParams};
use kokoro_tts_server::server::{create_router, AppState};
use kokoro_tts_server::{Cli, ModelManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let engine_config = cli.engine_config()?;
    log::info!("Starting Kokoro TTS API v{}", env!("CARGO_PKG_VERSION"));

    let engine = KokoroEngine::new(
        cli.model_dir.clone(),
        KokoroModelParams {
            num_threads: cli.num_threads,
            optimized_model_cache_path: cli.optimized_model_cache.clone(),
            espeak: EspeakConfig {
                bin_path: cli.espeak_bin.clone(),
                data_path: cli.espeak_data.clone(),
            },
        },
    );

    // Refuse to serve anything until the models are loaded.
    let models = Arc::new(ModelManager::new());
    tokio::task::spawn_blocking({
        let models = Arc::clone(&models);
        move || models.initialize(&engine, &engine_config)
    })
    .await??;

    let app = create_router(AppState::new(Arc::clone(&models)));
    let addr = cli.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    models.teardown();
    log::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down"),
        _ = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}
