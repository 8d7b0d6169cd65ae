//! `sdbot-worker` -- console front end for a Stable Diffusion WebUI.
//!
//! Reads `<user_id> <prompt>` lines from stdin, queues one generation job
//! per line, and writes the resulting images to `OUTPUT_DIR`. See
//! [`WorkerConfig::from_env`] for the environment variables.
//!
//! Ctrl-C stops accepting input; jobs still waiting in the queue are
//! cancelled once the running one finishes. At end of input the queue
//! is worked off before exiting.

use std::sync::Arc;

use sdbot_core::style::StyleBook;
use sdbot_pipeline::AdmissionQueue;
use sdbot_webui::WebUiApi;
use sdbot_worker::config::WorkerConfig;
use sdbot_worker::console::Console;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sdbot_worker=info,sdbot_pipeline=info,sdbot_webui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let api = WebUiApi::new(&config.webui_url, config.webui_timeout).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build WebUI client");
        std::process::exit(1);
    });

    match api.sd_models().await {
        Ok(models) => tracing::info!(
            webui_url = %api.base_url(),
            models = models.len(),
            "Connected to WebUI",
        ),
        Err(e) => tracing::warn!(
            webui_url = %api.base_url(),
            error = %e,
            "WebUI not reachable yet; requests will fail until it is",
        ),
    }

    let (queue, worker) = AdmissionQueue::new(&config.queue).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid queue configuration");
        std::process::exit(1);
    });

    let cancel = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received");
                cancel.cancel();
            }
        }
    });

    tracing::info!(
        default_limit = config.queue.default_limit,
        capacity = config.queue.capacity,
        upscaler = %config.upscaler,
        output_dir = %config.output_dir.display(),
        "Starting sdbot-worker",
    );

    let console = Console::new(
        queue,
        Arc::new(api),
        StyleBook::with_defaults(),
        config.upscaler,
        config.output_dir,
    );
    console.run(cancel).await;

    // Dropping the last submit handle lets the worker finish what is queued.
    drop(console);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Queue worker task failed");
    }
}
