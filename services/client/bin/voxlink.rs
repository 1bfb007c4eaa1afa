//! Main Entrypoint for the voxlink console client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading (or creating) the persisted user identifier.
//! 3. Wiring the HTTP backend, microphone policy and voice connector into a
//!    session controller.
//! 4. Reading `start` / `end` / `quit` commands from a stdin thread and rendering
//!    controller events to stdout.
//! 5. Unloading the session on Ctrl+C.

use anyhow::Context;
use convai_realtime::WsVoiceConnector;
use std::{io, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, warn};
use voxlink_client::{
    commands::{self, Command, HELP},
    config::Config,
    console::ConsolePresenter,
    microphone::ConfiguredMicrophone,
    user_id::UserIdStore,
};
use voxlink_core::{Dependencies, SessionController, backend_client::HttpBackend};

/// Lets the end-session beacon leave before the process exits.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Listens for the `Ctrl+C` signal.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal.");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let user_id = UserIdStore::new(&config.user_id_path)
        .load_or_create()
        .context("Failed to load user id")?;
    info!(user_id = %user_id, api_url = %config.api_url, "Configuration loaded.");

    // --- 3. Wire the Session Controller ---
    let backend = Arc::new(
        HttpBackend::new(config.api_url.clone()).context("Failed to build backend client")?,
    );
    let deps = Dependencies {
        signed_urls: backend.clone(),
        backend,
        microphone: Arc::new(ConfiguredMicrophone::new(config.microphone)),
        voice: Arc::new(WsVoiceConnector::default()),
    };

    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let controller = SessionController::new(config.controller_config(), deps, user_id, ui_tx);
    let handle = controller.handle();

    let presenter = tokio::spawn(ConsolePresenter::new(std::io::stdout()).run(ui_rx));
    let controller_task = tokio::spawn(controller.run());

    // --- 4. Command Loop ---
    println!("{}", HELP);
    let mut lines = commands::spawn_line_reader(io::BufReader::new(io::stdin()))
        .context("Failed to start stdin reader")?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match Command::parse(&line) {
                    Command::Empty => {}
                    Command::Start => {
                        handle.start().await;
                    }
                    Command::End => {
                        handle.end().await;
                    }
                    Command::Quit => {
                        handle.end().await;
                        break;
                    }
                    Command::Unknown(other) => println!("Unknown command '{}'. {}", other, HELP),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    // --- 5. Teardown ---
    handle.unload().await;
    drop(handle);
    if let Err(e) = controller_task.await {
        warn!(error = %e, "Session controller task failed.");
    }
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    if let Err(e) = presenter.await {
        warn!(error = %e, "Console presenter task failed.");
    }

    // The stdin thread may still be parked in a read; exiting main ends it.
    drop(lines);
    info!("voxlink has shut down.");
    Ok(())
}
