use std::sync::Arc;

use centralino_updater::{
    BackendClient, Config, UpdateError, UpdateEvent, UpdateOrchestrator, WsConnector,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!(error = ?err, "Update monitor failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), UpdateError> {
    let config = Config::load().await;
    let api = Arc::new(BackendClient::from_config(&config)?);
    let connector = Arc::new(WsConnector::from_config(&config));
    let orchestrator = Arc::new(UpdateOrchestrator::new(
        api,
        connector,
        config.orchestrator_settings(),
    ));

    let mut events = orchestrator.subscribe_events();
    let mut state = orchestrator.subscribe_state();
    orchestrator.initialize().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                let progress = snapshot
                    .update_progress
                    .as_ref()
                    .filter(|_| snapshot.is_updating);
                if let Some(progress) = progress {
                    info!(
                        status = ?progress.status,
                        percentage = ?progress.percentage,
                        message = %progress.message,
                        push = snapshot.push_connected,
                        "Update progress"
                    );
                }
            }
            event = events.recv() => match event {
                Ok(UpdateEvent::UpdateAvailable(info)) => {
                    if let Some(notes) = info.release_notes.as_deref() {
                        info!(notes, "Release notes");
                    }
                    if config.auto_start {
                        // The trigger is unbounded; keep this loop responsive.
                        let orchestrator = Arc::clone(&orchestrator);
                        tokio::spawn(async move { orchestrator.start_update().await });
                    } else if let Some(steps) = info
                        .instructions
                        .as_ref()
                        .and_then(|i| i.for_current_platform())
                    {
                        info!(
                            command = %steps.command,
                            "Update available; set auto_start or run manually"
                        );
                    }
                }
                Ok(UpdateEvent::ManualRequired { message, command }) => {
                    warn!(%message, command = ?command, "Manual update required");
                    if let Some(instructions) = orchestrator.fetch_instructions().await {
                        if let Some(steps) = instructions.for_current_platform() {
                            for step in &steps.steps {
                                info!(%step, "Manual update step");
                            }
                        }
                    }
                }
                Ok(UpdateEvent::Completed) => {
                    info!("Update completed, backend is on the new version");
                    break;
                }
                Ok(UpdateEvent::Failed(message)) => {
                    error!(%message, "Update failed");
                }
                Ok(UpdateEvent::StartFailed(message)) => {
                    error!(%message, "Update could not be started");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed update events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
