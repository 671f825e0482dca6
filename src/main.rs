use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;

use realtime_channel_client::adapters::{NativePlatform, StaticTokenProvider};
use realtime_channel_client::channel::{ChannelDescriptor, InboundFrame};
use realtime_channel_client::config::Settings;
use realtime_channel_client::metrics::encode_metrics;
use realtime_channel_client::telemetry::init_tracing;
use realtime_channel_client::{listener, ChannelManager, ManagerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&settings.log)?;
    tracing::info!(url = %settings.websocket.url, "Configuration loaded");

    let token_provider = match settings.auth.token.clone() {
        Some(token) => StaticTokenProvider::new(token),
        None => {
            tracing::warn!("No auth token configured (CHANNEL__AUTH__TOKEN)");
            StaticTokenProvider::unauthenticated()
        }
    };

    let manager = ChannelManager::builder(
        ManagerConfig::from(&settings.websocket),
        Arc::new(token_provider),
    )
    .platform(Arc::new(NativePlatform::new(settings.platform.os.clone())))
    .build();

    let session = &settings.session;
    let id = session.connection_id;
    let channel = ChannelDescriptor {
        name: session.channel.clone(),
        params: session.params.clone(),
    };

    let connecting = manager.connect(id, channel);
    // Reconnects sweep listeners; keep this one registered across them
    let frames = manager.on_message_retained(id, listener(move |frame| log_frame(id, frame)));

    if manager.wait_for_connection_default(id).await {
        tracing::info!(connection_id = id, "Subscribed, waiting for messages");
    } else {
        tracing::warn!(connection_id = id, "Not connected yet, retries continue in background");
    }

    // Status changes are logged from a background task
    let status_task = tokio::spawn({
        let mut status_rx = manager.subscribe_status();
        async move {
            while status_rx.changed().await.is_ok() {
                let snapshot = status_rx.borrow_and_update().clone();
                tracing::info!(
                    status = ?snapshot.status_of(id),
                    retries = snapshot.retries_of(id),
                    "Connection status changed"
                );
            }
        }
    });

    shutdown_signal().await;

    manager.close_all();
    status_task.abort();
    frames.abort();
    connecting.abort();

    match encode_metrics() {
        Ok(metrics) => tracing::debug!("Final metrics:\n{}", metrics),
        Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_frame(id: u64, frame: &InboundFrame) {
    match frame {
        InboundFrame::Text(text) => tracing::info!(connection_id = id, frame = %text, "Frame received"),
        InboundFrame::Binary(data) => {
            tracing::info!(connection_id = id, bytes = data.len(), "Binary frame received")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, closing connections");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, closing connections");
        }
    }
}
