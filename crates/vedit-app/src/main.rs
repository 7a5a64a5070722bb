//! vedit service binary.

mod settings;

use std::net::SocketAddr;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_api::{create_router, metrics, AppState};
use vedit_queue::{EventTransport, TransportKind};
use vedit_worker::JobExecutor;

use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rediss:// connections)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut settings = AppSettings::from_env()?;
    init_tracing(settings.log_json)?;

    info!("Starting vedit");

    settings.prepare_directories()?;
    info!(
        "Directories: input={} output={}",
        settings.api.input_path.display(),
        settings.api.output_path.display()
    );

    let metrics_handle = if settings.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let transport = EventTransport::from_config(&settings.queue)?;
    let split_roles = !(settings.api_enabled && settings.job_enabled);
    if transport.kind() == TransportKind::Memory && split_roles {
        warn!("In-process queue needs both API and workers enabled in this process");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    if settings.api_enabled {
        let addr: SocketAddr = settings
            .api
            .bind_address()
            .parse()
            .context("invalid bind address")?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("Listening on {}", addr);

        let app = create_router(
            AppState::new(settings.api.clone(), transport.emitter()),
            metrics_handle,
        );
        let shutdown = cancel.clone();
        tasks.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await?;
            info!("Server shutdown complete");
            Ok(())
        });
    }

    if settings.job_enabled {
        let executor = JobExecutor::from_config(settings.worker.clone(), transport.clone())?;
        let shutdown = cancel.clone();
        tasks.spawn(async move {
            executor.run(shutdown).await?;
            Ok(())
        });
    }

    if tasks.is_empty() {
        warn!("Neither API nor workers are enabled, exiting");
        return Ok(());
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Component failed: {:#}", e);
                cancel.cancel();
            }
            Err(e) => {
                error!("Component panicked: {}", e);
                cancel.cancel();
            }
        }
    }

    info!("vedit stopped");
    Ok(())
}

/// Initialize tracing with colored output for dev, JSON for production.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("vedit=info".parse()?)
        .add_directive("vedit_api=info".parse()?)
        .add_directive("vedit_worker=info".parse()?)
        .add_directive("vedit_queue=info".parse()?)
        .add_directive("vedit_media=info".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    cancel.cancel();
}
