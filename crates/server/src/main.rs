mod api;
mod bootstrap;
mod context;
mod email;
mod health;
mod webhook;
mod workflow;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use dealgate_core::config::{AppConfig, LoadOptions};

use crate::email::{EmailNotifier, MailTransport, TracingMailTransport};
use crate::webhook::WebhookDispatcher;
use crate::workflow::{DealWorkflow, WorkflowRepositories};

fn init_logging(config: &AppConfig) {
    use dealgate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let transport: Arc<dyn MailTransport> = Arc::new(TracingMailTransport);
    let workflow = Arc::new(DealWorkflow::new(
        WorkflowRepositories::sql(&app.db_pool),
        EmailNotifier::new(transport),
        WebhookDispatcher::new(app.config.webhook.max_attempts),
        &app.config,
    ));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        bind_address = %address,
        "dealgate-server listening"
    );

    // Ctrl-C starts the drain; connections get a bounded grace window.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut drain_rx = shutdown_rx.clone();
    let server = axum::serve(
        listener,
        api::router(workflow).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = drain_rx.changed().await;
    });

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let mut deadline_rx = shutdown_rx;
    tokio::select! {
        served = server => served?,
        _ = async {
            let _ = deadline_rx.changed().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                event_name = "system.server.shutdown_timeout",
                grace_secs = grace.as_secs(),
                "graceful drain window elapsed, exiting"
            );
        }
    }

    info!(event_name = "system.server.stopping", "dealgate-server stopping");
    Ok(())
}
