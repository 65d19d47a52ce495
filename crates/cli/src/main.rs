//! Repo-ingestion entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: flags and environment variables via `clap`
//!    ([`config::Args`]). The allowlist is compiled here, so a bad pattern
//!    stops the process before it accepts traffic.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty layer
//!    and an optional OpenTelemetry OTLP exporter ([`telemetry::init`]). All
//!    `tracing` spans and events emitted by every crate in the workspace flow
//!    through this subscriber.
//! 3. **Construct infrastructure**: the GitHub REST client and a token
//!    provider (static token or GitHub App), injected into a
//!    [`reconciler::Reconciler`].
//! 4. **Serve**: bind the HTTP front door and run until SIGINT/SIGTERM.

mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use github::GitHubRepositoryClient;
use ingestion::IngestionSettings;
use listener::AppState;
use reconciler::Reconciler;
use tokio::net::TcpListener;

use crate::config::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = telemetry::init(
        &args.log_level,
        args.log_format,
        args.otel_exporter_otlp_endpoint.as_deref(),
    )?;

    let allow_list = args.allow_list()?;
    let build_info = args.build_info()?;
    let tokens = args.token_provider()?;
    let client = Arc::new(
        GitHubRepositoryClient::new(&args.github_api_url)
            .context("cannot initialise GitHub client")?,
    );

    tracing::info!(
        rules = allow_list.len(),
        api = %args.github_api_url,
        environment = %args.deployment_environment,
        "Starting repo-ingestion"
    );

    let reconciler = Reconciler::new(
        allow_list,
        client.clone(),
        tokens,
        IngestionSettings::default(),
    );
    let state = Arc::new(AppState::new(
        reconciler,
        build_info,
        args.deployment_environment.clone(),
        Some(client),
    ));

    let listener = TcpListener::bind(args.bind_address)
        .await
        .with_context(|| format!("cannot bind {}", args.bind_address))?;
    listener::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
