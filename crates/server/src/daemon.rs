//! Daemon wiring
//!
//! Builds the gate, runner, prober and router from one [`Config`] and runs
//! the HTTP server until shutdown.

use crate::config::Config;
use crate::gate::GateError;
use crate::http::{router, AppState};
use crate::job::SnapshotRunner;
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::probe::EncoderProber;
use crate::render::{CommandRenderer, Renderer};
use crate::startup::{run_startup_checks, StartupError};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// The gate could not be built
    #[error("Invalid gate configuration: {0}")]
    Gate(#[from] GateError),

    /// Binding or serving failed
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Everything the server needs at runtime
pub struct Daemon {
    /// Configuration the daemon was built from
    pub config: Config,
    pub runner: Arc<SnapshotRunner>,
    pub prober: Arc<EncoderProber>,
    pub metrics: SharedMetrics,
}

impl Daemon {
    /// Run startup checks, then build the daemon around the renderer CLI
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Build the daemon around the renderer CLI without startup checks
    ///
    /// Useful for testing when the renderer and ffmpeg are not installed.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let renderer = Arc::new(CommandRenderer::new(config.render.program.clone()));
        Self::with_renderer(config, renderer)
    }

    /// Build the daemon around any renderer
    pub fn with_renderer(config: Config, renderer: Arc<dyn Renderer>) -> Result<Self, DaemonError> {
        let metrics = new_shared_metrics();
        let runner = Arc::new(SnapshotRunner::from_config(
            &config,
            renderer,
            metrics.clone(),
        )?);
        let prober = Arc::new(EncoderProber::from_config(&config.encoder));

        Ok(Self {
            config,
            runner,
            prober,
            metrics,
        })
    }

    pub fn router(&self) -> Router {
        router(AppState::new(self.runner.clone(), self.prober.clone()))
    }

    /// Serve on `listener` until `shutdown` resolves
    ///
    /// Leftover workspaces under the output root are purged first.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.runner.workspaces().purge() {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "purged stale workspaces"),
            Err(e) => warn!(error = %e, "failed to purge stale workspaces"),
        }

        info!(
            addr = %listener.local_addr()?,
            capacity = self.runner.gate().capacity(),
            output_dir = %self.runner.workspaces().root().display(),
            "listening"
        );

        // Queued requests fail fast once shutdown starts; running jobs finish
        let gate = self.runner.gate().clone();
        let shutdown = async move {
            shutdown.await;
            gate.close();
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("server stopped");
        Ok(())
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(&self) -> Result<(), DaemonError> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener, shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
