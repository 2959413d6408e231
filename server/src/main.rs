mod collector;
mod commands;
mod http;
mod job;
mod terminal;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use commands::CommandLine;
use scanbox_common::config::Config;
use scanbox_core::{DiscoveryPipeline, NmapEngine, PipelineOptions};
use terminal::{logging, print};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::HttpCollector;
use crate::http::AppState;
use crate::job::JobRunner;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();
    logging::init_logging(commands.verbose)?;
    print::banner(commands.no_banner);

    let mut cfg = Config::from_env().context("Failed to load configuration")?;
    commands.apply(&mut cfg);
    debug!("{:?}", cfg);

    let engine = Arc::new(NmapEngine::new(&cfg.engine));
    let pipeline = Arc::new(DiscoveryPipeline::with_options(
        engine,
        PipelineOptions::from(&cfg.pipeline),
    ));
    let sink = Arc::new(HttpCollector::new(&cfg.collector)?);

    let shutdown = CancellationToken::new();
    let jobs = JobRunner::new(
        pipeline,
        sink,
        shutdown.clone(),
        cfg.pipeline.scan_timeout,
        cfg.pipeline.deliver_partial,
    );
    let app = http::build_app(AppState { jobs: jobs.clone() });

    let addr = SocketAddr::new(cfg.server.bind, cfg.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    print::header("accepting discovery jobs");
    print::listening(addr);
    info!("Reporting to {}", cfg.collector.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    print::header("shutting down");
    shutdown.cancel();
    jobs.drain(SHUTDOWN_GRACE).await;
    info!("Bye");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels every running job.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
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
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, cancelling running jobs");
    shutdown.cancel();
}
