//! # Discovery Pipeline
//!
//! Implements the core "discover assets" use case.
//!
//! A run classifies the raw targets, fans out into at most two concurrent
//! branches (one for IP/CIDR targets, one for domains), merges what they find
//! into a single [`ResultCollection`], and decides the outcome once every
//! branch has finished.

use std::sync::Arc;

use scanbox_common::config::PipelineConfig;
use scanbox_common::error::{InvalidTargetError, ScanEngineError};
use scanbox_common::network::host::DiscoveryItem;
use scanbox_common::network::target::{self, AssetKind};
use scanbox_common::progress::Progress;
use scanbox_common::scanning::ScanEngine;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

mod branch;
pub mod collection;

pub use branch::BranchKind;
use branch::BranchContext;
use collection::ResultCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Reverse lookups in flight at once in the network branch.
    pub resolve_concurrency: usize,
    /// Forward-resolve submitted domains and report them next to their subdomains.
    pub resolve_apex: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            resolve_concurrency: 16,
            resolve_apex: false,
        }
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            resolve_concurrency: cfg.resolve_concurrency,
            resolve_apex: cfg.resolve_apex,
        }
    }
}

/// Why a single branch produced nothing.
#[derive(Debug, Error)]
pub enum BranchFailure {
    #[error("{branch} branch failed: {source}")]
    Scan {
        branch: BranchKind,
        #[source]
        source: ScanEngineError,
    },

    #[error("{branch} branch panicked: {message}")]
    Panicked { branch: BranchKind, message: String },
}

impl BranchFailure {
    pub fn branch(&self) -> BranchKind {
        match self {
            BranchFailure::Scan { branch, .. } | BranchFailure::Panicked { branch, .. } => *branch,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing was scanned.
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] InvalidTargetError),

    /// At least one branch failed. `partial` holds what the others merged.
    #[error("{} discovery branch(es) failed: {}", .failures.len(), summarize(.failures))]
    Branches {
        failures: Vec<BranchFailure>,
        partial: Vec<DiscoveryItem>,
    },
}

impl PipelineError {
    /// Results merged before the run failed; empty when nothing was scanned.
    pub fn partial(&self) -> &[DiscoveryItem] {
        match self {
            PipelineError::InvalidTarget(_) => &[],
            PipelineError::Branches { partial, .. } => partial,
        }
    }

    pub fn into_partial(self) -> Vec<DiscoveryItem> {
        match self {
            PipelineError::InvalidTarget(_) => Vec::new(),
            PipelineError::Branches { partial, .. } => partial,
        }
    }
}

fn summarize(failures: &[BranchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application service for asset discovery.
///
/// Orchestrates a run by:
/// 1. classifying the raw targets (no scan starts if any is invalid).
/// 2. spawning one branch per populated target class.
/// 3. waiting for every branch and collecting their failures.
pub struct DiscoveryPipeline {
    engine: Arc<dyn ScanEngine>,
    options: PipelineOptions,
}

impl DiscoveryPipeline {
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self::with_options(engine, PipelineOptions::default())
    }

    pub fn with_options(engine: Arc<dyn ScanEngine>, options: PipelineOptions) -> Self {
        Self { engine, options }
    }

    /// Executes one discovery run over `targets`.
    ///
    /// `progress` is notified periodically while scans are in flight;
    /// `cancel` aborts every outstanding scan call.
    pub async fn run<S: AsRef<str>>(
        &self,
        targets: &[S],
        progress: Progress,
        cancel: CancellationToken,
    ) -> Result<Vec<DiscoveryItem>, PipelineError> {
        let assets = target::classify(targets)?;
        info!(
            "Classified {} target(s): {} ip, {} cidr, {} domain",
            assets.len(),
            assets.get(AssetKind::Ip).len(),
            assets.get(AssetKind::Cidr).len(),
            assets.domains().len(),
        );

        let results = Arc::new(ResultCollection::new());
        let ctx = BranchContext {
            engine: self.engine.clone(),
            progress,
            cancel,
            results: results.clone(),
            options: self.options,
        };

        let mut handles: Vec<(BranchKind, JoinHandle<Result<(), ScanEngineError>>)> = Vec::new();

        let network_targets = assets.network_targets();
        if !network_targets.is_empty() {
            let span = info_span!("branch", kind = %BranchKind::Network);
            let task = branch::network_branch(ctx.clone(), network_targets).instrument(span);
            handles.push((BranchKind::Network, tokio::spawn(task)));
        }

        let domains = assets.domains().to_vec();
        if !domains.is_empty() {
            let span = info_span!("branch", kind = %BranchKind::Domain);
            let task = branch::domain_branch(ctx.clone(), domains).instrument(span);
            handles.push((BranchKind::Domain, tokio::spawn(task)));
        }

        drop(ctx);

        let mut failures: Vec<BranchFailure> = Vec::new();
        for (branch, handle) in handles {
            match handle.await {
                Ok(Ok(())) => debug!("{branch} branch finished"),
                Ok(Err(source)) => {
                    error!("{branch} branch failed: {source}");
                    failures.push(BranchFailure::Scan { branch, source });
                }
                Err(join_err) => {
                    error!("{branch} branch panicked: {join_err}");
                    failures.push(BranchFailure::Panicked {
                        branch,
                        message: join_err.to_string(),
                    });
                }
            }
        }

        let items: Vec<DiscoveryItem> = match Arc::try_unwrap(results) {
            Ok(collection) => collection.into_inner(),
            Err(shared) => shared.snapshot().await,
        };

        if failures.is_empty() {
            info!("Discovery finished with {} item(s)", items.len());
            Ok(items)
        } else {
            Err(PipelineError::Branches {
                failures,
                partial: items,
            })
        }
    }
}
