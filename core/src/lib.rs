//! Discovery orchestration and the nmap-backed engine it runs on by default.
//!
//! * [`discovery`]: the pipeline that classifies targets, fans out branches and merges results.
//! * [`scanner`]: the [`ScanEngine`](scanbox_common::scanning::ScanEngine) implementation.

pub mod discovery;
pub mod scanner;

pub use discovery::{DiscoveryPipeline, PipelineError, PipelineOptions};
pub use scanner::NmapEngine;
