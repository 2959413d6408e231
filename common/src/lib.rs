//! Shared vocabulary of the scanbox workspace: the models passed between
//! layers, the traits the pipeline depends on, and the runtime configuration.

pub mod config;
pub mod error;
pub mod network;
pub mod progress;
pub mod scanning;
pub mod sink;
