/// Photo curation pipeline
///
/// Opens a folder of images, groups bursts of near-simultaneous shots,
/// sends them to a grading service and records the verdicts in sidecars
/// next to the images.

pub mod config;
pub mod error;
pub mod grading;
pub mod media;
pub mod pipeline;
pub mod sidecar;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{CuratorError, Result};
pub use pipeline::{BatchEvaluator, PassOutcome, Scheduler, SchedulerEvent};
pub use sidecar::{JsonSidecarStore, MetadataStore};
pub use state::library::{ImportResult, Library};
