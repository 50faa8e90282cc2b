/// Grading pipeline
///
/// - Burst grouping of temporally adjacent shots (burst.rs)
/// - Batch preparation, grading and persistence (orchestrator.rs)
/// - Single-flight recurring driver (scheduler.rs)

pub mod burst;
pub mod orchestrator;
pub mod scheduler;

pub use burst::{group_next, BurstCandidate, MAX_BURST};
pub use orchestrator::{BatchEvaluator, BatchOutcome, GradedMember};
pub use scheduler::{PassOutcome, Scheduler, SchedulerEvent};
