/// Batch evaluation
///
/// Grades one run as a unit: every member ends `done`, or every member ends
/// `error` with the same message. Sidecar writes happen after a successful
/// grade and never change a member's outcome.

use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CuratorError, Result};
use crate::grading::Grader;
use crate::media::{ImageSource, PreparedImage, Preparer};
use crate::sidecar::MetadataStore;
use crate::state::backlog::Backlog;
use crate::state::data::{Item, ItemId, MetadataRef};
use crate::state::evaluation::Evaluation;

/// Grade result for one member of a successful batch
#[derive(Debug, Clone, PartialEq)]
pub struct GradedMember {
    pub id: ItemId,
    pub evaluation: Evaluation,
    /// None when the sidecar write failed
    pub metadata_ref: Option<MetadataRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Graded(Vec<GradedMember>),
    Failed { ids: Vec<ItemId>, message: String },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Graded(_))
    }

    pub fn ids(&self) -> Vec<ItemId> {
        match self {
            BatchOutcome::Graded(members) => members.iter().map(|m| m.id.clone()).collect(),
            BatchOutcome::Failed { ids, .. } => ids.clone(),
        }
    }

    /// Write the outcome back into item state
    pub fn apply(self, backlog: &mut Backlog) {
        let result = match self {
            BatchOutcome::Graded(members) => members.into_iter().try_for_each(|member| {
                backlog.complete(&member.id, member.evaluation, member.metadata_ref)
            }),
            BatchOutcome::Failed { ids, message } => ids
                .iter()
                .try_for_each(|id| backlog.fail(id, message.clone())),
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Batch outcome refers to a missing item");
        }
    }
}

/// Prepares, grades and persists one run
pub struct BatchEvaluator {
    source: Arc<dyn ImageSource>,
    preparer: Arc<dyn Preparer>,
    grader: Arc<dyn Grader>,
    metadata: Arc<dyn MetadataStore>,
}

impl BatchEvaluator {
    pub fn new(
        source: Arc<dyn ImageSource>,
        preparer: Arc<dyn Preparer>,
        grader: Arc<dyn Grader>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            source,
            preparer,
            grader,
            metadata,
        }
    }

    /// Byte source shared with the burst grouper
    pub fn source(&self) -> &Arc<dyn ImageSource> {
        &self.source
    }

    /// Grade a run whose items were just marked processing
    pub async fn run_batch(&self, run: &[Item]) -> BatchOutcome {
        let started = Instant::now();
        let ids: Vec<ItemId> = run.iter().map(|item| item.id.clone()).collect();

        let evaluations = match self.grade(run).await {
            Ok(evaluations) => evaluations,
            Err(e) => {
                tracing::warn!(
                    batch_size = run.len(),
                    first = %run.first().map(|i| i.name.as_str()).unwrap_or(""),
                    error = %e,
                    "Batch failed"
                );
                return BatchOutcome::Failed {
                    ids,
                    message: e.to_string(),
                };
            }
        };

        let refs = join_all(
            run.iter()
                .zip(evaluations.iter())
                .map(|(item, evaluation)| self.persist(item, evaluation)),
        )
        .await;

        tracing::info!(
            batch_size = run.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch graded"
        );

        BatchOutcome::Graded(
            ids.into_iter()
                .zip(evaluations)
                .zip(refs)
                .map(|((id, evaluation), metadata_ref)| GradedMember {
                    id,
                    evaluation,
                    metadata_ref,
                })
                .collect(),
        )
    }

    /// One evaluation per run member, in run order
    async fn grade(&self, run: &[Item]) -> Result<Vec<Evaluation>> {
        let prepared = try_join_all(run.iter().map(|item| self.prepare(item))).await?;

        if let ([item], [image]) = (run, prepared.as_slice()) {
            let evaluation = self.grader.grade_one(&item.name, image).await?;
            return Ok(vec![evaluation]);
        }

        let payloads: Vec<(String, PreparedImage)> = run
            .iter()
            .map(|item| item.name.clone())
            .zip(prepared)
            .collect();
        let mut results = self.grader.grade_group(&payloads).await?;

        // All or nothing: one missing member fails the whole batch
        run.iter()
            .map(|item| {
                results
                    .remove(&item.name)
                    .ok_or_else(|| CuratorError::MissingResult(item.name.clone()))
            })
            .collect()
    }

    async fn prepare(&self, item: &Item) -> Result<PreparedImage> {
        let source = self.source.read_full(item).await?;
        self.preparer.prepare(source.bytes).await
    }

    async fn persist(&self, item: &Item, evaluation: &Evaluation) -> Option<MetadataRef> {
        match self.metadata.write(item, evaluation).await {
            Ok(metadata_ref) => Some(metadata_ref),
            Err(e) => {
                tracing::warn!(item = %item.id, error = %e, "Sidecar write failed, keeping grade in memory");
                None
            }
        }
    }
}
