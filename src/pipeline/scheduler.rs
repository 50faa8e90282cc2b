/// Processing scheduler
///
/// A single recurring driver that moves pending items through grading, one
/// batch at a time. The in-flight guard is a one-permit semaphore held for
/// the whole pass, so ticks and follow-ups that arrive mid-batch return
/// without doing anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, RwLock, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::burst::{group_window, MAX_BURST};
use super::orchestrator::{BatchEvaluator, BatchOutcome};
use crate::config::SchedulerConfig;
use crate::error::{CuratorError, Result};
use crate::state::backlog::{Backlog, BacklogSummary};
use crate::state::data::{Item, ItemId, ItemStatus};

const EVENT_CAPACITY: usize = 64;

/// Progress notifications for observers (CLI, UI)
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    BatchStarted { ids: Vec<ItemId> },
    BatchFinished { ids: Vec<ItemId>, keepers: usize },
    BatchFailed { ids: Vec<ItemId>, message: String },
    /// A pass found nothing left to grade
    Drained { summary: BacklogSummary },
}

/// What a single pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Paused,
    /// Another batch holds the in-flight guard
    Busy,
    /// No pending item
    Idle,
    Processed { batch_size: usize, success: bool },
}

struct Shared {
    backlog: RwLock<Backlog>,
    evaluator: BatchEvaluator,
    in_flight: Arc<Semaphore>,
    paused: AtomicBool,
    drained: AtomicBool,
    follow_up: Notify,
    events: broadcast::Sender<SchedulerEvent>,
    config: SchedulerConfig,
}

#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(backlog: Backlog, evaluator: BatchEvaluator, config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let paused = config.start_paused;

        Self {
            shared: Arc::new(Shared {
                backlog: RwLock::new(backlog),
                evaluator,
                in_flight: Arc::new(Semaphore::new(1)),
                paused: AtomicBool::new(paused),
                drained: AtomicBool::new(false),
                follow_up: Notify::new(),
                events,
                config,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    /// Stop starting new batches. A batch already in flight still finishes.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        tracing::info!("Processing paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        tracing::info!("Processing resumed");
        self.shared.follow_up.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// A batch is in flight
    pub fn is_busy(&self) -> bool {
        self.shared.in_flight.available_permits() == 0
    }

    pub async fn summary(&self) -> BacklogSummary {
        self.shared.backlog.read().await.summary()
    }

    /// Items in backlog order
    pub async fn items(&self) -> Vec<Item> {
        self.shared.backlog.read().await.iter().cloned().collect()
    }

    /// Explicit operator action: move every `error` item back to `pending`
    pub async fn requeue_failed(&self) -> usize {
        let count = self.shared.backlog.write().await.requeue_failed();
        if count > 0 {
            self.shared.drained.store(false, Ordering::SeqCst);
            tracing::info!(count, "Requeued failed items");
        }
        count
    }

    /// Swap in a new backlog (folder change). Refused while a batch is in
    /// flight; returns the old backlog.
    pub async fn replace_backlog(&self, backlog: Backlog) -> Result<Backlog> {
        let _permit = self
            .shared
            .in_flight
            .try_acquire()
            .map_err(|_| CuratorError::Busy("a batch is still being graded".to_string()))?;

        let mut current = self.shared.backlog.write().await;
        self.shared.drained.store(false, Ordering::SeqCst);
        Ok(std::mem::replace(&mut *current, backlog))
    }

    /// Remove an item after `action` succeeds on it (delete/archive).
    /// Refused while the item is being graded. The action runs on the
    /// blocking pool while the backlog stays locked.
    pub async fn remove_item_with<F>(&self, id: &ItemId, action: F) -> Result<Item>
    where
        F: FnOnce(&Item) -> Result<()> + Send + 'static,
    {
        let mut backlog = self.shared.backlog.write().await;
        let item = backlog
            .get(id)
            .cloned()
            .ok_or_else(|| CuratorError::NotFound(id.to_string()))?;
        if item.status == ItemStatus::Processing {
            return Err(CuratorError::Busy(format!("{} is being graded", id)));
        }

        tokio::task::spawn_blocking(move || action(&item)).await??;
        backlog.remove(id)
    }

    /// Wait for the batch in flight, if any, to finish
    pub async fn wait_idle(&self) {
        // Closed only on drop of the semaphore, which outlives self
        if let Ok(permit) = self.shared.in_flight.acquire().await {
            drop(permit);
        }
    }

    /// One scheduling pass: pick the next run, grade it, write back.
    pub async fn run_once(&self) -> PassOutcome {
        if self.is_paused() {
            return PassOutcome::Paused;
        }

        let Ok(_permit) = self.shared.in_flight.clone().try_acquire_owned() else {
            return PassOutcome::Busy;
        };

        let window = self.shared.backlog.read().await.pending_window(MAX_BURST);
        let Some(seed) = window.first().map(|(_, item)| item.id.clone()) else {
            self.announce_drained().await;
            return PassOutcome::Idle;
        };
        self.shared.drained.store(false, Ordering::SeqCst);

        let run = match group_window(window, self.shared.evaluator.source().as_ref()).await {
            Ok(run) => run,
            Err(e) => return self.fail_seed(seed, e).await,
        };

        let ids: Vec<ItemId> = run.iter().map(|c| c.item.id.clone()).collect();
        let claimed = self.shared.backlog.write().await.claim(&ids);
        if claimed.is_empty() {
            return PassOutcome::Idle;
        }

        let items: Vec<Item> = run
            .into_iter()
            .take(claimed.len())
            .map(|candidate| Item {
                status: ItemStatus::Processing,
                ..candidate.item
            })
            .collect();

        tracing::info!(
            batch_size = items.len(),
            first = %items[0].name,
            "Grading batch"
        );
        self.publish(SchedulerEvent::BatchStarted { ids: claimed.clone() });

        let outcome = self.shared.evaluator.run_batch(&items).await;
        let success = outcome.is_success();
        let event = match &outcome {
            BatchOutcome::Graded(members) => SchedulerEvent::BatchFinished {
                ids: claimed,
                keepers: members.iter().filter(|m| m.evaluation.is_worth_keeping).count(),
            },
            BatchOutcome::Failed { message, .. } => SchedulerEvent::BatchFailed {
                ids: claimed,
                message: message.clone(),
            },
        };

        outcome.apply(&mut *self.shared.backlog.write().await);
        self.publish(event);

        PassOutcome::Processed {
            batch_size: items.len(),
            success,
        }
    }

    /// Recurring driver. Returns when `shutdown` fires; a batch in flight at
    /// that moment keeps running (see `wait_idle`).
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.shared.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_ms = self.shared.config.tick_interval_ms,
            follow_up_ms = self.shared.config.follow_up_delay_ms,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.spawn_pass(),
                _ = self.shared.follow_up.notified() => self.spawn_pass(),
            }
        }

        tracing::info!("Scheduler stopped");
    }

    fn spawn_pass(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let PassOutcome::Processed { .. } = scheduler.run_once().await {
                // Drain faster than the tick while still yielding between batches
                tokio::time::sleep(scheduler.shared.config.follow_up_delay()).await;
                scheduler.shared.follow_up.notify_one();
            }
        });
    }

    /// The seed could not even be read: that is a preparation failure for it
    async fn fail_seed(&self, seed: ItemId, error: CuratorError) -> PassOutcome {
        let message = error.to_string();
        {
            let mut backlog = self.shared.backlog.write().await;
            if backlog.claim(std::slice::from_ref(&seed)).is_empty() {
                return PassOutcome::Idle;
            }
            if let Err(e) = backlog.fail(&seed, message.clone()) {
                tracing::error!(error = %e, "Cannot record failure");
            }
        }

        tracing::warn!(item = %seed, error = %message, "Cannot read item");
        self.publish(SchedulerEvent::BatchFailed {
            ids: vec![seed],
            message,
        });

        PassOutcome::Processed {
            batch_size: 1,
            success: false,
        }
    }

    async fn announce_drained(&self) {
        if !self.shared.drained.swap(true, Ordering::SeqCst) {
            let summary = self.summary().await;
            tracing::info!(
                done = summary.done,
                errors = summary.error,
                keepers = summary.keepers,
                "Backlog drained"
            );
            self.publish(SchedulerEvent::Drained { summary });
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        // No subscribers is fine
        let _ = self.shared.events.send(event);
    }
}
