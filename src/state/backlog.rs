use std::collections::HashMap;

use super::data::{Item, ItemId, ItemStatus, MetadataRef};
use super::evaluation::Evaluation;
use crate::error::{CuratorError, Result};

/// Ordered working set of items.
///
/// Items are stored in a map keyed by id for O(1) updates, while `order`
/// keeps the name-sorted sequence fixed at construction. That sequence is
/// the grouping order used by the burst grouper.
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    items: HashMap<ItemId, Item>,
    order: Vec<ItemId>,
}

/// Per-status counts for progress reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogSummary {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
    /// Done items graded as worth keeping
    pub keepers: usize,
}

impl BacklogSummary {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.done + self.error
    }
}

impl Backlog {
    /// Build a backlog sorted by name. Later items whose id is already
    /// present are dropped.
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut items = items;
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut backlog = Backlog::default();
        for item in items {
            if backlog.items.contains_key(&item.id) {
                tracing::warn!(item = %item.id, "Duplicate item id, skipping");
                continue;
            }
            backlog.order.push(item.id.clone());
            backlog.items.insert(item.id.clone(), item);
        }
        backlog
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Items in backlog order
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Position of the first pending item
    pub fn first_pending(&self) -> Option<usize> {
        self.iter().position(Item::is_pending)
    }

    /// Contiguous run of pending items starting at the first pending one,
    /// at most `max` long. Cloned so it can be inspected without holding
    /// a lock on the backlog.
    pub fn pending_window(&self, max: usize) -> Vec<(usize, Item)> {
        let Some(start) = self.first_pending() else {
            return Vec::new();
        };

        self.iter()
            .enumerate()
            .skip(start)
            .take(max)
            .take_while(|(_, item)| item.is_pending())
            .map(|(index, item)| (index, item.clone()))
            .collect()
    }

    /// Mark a run as processing. Only the prefix of `ids` that is still
    /// pending is claimed; the claimed ids are returned.
    pub fn claim(&mut self, ids: &[ItemId]) -> Vec<ItemId> {
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            match self.items.get_mut(id) {
                Some(item) if item.is_pending() => {
                    item.status = ItemStatus::Processing;
                    claimed.push(id.clone());
                }
                _ => break,
            }
        }
        claimed
    }

    /// processing -> done
    pub fn complete(
        &mut self,
        id: &ItemId,
        evaluation: Evaluation,
        metadata_ref: Option<MetadataRef>,
    ) -> Result<()> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| CuratorError::NotFound(id.to_string()))?;
        item.status = ItemStatus::Done;
        item.evaluation = Some(evaluation);
        item.error_message = None;
        if metadata_ref.is_some() {
            item.metadata_ref = metadata_ref;
        }
        Ok(())
    }

    /// processing -> error
    pub fn fail(&mut self, id: &ItemId, message: impl Into<String>) -> Result<()> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| CuratorError::NotFound(id.to_string()))?;
        item.status = ItemStatus::Error;
        item.evaluation = None;
        item.error_message = Some(message.into());
        Ok(())
    }

    /// Put every failed item back in the queue. Returns how many moved.
    pub fn requeue_failed(&mut self) -> usize {
        let mut count = 0;
        for item in self.items.values_mut() {
            if item.status == ItemStatus::Error {
                item.status = ItemStatus::Pending;
                item.error_message = None;
                count += 1;
            }
        }
        count
    }

    /// Drop an item from the backlog (user delete/archive)
    pub fn remove(&mut self, id: &ItemId) -> Result<Item> {
        match self.items.get(id) {
            None => return Err(CuratorError::NotFound(id.to_string())),
            Some(item) if item.status == ItemStatus::Processing => {
                return Err(CuratorError::Busy(format!("{} is being graded", id)));
            }
            Some(_) => {}
        }

        self.order.retain(|existing| existing != id);
        self.items
            .remove(id)
            .ok_or_else(|| CuratorError::NotFound(id.to_string()))
    }

    pub fn summary(&self) -> BacklogSummary {
        let mut summary = BacklogSummary::default();
        for item in self.items.values() {
            match item.status {
                ItemStatus::Pending => summary.pending += 1,
                ItemStatus::Processing => summary.processing += 1,
                ItemStatus::Done => {
                    summary.done += 1;
                    if item.evaluation.as_ref().is_some_and(|e| e.is_worth_keeping) {
                        summary.keepers += 1;
                    }
                }
                ItemStatus::Error => summary.error += 1,
            }
        }
        summary
    }
}
