/// Shared data structures for the curation backlog
///
/// These structs represent the data model that flows between
/// the library scan, the scheduler and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::evaluation::Evaluation;

/// Stable identifier of an item: its path relative to the library root,
/// with `/` separators on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from a file path below `root`
    pub fn from_relative(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the id back into a path below `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grading lifecycle: pending -> processing -> done | error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// Reference to a sidecar owned by the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRef(PathBuf);

impl MetadataRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Represents a single image in the backlog
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    /// Filename only (e.g., "DSC_0001.JPG")
    pub name: String,
    pub status: ItemStatus,
    /// Present once graded, or pre-loaded from an existing sidecar
    pub evaluation: Option<Evaluation>,
    /// Present iff status is `Error`
    pub error_message: Option<String>,
    pub metadata_ref: Option<MetadataRef>,
}

impl Item {
    /// A fresh item waiting to be graded
    pub fn pending(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ItemStatus::Pending,
            evaluation: None,
            error_message: None,
            metadata_ref: None,
        }
    }

    /// An item whose grade was recovered from an existing sidecar
    pub fn graded(
        id: ItemId,
        name: impl Into<String>,
        evaluation: Evaluation,
        metadata_ref: MetadataRef,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            status: ItemStatus::Done,
            evaluation: Some(evaluation),
            error_message: None,
            metadata_ref: Some(metadata_ref),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    /// Base name used to pair images with sidecars (file name without extension)
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(dot) if dot > 0 => &self.name[..dot],
            _ => &self.name,
        }
    }
}
