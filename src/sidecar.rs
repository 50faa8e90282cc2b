/// Sidecar metadata files
///
/// A graded image `IMG_0001.JPG` gets `IMG_0001.curate.json` in the same
/// directory. The sidecar is the only place grades outlive a session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CuratorError, Result};
use crate::state::data::{Item, MetadataRef};
use crate::state::evaluation::Evaluation;

/// Suffix appended to an image's base name
pub const SIDECAR_SUFFIX: &str = ".curate.json";

const SIDECAR_VERSION: u32 = 1;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist an evaluation for `item`, returning where it went
    async fn write(&self, item: &Item, evaluation: &Evaluation) -> Result<MetadataRef>;

    /// Load a previously written evaluation. Unreadable or malformed
    /// sidecars come back as `None`.
    async fn read(&self, metadata_ref: &MetadataRef) -> Option<Evaluation>;

    /// Existing sidecar for `item`, if there is one
    async fn locate(&self, item: &Item) -> Option<MetadataRef>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarDocument {
    version: u32,
    /// Image file name the grade belongs to
    source: String,
    graded_at: DateTime<Utc>,
    evaluation: Evaluation,
}

/// JSON sidecars written next to the images of a library
#[derive(Debug, Clone)]
pub struct JsonSidecarStore {
    root: PathBuf,
}

impl JsonSidecarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sidecar location for an item
    pub fn sidecar_path(&self, item: &Item) -> PathBuf {
        let image_path = item.id.to_path(&self.root);
        let dir = image_path.parent().unwrap_or(&self.root).to_path_buf();
        dir.join(format!("{}{}", item.base_name(), SIDECAR_SUFFIX))
    }
}

#[async_trait]
impl MetadataStore for JsonSidecarStore {
    async fn write(&self, item: &Item, evaluation: &Evaluation) -> Result<MetadataRef> {
        let path = self.sidecar_path(item);
        let document = SidecarDocument {
            version: SIDECAR_VERSION,
            source: item.name.clone(),
            graded_at: Utc::now(),
            evaluation: evaluation.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        // Write to a temp file then rename so readers never see half a sidecar
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| CuratorError::Metadata(format!("{}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CuratorError::Metadata(format!("{}: {}", path.display(), e)));
        }

        Ok(MetadataRef::new(path))
    }

    async fn read(&self, metadata_ref: &MetadataRef) -> Option<Evaluation> {
        read_sidecar(metadata_ref.path()).await
    }

    async fn locate(&self, item: &Item) -> Option<MetadataRef> {
        let path = self.sidecar_path(item);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(MetadataRef::new(path)),
            _ => None,
        }
    }
}

async fn read_sidecar(path: &Path) -> Option<Evaluation> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read sidecar");
            return None;
        }
    };

    match serde_json::from_slice::<SidecarDocument>(&bytes) {
        Ok(document) => Some(document.evaluation),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed sidecar");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::ItemId;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("trip")).unwrap();
        let store = JsonSidecarStore::new(dir.path());
        let item = Item::pending(ItemId::new("trip/DSC_0042.JPG"), "DSC_0042.JPG");

        let evaluation = Evaluation::new(true).with_score(8.5).with_reasoning("sharp, well exposed");
        let metadata_ref = store.write(&item, &evaluation).await.unwrap();

        assert_eq!(metadata_ref.path(), dir.path().join("trip").join("DSC_0042.curate.json"));
        assert_eq!(store.read(&metadata_ref).await, Some(evaluation));
        assert_eq!(store.locate(&item).await, Some(metadata_ref));

        let other = Item::pending(ItemId::new("trip/DSC_0043.JPG"), "DSC_0043.JPG");
        assert_eq!(store.locate(&other).await, None);
    }

    #[tokio::test]
    async fn test_malformed_sidecar_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.curate.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonSidecarStore::new(dir.path());
        assert_eq!(store.read(&MetadataRef::new(path)).await, None);
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSidecarStore::new(dir.path());
        let item = Item::pending(ItemId::new("gone/a.jpg"), "a.jpg");

        let result = store.write(&item, &Evaluation::new(false)).await;
        assert!(matches!(result, Err(CuratorError::Metadata(_))));
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the sidecar should go makes the rename fail
        let blocker = dir.path().join("a.curate.json");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), "x").unwrap();

        let store = JsonSidecarStore::new(dir.path());
        let item = Item::pending(ItemId::new("a.jpg"), "a.jpg");

        let result = store.write(&item, &Evaluation::new(true)).await;
        assert!(matches!(result, Err(CuratorError::Metadata(_))));
        assert!(!dir.path().join("a.curate.json.tmp").exists());
    }
}
