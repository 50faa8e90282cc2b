use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::backlog::Backlog;
use super::data::{Item, ItemId};
use crate::error::{CuratorError, Result};
use crate::media::source::is_image_path;
use crate::pipeline::Scheduler;
use crate::sidecar::{MetadataStore, SIDECAR_SUFFIX};

/// Archived items are moved here, below the library root
pub const ARCHIVE_DIR: &str = "archive";

/// Result of opening a folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Items in the backlog
    pub imported_count: usize,
    /// Items that already had a valid sidecar
    pub graded_count: usize,
    /// Images skipped because their base name was already taken
    pub skipped_count: usize,
}

/// The Library is one opened folder of images.
/// It builds the initial backlog and performs file-level user actions
/// (delete, archive) on items.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Open a library rooted at `root`, which must be an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(CuratorError::Scan(root, "path not found".to_string()));
        }
        if !root.is_dir() {
            return Err(CuratorError::Scan(root, "not a directory".to_string()));
        }
        Ok(Library { root })
    }

    /// Get the path to the library folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// Scan the folder once and build the initial backlog. Images with a
    /// readable sidecar start as done; everything else starts pending.
    pub async fn open(&self, store: &dyn MetadataStore) -> Result<(Backlog, ImportResult)> {
        let root = self.root.clone();
        tracing::info!("🔍 Scanning folder: {}", root.display());

        let images = tokio::task::spawn_blocking(move || scan_folder(&root)).await??;
        self.build_backlog(images, store).await
    }

    /// Bulk-select fallback: build the backlog from an explicit file list.
    /// Files outside the library root and non-images are skipped.
    pub async fn from_files(
        &self,
        files: Vec<PathBuf>,
        store: &dyn MetadataStore,
    ) -> Result<(Backlog, ImportResult)> {
        let images = files
            .into_iter()
            .filter(|path| {
                let inside = path.starts_with(&self.root) && path != &self.root;
                if !inside {
                    tracing::warn!("Skipping {}: outside {}", path.display(), self.root.display());
                }
                inside && is_image_path(path) && path.is_file()
            })
            .collect();

        self.build_backlog(images, store).await
    }

    async fn build_backlog(
        &self,
        mut images: Vec<PathBuf>,
        store: &dyn MetadataStore,
    ) -> Result<(Backlog, ImportResult)> {
        // Name order decides which of two same-named images wins
        images.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));

        let mut result = ImportResult::default();
        let mut seen_bases = HashSet::new();
        let mut items = Vec::with_capacity(images.len());

        for path in images {
            let name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let item = Item::pending(ItemId::from_relative(&self.root, &path), name);

            if !seen_bases.insert(item.base_name().to_string()) {
                tracing::warn!(item = %item.id, "Another image already uses this base name, skipping");
                result.skipped_count += 1;
                continue;
            }

            let item = match store.locate(&item).await {
                Some(metadata_ref) => match store.read(&metadata_ref).await {
                    Some(evaluation) => {
                        result.graded_count += 1;
                        Item::graded(item.id, item.name, evaluation, metadata_ref)
                    }
                    None => item,
                },
                None => item,
            };
            items.push(item);
        }

        result.imported_count = items.len();
        tracing::info!(
            "✅ Opened {}: {} images, {} already graded, {} skipped",
            self.root.display(),
            result.imported_count,
            result.graded_count,
            result.skipped_count
        );

        Ok((Backlog::from_items(items), result))
    }

    /// Delete an item's image and sidecar and drop it from the backlog
    pub async fn delete(&self, scheduler: &Scheduler, id: &ItemId) -> Result<Item> {
        let root = self.root.clone();
        scheduler
            .remove_item_with(id, move |item| delete_files(&root, item))
            .await
    }

    /// Move an item's image and sidecar under `archive/` and drop it from
    /// the backlog. An earlier archived file with the same name is kept and
    /// the new one gets a numbered name.
    pub async fn archive(&self, scheduler: &Scheduler, id: &ItemId) -> Result<Item> {
        let root = self.root.clone();
        let archive = self.archive_dir();
        scheduler
            .remove_item_with(id, move |item| archive_files(&root, &archive, item))
            .await
    }

    /// Archive every graded item that is not worth keeping. Returns how
    /// many were moved.
    pub async fn archive_rejects(&self, scheduler: &Scheduler) -> Result<usize> {
        let rejects: Vec<ItemId> = scheduler
            .items()
            .await
            .into_iter()
            .filter(|item| item.evaluation.as_ref().is_some_and(|e| !e.is_worth_keeping))
            .map(|item| item.id)
            .collect();

        for id in &rejects {
            self.archive(scheduler, id).await?;
        }

        if !rejects.is_empty() {
            tracing::info!("📦 Archived {} rejected images", rejects.len());
        }
        Ok(rejects.len())
    }
}

/// Recursive scan for image files, skipping hidden entries and the archive
fn scan_folder(root: &Path) -> Result<Vec<PathBuf>> {
    let archive = root.join(ARCHIVE_DIR);
    let mut images = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && e.path() != archive));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_image_path(entry.path()) {
                    images.push(entry.path().to_path_buf());
                }
            }
            Err(e) => {
                if e.depth() == 0 {
                    return Err(CuratorError::Scan(root.to_path_buf(), e.to_string()));
                }
                tracing::warn!("Error accessing entry: {}", e);
            }
        }
    }

    tracing::debug!("{} image files found", images.len());
    Ok(images)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn delete_files(root: &Path, item: &Item) -> Result<()> {
    // Once the image is gone the item is gone, whatever happens to the sidecar
    std::fs::remove_file(item.id.to_path(root))?;
    if let Some(metadata_ref) = &item.metadata_ref {
        if let Err(e) = remove_if_exists(metadata_ref.path()) {
            tracing::warn!(item = %item.id, error = %e, "Sidecar left behind");
        }
    }
    tracing::info!(item = %item.id, "🗑️  Deleted");
    Ok(())
}

fn archive_files(root: &Path, archive: &Path, item: &Item) -> Result<()> {
    let source = item.id.to_path(root);
    let wanted = item.id.to_path(archive);
    let target_dir = wanted.parent().unwrap_or(archive).to_path_buf();
    std::fs::create_dir_all(&target_dir)?;
    let (target, target_sidecar) = free_archive_slot(&target_dir, &wanted);

    // Sidecar first so a failed image move can be undone
    let moved_sidecar = match &item.metadata_ref {
        Some(metadata_ref) if metadata_ref.path().exists() => {
            std::fs::rename(metadata_ref.path(), &target_sidecar)?;
            Some(metadata_ref.path())
        }
        _ => None,
    };

    if let Err(e) = std::fs::rename(&source, &target) {
        if let Some(original) = moved_sidecar {
            if let Err(undo) = std::fs::rename(&target_sidecar, original) {
                tracing::error!(
                    item = %item.id,
                    error = %undo,
                    "Cannot restore sidecar to {}",
                    original.display()
                );
            }
        }
        return Err(e.into());
    }

    tracing::info!(item = %item.id, "📦 Archived to {}", target.display());
    Ok(())
}

/// First of `name`, `name-1`, `name-2`... in `dir` where neither the image
/// nor its sidecar exists yet
fn free_archive_slot(dir: &Path, wanted: &Path) -> (PathBuf, PathBuf) {
    let stem = wanted.file_stem().unwrap_or_default().to_string_lossy().to_string();
    let extension = wanted.extension().map(|e| e.to_string_lossy().to_string());

    let mut n = 0usize;
    loop {
        let base = if n == 0 { stem.clone() } else { format!("{}-{}", stem, n) };
        let image = match &extension {
            Some(ext) => dir.join(format!("{}.{}", base, ext)),
            None => dir.join(&base),
        };
        let sidecar = dir.join(format!("{}{}", base, SIDECAR_SUFFIX));
        if !image.exists() && !sidecar.exists() {
            return (image, sidecar);
        }
        n += 1;
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
