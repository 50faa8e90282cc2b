/// Image byte source
///
/// Reads the raw bytes of an item together with its declared MIME type and
/// last-modified time. The head read is bounded so capture-time scanning of a
/// whole burst stays cheap.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::AsyncReadExt;

use crate::error::Result;
use crate::state::data::Item;

/// Bytes read for capture-time extraction. EXIF headers live at the start
/// of the file.
pub const HEAD_LIMIT: usize = 64 * 1024;

/// Raw image bytes plus what the filesystem declares about them
#[derive(Debug, Clone)]
pub struct SourceBytes {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    /// Epoch milliseconds
    pub last_modified: i64,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// First `HEAD_LIMIT` bytes of the item
    async fn read_head(&self, item: &Item) -> Result<SourceBytes>;

    /// The whole file
    async fn read_full(&self, item: &Item) -> Result<SourceBytes>;
}

/// Reads items from files below a library root
#[derive(Debug, Clone)]
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, item: &Item) -> PathBuf {
        item.id.to_path(&self.root)
    }

    async fn read(&self, item: &Item, limit: Option<usize>) -> Result<SourceBytes> {
        let path = self.path_of(item);
        let mut file = tokio::fs::File::open(&path).await?;
        let metadata = file.metadata().await?;

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let bytes = match limit {
            Some(max_bytes) => {
                let mut data = Vec::with_capacity(max_bytes);
                (&mut file).take(max_bytes as u64).read_to_end(&mut data).await?;
                data
            }
            None => {
                let mut data = Vec::with_capacity(metadata.len() as usize);
                file.read_to_end(&mut data).await?;
                data
            }
        };

        Ok(SourceBytes {
            bytes,
            mime_type: mime_for_path(&path),
            last_modified,
        })
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn read_head(&self, item: &Item) -> Result<SourceBytes> {
        self.read(item, Some(HEAD_LIMIT)).await
    }

    async fn read_full(&self, item: &Item) -> Result<SourceBytes> {
        self.read(item, None).await
    }
}

/// Supported image extensions (lowercase)
pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "webp", "heic", "heif", "tif", "tiff"];

/// Declared MIME type from the file extension
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::ItemId;

    #[tokio::test]
    async fn test_head_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("day1")).unwrap();
        std::fs::write(dir.path().join("day1").join("big.jpg"), vec![7u8; HEAD_LIMIT + 500]).unwrap();

        let source = FsImageSource::new(dir.path());
        let item = Item::pending(ItemId::new("day1/big.jpg"), "big.jpg");

        let head = source.read_head(&item).await.unwrap();
        assert_eq!(head.bytes.len(), HEAD_LIMIT);
        assert_eq!(head.mime_type, "image/jpeg");
        assert!(head.last_modified > 0);

        let full = source.read_full(&item).await.unwrap();
        assert_eq!(full.bytes.len(), HEAD_LIMIT + 500);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsImageSource::new(dir.path());
        let item = Item::pending(ItemId::new("nope.jpg"), "nope.jpg");
        assert!(source.read_head(&item).await.is_err());
    }

    #[test]
    fn test_extension_matching() {
        assert!(is_image_path(Path::new("a/IMG_1.JPG")));
        assert!(is_image_path(Path::new("b.heic")));
        assert!(!is_image_path(Path::new("IMG_1.curate.json")));
        assert!(!is_image_path(Path::new("README")));
        assert_eq!(mime_for_path(Path::new("x.PNG")), "image/png");
    }
}
