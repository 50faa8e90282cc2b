/// Image byte handling
///
/// This module handles:
/// - Reading image bytes from the library (bounded head or whole file)
/// - Extracting the EXIF capture time used for burst detection
/// - Preparing resized payloads for the grading service

pub mod capture_time;
pub mod prepare;
pub mod source;

pub use capture_time::capture_time;
pub use prepare::{JpegPreparer, PreparedImage, Preparer};
pub use source::{FsImageSource, ImageSource, SourceBytes, HEAD_LIMIT};
