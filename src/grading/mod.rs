/// Grading service collaborator
///
/// The pipeline does not decide how an image is graded. It hands prepared
/// payloads to a `Grader` and interprets what comes back.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::media::PreparedImage;
use crate::state::evaluation::Evaluation;

pub mod http;

pub use http::HttpGrader;

#[async_trait]
pub trait Grader: Send + Sync {
    /// Grade a single image
    async fn grade_one(&self, name: &str, image: &PreparedImage) -> Result<Evaluation>;

    /// Grade a burst jointly. The response is keyed by file name and may
    /// omit entries; the caller decides what a missing entry means.
    async fn grade_group(
        &self,
        images: &[(String, PreparedImage)],
    ) -> Result<HashMap<String, Evaluation>>;
}
