/// In-memory collaborators for pipeline tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{CuratorError, Result};
use crate::grading::Grader;
use crate::media::{ImageSource, PreparedImage, Preparer, SourceBytes};
use crate::pipeline::orchestrator::BatchEvaluator;
use crate::state::backlog::Backlog;
use crate::state::data::{Item, ItemId, MetadataRef};
use crate::state::evaluation::Evaluation;

pub const CORRUPT: &[u8] = b"corrupt";

pub fn backlog(names: &[&str]) -> Backlog {
    Backlog::from_items(
        names
            .iter()
            .map(|name| Item::pending(ItemId::new(*name), *name))
            .collect(),
    )
}

/// Serves non-JPEG bytes, so capture time is the scripted last-modified
#[derive(Default)]
pub struct FakeSource {
    times: Mutex<HashMap<String, i64>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeSource {
    pub fn with_times(entries: &[(&str, i64)]) -> Self {
        let source = FakeSource::default();
        for (name, time) in entries {
            source.add(name, *time);
        }
        source
    }

    pub fn add(&self, name: &str, time: i64) {
        self.times.lock().unwrap().insert(name.to_string(), time);
    }

    pub fn set_contents(&self, name: &str, bytes: &[u8]) {
        self.contents.lock().unwrap().insert(name.to_string(), bytes.to_vec());
    }

    fn lookup(&self, item: &Item) -> Result<SourceBytes> {
        let time = self
            .times
            .lock()
            .unwrap()
            .get(item.id.as_str())
            .copied()
            .ok_or_else(|| CuratorError::NotFound(item.id.to_string()))?;
        let bytes = self
            .contents
            .lock()
            .unwrap()
            .get(item.id.as_str())
            .cloned()
            .unwrap_or_else(|| item.name.as_bytes().to_vec());
        Ok(SourceBytes {
            bytes,
            mime_type: "image/png",
            last_modified: time,
        })
    }
}

#[async_trait]
impl ImageSource for FakeSource {
    async fn read_head(&self, item: &Item) -> Result<SourceBytes> {
        self.lookup(item)
    }

    async fn read_full(&self, item: &Item) -> Result<SourceBytes> {
        self.lookup(item)
    }
}

/// Passes bytes through, rejecting `CORRUPT`
pub struct FakePreparer;

#[async_trait]
impl Preparer for FakePreparer {
    async fn prepare(&self, bytes: Vec<u8>) -> Result<PreparedImage> {
        if bytes == CORRUPT {
            return Err(CuratorError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cannot decode",
            )));
        }
        Ok(PreparedImage {
            data: bytes,
            mime_type: "image/jpeg",
        })
    }
}

/// Grades everything as a keeper unless told otherwise, counting calls
#[derive(Default)]
pub struct ScriptedGrader {
    pub single_calls: AtomicUsize,
    pub group_calls: AtomicUsize,
    pub group_sizes: Mutex<Vec<usize>>,
    omit: Mutex<HashSet<String>>,
    fail_with: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl ScriptedGrader {
    pub fn omit(&self, name: &str) {
        self.omit.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst) + self.group_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        match self.fail_with.lock().unwrap().clone() {
            Some(message) => Err(CuratorError::Grading(message)),
            None => Ok(()),
        }
    }

    fn evaluate(name: &str) -> Evaluation {
        Evaluation::new(!name.contains("blurry")).with_reasoning(format!("graded {}", name))
    }
}

#[async_trait]
impl Grader for ScriptedGrader {
    async fn grade_one(&self, name: &str, _image: &PreparedImage) -> Result<Evaluation> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(Self::evaluate(name))
    }

    async fn grade_group(
        &self,
        images: &[(String, PreparedImage)],
    ) -> Result<HashMap<String, Evaluation>> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        self.group_sizes.lock().unwrap().push(images.len());
        self.enter().await?;

        let omit = self.omit.lock().unwrap().clone();
        Ok(images
            .iter()
            .filter(|(name, _)| !omit.contains(name))
            .map(|(name, _)| (name.clone(), Self::evaluate(name)))
            .collect())
    }
}

/// Records writes in memory, failing for chosen item names
#[derive(Default)]
pub struct RecordingStore {
    pub written: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn fail_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl crate::sidecar::MetadataStore for RecordingStore {
    async fn write(&self, item: &Item, _evaluation: &Evaluation) -> Result<MetadataRef> {
        if self.failing.lock().unwrap().contains(&item.name) {
            return Err(CuratorError::Metadata("disk full".to_string()));
        }
        self.written.lock().unwrap().push(item.name.clone());
        Ok(MetadataRef::new(format!("/sidecars/{}.json", item.name)))
    }

    async fn read(&self, _metadata_ref: &MetadataRef) -> Option<Evaluation> {
        None
    }

    async fn locate(&self, _item: &Item) -> Option<MetadataRef> {
        None
    }
}

/// Evaluator wired to the given fakes
pub fn evaluator(
    source: Arc<FakeSource>,
    grader: Arc<ScriptedGrader>,
    store: Arc<RecordingStore>,
) -> BatchEvaluator {
    BatchEvaluator::new(source, Arc::new(FakePreparer), grader, store)
}
