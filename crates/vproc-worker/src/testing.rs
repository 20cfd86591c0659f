//! In-memory stand-ins for the object store, video store and transcoder, and
//! a metrics recorder for tests.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! other crates' tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use vproc_firestore::{FirestoreError, FirestoreResult, VideoSnapshot, VideoStore, WritePrecondition};
use vproc_media::{MediaError, TranscodeHandle, Transcoder};
use vproc_models::{Video, VideoId};
use vproc_storage::{ObjectStore, StorageError, StorageResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub public: bool,
}

/// Object store keeping objects in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    fail_uploads: AtomicBool,
    fail_publish: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, as an upload by a client would.
    pub fn put(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: bytes.into(),
                public: false,
            },
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Object keys in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every upload fail.
    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Make the public-read step after an upload fail.
    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str, destination: &Path) -> StorageResult<PathBuf> {
        let object = self
            .get(bucket, key)
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", bucket, key)))?;
        tokio::fs::write(destination, &object.bytes).await?;
        Ok(destination.to_path_buf())
    }

    async fn store(&self, source: &Path, bucket: &str, key: &str) -> StorageResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed(format!("{}/{}: injected failure", bucket, key)));
        }
        let bytes = tokio::fs::read(source).await?;
        self.put(bucket, key, bytes);

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StorageError::publish_failed(format!("{}/{}", bucket, key), "injected failure"));
        }
        if let Some(object) = lock(&self.objects).get_mut(&(bucket.to_string(), key.to_string())) {
            object.public = true;
        }
        Ok(())
    }
}

/// Video store keeping records in memory.
///
/// Every write bumps a version counter reported as the record's update time,
/// so conditional writes behave like Firestore preconditions.
#[derive(Debug, Default)]
pub struct MemoryVideoStore {
    records: Mutex<HashMap<String, (Video, u64)>>,
    clock: AtomicU64,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record.
    pub fn insert(&self, video_id: &VideoId, video: Video) {
        let version = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.records).insert(video_id.to_string(), (video, version));
    }

    pub fn video(&self, video_id: &VideoId) -> Option<Video> {
        lock(&self.records).get(video_id.as_str()).map(|(v, _)| v.clone())
    }

    /// Fail every call with a 503, as an unreachable store would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> FirestoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FirestoreError::ServerError(503, "store unavailable".into()));
        }
        Ok(())
    }

    fn merge(&self, records: &mut HashMap<String, (Video, u64)>, video_id: &VideoId, patch: &Video) {
        let version = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = records
            .entry(video_id.to_string())
            .or_insert_with(|| (Video::default(), version));
        entry.0.merge(patch);
        entry.1 = version;
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn get_video(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoSnapshot>> {
        self.check_available()?;
        Ok(lock(&self.records)
            .get(video_id.as_str())
            .map(|(video, version)| VideoSnapshot {
                video: video.clone(),
                update_time: Some(version.to_string()),
            }))
    }

    async fn set_video(&self, video_id: &VideoId, video: &Video) -> FirestoreResult<()> {
        self.check_available()?;
        let mut records = lock(&self.records);
        self.merge(&mut records, video_id, video);
        Ok(())
    }

    async fn set_video_if(
        &self,
        video_id: &VideoId,
        video: &Video,
        precondition: &WritePrecondition,
    ) -> FirestoreResult<()> {
        self.check_available()?;
        let mut records = lock(&self.records);
        let current = records.get(video_id.as_str()).map(|(_, version)| version.to_string());

        let holds = match (precondition, &current) {
            (WritePrecondition::Absent, None) => true,
            (WritePrecondition::UnchangedSince(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        if !holds {
            return Err(FirestoreError::PreconditionFailed(format!(
                "videos/{} does not satisfy {:?}",
                video_id, precondition
            )));
        }

        self.merge(&mut records, video_id, video);
        Ok(())
    }
}

/// How [`FakeTranscoder`] behaves.
#[derive(Debug, Clone)]
pub enum FakeTranscode {
    /// Write these bytes to the destination and succeed
    Succeed(Vec<u8>),
    /// Write a truncated destination and fail with this diagnostic
    Fail(String),
    /// Never finish
    Hang,
}

/// Transcoder double that records its calls.
#[derive(Debug)]
pub struct FakeTranscoder {
    behaviour: FakeTranscode,
    calls: AtomicUsize,
    /// Set when a hanging transcode's handle was dropped
    abandoned: Arc<AtomicBool>,
}

impl FakeTranscoder {
    pub fn new(behaviour: FakeTranscode) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeTranscode::Succeed(b"360p rendition".to_vec()))
    }

    pub fn failing(diagnostic: &str) -> Self {
        Self::new(FakeTranscode::Fail(diagnostic.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn was_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode(&self, source: &Path, destination: &Path) -> TranscodeHandle {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (mut completer, handle) = TranscodeHandle::channel();
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let behaviour = self.behaviour.clone();
        let abandoned = Arc::clone(&self.abandoned);

        tokio::spawn(async move {
            if !source.exists() {
                completer.complete(Err(MediaError::FileNotFound(source)));
                return;
            }
            match behaviour {
                FakeTranscode::Succeed(bytes) => {
                    let result = tokio::fs::write(&destination, bytes).await.map_err(MediaError::from);
                    completer.complete(result);
                }
                FakeTranscode::Fail(diagnostic) => {
                    let _ = tokio::fs::write(&destination, b"trunc").await;
                    completer.complete(Err(MediaError::ffmpeg_failed(
                        "FFmpeg exited with non-zero status",
                        Some(diagnostic),
                        Some(1),
                    )));
                }
                FakeTranscode::Hang => {
                    completer.closed().await;
                    abandoned.store(true, Ordering::SeqCst);
                }
            }
        });

        handle
    }
}

/// Metrics recorder keeping counter totals, for asserting what was counted.
///
/// Install per test with [`metrics::set_default_local_recorder`]; it only sees
/// metrics recorded on the installing thread.
#[derive(Debug, Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<Key, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total of counter `name` over every series carrying all of `labels`.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        lock(&self.counters)
            .iter()
            .filter(|(key, _)| key.name() == name)
            .filter(|(key, _)| {
                labels
                    .iter()
                    .all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v))
            })
            .map(|(_, value)| value.load(Ordering::SeqCst))
            .sum()
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let value = lock(&self.counters)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        Counter::from_arc(value)
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
