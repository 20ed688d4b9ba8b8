//! End-to-end runs of a task through orchestration, chains and cleanup,
//! with fake encoder, speech provider and object store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vmix_media::{Encoder, MediaError, MediaResult, RenderSpec};
use vmix_models::{MediaRequest, RequestError, SpeechText, TaskId};
use vmix_queue::{
    CleanupJob, CleanupTrigger, JobBackend, MemoryBackend, OrchestrateJob, QueueClass, QueueJob,
};
use vmix_storage::{ObjectStore, StorageResult};
use vmix_tts::{SpeechProvider, TtsResult, Voice, VoiceMap};
use vmix_worker::{
    abandon_step, orchestrate, process_job, run_cleanup, WorkerConfig, WorkerContext, WorkerError,
};

struct FakeSpeech {
    syntheses: AtomicUsize,
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
        Ok(vec![Voice::new("Rachel", "v-rachel")])
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> TtsResult<Vec<u8>> {
        self.syntheses.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{voice_id}:{text}").into_bytes())
    }
}

/// Writes a placeholder file, failing for the listed indices.
struct FakeEncoder {
    fail: Vec<usize>,
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, spec: &RenderSpec) -> MediaResult<PathBuf> {
        if self.fail.contains(&spec.index) {
            return Err(MediaError::ffmpeg_failed("exit status 1", None, Some(1)));
        }
        tokio::fs::create_dir_all(&spec.output_dir).await?;
        let out = spec.output_path();
        tokio::fs::write(&out, format!("{:?}", spec.videos)).await?;
        Ok(out)
    }
}

#[derive(Default)]
struct FakeStore {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
        tokio::fs::metadata(path).await?;
        self.keys.lock().unwrap().push(key.to_string());
        Ok(key.to_string())
    }
}

struct Harness {
    _dir: TempDir,
    work_dir: PathBuf,
    backend: Arc<MemoryBackend>,
    speech: Arc<FakeSpeech>,
    store: Arc<FakeStore>,
    ctx: WorkerContext,
}

fn harness(fail: Vec<usize>) -> Harness {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().to_path_buf();
    let backend = Arc::new(MemoryBackend::new());
    let speech = Arc::new(FakeSpeech {
        syntheses: AtomicUsize::new(0),
    });
    let store = Arc::new(FakeStore::default());

    let config = WorkerConfig {
        work_dir: work_dir.clone(),
        ..WorkerConfig::default()
    };
    let ctx = WorkerContext::new(
        config,
        backend.clone(),
        speech.clone(),
        Arc::new(VoiceMap::new()),
        Arc::new(FakeEncoder { fail }),
        store.clone(),
    )
    .unwrap();

    Harness {
        _dir: dir,
        work_dir,
        backend,
        speech,
        store,
        ctx,
    }
}

async fn media_server() -> MockServer {
    let server = MockServer::start().await;
    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}.mp4")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(name.as_bytes().to_vec()),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/x.mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(b"music".to_vec()),
        )
        .mount(&server)
        .await;
    server
}

fn request(base: &str) -> MediaRequest {
    let url = |name: &str| format!("{}/{}", base, name);
    MediaRequest {
        task_name: "launch".to_string(),
        video_blocks: BTreeMap::from([
            ("block_1".to_string(), vec![url("a.mp4"), url("b.mp4")]),
            ("block_2".to_string(), vec![url("c.mp4")]),
        ]),
        audio_blocks: BTreeMap::from([("m".to_string(), vec![url("x.mp3")])]),
        text_to_speech: vec![SpeechText::new("Hello there", "Rachel")],
    }
}

/// Drain every queue, abandoning chains whose step fails permanently.
async fn drain(h: &Harness) -> usize {
    let mut cleanups = 0;
    while let Some(job) = h
        .backend
        .pop_any(&[QueueClass::Default, QueueClass::Heavy, QueueClass::Light])
    {
        if matches!(job, QueueJob::Cleanup(_)) {
            cleanups += 1;
        }
        if let Err(e) = process_job(&h.ctx, &job).await {
            assert!(!e.is_retryable(), "unexpected retryable error: {e}");
            abandon_step(&h.ctx, &job).await.unwrap();
        }
    }
    cleanups
}

#[tokio::test]
async fn orchestrate_submits_one_render_per_combination() {
    let server = media_server().await;
    let h = harness(vec![]);
    let job = OrchestrateJob::new(request(&server.uri()));

    let summary = orchestrate(&h.ctx, &job).await.unwrap();
    assert_eq!(summary.status, "processing");
    assert_eq!(summary.total_combinations, 2);

    let renders: Vec<_> = h
        .backend
        .pending(QueueClass::Heavy)
        .into_iter()
        .map(|j| match j {
            QueueJob::Render(r) => r,
            other => panic!("unexpected job {other:?}"),
        })
        .collect();
    assert_eq!(renders.len(), 2);
    assert_eq!(renders[0].params.index, 0);
    assert_eq!(renders[1].params.index, 1);
    assert_eq!(renders[0].params.total, 2);

    // {a, c} then {b, c}
    let (first, second) = (&renders[0].params.videos, &renders[1].params.videos);
    assert_eq!(first.len(), 2);
    assert_ne!(first[0], second[0]);
    assert_eq!(first[1], second[1]);
    assert_eq!(std::fs::read(&first[0]).unwrap(), b"a");
    assert_eq!(std::fs::read(&second[0]).unwrap(), b"b");
    assert_eq!(std::fs::read(&first[1]).unwrap(), b"c");

    assert_eq!(renders[0].params.voiceover, renders[1].params.voiceover);
    assert_eq!(h.speech.syntheses.load(Ordering::SeqCst), 1);
    assert!(h.backend.has_barrier(&job.task_id));
}

#[tokio::test]
async fn full_run_uploads_every_variant_and_cleans_up_once() {
    let server = media_server().await;
    let h = harness(vec![]);
    let job = OrchestrateJob::new(request(&server.uri()));
    let task_dir = h.work_dir.join(job.task_id.dir_name());

    h.backend
        .enqueue(QueueJob::Orchestrate(job.clone()))
        .await
        .unwrap();
    let cleanups = drain(&h).await;

    assert_eq!(cleanups, 1);
    let mut keys = h.store.keys.lock().unwrap().clone();
    keys.sort();
    assert_eq!(keys, ["launch/video_0.mp4", "launch/video_1.mp4"]);
    assert!(!task_dir.exists());
    assert!(!h.backend.has_barrier(&job.task_id));
}

#[tokio::test]
async fn failed_render_still_releases_cleanup() {
    let server = media_server().await;
    let h = harness(vec![1]);
    let job = OrchestrateJob::new(request(&server.uri()));
    let task_dir = h.work_dir.join(job.task_id.dir_name());

    orchestrate(&h.ctx, &job).await.unwrap();
    let cleanups = drain(&h).await;

    assert_eq!(cleanups, 1);
    assert_eq!(*h.store.keys.lock().unwrap(), ["launch/video_0.mp4"]);
    assert!(!task_dir.exists());
}

#[tokio::test]
async fn fetch_failure_dispatches_cleanup_without_submitting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let h = harness(vec![]);
    let job = OrchestrateJob::new(request(&server.uri()));

    let err = orchestrate(&h.ctx, &job).await.unwrap_err();
    assert!(matches!(err, WorkerError::Media(MediaError::Transport(_))));

    assert!(h.backend.pending(QueueClass::Heavy).is_empty());
    assert!(!h.backend.has_barrier(&job.task_id));
    let light = h.backend.pending(QueueClass::Light);
    assert_eq!(light.len(), 1);
    assert!(matches!(
        &light[0],
        QueueJob::Cleanup(c) if c.trigger == CleanupTrigger::SetupFailure
    ));

    drain(&h).await;
    assert!(!h.work_dir.join(job.task_id.dir_name()).exists());
}

#[tokio::test]
async fn oversized_request_rejected_before_any_fetch() {
    let server = MockServer::start().await;
    let h = harness(vec![]);

    let clips = |n: usize| -> Vec<String> {
        (0..n).map(|i| format!("{}/{}.mp4", server.uri(), i)).collect()
    };
    let mut req = request(&server.uri());
    req.video_blocks = BTreeMap::from([
        ("block_1".to_string(), clips(50)),
        ("block_2".to_string(), clips(10)),
        ("block_3".to_string(), clips(10)),
    ]);

    let err = orchestrate(&h.ctx, &OrchestrateJob::new(req)).await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Request(RequestError::CombinationLimitExceeded { total: 5000, max: 4000 })
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(h.speech.syntheses.load(Ordering::SeqCst), 0);
    assert!(h.backend.pending(QueueClass::Heavy).is_empty());
}

#[tokio::test]
async fn refused_cleanup_dispatch_removes_directory_locally() {
    let server = media_server().await;
    let h = harness(vec![]);
    h.backend.fail_enqueues_after(0);
    let job = OrchestrateJob::new(request(&server.uri()));

    assert!(orchestrate(&h.ctx, &job).await.is_err());
    assert!(!h.work_dir.join(job.task_id.dir_name()).exists());
    assert!(h.backend.pending(QueueClass::Light).is_empty());
}

#[tokio::test]
async fn upload_retried_after_cleanup_dispatch_failure_completes_chain() {
    let server = media_server().await;
    let h = harness(vec![]);
    let job = OrchestrateJob::new(request(&server.uri()));
    orchestrate(&h.ctx, &job).await.unwrap();

    while let Some(render) = h.backend.pop_any(&[QueueClass::Heavy]) {
        process_job(&h.ctx, &render).await.unwrap();
    }
    let first = h.backend.pop_any(&[QueueClass::Light]).unwrap();
    process_job(&h.ctx, &first).await.unwrap();

    // the last chain's upload lands, but cleanup cannot be queued
    let last = h.backend.pop_any(&[QueueClass::Light]).unwrap();
    let local = match &last {
        QueueJob::Upload(u) => u.local_path.clone(),
        other => panic!("unexpected job {other:?}"),
    };
    h.backend.fail_enqueues_after(0);
    let err = process_job(&h.ctx, &last).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(local.exists());
    assert!(h.backend.pending(QueueClass::Light).is_empty());

    h.backend.fail_enqueues_after(usize::MAX);
    process_job(&h.ctx, &last).await.unwrap();
    assert!(!local.exists());

    let light = h.backend.pending(QueueClass::Light);
    assert_eq!(light.len(), 1);
    assert!(matches!(&light[0], QueueJob::Cleanup(c) if c.trigger == CleanupTrigger::FanIn));

    assert_eq!(drain(&h).await, 1);
    assert!(!h.work_dir.join(job.task_id.dir_name()).exists());
    assert!(!h.backend.has_barrier(&job.task_id));
}

#[tokio::test]
async fn cleanup_twice_is_harmless() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("task_gone");
    std::fs::create_dir_all(work_dir.join("results")).unwrap();

    let job = CleanupJob {
        task_id: TaskId::from_string("gone"),
        work_dir: work_dir.clone(),
        started_at: Utc::now(),
        trigger: CleanupTrigger::FanIn,
    };
    run_cleanup(&job).await;
    run_cleanup(&job).await;
    assert!(!work_dir.exists());
}
