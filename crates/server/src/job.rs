//! Snapshot job runner
//!
//! Turns a post target into exactly one rendered media file living in its
//! own workspace. Every run goes through the [`ConcurrencyGate`].

use crate::artifact::MediaKind;
use crate::config::Config;
use crate::gate::{ConcurrencyGate, GateError};
use crate::metrics::SharedMetrics;
use crate::render::{
    RenderError, RenderOptions, RenderRequest, RenderedPost, Renderer, OUTPUT_FILE_TEMPLATE,
};
use crate::target::{Target, TargetError};
use crate::workspace::{Workspace, WorkspaceManager};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Renderer scratch directory, relative to the workspace
const SCRATCH_DIR_NAME: &str = ".render";

/// Error type for snapshot jobs
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Waiting for a gate slot failed
    #[error("gate: {0}")]
    Gate(#[from] GateError),

    /// The target did not validate
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    /// The workspace could not be allocated
    #[error("failed to allocate workspace: {0}")]
    Workspace(io::Error),

    /// The renderer failed
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// The renderer reported something other than one post
    #[error("expected exactly one post, renderer reported {0}")]
    PostCount(usize),

    /// The workspace holds something other than one artifact
    #[error("expected exactly one artifact, found {0}")]
    ArtifactCount(usize),

    /// The artifact is neither png nor mp4
    #[error("unsupported artifact: {0}")]
    UnsupportedArtifact(String),

    /// IO error inspecting the workspace
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SnapshotError {
    /// Whether the caller supplied bad input, as opposed to the job failing
    pub fn is_input_error(&self) -> bool {
        matches!(self, SnapshotError::InvalidTarget(_))
    }
}

/// One snapshot operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Random identifier, also the workspace directory name
    pub id: String,
    /// Resolved page URL
    pub url: String,
}

/// A finished job: the artifact and the workspace that holds it
///
/// Whoever holds the snapshot owns the workspace; dropping it removes the
/// directory and the artifact with it.
#[derive(Debug)]
pub struct Snapshot {
    pub workspace: Workspace,
    pub artifact: PathBuf,
    pub kind: MediaKind,
}

/// Gate-protected snapshot runner shared by all request handlers
pub struct SnapshotRunner {
    gate: ConcurrencyGate,
    workspaces: WorkspaceManager,
    renderer: Arc<dyn Renderer>,
    session_file: PathBuf,
    options: RenderOptions,
    metrics: SharedMetrics,
}

impl SnapshotRunner {
    pub fn new(
        gate: ConcurrencyGate,
        workspaces: WorkspaceManager,
        renderer: Arc<dyn Renderer>,
        session_file: PathBuf,
        options: RenderOptions,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            gate,
            workspaces,
            renderer,
            session_file,
            options,
            metrics,
        }
    }

    /// Build a runner from the loaded configuration
    pub fn from_config(
        config: &Config,
        renderer: Arc<dyn Renderer>,
        metrics: SharedMetrics,
    ) -> Result<Self, GateError> {
        Ok(Self::new(
            ConcurrencyGate::from_config(&config.gate)?,
            WorkspaceManager::new(&config.render.output_dir),
            renderer,
            config.cookie_file(),
            RenderOptions::from(&config.render),
            metrics,
        ))
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Snapshot an arbitrary http(s) URL
    pub async fn snapshot_url(&self, raw: &str) -> Result<Snapshot, SnapshotError> {
        self.snapshot(&Target::url(raw)?).await
    }

    /// Snapshot a post on X/Twitter by status id
    pub async fn snapshot_twitter(&self, id: &str) -> Result<Snapshot, SnapshotError> {
        self.snapshot(&Target::twitter(id)?).await
    }

    /// Snapshot a pixiv artwork by id
    pub async fn snapshot_pixiv(&self, id: &str) -> Result<Snapshot, SnapshotError> {
        self.snapshot(&Target::pixiv(id)?).await
    }

    /// Run one job for `target` under the gate
    ///
    /// The slot is held only while the renderer works; streaming the result
    /// happens after it has been given back.
    pub async fn snapshot(&self, target: &Target) -> Result<Snapshot, SnapshotError> {
        let url = target.resolve();

        let queued = self.metrics.enter_queue();
        let permit = self.gate.acquire().await.map_err(|e| {
            warn!(url = %url, error = %e, "gave up waiting for a slot");
            self.metrics.record_failed();
            e
        })?;
        drop(queued);

        let running = self.metrics.start_running();
        let started = Instant::now();
        let result = self.run(&url).await;
        drop(running);
        permit.release();

        match &result {
            Ok(snapshot) => {
                self.metrics.record_completed();
                info!(
                    url = %url,
                    workspace = %snapshot.workspace.id(),
                    kind = ?snapshot.kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "snapshot ready"
                );
            }
            Err(e) => {
                self.metrics.record_failed();
                error!(
                    url = %url,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "snapshot failed"
                );
            }
        }

        result
    }

    /// Render `url` into a fresh workspace, without touching the gate
    ///
    /// On failure the workspace is destroyed before the error is returned.
    pub async fn run(&self, url: &str) -> Result<Snapshot, SnapshotError> {
        let workspace = self.workspaces.allocate().map_err(SnapshotError::Workspace)?;
        let job = JobRequest {
            id: workspace.id().to_string(),
            url: url.to_string(),
        };
        debug!(job = %job.id, url = %job.url, "starting job");

        let request = RenderRequest {
            url: job.url.clone(),
            limit: 1,
            session_file: self.session_file.clone(),
            workspace: workspace.path().to_path_buf(),
            output_template: workspace
                .path()
                .join(OUTPUT_FILE_TEMPLATE)
                .to_string_lossy()
                .to_string(),
            scratch_dir: workspace.path().join(SCRATCH_DIR_NAME),
            options: self.options.clone(),
        };

        let rendered = self.renderer.render(&request).await;
        if let Err(e) = self.renderer.cleanup_temp(&request).await {
            warn!(job = %job.id, error = %e, "renderer temp cleanup failed");
        }
        let posts = rendered?;

        let files = workspace.files()?;
        let (artifact, kind) = decode_artifact(&posts, files)?;

        Ok(Snapshot {
            workspace,
            artifact,
            kind,
        })
    }
}

/// Reduce the renderer's posts and the workspace listing to one artifact
pub fn decode_artifact(
    posts: &[RenderedPost],
    mut files: Vec<PathBuf>,
) -> Result<(PathBuf, MediaKind), SnapshotError> {
    if posts.len() != 1 {
        return Err(SnapshotError::PostCount(posts.len()));
    }
    if files.len() != 1 {
        return Err(SnapshotError::ArtifactCount(files.len()));
    }

    let artifact = files.remove(0);
    match MediaKind::from_path(&artifact) {
        Some(kind) => Ok((artifact, kind)),
        None => Err(SnapshotError::UnsupportedArtifact(
            artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_metrics;
    use crate::testing::{FakeOutput, FakeRenderer, FAKE_MP4, FAKE_PNG};
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_runner(
        temp: &TempDir,
        capacity: usize,
        renderer: Arc<FakeRenderer>,
    ) -> Arc<SnapshotRunner> {
        Arc::new(SnapshotRunner::new(
            ConcurrencyGate::new(capacity).unwrap(),
            WorkspaceManager::new(temp.path().join("out")),
            renderer,
            PathBuf::from("./cookie.json"),
            RenderOptions::default(),
            new_shared_metrics(),
        ))
    }

    fn leftover_workspaces(temp: &TempDir) -> usize {
        match std::fs::read_dir(temp.path().join("out")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn test_decode_artifact_cardinality() {
        let one = vec![RenderedPost {
            id: "1".to_string(),
            media: vec![PathBuf::from("/w/1.png")],
        }];

        let (path, kind) = decode_artifact(&one, vec![PathBuf::from("/w/1.png")]).unwrap();
        assert_eq!(path, PathBuf::from("/w/1.png"));
        assert_eq!(kind, MediaKind::Image);

        assert!(matches!(
            decode_artifact(&[], vec![]),
            Err(SnapshotError::PostCount(0))
        ));
        assert!(matches!(
            decode_artifact(&[one[0].clone(), one[0].clone()], vec![]),
            Err(SnapshotError::PostCount(2))
        ));
        assert!(matches!(
            decode_artifact(&one, vec![PathBuf::from("/w/1.png"), PathBuf::from("/w/1.mp4")]),
            Err(SnapshotError::ArtifactCount(2))
        ));
        assert!(matches!(
            decode_artifact(&one, vec![PathBuf::from("/w/1.webm")]),
            Err(SnapshotError::UnsupportedArtifact(name)) if name == "1.webm"
        ));
    }

    #[tokio::test]
    async fn test_image_snapshot() {
        let temp = TempDir::new().unwrap();
        let renderer = Arc::new(FakeRenderer::new(FakeOutput::Image));
        let runner = make_runner(&temp, 1, renderer.clone());

        let snapshot = runner.snapshot_twitter("1349129669258448897").await.unwrap();

        assert_eq!(snapshot.kind, MediaKind::Image);
        assert_eq!(
            snapshot.artifact.file_name().unwrap(),
            "1349129669258448897.png"
        );
        assert_eq!(std::fs::read(&snapshot.artifact).unwrap(), FAKE_PNG);
        // Scratch directory was cleaned, leaving only the artifact
        assert_eq!(renderer.cleanups(), 1);
        assert!(!snapshot.workspace.path().join(".render").exists());
        assert_eq!(runner.gate().available_permits(), 1);

        let dir = snapshot.workspace.path().to_path_buf();
        drop(snapshot);
        assert!(!dir.exists());
        assert_eq!(runner.metrics().snapshot(1, 1).completed_jobs, 1);
    }

    #[tokio::test]
    async fn test_video_snapshot() {
        let temp = TempDir::new().unwrap();
        let runner = make_runner(&temp, 1, Arc::new(FakeRenderer::new(FakeOutput::Video)));

        let snapshot = runner.snapshot_pixiv("44298467").await.unwrap();

        assert_eq!(snapshot.kind, MediaKind::Video);
        assert_eq!(std::fs::read(&snapshot.artifact).unwrap(), FAKE_MP4);
    }

    #[tokio::test]
    async fn test_failures_leave_nothing_behind() {
        let cases = [
            (FakeOutput::Fail, "render"),
            (FakeOutput::Nothing, "posts"),
            (FakeOutput::TwoPosts, "posts"),
            (FakeOutput::TwoMedia, "artifacts"),
            (FakeOutput::Webm, "unsupported"),
        ];

        for (output, expected) in cases {
            let temp = TempDir::new().unwrap();
            let renderer = Arc::new(FakeRenderer::new(output));
            let runner = make_runner(&temp, 2, renderer.clone());

            let err = runner
                .snapshot_url("https://unreachable.invalid/post/1")
                .await
                .unwrap_err();

            let matched = match expected {
                "render" => matches!(err, SnapshotError::Render(RenderError::Failed { .. })),
                "posts" => matches!(err, SnapshotError::PostCount(_)),
                "artifacts" => matches!(err, SnapshotError::ArtifactCount(2)),
                _ => matches!(err, SnapshotError::UnsupportedArtifact(_)),
            };
            assert!(matched, "{:?} produced {:?}", output, err);
            assert!(!err.is_input_error());
            assert_eq!(leftover_workspaces(&temp), 0, "{:?} leaked a workspace", output);
            assert_eq!(renderer.cleanups(), 1);
            assert_eq!(runner.gate().available_permits(), 2);
            assert_eq!(runner.metrics().snapshot(2, 2).failed_jobs, 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_target_skips_the_gate() {
        let temp = TempDir::new().unwrap();
        let renderer = Arc::new(FakeRenderer::new(FakeOutput::Image));
        let runner = make_runner(&temp, 1, renderer.clone());

        let err = runner.snapshot_twitter("not-a-number").await.unwrap_err();
        assert!(err.is_input_error());
        let err = runner.snapshot_url("ftp://example.com/file").await.unwrap_err();
        assert!(err.is_input_error());

        assert_eq!(renderer.spans().len(), 0);
        assert_eq!(leftover_workspaces(&temp), 0);
        assert_eq!(runner.metrics().snapshot(1, 1).failed_jobs, 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_releases_everything() {
        let temp = TempDir::new().unwrap();
        let renderer =
            Arc::new(FakeRenderer::new(FakeOutput::Image).with_delay(Duration::from_secs(30)));
        let runner = make_runner(&temp, 1, renderer);

        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.snapshot_twitter("1").await })
        };

        // Wait until the job is inside the renderer
        for _ in 0..100 {
            if runner.metrics().running() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runner.metrics().running(), 1);
        assert_eq!(leftover_workspaces(&temp), 1);

        task.abort();
        let _ = task.await;

        assert_eq!(runner.gate().available_permits(), 1);
        assert_eq!(runner.metrics().running(), 0);
        assert_eq!(leftover_workspaces(&temp), 0);
    }

    #[tokio::test]
    async fn test_single_slot_serializes_jobs() {
        let temp = TempDir::new().unwrap();
        let renderer =
            Arc::new(FakeRenderer::new(FakeOutput::Image).with_delay(Duration::from_millis(50)));
        let runner = make_runner(&temp, 1, renderer.clone());

        let (a, b) = tokio::join!(runner.snapshot_twitter("1"), runner.snapshot_twitter("2"));
        assert!(a.is_ok() && b.is_ok());

        let spans = renderer.spans();
        assert_eq!(spans.len(), 2);
        assert!(spans[1].0 >= spans[0].1, "second job started before the first ended");
        assert_eq!(renderer.peak(), 1);
    }

    #[tokio::test]
    async fn test_burst_never_exceeds_capacity() {
        for capacity in [1usize, 2, 3] {
            let temp = TempDir::new().unwrap();
            let renderer = Arc::new(
                FakeRenderer::new(FakeOutput::Image).with_delay(Duration::from_millis(20)),
            );
            let runner = make_runner(&temp, capacity, renderer.clone());

            let handles: Vec<_> = (0..capacity * 3 + 1)
                .map(|i| {
                    let runner = runner.clone();
                    tokio::spawn(
                        async move { runner.snapshot_twitter(&i.to_string()).await.map(drop) },
                    )
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            assert!(renderer.peak() <= capacity);
            assert!(runner.metrics().peak_running() <= capacity);
            assert_eq!(runner.gate().available_permits(), capacity);
            assert_eq!(leftover_workspaces(&temp), 0);
        }
    }

    #[tokio::test]
    async fn test_concurrent_workspaces_are_distinct() {
        let temp = TempDir::new().unwrap();
        let runner = make_runner(&temp, 8, Arc::new(FakeRenderer::new(FakeOutput::Image)));

        let results = futures::future::join_all((0..8).map(|i| {
            let runner = runner.clone();
            async move { runner.snapshot_twitter(&i.to_string()).await.unwrap() }
        }))
        .await;

        let dirs: HashSet<_> = results
            .iter()
            .map(|s| s.workspace.path().to_path_buf())
            .collect();
        assert_eq!(dirs.len(), 8);
    }

    #[tokio::test]
    async fn test_gate_timeout_is_a_job_failure() {
        let temp = TempDir::new().unwrap();
        let runner = SnapshotRunner::new(
            ConcurrencyGate::new(1)
                .unwrap()
                .with_acquire_timeout(Duration::from_millis(20)),
            WorkspaceManager::new(temp.path().join("out")),
            Arc::new(FakeRenderer::new(FakeOutput::Image)),
            PathBuf::from("./cookie.json"),
            RenderOptions::default(),
            new_shared_metrics(),
        );

        let _held = runner.gate().acquire().await.unwrap();
        let err = runner.snapshot_twitter("1").await.unwrap_err();

        assert!(matches!(err, SnapshotError::Gate(GateError::Timeout(_))));
        assert!(!err.is_input_error());
        assert_eq!(leftover_workspaces(&temp), 0);
    }

    #[tokio::test]
    async fn test_closed_gate_rejects_new_jobs() {
        let temp = TempDir::new().unwrap();
        let renderer = Arc::new(FakeRenderer::new(FakeOutput::Image));
        let runner = make_runner(&temp, 1, renderer.clone());

        runner.gate().close();
        let err = runner.snapshot_twitter("1").await.unwrap_err();

        assert!(matches!(err, SnapshotError::Gate(GateError::Closed)));
        assert!(!err.is_input_error());
        assert!(renderer.spans().is_empty());
        assert_eq!(leftover_workspaces(&temp), 0);
    }
}
