//! post-snap server
//!
//! HTTP service that renders social media posts to images and videos with an
//! external renderer, one bounded job at a time, and streams the result back.

pub mod artifact;
pub mod daemon;
pub mod gate;
pub mod http;
pub mod job;
pub mod metrics;
pub mod probe;
pub mod render;
pub mod startup;
pub mod target;
pub mod telemetry;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{artifact_response, MediaKind};
pub use daemon::{Daemon, DaemonError};
pub use gate::{ConcurrencyGate, GateError, GatePermit};
pub use http::{router, ApiError, AppState};
pub use job::{decode_artifact, JobRequest, Snapshot, SnapshotError, SnapshotRunner};
pub use metrics::{new_shared_metrics, JobMetrics, MetricsSnapshot, SharedMetrics};
pub use post_snap_config as config;
pub use post_snap_config::Config;
pub use probe::{
    build_probe_command, EncoderCapability, EncoderProber, EncoderReport, ENCODER_CATALOG,
};
pub use render::{
    build_render_command, CommandRenderer, RenderError, RenderOptions, RenderRequest,
    RenderedPost, Renderer,
};
pub use startup::{
    check_ffmpeg_available, check_renderer_available, check_session_file,
    parse_ffmpeg_version, run_startup_checks, StartupError,
};
pub use target::{Target, TargetError};
pub use workspace::{Workspace, WorkspaceManager};
