//! Renderer seam
//!
//! The renderer turns a post page into an image or video file. It is an
//! external collaborator; [`Renderer`] is the boundary the job runner talks
//! to, and [`CommandRenderer`] drives the real CLI.

pub mod command;

pub use command::{build_render_command, CommandRenderer};

use crate::config::RenderConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Output file name template understood by the renderer
///
/// `{id}` is the platform post id; stills become `.png`, anything animated `.mp4`.
pub const OUTPUT_FILE_TEMPLATE: &str = "{id}.{if-photo:png:mp4}";

/// Errors reported by a renderer
#[derive(Debug, Error)]
pub enum RenderError {
    /// Renderer exited with non-zero status
    #[error("renderer failed with exit code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    /// Renderer was terminated by a signal
    #[error("renderer was terminated by signal")]
    Terminated,

    /// IO error launching the renderer or touching its files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render tuning passed through to the renderer on every job
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub theme: String,
    pub scale: f32,
    pub width: u32,
    pub ffmpeg_timeout_ms: u64,
    pub ffmpeg_options: Vec<String>,
}

impl From<&RenderConfig> for RenderOptions {
    fn from(cfg: &RenderConfig) -> Self {
        Self {
            theme: cfg.theme.clone(),
            scale: cfg.scale,
            width: cfg.width,
            ffmpeg_timeout_ms: cfg.ffmpeg_timeout_ms,
            ffmpeg_options: cfg.ffmpeg_options.clone().unwrap_or_default(),
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

/// One renderer invocation
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Page to render
    pub url: String,
    /// Maximum number of posts to render
    pub limit: u32,
    /// Cookie/credential file for the source platform
    pub session_file: PathBuf,
    /// Directory the result must be written into
    pub workspace: PathBuf,
    /// Full output path template, `<workspace>/{id}.{if-photo:png:mp4}`
    pub output_template: String,
    /// Where intermediates go; removed by [`Renderer::cleanup_temp`]
    pub scratch_dir: PathBuf,
    pub options: RenderOptions,
}

/// A post as reported by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    /// Platform post id
    pub id: String,
    /// Files produced for this post
    pub media: Vec<PathBuf>,
}

/// External renderer boundary
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `request.url` into `request.workspace`
    async fn render(&self, request: &RenderRequest) -> Result<Vec<RenderedPost>, RenderError>;

    /// Remove intermediate render files (never the workspace itself)
    async fn cleanup_temp(&self, request: &RenderRequest) -> Result<(), RenderError>;
}

/// Group files by stem into posts
///
/// The output template names every file after its post id, so files sharing
/// a stem belong to the same post.
pub fn group_posts(files: &[PathBuf]) -> Vec<RenderedPost> {
    let mut posts: Vec<RenderedPost> = Vec::new();
    for file in files {
        let id = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match posts.iter_mut().find(|p| p.id == id) {
            Some(post) => post.media.push(file.clone()),
            None => posts.push(RenderedPost {
                id,
                media: vec![file.clone()],
            }),
        }
    }
    posts
}
