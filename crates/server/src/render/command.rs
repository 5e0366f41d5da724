//! Command-line renderer
//!
//! Builds and runs the external renderer CLI (`twitter-snap` by default) for
//! one job.

use super::{group_posts, RenderError, RenderRequest, RenderedPost, Renderer};
use crate::workspace::list_files;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Bytes of renderer stderr kept in error reports
const STDERR_TAIL_BYTES: usize = 2000;

/// Build the renderer command for a request
///
/// Creates a Command configured with:
/// - The target URL and templated output path
/// - A one-post limit and file-based session
/// - Theme, scale, width and ffmpeg settings from the render options
/// - `TMPDIR` pointed at the request's scratch directory
pub fn build_render_command(program: &str, request: &RenderRequest) -> Command {
    let mut cmd = Command::new(program);

    cmd.arg(&request.url);
    cmd.arg("--output").arg(&request.output_template);
    cmd.arg("--limit").arg(request.limit.to_string());

    cmd.arg("--session-type").arg("file");
    cmd.arg("--cookies-file").arg(&request.session_file);

    let options = &request.options;
    cmd.arg("--theme").arg(&options.theme);
    cmd.arg("--scale").arg(options.scale.to_string());
    cmd.arg("--width").arg(options.width.to_string());
    cmd.arg("--ffmpeg-timeout")
        .arg(options.ffmpeg_timeout_ms.to_string());

    if !options.ffmpeg_options.is_empty() {
        // The renderer takes the extra options as one JSON list; the flag
        // spelling is the renderer's own.
        let encoded = serde_json::to_string(&options.ffmpeg_options)
            .unwrap_or_else(|_| "[]".to_string());
        cmd.arg("--ffmpeg-additonal-option").arg(encoded);
    }

    cmd.env("TMPDIR", &request.scratch_dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // A cancelled request must not leave the renderer running
    cmd.kill_on_drop(true);

    cmd
}

/// [`Renderer`] backed by an external program
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<RenderedPost>, RenderError> {
        tokio::fs::create_dir_all(&request.scratch_dir).await?;

        let mut cmd = build_render_command(&self.program, request);
        debug!(program = %self.program, url = %request.url, "starting renderer");
        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            return match output.status.code() {
                Some(code) => Err(RenderError::Failed { code, stderr }),
                None => Err(RenderError::Terminated),
            };
        }

        let files = list_files(&request.workspace)?;
        Ok(group_posts(&files))
    }

    async fn cleanup_temp(&self, request: &RenderRequest) -> Result<(), RenderError> {
        match tokio::fs::remove_dir_all(&request.scratch_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(
                    scratch = %request.scratch_dir.display(),
                    error = %e,
                    "failed to remove renderer scratch directory"
                );
                Err(e.into())
            }
        }
    }
}

/// Last few lines of renderer stderr, lossily decoded
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
