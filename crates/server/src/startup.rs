//! Startup checks
//!
//! Preflight checks run before the server binds:
//! - The renderer CLI must be installed (fatal)
//! - ffmpeg should be installed (warning only; encoder probes report it)
//! - The session file should exist (warning only)

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("renderer not available: {0}")]
    RendererUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check the renderer by running `<program> --version`
pub fn check_renderer_available(program: &str) -> Result<(), StartupError> {
    let output = Command::new(program)
        .arg("--version")
        .output()
        .map_err(|e| {
            StartupError::RendererUnavailable(format!(
                "{} --version failed; is it installed and in PATH? Error: {}",
                program, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::RendererUnavailable(format!(
            "{} --version exited with {}",
            program, output.status
        )));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!(program, version = %version.trim(), "renderer available");
    Ok(())
}

/// Parse the ffmpeg version banner into its version token
///
/// Handles plain releases (`ffmpeg version 7.1 ...`), `n`-prefixed
/// builds (`ffmpeg version n8.0-...`) and git snapshots (`N-113...`).
pub fn parse_ffmpeg_version(version_output: &str) -> Option<String> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version = match version.strip_prefix('n') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest.to_string(),
        _ => version,
    };

    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

/// Check ffmpeg by running `<program> -version`
///
/// Returns the detected version. A missing ffmpeg only disables hardware
/// probing, so failure is logged and reported as `None`.
pub fn check_ffmpeg_available(program: &str) -> Option<String> {
    let output = match Command::new(program).arg("-version").output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!(
                program,
                status = %output.status,
                "ffmpeg -version failed; encoder probes will report nothing available"
            );
            return None;
        }
        Err(e) => {
            warn!(
                program,
                error = %e,
                "ffmpeg not found; encoder probes will report nothing available"
            );
            return None;
        }
    };

    let version = parse_ffmpeg_version(&String::from_utf8_lossy(&output.stdout));
    info!(program, version = version.as_deref().unwrap_or("unknown"), "ffmpeg available");
    version
}

/// Warn when the session file is missing; the renderer may still work for
/// public posts.
pub fn check_session_file(path: &Path) -> bool {
    if path.is_file() {
        true
    } else {
        warn!(
            path = %path.display(),
            "session file not found; posts that need login will fail"
        );
        false
    }
}

/// Run all startup checks
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_renderer_available(&cfg.render.program)?;
    check_ffmpeg_available(&cfg.encoder.ffmpeg_program);
    check_session_file(&cfg.cookie_file());
    Ok(())
}
