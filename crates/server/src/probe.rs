//! Encoder capability probing
//!
//! Asks the local ffmpeg which hardware and software encoders actually work
//! by encoding one second of test pattern with each of them.

use crate::config::EncoderConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Synthetic input fed to every probe
pub const PROBE_SOURCE: &str = "testsrc=duration=1:size=427x240:rate=5";

/// How long a single probe may take before it counts as unavailable
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Codec and container pairs probed, grouped by family
pub const ENCODER_CATALOG: &[(&str, &[(&str, &str)])] = &[
    (
        "software",
        &[
            ("libx264", "mp4"),
            ("libx265", "mp4"),
            ("libsvtav1", "webm"),
            ("libvpx-vp9", "webm"),
        ],
    ),
    (
        "nvenc",
        &[
            ("h264_nvenc", "mp4"),
            ("hevc_nvenc", "mp4"),
            ("av1_nvenc", "webm"),
        ],
    ),
    (
        "qsv",
        &[
            ("h264_qsv", "mp4"),
            ("hevc_qsv", "mp4"),
            ("av1_qsv", "webm"),
            ("vp9_qsv", "webm"),
        ],
    ),
    (
        "vaapi",
        &[
            ("h264_vaapi", "mp4"),
            ("hevc_vaapi", "mp4"),
            ("av1_vaapi", "webm"),
            ("vp8_vaapi", "webm"),
            ("vp9_vaapi", "webm"),
        ],
    ),
    (
        "vulkan",
        &[
            ("h264_vulkan", "mp4"),
            ("hevc_vulkan", "mp4"),
            ("av1_vulkan", "webm"),
        ],
    ),
];

/// Result of probing one codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapability {
    pub codec: String,
    pub format: String,
    pub available: bool,
}

/// Family name to probe results, in catalog order within each family
pub type EncoderReport = BTreeMap<String, Vec<EncoderCapability>>;

/// Build the ffmpeg command that tries one encoder
pub fn build_probe_command(program: &str, codec: &str, format: &str) -> Command {
    let mut cmd = Command::new(program);

    cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
    cmd.arg("-f").arg("lavfi");
    cmd.arg("-i").arg(PROBE_SOURCE);
    cmd.arg("-c:v").arg(codec);
    cmd.arg("-f").arg(format);
    cmd.arg("-y").arg("/dev/null");

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    cmd
}

/// Runs encoder probes against one ffmpeg binary
#[derive(Debug, Clone)]
pub struct EncoderProber {
    program: String,
    timeout: Duration,
}

impl EncoderProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn from_config(cfg: &EncoderConfig) -> Self {
        Self::new(cfg.ffmpeg_program.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Probe one codec; any failure means unavailable
    pub async fn probe(&self, codec: &str, format: &str) -> EncoderCapability {
        let mut cmd = build_probe_command(&self.program, codec, format);
        let available = match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(codec, error = %e, "probe could not start");
                false
            }
            Err(_) => {
                debug!(codec, "probe timed out");
                false
            }
        };

        EncoderCapability {
            codec: codec.to_string(),
            format: format.to_string(),
            available,
        }
    }

    /// Probe the whole catalog concurrently
    pub async fn probe_all(&self) -> EncoderReport {
        let families = ENCODER_CATALOG.iter().map(|(family, codecs)| async move {
            let results = join_all(
                codecs
                    .iter()
                    .map(|(codec, format)| self.probe(codec, format)),
            )
            .await;
            (family.to_string(), results)
        });

        let report: EncoderReport = join_all(families).await.into_iter().collect();

        let available: Vec<&str> = report
            .values()
            .flatten()
            .filter(|c| c.available)
            .map(|c| c.codec.as_str())
            .collect();
        info!(available = ?available, "encoder probe finished");

        report
    }
}
