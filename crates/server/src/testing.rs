//! Test doubles shared by the unit tests

use crate::render::{group_posts, RenderError, RenderRequest, RenderedPost, Renderer};
use crate::workspace::list_files;
use async_trait::async_trait;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What the fake renderer leaves in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutput {
    /// One `<id>.png`
    Image,
    /// One `<id>.mp4`
    Video,
    /// Nothing at all
    Nothing,
    /// A `.png` and an `.mp4` for the same post
    TwoMedia,
    /// One file for each of two posts
    TwoPosts,
    /// One `<id>.webm`
    Webm,
    /// Exit as if the platform was unreachable
    Fail,
}

/// Renderer that writes synthetic artifacts and records how it was driven
pub struct FakeRenderer {
    output: FakeOutput,
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
    cleanups: AtomicUsize,
    spans: Mutex<Vec<(Instant, Instant)>>,
}

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake image body";
pub const FAKE_MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42fake video body";

impl FakeRenderer {
    pub fn new(output: FakeOutput) -> Self {
        Self {
            output,
            delay: Duration::ZERO,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
            spans: Mutex::new(Vec::new()),
        }
    }

    /// Spend `delay` inside every render call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of overlapping render calls
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    /// (start, end) of every finished render call, in completion order
    pub fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().unwrap().clone()
    }

    fn post_id(url: &str) -> String {
        url.rsplit('/').next().unwrap_or("post").to_string()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<RenderedPost>, RenderError> {
        let start = Instant::now();
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        fs::create_dir_all(&request.scratch_dir)?;
        fs::write(request.scratch_dir.join("frame-0001.png"), b"intermediate")?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let id = Self::post_id(&request.url);
        let ws = &request.workspace;
        let result = match self.output {
            FakeOutput::Image => fs::write(ws.join(format!("{}.png", id)), FAKE_PNG),
            FakeOutput::Video => fs::write(ws.join(format!("{}.mp4", id)), FAKE_MP4),
            FakeOutput::Nothing => Ok(()),
            FakeOutput::TwoMedia => fs::write(ws.join(format!("{}.png", id)), FAKE_PNG)
                .and_then(|_| fs::write(ws.join(format!("{}.mp4", id)), FAKE_MP4)),
            FakeOutput::TwoPosts => fs::write(ws.join("1.png"), FAKE_PNG)
                .and_then(|_| fs::write(ws.join("2.png"), FAKE_PNG)),
            FakeOutput::Webm => fs::write(ws.join(format!("{}.webm", id)), b"webm"),
            FakeOutput::Fail => Ok(()),
        };

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().unwrap().push((start, Instant::now()));

        result?;
        if self.output == FakeOutput::Fail {
            return Err(RenderError::Failed {
                code: 1,
                stderr: "getaddrinfo ENOTFOUND unreachable.invalid".to_string(),
            });
        }

        Ok(group_posts(&list_files(ws)?))
    }

    async fn cleanup_temp(&self, request: &RenderRequest) -> Result<(), RenderError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        match fs::remove_dir_all(&request.scratch_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
