//! Artifact delivery
//!
//! Streams a finished snapshot to the client. The response body owns the
//! job's [`Workspace`](crate::workspace::Workspace): the directory is removed
//! right after the last byte is read, when a read fails, or when the client
//! goes away and the body is dropped, whichever happens first, and only once.

use crate::job::Snapshot;
use crate::workspace::Workspace;
use async_stream::try_stream;
use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read size for streamed artifacts
const CHUNK_SIZE: usize = 64 * 1024;

/// Media kind of an artifact, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// `.png` is an image and `.mp4` a video; anything else is unknown
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(MediaKind::Image),
            "mp4" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Image => "image/png",
            MediaKind::Video => "video/mp4",
        }
    }
}

/// Build a streaming 200 response for a snapshot
///
/// If the artifact cannot be opened the snapshot's workspace is dropped, and
/// with it destroyed, before the error is returned.
pub async fn artifact_response(snapshot: Snapshot) -> io::Result<Response> {
    let Snapshot {
        workspace,
        artifact,
        kind,
    } = snapshot;

    let file = File::open(&artifact).await?;
    let len = file.metadata().await?.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, kind.content_type())
        .header(CONTENT_LENGTH, len)
        .body(Body::from_stream(artifact_stream(file, workspace)))
        .map_err(io::Error::other)
}

/// Chunks of `reader`, then the workspace is destroyed
///
/// A read error ends the stream; the workspace goes with the generator.
fn artifact_stream<R>(mut reader: R, workspace: Workspace) -> impl Stream<Item = io::Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    try_stream! {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
        drop(reader);
        workspace.destroy();
    }
}
