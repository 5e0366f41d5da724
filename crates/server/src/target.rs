//! Snapshot targets
//!
//! Validates what callers ask for and turns it into the URL the renderer
//! visits. Nothing here touches the gate or the filesystem.

use std::fmt;
use thiserror::Error;
use url::Url;

/// Status page template for `/twitter/:id`
pub const TWITTER_STATUS_TEMPLATE: &str = "https://x.com/elonmusk/status/{id}";

/// Artwork page template for `/pixiv/:id`
pub const PIXIV_ARTWORK_TEMPLATE: &str = "https://www.pixiv.net/artworks/{id}";

/// Longest accepted platform post id
const MAX_POST_ID_LEN: usize = 32;

/// Rejected snapshot input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("missing url")]
    MissingUrl,

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid post id '{0}': expected 1-32 ASCII digits")]
    InvalidPostId(String),
}

/// What a snapshot job should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An arbitrary post URL
    Url(Url),
    /// A post on x.com / twitter
    Twitter(String),
    /// An artwork on pixiv
    Pixiv(String),
}

impl Target {
    /// Accept an absolute http(s) URL
    pub fn url(raw: &str) -> Result<Self, TargetError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TargetError::MissingUrl);
        }

        let url = Url::parse(trimmed).map_err(|e| TargetError::InvalidUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(Target::Url(url)),
            other => Err(TargetError::InvalidUrl {
                url: trimmed.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }

    pub fn twitter(id: &str) -> Result<Self, TargetError> {
        validate_post_id(id).map(|id| Target::Twitter(id.to_string()))
    }

    pub fn pixiv(id: &str) -> Result<Self, TargetError> {
        validate_post_id(id).map(|id| Target::Pixiv(id.to_string()))
    }

    /// The page the renderer should visit
    pub fn resolve(&self) -> String {
        match self {
            Target::Url(url) => url.to_string(),
            Target::Twitter(id) => TWITTER_STATUS_TEMPLATE.replace("{id}", id),
            Target::Pixiv(id) => PIXIV_ARTWORK_TEMPLATE.replace("{id}", id),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resolve())
    }
}

fn validate_post_id(id: &str) -> Result<&str, TargetError> {
    if id.is_empty() || id.len() > MAX_POST_ID_LEN || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TargetError::InvalidPostId(id.to_string()));
    }
    Ok(id)
}
