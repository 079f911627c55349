//! Track byte sources
//!
//! A track is either a local file or an HTTP(S) URL. `SourceFetcher` reads the
//! whole compressed stream into memory; recitation clips are small, and the
//! decoder needs a seekable source anyway.

use crate::error::DecodeError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("tilawa-ap/", env!("CARGO_PKG_VERSION"));

/// Where one track's compressed audio lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    File(PathBuf),
    Url(reqwest::Url),
}

impl TrackSource {
    /// File extension used as the format probe hint
    pub fn extension(&self) -> Option<String> {
        let ext = match self {
            TrackSource::File(path) => path.extension()?.to_str()?.to_string(),
            TrackSource::Url(url) => {
                let last = url.path_segments()?.next_back()?;
                Path::new(last).extension()?.to_str()?.to_string()
            }
        };
        Some(ext.to_ascii_lowercase())
    }
}

impl FromStr for TrackSource {
    type Err = DecodeError;

    /// `http://` and `https://` strings become URLs, anything else a path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            reqwest::Url::parse(s)
                .map(TrackSource::Url)
                .map_err(|e| DecodeError::Fetch(format!("invalid URL '{}': {}", s, e)))
        } else {
            Ok(TrackSource::File(PathBuf::from(s)))
        }
    }
}

impl From<PathBuf> for TrackSource {
    fn from(path: PathBuf) -> Self {
        TrackSource::File(path)
    }
}

impl From<reqwest::Url> for TrackSource {
    fn from(url: reqwest::Url) -> Self {
        TrackSource::Url(url)
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::File(path) => write!(f, "{}", path.display()),
            TrackSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Reads a `TrackSource` into memory
#[derive(Clone)]
pub struct SourceFetcher {
    http_client: reqwest::Client,
}

impl SourceFetcher {
    /// Build a fetcher whose HTTP requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, DecodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DecodeError::Fetch(e.to_string()))?;
        Ok(Self { http_client })
    }

    /// Read all bytes of `source`
    pub async fn fetch(&self, source: &TrackSource) -> Result<Vec<u8>, DecodeError> {
        match source {
            TrackSource::File(path) => {
                tokio::fs::read(path).await.map_err(|e| DecodeError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
            TrackSource::Url(url) => {
                debug!(url = %url, "Fetching track");
                let response = self
                    .http_client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            DecodeError::Fetch(format!("timed out fetching {}", url))
                        } else {
                            DecodeError::Fetch(e.to_string())
                        }
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(DecodeError::Fetch(format!("HTTP {} for {}", status, url)));
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| DecodeError::Fetch(e.to_string()))?;
                debug!(url = %url, bytes = bytes.len(), "Fetched track");
                Ok(bytes.to_vec())
            }
        }
    }
}
