pub mod clock;
pub mod fetcher;
pub mod manifest;
pub mod monitor;
pub mod segment;
pub mod session;

use thiserror::Error;

// Re-export main types
pub use clock::{Clock, TokioClock};
pub use fetcher::{FetchRequest, Fetcher, FetcherConfig, HttpFetcher};
pub use manifest::{parse_manifest, Manifest, Tag, DEFAULT_TARGET_DURATION};
pub use monitor::{
    FnConsumer, LiveMonitor, MonitorHandle, MonitorReport, MonitorState, SegmentConsumer,
};
pub use segment::HlsSegment;
pub use session::{HlsSession, ManifestSession};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HlsStreamError {
    #[error("FetchFailed: {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("MalformedManifest: {0}")]
    MalformedManifest(String),
    #[error("PersistenceFailed: {path}: {reason}")]
    PersistenceFailed { path: String, reason: String },
    #[error("ConsumerClosed")]
    ConsumerClosed,
}

impl HlsStreamError {
    pub(crate) fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        HlsStreamError::FetchFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        HlsStreamError::MalformedManifest(reason.into())
    }
}
