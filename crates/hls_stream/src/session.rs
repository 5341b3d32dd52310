use std::path::Path;
use std::sync::Arc;

use m3u8_rs::{parse_playlist_res, Playlist};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::fetcher::{FetchRequest, Fetcher};
use crate::manifest::{parse_manifest, Manifest, DEFAULT_TARGET_DURATION};
use crate::{HlsSegment, HlsStreamError};

/// Loaded state of one stream.
///
/// `segments[i]` has sequence number `media_sequence + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSession {
    pub source_url: String,
    pub segments: Vec<String>,
    pub media_sequence: u64,
    pub target_duration: u64,
    /// Sticky: once an end marker was seen it stays set.
    pub is_terminated: bool,
}

impl ManifestSession {
    fn new(source_url: String, manifest: Manifest) -> Self {
        Self {
            source_url,
            segments: manifest.segments,
            media_sequence: manifest.media_sequence,
            target_duration: manifest.target_duration,
            is_terminated: manifest.end_list,
        }
    }

    /// Sequence number one past the last listed segment.
    pub fn next_sequence(&self) -> u64 {
        self.media_sequence
            .saturating_add(self.segments.len() as u64)
    }

    /// Listed segments whose sequence number is at least `sequence`.
    pub fn segments_from(&self, sequence: u64) -> Vec<HlsSegment> {
        let offset = sequence.saturating_sub(self.media_sequence) as usize;
        self.segments
            .iter()
            .enumerate()
            .skip(offset)
            .map(|(i, url)| {
                HlsSegment::new(self.media_sequence.saturating_add(i as u64), url.clone())
            })
            .collect()
    }

    fn replace(&mut self, source_url: String, manifest: Manifest) {
        let terminated = self.is_terminated || manifest.end_list;
        *self = Self::new(source_url, manifest);
        self.is_terminated = terminated;
    }
}

impl Default for ManifestSession {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            segments: Vec::new(),
            media_sequence: 0,
            target_duration: DEFAULT_TARGET_DURATION,
            is_terminated: false,
        }
    }
}

/// A manifest URL plus the state parsed from it.
///
/// Clones share state; readers should work on [`HlsSession::snapshot`]
/// because a running monitor replaces the state on every poll.
#[derive(Clone)]
pub struct HlsSession {
    fetcher: Arc<dyn Fetcher>,
    state: Arc<RwLock<ManifestSession>>,
}

impl HlsSession {
    /// Fetches and parses the manifest at `url`.
    ///
    /// A master playlist is followed to its highest-bandwidth variant. Nothing
    /// is created when the initial load fails.
    pub async fn open(fetcher: Arc<dyn Fetcher>, url: &str) -> Result<Self, HlsStreamError> {
        let url = Url::parse(url).map_err(|e| HlsStreamError::fetch(url, e))?;
        let content = fetch_text(fetcher.as_ref(), &url).await?;

        let (url, content) = match select_variant(&url, &content)? {
            Some(variant) => {
                log::info!("Master playlist, following variant {}", variant);
                let content = fetch_text(fetcher.as_ref(), &variant).await?;
                (variant, content)
            }
            None => (url, content),
        };

        let manifest = parse_manifest(&content, &url)?;
        log::info!(
            "Opened {} with {} segments (sequence {}, live: {})",
            url,
            manifest.segments.len(),
            manifest.media_sequence,
            !manifest.end_list
        );

        Ok(Self {
            fetcher,
            state: Arc::new(RwLock::new(ManifestSession::new(url.into(), manifest))),
        })
    }

    /// Re-fetches `source_url` and replaces the state in one step.
    ///
    /// On error the previous state is kept untouched.
    pub async fn reload(&self) -> Result<(), HlsStreamError> {
        let source_url = self.state.read().await.source_url.clone();
        let url = Url::parse(&source_url).map_err(|e| HlsStreamError::fetch(&source_url, e))?;
        let content = fetch_text(self.fetcher.as_ref(), &url).await?;
        let manifest = parse_manifest(&content, &url)?;

        self.state.write().await.replace(source_url, manifest);
        Ok(())
    }

    pub async fn snapshot(&self) -> ManifestSession {
        self.state.read().await.clone()
    }

    pub async fn segments(&self) -> Vec<String> {
        self.state.read().await.segments.clone()
    }

    pub async fn source_url(&self) -> String {
        self.state.read().await.source_url.clone()
    }

    pub async fn is_terminated(&self) -> bool {
        self.state.read().await.is_terminated
    }

    /// Downloads one segment to `output_path`, creating parent directories.
    /// Returns the number of bytes written.
    pub async fn download_segment(
        &self,
        url: &str,
        output_path: &Path,
    ) -> Result<u64, HlsStreamError> {
        let bytes = self.fetcher.fetch(FetchRequest::get(url)).await?;

        let persistence_failed = |e: std::io::Error| HlsStreamError::PersistenceFailed {
            path: output_path.display().to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(persistence_failed)?;
        }
        tokio::fs::write(output_path, &bytes)
            .await
            .map_err(persistence_failed)?;

        log::debug!("Downloaded {} ({} bytes)", url, bytes.len());
        Ok(bytes.len() as u64)
    }

    /// Ends the session. The fetcher is released once no clone holds it.
    pub async fn close(self) {
        let state = self.state.read().await;
        log::debug!("Closing session for {}", state.source_url);
    }
}

async fn fetch_text(fetcher: &dyn Fetcher, url: &Url) -> Result<String, HlsStreamError> {
    log::debug!("Fetching manifest: {}", url);
    let bytes = fetcher.fetch(FetchRequest::get(url.as_str())).await?;
    String::from_utf8(bytes).map_err(|_| HlsStreamError::malformed("manifest is not valid UTF-8"))
}

/// Returns the variant to load when `content` is a master playlist.
fn select_variant(base: &Url, content: &str) -> Result<Option<Url>, HlsStreamError> {
    let Ok(Playlist::MasterPlaylist(master)) = parse_playlist_res(content.as_bytes()) else {
        return Ok(None);
    };

    let variant = master
        .variants
        .iter()
        .filter(|variant| !variant.is_i_frame)
        .max_by_key(|variant| variant.bandwidth)
        .ok_or_else(|| HlsStreamError::malformed("master playlist has no variants"))?;

    base.join(&variant.uri)
        .map(Some)
        .map_err(|e| HlsStreamError::malformed(format!("bad variant uri {:?}: {}", variant.uri, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::ScriptedFetcher;

    const LIST: &str = "http://h/a/b/list.m3u8";

    #[tokio::test]
    async fn test_open_parses_segments() {
        let fetcher = ScriptedFetcher::new().respond(
            LIST,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:3\n#EXTINF:4,\nseg3.ts\n#EXTINF:4,\nhttp://other/seg4.ts\n",
        );
        let session = HlsSession::open(Arc::new(fetcher), LIST).await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.source_url, LIST);
        assert_eq!(
            snapshot.segments,
            vec!["http://h/a/b/seg3.ts", "http://other/seg4.ts"]
        );
        assert_eq!(snapshot.media_sequence, 3);
        assert_eq!(snapshot.next_sequence(), 5);
        assert_eq!(snapshot.target_duration, DEFAULT_TARGET_DURATION);
        assert!(!snapshot.is_terminated);
    }

    #[tokio::test]
    async fn test_open_failures() {
        let fetcher = Arc::new(ScriptedFetcher::new().fail(LIST));
        let result = HlsSession::open(fetcher, LIST).await;
        assert!(matches!(result, Err(HlsStreamError::FetchFailed { .. })));

        let fetcher = Arc::new(ScriptedFetcher::new().respond(LIST, "<html></html>"));
        let result = HlsSession::open(fetcher, LIST).await;
        assert!(matches!(result, Err(HlsStreamError::MalformedManifest(_))));

        let fetcher = Arc::new(ScriptedFetcher::new());
        let result = HlsSession::open(fetcher, "not a url").await;
        assert!(matches!(result, Err(HlsStreamError::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_state() {
        let fetcher = ScriptedFetcher::new()
            .respond(LIST, "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:1\ns1.ts\ns2.ts\n")
            .respond(LIST, "garbage")
            .fail(LIST);
        let session = HlsSession::open(Arc::new(fetcher), LIST).await.unwrap();
        let before = session.snapshot().await;

        let result = session.reload().await;
        assert!(matches!(result, Err(HlsStreamError::MalformedManifest(_))));
        assert_eq!(session.snapshot().await, before);

        let result = session.reload().await;
        assert!(matches!(result, Err(HlsStreamError::FetchFailed { .. })));
        assert_eq!(session.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_reload_replaces_state_and_termination_sticks() {
        let fetcher = ScriptedFetcher::new()
            .respond(LIST, "#EXTM3U\n#EXT-X-TARGETDURATION:2\ns0.ts\ns1.ts\n")
            .respond(LIST, "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:1\ns1.ts\ns2.ts\n#EXT-X-ENDLIST\n")
            .respond(LIST, "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:2\ns2.ts\n");
        let session = HlsSession::open(Arc::new(fetcher), LIST).await.unwrap();
        assert_eq!(session.snapshot().await.target_duration, 2);

        session.reload().await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.media_sequence, 1);
        assert_eq!(snapshot.target_duration, DEFAULT_TARGET_DURATION);
        assert!(snapshot.is_terminated);

        session.reload().await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.segments, vec!["http://h/a/b/s2.ts"]);
        assert!(snapshot.is_terminated);
    }

    #[tokio::test]
    async fn test_master_playlist_follows_best_variant() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
            low/index.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1280x720\n\
            high/index.m3u8\n";
        let fetcher = ScriptedFetcher::new()
            .respond(LIST, master)
            .respond("http://h/a/b/high/index.m3u8", "#EXTM3U\nseg0.ts\n");
        let session = HlsSession::open(Arc::new(fetcher), LIST).await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.source_url, "http://h/a/b/high/index.m3u8");
        assert_eq!(snapshot.segments, vec!["http://h/a/b/high/seg0.ts"]);
    }

    #[test]
    fn test_segments_from() {
        let session = ManifestSession {
            source_url: LIST.to_string(),
            segments: vec!["a".into(), "b".into(), "c".into()],
            media_sequence: 10,
            ..ManifestSession::default()
        };
        let urls: Vec<_> = session
            .segments_from(11)
            .into_iter()
            .map(|s| (s.sequence, s.url))
            .collect();
        assert_eq!(urls, vec![(11, "b".to_string()), (12, "c".to_string())]);
        assert_eq!(session.segments_from(4).len(), 3);
        assert!(session.segments_from(13).is_empty());
    }

    #[test]
    fn test_sequence_numbers_at_upper_bound() {
        let session = ManifestSession {
            segments: vec!["last".into()],
            media_sequence: u64::MAX - 1,
            ..ManifestSession::default()
        };
        assert_eq!(session.next_sequence(), u64::MAX);
        let segments = session.segments_from(0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sequence, u64::MAX - 1);
        assert!(session.segments_from(u64::MAX).is_empty());
    }

    #[tokio::test]
    async fn test_open_rejects_overflowing_sequence() {
        let fetcher = ScriptedFetcher::new().respond(
            LIST,
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\n#EXTINF:4,\ns0.ts\n",
        );
        let result = HlsSession::open(Arc::new(fetcher), LIST).await;
        assert!(matches!(result, Err(HlsStreamError::MalformedManifest(_))));
    }

    #[tokio::test]
    async fn test_download_segment_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new()
            .respond(LIST, "#EXTM3U\nseg0.ts\n")
            .respond("http://h/a/b/seg0.ts", "payload");
        let session = HlsSession::open(Arc::new(fetcher), LIST).await.unwrap();

        let output = dir.path().join("nested").join("000000.ts");
        let written = session
            .download_segment("http://h/a/b/seg0.ts", &output)
            .await
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&output).unwrap(), b"payload");

        let result = session
            .download_segment("http://h/a/b/missing.ts", &output)
            .await;
        assert!(matches!(result, Err(HlsStreamError::FetchFailed { .. })));
    }
}
