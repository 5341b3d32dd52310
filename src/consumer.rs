use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hls_stream::{HlsSegment, HlsSession, HlsStreamError, SegmentConsumer};
use playlist_store::{PlaylistItem, PlaylistStore};
use serde_json::json;

/// Prints each segment on stdout.
pub struct Printer;

#[async_trait]
impl SegmentConsumer for Printer {
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError> {
        println!("{:>8}  {}", segment.sequence, segment.url);
        Ok(())
    }
}

/// Stores each segment as `<dir>/<sequence>.<ext>`.
pub struct SegmentDownloader {
    session: HlsSession,
    dir: PathBuf,
}

impl SegmentDownloader {
    pub fn new(session: HlsSession, dir: PathBuf) -> Self {
        Self { session, dir }
    }
}

#[async_trait]
impl SegmentConsumer for SegmentDownloader {
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError> {
        let path = self.dir.join(segment.file_name());
        let size = self.session.download_segment(&segment.url, &path).await?;
        log::info!(
            "Saved segment {} to {} ({} bytes)",
            segment.sequence,
            path.display(),
            size
        );
        Ok(())
    }
}

/// Appends each segment to a playlist collection.
///
/// The store writes files synchronously, so every append runs on the
/// blocking pool.
pub struct PlaylistQueue {
    store: Arc<Mutex<PlaylistStore>>,
    collection: String,
    path: String,
    stream_url: String,
    target_duration: u64,
}

impl PlaylistQueue {
    pub fn new(
        store: PlaylistStore,
        collection: String,
        stream_url: String,
        target_duration: u64,
    ) -> Self {
        let path = store.path_for(&collection).display().to_string();
        Self {
            store: Arc::new(Mutex::new(store)),
            collection,
            path,
            stream_url,
            target_duration,
        }
    }

    fn item_for(&self, segment: &HlsSegment) -> PlaylistItem {
        PlaylistItem::new(format!("Segment {}", segment.sequence), segment.url.clone())
            .with_duration(self.target_duration as f64)
            .with_metadata("source", json!("hls"))
            .with_metadata("stream", json!(self.stream_url))
            .with_metadata("sequence", json!(segment.sequence))
            .with_metadata("observed_at", json!(segment.observed_at))
    }
}

#[async_trait]
impl SegmentConsumer for PlaylistQueue {
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError> {
        let item = self.item_for(&segment);
        let store = Arc::clone(&self.store);
        let collection = self.collection.clone();
        let added = tokio::task::spawn_blocking(move || -> Result<usize, String> {
            let mut store = store
                .lock()
                .map_err(|_| "playlist store lock poisoned".to_string())?;
            store
                .add_item(Some(collection.as_str()), item)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|added| added);

        added
            .map(|_| ())
            .map_err(|reason| HlsStreamError::PersistenceFailed {
                path: self.path.clone(),
                reason,
            })
    }
}

/// Hands every segment to each inner consumer in order. An inner failure is
/// logged so the remaining consumers still see the segment; a closed
/// consumer closes the whole fan-out.
#[derive(Default)]
pub struct Fanout {
    consumers: Vec<Box<dyn SegmentConsumer>>,
}

impl Fanout {
    pub fn push(mut self, consumer: impl SegmentConsumer + 'static) -> Self {
        self.consumers.push(Box::new(consumer));
        self
    }
}

#[async_trait]
impl SegmentConsumer for Fanout {
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError> {
        for consumer in self.consumers.iter_mut() {
            match consumer.on_segment(segment.clone()).await {
                Ok(()) => {}
                Err(HlsStreamError::ConsumerClosed) => return Err(HlsStreamError::ConsumerClosed),
                Err(e) => log::warn!("Segment {} not handled: {}", segment.sequence, e),
            }
        }
        Ok(())
    }
}
