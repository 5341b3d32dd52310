use serde::{Deserialize, Serialize};

/// A segment handed to a consumer by the live monitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HlsSegment {
    /// Media sequence number of this segment in the whole stream
    pub sequence: u64,
    /// Absolute segment URL
    pub url: String,
    /// Timestamp (ms) when the segment was first seen
    pub observed_at: i64,
}

impl HlsSegment {
    pub fn new(sequence: u64, url: String) -> Self {
        Self {
            sequence,
            url,
            observed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// File name used when the segment is stored locally, e.g. `000042.ts`
    pub fn file_name(&self) -> String {
        let extension = url::Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_string()))
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
            .unwrap_or_else(|| "ts".to_string());
        format!("{:06}.{}", self.sequence, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_keeps_extension() {
        let segment = HlsSegment::new(42, "http://h/live/chunk_42.m4s?token=x".to_string());
        assert_eq!(segment.file_name(), "000042.m4s");

        let segment = HlsSegment::new(7, "http://h/live/segment".to_string());
        assert_eq!(segment.file_name(), "000007.ts");
    }
}
