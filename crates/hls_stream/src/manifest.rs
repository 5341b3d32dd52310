//! Line-oriented M3U8 media playlist parsing.
//!
//! The parser is tolerant: any directive it does not recognize is skipped,
//! and every other non-empty line is a segment reference. Only the header is
//! mandatory.

use url::Url;

use crate::HlsStreamError;

pub const HEADER: &str = "#EXTM3U";
/// Used when the manifest does not advertise `#EXT-X-TARGETDURATION`.
pub const DEFAULT_TARGET_DURATION: u64 = 10;

const MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE";
const TARGET_DURATION: &str = "#EXT-X-TARGETDURATION";
const END_LIST: &str = "#EXT-X-ENDLIST";
const INF: &str = "#EXTINF";

/// The directives that affect session state.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    MediaSequence(u64),
    TargetDuration(u64),
    EndList,
    /// Per-segment `#EXTINF`; its duration is not surfaced yet.
    Inf,
    Other,
}

impl Tag {
    /// Classifies a line starting with `#`.
    pub fn parse(line: &str) -> Result<Tag, HlsStreamError> {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, Some(value.trim())),
            None => (line, None),
        };

        match name {
            MEDIA_SEQUENCE => {
                let value = value.unwrap_or_default();
                value.parse::<u64>().map(Tag::MediaSequence).map_err(|_| {
                    HlsStreamError::malformed(format!("invalid media sequence: {value:?}"))
                })
            }
            TARGET_DURATION => parse_target_duration(value.unwrap_or_default()),
            END_LIST => Ok(Tag::EndList),
            INF => Ok(Tag::Inf),
            _ => Ok(Tag::Other),
        }
    }
}

fn parse_target_duration(value: &str) -> Result<Tag, HlsStreamError> {
    let seconds = match value.parse::<u64>() {
        Ok(seconds) => seconds,
        // Some servers write a decimal here
        Err(_) => match value.parse::<f64>() {
            Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => seconds.ceil() as u64,
            _ => {
                return Err(HlsStreamError::malformed(format!(
                    "invalid target duration: {value:?}"
                )))
            }
        },
    };
    Ok(Tag::TargetDuration(seconds.max(1)))
}

/// A parsed media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Absolute segment URLs in document order.
    pub segments: Vec<String>,
    pub media_sequence: u64,
    pub target_duration: u64,
    pub end_list: bool,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            segments: Vec::new(),
            media_sequence: 0,
            target_duration: DEFAULT_TARGET_DURATION,
            end_list: false,
        }
    }
}

/// Parses `content`, resolving relative segment references against `base`,
/// the URL the manifest was retrieved from.
pub fn parse_manifest(content: &str, base: &Url) -> Result<Manifest, HlsStreamError> {
    if !content.starts_with(HEADER) {
        return Err(HlsStreamError::malformed(format!("missing {HEADER} header")));
    }

    let mut manifest = Manifest::default();
    for line in content.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            match Tag::parse(line)? {
                Tag::MediaSequence(sequence) => manifest.media_sequence = sequence,
                Tag::TargetDuration(seconds) => manifest.target_duration = seconds,
                Tag::EndList => manifest.end_list = true,
                Tag::Inf | Tag::Other => {}
            }
            continue;
        }

        manifest.segments.push(resolve_segment_url(base, line)?);
    }

    // Every listed segment needs a representable sequence number
    if manifest
        .media_sequence
        .checked_add(manifest.segments.len() as u64)
        .is_none()
    {
        return Err(HlsStreamError::malformed(format!(
            "media sequence {} overflows with {} segments",
            manifest.media_sequence,
            manifest.segments.len()
        )));
    }

    log::debug!(
        "Parsed {} segments from manifest (sequence {}, target duration {}s, ended: {})",
        manifest.segments.len(),
        manifest.media_sequence,
        manifest.target_duration,
        manifest.end_list
    );
    Ok(manifest)
}

/// Absolute references are kept verbatim; relative ones are joined to `base`.
pub fn resolve_segment_url(base: &Url, reference: &str) -> Result<String, HlsStreamError> {
    if Url::parse(reference).is_ok() {
        return Ok(reference.to_string());
    }
    base.join(reference)
        .map(String::from)
        .map_err(|e| HlsStreamError::malformed(format!("bad segment reference {reference:?}: {e}")))
}
