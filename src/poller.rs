//! SegmentPoller (§4.4): the ~1 Hz loop behind every `/segment.ts` request.
//! Reshaped from the teacher's event-driven `run_hls_handler`
//! `tokio::select!` in `dog4ik-media-server/src/watch/hls_stream/job.rs`
//! into the spec's explicit polling algorithm: the teacher reacts to
//! filesystem close-write events, we poll and gap-check instead, since that
//! behavior is itself a testable property (§8). The teacher's
//! `JOB_RESET_SEGMENT_THRESHOLD` constant is the direct ancestor of
//! `hls_segment_max_gap`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tokio::time::sleep;

use crate::app_error::AppError;
use crate::config::Config;
use crate::playlist;
use crate::stream::registry::StreamsRegistry;
use crate::transcoder;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRequest {
    pub identifier: String,
    pub segment_index: usize,
}

impl SegmentRequest {
    /// Identifiers are a fixed 8-character prefix (§3, GLOSSARY); parses
    /// `<identifier><index>.ts` into its two parts, reusing the same
    /// `playlist::parse_segment_file` the Synthesizer's URIs round-trip
    /// through, rather than re-deriving the suffix digits by hand.
    pub fn parse(filename: &str) -> Option<Self> {
        if filename.len() <= 8 {
            return None;
        }
        let (identifier, _) = filename.split_at(8);
        let segment_index = playlist::parse_segment_file(identifier, filename)?;
        Some(Self { identifier: identifier.to_string(), segment_index })
    }
}

/// Waits for (and if needed, triggers production of) the requested segment.
/// Implements §4.4's loop: serve immediately if the file already exists,
/// otherwise decide whether the current transcoder is still on track to
/// produce it or has fallen too far behind (a seek), spawning a replacement
/// when it has.
pub async fn poll_for_segment(
    config: &'static Config,
    registry: StreamsRegistry,
    request: SegmentRequest,
) -> Result<PathBuf, AppError> {
    let segment_path = config
        .transcode_dir
        .join(format!("{}{}.ts", request.identifier, request.segment_index));

    let Some(stream) = registry.get(&request.identifier) else {
        // Unreachable in practice: /segment.ts only follows an admitted
        // /watch.m3u8, which always creates the Stream first. Treated as a
        // hard error rather than the documented dereference bug (§9).
        return Err(AppError::not_found(format!("unknown stream {}", request.identifier)));
    };

    let max_attempts = (2 * config.hls_segment_duration as usize).max(10);
    let mut restart_in_flight = false;
    let mut already_restarted = false;

    for _ in 0..max_attempts {
        if tokio::fs::try_exists(&segment_path).await.unwrap_or(false) {
            return Ok(segment_path);
        }

        stream.touch().await;

        let should_restart = if restart_in_flight || already_restarted {
            false
        } else if !stream.has_live_transcoder().await {
            true
        } else {
            let produced = current_transcoding_index(&config.transcode_dir, &request.identifier).await;
            request.segment_index.saturating_sub(produced) >= config.hls_segment_max_gap
        };

        if should_restart {
            restart_in_flight = true;
            already_restarted = true;

            if stream.has_live_transcoder().await {
                stream.kill_transcoder().await;
            }
            stream.set_seek_start_segment(request.segment_index).await;

            let result = transcoder::spawn(
                config,
                &stream.identifier,
                &stream.source_url,
                request.segment_index,
            )
            .await?;

            stream.adopt_child(result.child, request.segment_index, config).await;
            stream.start_self_destructor(config).await;
            restart_in_flight = false;

            sleep(POLL_INTERVAL).await;
            continue;
        }

        sleep(POLL_INTERVAL).await;
    }

    Err(AppError::poll_timeout(format!(
        "segment {} never appeared for stream {}",
        request.segment_index, request.identifier
    )))
}

/// Returns the highest segment index the current transcoder has produced,
/// via the manifest-regex scan first (primary), falling back to a directory
/// listing if the manifest is missing or unparsable (§4.4).
async fn current_transcoding_index(transcode_dir: &Path, identifier: &str) -> usize {
    if let Some(index) = index_from_manifest(transcode_dir, identifier).await {
        return index;
    }
    index_from_filesystem(transcode_dir, identifier)
        .await
        .unwrap_or(0)
}

async fn index_from_manifest(transcode_dir: &Path, identifier: &str) -> Option<usize> {
    let manifest_path = transcode_dir.join(format!("{identifier}.m3u8"));
    let contents = tokio::fs::read_to_string(&manifest_path).await.ok()?;

    let pattern = format!(r"{}(\d+)\.ts", regex::escape(identifier));
    let re = Regex::new(&pattern).ok()?;

    match re.captures_iter(&contents).last() {
        Some(caps) => caps.get(1)?.as_str().parse().ok(),
        None => Some(0),
    }
}

async fn index_from_filesystem(transcode_dir: &Path, identifier: &str) -> Option<usize> {
    let mut dir = tokio::fs::read_dir(transcode_dir).await.ok()?;
    let mut latest: Option<String> = None;

    while let Ok(Some(entry)) = dir.next_entry().await {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name.starts_with(identifier) && name.ends_with(".ts") {
            let is_newer = match &latest {
                Some(current) => name.as_str() > current.as_str(),
                None => true,
            };
            if is_newer {
                latest = Some(name);
            }
        }
    }

    let name = latest?;
    let digits = name.strip_prefix(identifier)?.strip_suffix(".ts")?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identifier_and_index() {
        let request = SegmentRequest::parse("abcd12345.ts").unwrap();
        assert_eq!(request.identifier, "abcd1234");
        assert_eq!(request.segment_index, 5);
    }

    #[test]
    fn rejects_too_short_filenames() {
        assert!(SegmentRequest::parse("short.ts").is_none());
    }

    #[test]
    fn rejects_non_numeric_index() {
        assert!(SegmentRequest::parse("abcd1234oops.ts").is_none());
    }

    async fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rtsp-hls-gateway-poller-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn manifest_scan_finds_highest_index() {
        let dir = tempdir().await;
        let manifest = "#EXTM3U\nabcd12340.ts\nabcd12341.ts\nabcd12342.ts\n#EXT-X-ENDLIST\n";
        tokio::fs::write(dir.join("abcd1234.m3u8"), manifest).await.unwrap();

        let index = current_transcoding_index(&dir, "abcd1234").await;
        assert_eq!(index, 2);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn falls_back_to_directory_listing_without_manifest() {
        let dir = tempdir().await;
        tokio::fs::write(dir.join("abcd12340.ts"), b"").await.unwrap();
        tokio::fs::write(dir.join("abcd12341.ts"), b"").await.unwrap();

        let index = current_transcoding_index(&dir, "abcd1234").await;
        assert_eq!(index, 1);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn reports_zero_when_nothing_produced_yet() {
        let dir = tempdir().await;
        let index = current_transcoding_index(&dir, "abcd1234").await;
        assert_eq!(index, 0);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
