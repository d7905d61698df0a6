//! Playlist Synthesizer (§4.2): builds the VOD manifest handed back from
//! `/watch.m3u8` once duration has been probed, and parses `/segment.ts`
//! query values back into an identifier + segment index.

use std::fmt::Write as _;

const VERSION: u8 = 3;

/// Builds a VOD `#EXTM3U` manifest for a stream of `duration_secs`, split
/// into `segment_duration`-second entries, the last of which is shortened to
/// whatever remains. Matches the teacher's `M3U8Manifest::from_interval`
/// assembly via `writeln!`/`write!`, generalized to this gateway's
/// `/segment.ts?file=` URI shape instead of a local fmp4 path.
pub fn synthesize(duration_secs: f64, identifier: &str, segment_duration: u32) -> String {
    let mut manifest = String::new();

    write!(manifest, "#EXTM3U\r\n").unwrap();
    write!(manifest, "#EXT-X-VERSION:{VERSION}\r\n").unwrap();
    write!(manifest, "#EXT-X-MEDIA-SEQUENCE:0\r\n").unwrap();
    write!(manifest, "#EXT-X-TARGETDURATION: {segment_duration}\r\n").unwrap();
    write!(manifest, "#EXT-X-PLAYLIST-TYPE:VOD\r\n").unwrap();

    let mut remaining = duration_secs;
    let mut index = 0usize;
    while remaining > 0.0 {
        let length = remaining.min(segment_duration as f64);
        write!(manifest, "#EXTINF:{length:.4}, nodesc\r\n").unwrap();
        write!(manifest, "/segment.ts?file={identifier}{index}.ts\r\n").unwrap();
        remaining -= segment_duration as f64;
        index += 1;
    }

    write!(manifest, "#EXT-X-ENDLIST\r\n").unwrap();
    manifest
}

/// Recovers `(identifier, segment_index)` from a `/segment.ts` query's `file`
/// value, given the identifier is known to be an exact prefix. Returns
/// `None` if the remainder after stripping the identifier and `.ts` suffix
/// isn't a plain decimal index.
pub fn parse_segment_file(identifier: &str, file: &str) -> Option<usize> {
    let rest = file.strip_prefix(identifier)?;
    let digits = rest.strip_suffix(".ts")?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_short_segment() {
        let manifest = synthesize(12.5, "abcd1234", 5);
        assert!(manifest.starts_with("#EXTM3U\r\n"));
        assert!(manifest.contains("#EXT-X-TARGETDURATION: 5\r\n"));
        assert!(manifest.contains("#EXT-X-PLAYLIST-TYPE:VOD\r\n"));
        assert!(manifest.ends_with("#EXT-X-ENDLIST\r\n"));

        assert!(manifest.contains("#EXTINF:5.0000, nodesc\r\n/segment.ts?file=abcd12340.ts\r\n"));
        assert!(manifest.contains("#EXTINF:5.0000, nodesc\r\n/segment.ts?file=abcd12341.ts\r\n"));
        assert!(manifest.contains("#EXTINF:2.5000, nodesc\r\n/segment.ts?file=abcd12342.ts\r\n"));
        assert!(!manifest.contains("abcd12343.ts"));
    }

    #[test]
    fn exact_multiple_keeps_full_length_last_segment() {
        let manifest = synthesize(10.0, "id", 5);
        assert!(manifest.contains("#EXTINF:5.0000, nodesc\r\n/segment.ts?file=id0.ts\r\n"));
        assert!(manifest.contains("#EXTINF:5.0000, nodesc\r\n/segment.ts?file=id1.ts\r\n"));
        assert!(!manifest.contains("id2.ts"));
    }

    #[test]
    fn round_trips_segment_index() {
        let identifier = "stream01";
        assert_eq!(parse_segment_file(identifier, "stream013.ts"), Some(3));
        assert_eq!(parse_segment_file(identifier, "stream010.ts"), Some(0));
        assert_eq!(parse_segment_file(identifier, "other07.ts"), None);
        assert_eq!(parse_segment_file(identifier, "stream01abc.ts"), None);
    }
}
