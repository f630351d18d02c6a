// HLS manifest parsing: turns manifest text into variants or ordered segment references.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{trace, warn};
use url::Url;

use crate::DownloadError;

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
const EXTINF_TAG: &str = "#EXTINF:";
const SEGMENT_SUFFIX: &str = ".ts";
const SEGMENT_SUFFIX_WITH_QUERY: &str = ".ts?";

static BANDWIDTH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BANDWIDTH=(\d+)").unwrap());

/// One rendition advertised by a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub url: Url,
    pub bandwidth: u64,
}

/// A media segment in playlist order.
///
/// `ordinal` is the zero-based appearance index and the only ordering key used
/// downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub ordinal: usize,
    pub url: Url,
    /// Seconds; 0 when the playlist gave no duration.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(Vec<Variant>),
    Media(Vec<SegmentRef>),
}

/// Directory URL of a manifest: scheme, host and the path up to its last `/`.
pub fn base_url(manifest_url: &Url) -> Result<Url, DownloadError> {
    manifest_url.join(".").map_err(|e| {
        DownloadError::playlist(format!("Failed to determine base URL of {manifest_url}: {e}"))
    })
}

/// Resolve a playlist line against the manifest's base URL. Lines that already
/// look like absolute HTTP URLs are used verbatim.
fn resolve_reference(base: &Url, reference: &str) -> Result<Url, url::ParseError> {
    if reference.starts_with("http") {
        Url::parse(reference)
    } else {
        base.join(reference)
    }
}

pub fn is_master_playlist(content: &str) -> bool {
    content.contains(STREAM_INF_TAG)
}

/// Parse manifest text fetched from `manifest_url`.
pub fn parse_playlist(content: &str, manifest_url: &Url) -> Result<Playlist, DownloadError> {
    let base = base_url(manifest_url)?;
    let content = content.trim();

    if is_master_playlist(content) {
        Ok(Playlist::Master(parse_variants(content, &base)))
    } else {
        parse_segments(content, &base).map(Playlist::Media)
    }
}

/// Extract `(url, bandwidth)` pairs from a master playlist.
///
/// The variant URL is the line directly after the stream-info line; no
/// blank or comment lines are skipped to find it.
pub fn parse_variants(content: &str, base: &Url) -> Vec<Variant> {
    let lines: Vec<&str> = content.lines().collect();
    let mut variants = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.contains(STREAM_INF_TAG) {
            continue;
        }

        let Some(bandwidth) = BANDWIDTH_REGEX
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            warn!(line = %line.trim(), "Stream info without usable BANDWIDTH, skipping");
            continue;
        };

        let Some(next_line) = lines.get(i + 1).map(|l| l.trim()) else {
            continue;
        };
        if next_line.is_empty() || next_line.starts_with('#') {
            warn!(line = %next_line, "Stream info is not followed by a variant URL, skipping");
            continue;
        }

        match resolve_reference(base, next_line) {
            Ok(url) => {
                trace!(%url, bandwidth, "Found variant");
                variants.push(Variant { url, bandwidth });
            }
            Err(e) => warn!(line = %next_line, error = %e, "Invalid variant URL, skipping"),
        }
    }

    variants
}

/// Pick the variant with the strictly highest bandwidth; the first one wins ties.
pub fn select_variant(variants: &[Variant]) -> Option<&Variant> {
    variants.iter().fold(None, |best: Option<&Variant>, v| match best {
        Some(b) if v.bandwidth <= b.bandwidth => Some(b),
        _ => Some(v),
    })
}

/// Extract ordered segment references from a media playlist.
pub fn parse_segments(content: &str, base: &Url) -> Result<Vec<SegmentRef>, DownloadError> {
    let mut segments = Vec::new();
    let mut pending_duration: Option<f64> = None;

    for line in content.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(EXTINF_TAG) {
            let duration = parse_extinf_duration(rest);
            if duration.is_none() {
                warn!(line = %line, "Failed to parse duration from line");
            }
            pending_duration = Some(duration.unwrap_or(0.0));
        } else if line.ends_with(SEGMENT_SUFFIX) || line.contains(SEGMENT_SUFFIX_WITH_QUERY) {
            let url = resolve_reference(base, line).map_err(|e| {
                DownloadError::playlist(format!("Invalid segment URL `{line}`: {e}"))
            })?;
            segments.push(SegmentRef {
                ordinal: segments.len(),
                url,
                duration: pending_duration.unwrap_or(0.0),
            });
        }
    }

    Ok(segments)
}

/// `#EXTINF:<duration>,[title]` -> duration in seconds
fn parse_extinf_duration(rest: &str) -> Option<f64> {
    rest.split(',')
        .next()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=500000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=1200000,RESOLUTION=1280x720
high/index.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
seg_000.ts
#EXTINF:9.5,
seg_001.ts?token=abc
https://cdn.example.com/other/seg_002.ts
#EXT-X-ENDLIST
";

    #[test]
    fn base_url_is_manifest_directory() {
        let base = base_url(&url("https://example.com/vod/movie/index.m3u8?sig=1")).unwrap();
        assert_eq!(base.as_str(), "https://example.com/vod/movie/");
    }

    #[test]
    fn detects_master_playlist() {
        let parsed = parse_playlist(MASTER, &url("https://example.com/vod/master.m3u8")).unwrap();
        let Playlist::Master(variants) = parsed else {
            panic!("expected master playlist");
        };
        assert_eq!(
            variants,
            vec![
                Variant {
                    url: url("https://example.com/vod/low/index.m3u8"),
                    bandwidth: 500_000,
                },
                Variant {
                    url: url("https://example.com/vod/high/index.m3u8"),
                    bandwidth: 1_200_000,
                },
            ]
        );
    }

    #[test]
    fn selects_highest_bandwidth() {
        let variants = parse_variants(MASTER, &url("https://example.com/vod/"));
        let best = select_variant(&variants).unwrap();
        assert_eq!(best.bandwidth, 1_200_000);
        assert_eq!(best.url.as_str(), "https://example.com/vod/high/index.m3u8");
    }

    #[test]
    fn bandwidth_ties_keep_first_seen() {
        let content = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000
first.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000
second.m3u8
";
        let variants = parse_variants(content, &url("http://h/p/"));
        assert_eq!(
            select_variant(&variants).unwrap().url.as_str(),
            "http://h/p/first.m3u8"
        );
    }

    #[test]
    fn select_variant_on_empty_list() {
        assert!(select_variant(&[]).is_none());
    }

    #[test]
    fn variant_url_must_be_adjacent() {
        let content = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=900000
# a comment in between
skipped.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=100000
kept.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000";
        let variants = parse_variants(content, &url("http://h/p/"));
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].url.as_str(), "http://h/p/kept.m3u8");
    }

    #[test]
    fn stream_info_without_bandwidth_is_ignored() {
        let content = "#EXTM3U
#EXT-X-STREAM-INF:RESOLUTION=640x360
a.m3u8
";
        assert!(parse_variants(content, &url("http://h/")).is_empty());
        let parsed = parse_playlist(content, &url("http://h/master.m3u8")).unwrap();
        assert_eq!(parsed, Playlist::Master(Vec::new()));
    }

    #[test]
    fn parses_media_segments_in_order() {
        let parsed = parse_playlist(MEDIA, &url("https://example.com/vod/high/index.m3u8")).unwrap();
        let Playlist::Media(segments) = parsed else {
            panic!("expected media playlist");
        };

        assert_eq!(segments.len(), 3);
        let ordinals: Vec<usize> = segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);

        assert_eq!(
            segments[0].url.as_str(),
            "https://example.com/vod/high/seg_000.ts"
        );
        assert_eq!(segments[0].duration, 10.0);
        assert_eq!(
            segments[1].url.as_str(),
            "https://example.com/vod/high/seg_001.ts?token=abc"
        );
        assert_eq!(segments[1].duration, 9.5);
        // No EXTINF before the third segment: the previous duration carries over.
        assert_eq!(
            segments[2].url.as_str(),
            "https://cdn.example.com/other/seg_002.ts"
        );
        assert_eq!(segments[2].duration, 9.5);
    }

    #[test]
    fn relative_segment_resolves_against_manifest_directory() {
        let segments =
            parse_segments("seg_001.ts", &url("http://media.example.org:8080/a/b/")).unwrap();
        assert_eq!(
            segments[0].url.as_str(),
            "http://media.example.org:8080/a/b/seg_001.ts"
        );
    }

    #[test]
    fn missing_duration_defaults_to_zero() {
        let segments = parse_segments("one.ts\ntwo.ts", &url("http://h/")).unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.duration == 0.0));
    }

    #[test]
    fn malformed_duration_becomes_zero() {
        let content = "#EXTINF:abc,\nfirst.ts\n#EXTINF:4.0,\nsecond.ts";
        let segments = parse_segments(content, &url("http://h/")).unwrap();
        assert_eq!(segments[0].duration, 0.0);
        assert_eq!(segments[1].duration, 4.0);
    }

    #[test]
    fn non_segment_lines_are_ignored() {
        let content = "#EXTM3U\n#EXTINF:2.0,\nvideo.m4s\n#EXTINF:2.0,\nvideo.ts\nnotes.txt";
        let segments = parse_segments(content, &url("http://h/")).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].ordinal, 0);
        assert_eq!(segments[0].url.as_str(), "http://h/video.ts");
    }

    #[test]
    fn media_without_segments_parses_to_empty_list() {
        let parsed =
            parse_playlist("#EXTM3U\n#EXT-X-ENDLIST\n", &url("http://h/index.m3u8")).unwrap();
        assert_eq!(parsed, Playlist::Media(Vec::new()));
    }

    #[test]
    fn parsing_is_deterministic() {
        let manifest = url("https://example.com/vod/high/index.m3u8");
        let first = parse_playlist(MEDIA, &manifest).unwrap();
        let second = parse_playlist(MEDIA, &manifest).unwrap();
        assert_eq!(first, second);
    }

    // Property-based tests

    fn media_playlist(entries: &[(String, Option<u32>, bool)]) -> String {
        let mut text = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");
        for (name, duration_ms, with_comment) in entries {
            if *with_comment {
                text.push_str("#EXT-X-DISCONTINUITY\n\n");
            }
            if let Some(ms) = duration_ms {
                text.push_str(&format!("#EXTINF:{}.{:03},\n", ms / 1000, ms % 1000));
            }
            text.push_str(&format!("{name}.ts\n"));
        }
        text.push_str("#EXT-X-ENDLIST\n");
        text
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every segment line yields exactly one reference, numbered by appearance.
        #[test]
        fn prop_segments_keep_playlist_order(
            entries in prop::collection::vec(
                ("seg_[a-z0-9]{0,10}", prop::option::of(0u32..20_000), any::<bool>()),
                0..40,
            ),
        ) {
            let manifest = url("https://example.com/vod/index.m3u8");
            let Playlist::Media(segments) = parse_playlist(&media_playlist(&entries), &manifest).unwrap() else {
                panic!("media playlist parsed as master");
            };

            prop_assert_eq!(segments.len(), entries.len());
            for (i, (segment, (name, _, _))) in segments.iter().zip(&entries).enumerate() {
                prop_assert_eq!(segment.ordinal, i);
                let expected = format!("https://example.com/vod/{name}.ts");
                prop_assert_eq!(segment.url.as_str(), expected.as_str());
            }
        }

        /// The chosen variant carries the maximum bandwidth, earliest on ties.
        #[test]
        fn prop_select_variant_picks_first_maximum(
            bandwidths in prop::collection::vec(0u64..5, 1..20),
        ) {
            let variants: Vec<Variant> = bandwidths
                .iter()
                .enumerate()
                .map(|(i, &bandwidth)| Variant {
                    url: url(&format!("http://h/v{i}.m3u8")),
                    bandwidth,
                })
                .collect();
            let max = bandwidths.iter().copied().max().unwrap();
            let first = bandwidths.iter().position(|&b| b == max).unwrap();

            let chosen = select_variant(&variants).unwrap();
            prop_assert_eq!(chosen, &variants[first]);
        }
    }
}
