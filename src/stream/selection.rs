//! Source selection and subtitle merging
//!
//! Pure functions; everything here is deterministic for a given input order.

use chrono::Utc;
use std::cmp::Ordering;

use crate::error::ResolveError;
use crate::models::{EpisodeNumber, ResolvedStream, StreamingSource, SubtitleTrack, WatchData};

/// Adaptive first, then by quality rank; unranked sort last
fn compare_sources(a: &StreamingSource, b: &StreamingSource) -> Ordering {
    b.is_adaptive_playlist
        .cmp(&a.is_adaptive_playlist)
        .then_with(|| match (a.quality.rank(), b.quality.rank()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Best-first ordering; ties keep their input order
pub fn sort_sources(mut sources: Vec<StreamingSource>) -> Vec<StreamingSource> {
    sources.sort_by(compare_sources);
    sources
}

/// The source a player should try first, or `None` for an empty list
pub fn select_best_source(sources: &[StreamingSource]) -> Option<&StreamingSource> {
    // min_by returns the first of equal minima, matching a stable sort
    sources.iter().min_by(|a, b| compare_sources(a, b))
}

/// Streaming tracks first, then catalog tracks whose label is not already present
///
/// A default catalog track matching an existing non-default entry only flips
/// that entry's `is_default`; its `src` is kept.
pub fn merge_tracks(
    streaming_tracks: Vec<SubtitleTrack>,
    catalog_tracks: Vec<SubtitleTrack>,
) -> Vec<SubtitleTrack> {
    let mut keys: Vec<String> = streaming_tracks
        .iter()
        .map(SubtitleTrack::normalized_label)
        .collect();
    let mut merged = streaming_tracks;

    for track in catalog_tracks {
        let key = track.normalized_label();
        match keys.iter().position(|k| *k == key) {
            Some(i) => {
                if track.is_default && !merged[i].is_default {
                    merged[i].is_default = true;
                }
            }
            None => {
                keys.push(key);
                merged.push(track);
            }
        }
    }
    merged
}

/// Label of the first default track in final order
pub fn default_track_label(tracks: &[SubtitleTrack]) -> Option<String> {
    tracks
        .iter()
        .find(|t| t.is_default)
        .map(|t| t.label.clone())
}

/// Assemble the final stream; the only hard failure is an empty source list
pub fn build_resolved_stream(
    title_id: &str,
    episode: EpisodeNumber,
    watch: WatchData,
    catalog_tracks: Vec<SubtitleTrack>,
) -> Result<ResolvedStream, ResolveError> {
    let sources = sort_sources(watch.sources);
    if sources.is_empty() {
        return Err(ResolveError::NoPlayableSource {
            title_id: title_id.to_string(),
            episode,
        });
    }

    let tracks = merge_tracks(watch.tracks, catalog_tracks);
    let default_track_label = default_track_label(&tracks);

    Ok(ResolvedStream {
        sources,
        tracks,
        default_track_label,
        intro: watch.intro,
        outro: watch.outro,
        resolved_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Quality, TrackOrigin};

    fn source(url: &str, quality: Quality, adaptive: bool) -> StreamingSource {
        StreamingSource {
            url: url.into(),
            quality,
            is_adaptive_playlist: adaptive,
        }
    }

    fn track(label: &str, src: &str, default: bool, origin: TrackOrigin) -> SubtitleTrack {
        SubtitleTrack {
            label: label.into(),
            src: src.into(),
            is_default: default,
            origin,
        }
    }

    #[test]
    fn test_adaptive_beats_higher_quality() {
        let sources = vec![
            source("a", Quality::FHD1080p, false),
            source("b", Quality::HD720p, true),
        ];
        assert_eq!(select_best_source(&sources).unwrap().url, "b");
    }

    #[test]
    fn test_unknown_sorts_last_stably() {
        let sources = vec![
            source("u1", Quality::Unknown, true),
            source("q480", Quality::SD480p, true),
            source("u2", Quality::Unknown, true),
            source("q1080", Quality::FHD1080p, true),
        ];
        let urls: Vec<_> = sort_sources(sources).into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["q1080", "q480", "u1", "u2"]);
    }

    #[test]
    fn test_select_best_empty() {
        assert!(select_best_source(&[]).is_none());
    }

    #[test]
    fn test_select_best_ties_keep_first() {
        let sources = vec![
            source("first", Quality::HD720p, false),
            source("second", Quality::HD720p, false),
        ];
        assert_eq!(select_best_source(&sources).unwrap().url, "first");
    }

    #[test]
    fn test_merge_prefers_streaming_and_flips_default() {
        let merged = merge_tracks(
            vec![track("English", "s-en", false, TrackOrigin::Streaming)],
            vec![
                track("  english ", "c-en", true, TrackOrigin::Catalog),
                track("Spanish", "c-es", false, TrackOrigin::Catalog),
            ],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].src, "s-en");
        assert_eq!(merged[0].label, "English");
        assert!(merged[0].is_default);
        assert_eq!(merged[1].label, "Spanish");
        assert_eq!(default_track_label(&merged), Some("English".to_string()));
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge_tracks(Vec::new(), Vec::new());
        assert!(merged.is_empty());
        assert_eq!(default_track_label(&merged), None);
    }

    #[test]
    fn test_build_requires_sources() {
        let episode = EpisodeNumber::new(2).unwrap();
        let err = build_resolved_stream("abc", episode, WatchData::default(), Vec::new()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NoPlayableSource {
                title_id: "abc".into(),
                episode
            }
        );
    }
}
