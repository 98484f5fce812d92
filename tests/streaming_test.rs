//! Streaming API client tests
//!
//! Episode index and watch payload parsing against a mock server.

use mockito::{Matcher, Server};
use anistream::api::StreamingClient;
use anistream::error::ProviderError;
use anistream::models::{Quality, SkipRange, TrackOrigin};

// =============================================================================
// Index
// =============================================================================

#[tokio::test]
async fn test_index_parses_mixed_numbers() {
    let mut server = Server::new_async().await;

    let mock_response = r#"{
        "id": "frieren-18542",
        "title": "Frieren: Beyond Journey's End",
        "episodes": [
            {"id": "frieren-18542$episode$107257", "number": 1},
            {"id": "frieren-18542$episode$107258", "number": "2"},
            {"id": "frieren-18542$episode$107259", "number": 3.0},
            {"id": "recap", "number": "special"}
        ]
    }"#;

    let mock = server
        .mock("GET", "/info/frieren-18542")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_response)
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let index = client.index("frieren-18542").await.unwrap();

    mock.assert_async().await;

    assert_eq!(index.title_id, "frieren-18542");
    assert_eq!(index.episodes.len(), 3);
    assert_eq!(index.episodes[1].number, 2);
    assert_eq!(
        index.episodes[2].streaming_episode_id,
        "frieren-18542$episode$107259"
    );
}

/// Test: entries that carry both `id` and `episodeId` still resolve
#[tokio::test]
async fn test_index_entries_with_both_id_spellings() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/info/abc")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"episodes": [
                {"id": "strm-1", "episodeId": "strm-1", "number": 1},
                {"id": "strm-2", "episodeId": "strm-2", "number": 2, "episode": "2"}
            ]}"#,
        )
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let index = client.index("abc").await.unwrap();

    mock.assert_async().await;
    assert_eq!(index.episodes.len(), 2);
    assert_eq!(index.episodes[1].streaming_episode_id, "strm-2");
}

#[tokio::test]
async fn test_index_empty_body() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/info/frieren-18542")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let index = client.index("frieren-18542").await.unwrap();

    mock.assert_async().await;
    assert!(index.is_empty());
}

#[tokio::test]
async fn test_index_unavailable() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/info/frieren-18542")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let result = client.index("frieren-18542").await;

    mock.assert_async().await;
    assert_eq!(result, Err(ProviderError::Status(503)));
}

// =============================================================================
// Watch
// =============================================================================

#[tokio::test]
async fn test_watch_parses_sources_tracks_and_markers() {
    let mut server = Server::new_async().await;

    let mock_response = r#"{
        "headers": {"Referer": "https://megacloud.example/"},
        "sources": [
            {"url": "https://cdn.example/frieren-1/master.m3u8", "quality": "auto", "isM3U8": true},
            {"url": "https://cdn.example/frieren-1/1080.mp4", "quality": "1080p", "isM3U8": false},
            {"url": "https://cdn.example/frieren-1/720/index.m3u8?token=abc", "quality": "720p"},
            {"url": "", "quality": "480p"}
        ],
        "subtitles": [
            {"url": "https://cdn.example/frieren-1/eng.vtt", "lang": "English"},
            {"url": "https://cdn.example/frieren-1/thumbs.vtt", "lang": "thumbnails", "kind": "thumbnails"}
        ],
        "intro": {"start": 31, "end": 120},
        "outro": {"start": 0, "end": 0}
    }"#;

    let mock = server
        .mock("GET", "/watch")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("episodeId".into(), "frieren-18542$episode$107257".into()),
            Matcher::UrlEncoded("type".into(), "sub".into()),
        ]))
        .with_status(200)
        .with_body(mock_response)
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let watch = client.watch("frieren-18542$episode$107257").await.unwrap();

    mock.assert_async().await;

    assert_eq!(watch.sources.len(), 3);
    assert!(watch.sources[0].is_adaptive_playlist);
    assert_eq!(watch.sources[0].quality, Quality::Unknown);
    assert!(!watch.sources[1].is_adaptive_playlist);
    assert_eq!(watch.sources[1].quality, Quality::FHD1080p);
    // Inferred from the manifest path despite the query string
    assert!(watch.sources[2].is_adaptive_playlist);

    assert_eq!(watch.tracks.len(), 1);
    assert_eq!(watch.tracks[0].label, "English");
    assert_eq!(watch.tracks[0].origin, TrackOrigin::Streaming);

    assert_eq!(watch.intro, Some(SkipRange { start: 31, end: 120 }));
    assert_eq!(watch.outro, None);
}

/// Test: a nested `data` envelope is accepted
#[tokio::test]
async fn test_watch_nested_envelope() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/watch")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"data": {"sources": [{"file": "https://cdn.example/a.m3u8", "type": "hls"}], "tracks": []}}"#,
        )
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let watch = client.watch("strm-abc-1").await.unwrap();

    mock.assert_async().await;
    assert_eq!(watch.sources.len(), 1);
    assert!(watch.sources[0].is_adaptive_playlist);
    assert!(watch.tracks.is_empty());
}

#[tokio::test]
async fn test_watch_empty_sources() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/watch")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"sources": [], "subtitles": []}"#)
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let watch = client.watch("strm-abc-2").await.unwrap();

    mock.assert_async().await;
    assert!(watch.sources.is_empty());
}

#[tokio::test]
async fn test_watch_malformed() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/watch")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{\"sources\": [")
        .create_async()
        .await;

    let client = StreamingClient::with_base_url(server.url());
    let result = client.watch("strm-abc-1").await;

    mock.assert_async().await;
    assert!(matches!(result, Err(ProviderError::Malformed(_))));
}
