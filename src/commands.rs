//! CLI Command Handlers
//!
//! Implements all CLI commands on top of one `Pipeline`.
//! Each handler takes CLI args and Output, returns ExitCode.

use serde::Serialize;

use crate::api::images::{ImageClient, PosterSize};
use crate::cli::{
    EpisodesCmd, ExitCode, HomeCmd, IndexCmd, InfoCmd, Output, ResolveCmd, SearchCmd, SourcesCmd,
};
use crate::models::{ResolveRequest, StreamingSource, WatchData};
use crate::stream::{sort_sources, Pipeline};

fn print_or_fail<T: Serialize>(output: &Output, data: T, lines: &[String]) -> ExitCode {
    match output.print_lines(data, lines) {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

fn source_line(rank: usize, source: &StreamingSource) -> String {
    format!("{:>2}. {}", rank + 1, source)
}

// =============================================================================
// Resolve Command
// =============================================================================

pub async fn resolve_cmd(cmd: ResolveCmd, pipeline: &Pipeline, output: &Output) -> ExitCode {
    let mut request = ResolveRequest::new(cmd.title_id.trim(), cmd.episode);
    if let Some(id) = cmd.streaming_id {
        request = request.with_streaming_episode_id(id);
    }
    if let Some(id) = cmd.catalog_episode_id {
        request = request.with_catalog_episode_id(id);
    }

    output.info(format!(
        "Resolving {} episode {}...",
        request.title_id, request.episode_number
    ));

    let stream = match pipeline.resolve_episode(request).await {
        Ok(stream) => stream,
        Err(e) => return output.resolve_error("Resolve failed", &e),
    };

    if cmd.url_only {
        // best_source always exists on a resolved stream
        let url = stream.best_source().map(|s| s.url.clone()).unwrap_or_default();
        return print_or_fail(output, &url, &[url.clone()]);
    }

    let mut lines: Vec<String> = stream
        .sources
        .iter()
        .enumerate()
        .map(|(i, s)| source_line(i, s))
        .collect();
    for track in &stream.tracks {
        let marker = if track.is_default { "*" } else { " " };
        lines.push(format!(" {} sub: {} {}", marker, track.label, track.src));
    }
    if let Some(intro) = stream.intro {
        lines.push(format!("   intro: {}s-{}s", intro.start, intro.end));
    }
    if let Some(outro) = stream.outro {
        lines.push(format!("   outro: {}s-{}s", outro.start, outro.end));
    }
    print_or_fail(output, &stream, &lines)
}

// =============================================================================
// Episodes Command
// =============================================================================

pub async fn episodes_cmd(cmd: EpisodesCmd, pipeline: &Pipeline, output: &Output) -> ExitCode {
    output.info(format!("Fetching episodes for: {}", cmd.title_id));

    match pipeline.episodes(&cmd.title_id).await {
        Ok(mut episodes) => {
            if cmd.no_filler {
                episodes.retain(|e| !e.is_filler);
            }
            if episodes.is_empty() {
                output.info("No episodes listed");
            }
            let lines: Vec<String> = episodes.iter().map(|e| e.to_string()).collect();
            print_or_fail(output, &episodes, &lines)
        }
        Err(e) => output.resolve_error("Episode list failed", &e),
    }
}

// =============================================================================
// Index Command
// =============================================================================

pub async fn index_cmd(cmd: IndexCmd, pipeline: &Pipeline, output: &Output) -> ExitCode {
    output.info(format!("Fetching streaming index for: {}", cmd.title_id));

    match pipeline.streaming_index(&cmd.title_id).await {
        Ok(index) => {
            let lines: Vec<String> = index
                .episodes
                .iter()
                .map(|e| format!("E{:02}  {}", e.number, e.streaming_episode_id))
                .collect();
            print_or_fail(output, &index, &lines)
        }
        Err(e) => output.resolve_error("Streaming index failed", &e),
    }
}

// =============================================================================
// Sources Command
// =============================================================================

pub async fn sources_cmd(cmd: SourcesCmd, pipeline: &Pipeline, output: &Output) -> ExitCode {
    output.info(format!("Fetching sources for: {}", cmd.streaming_episode_id));

    match pipeline.watch(&cmd.streaming_episode_id).await {
        Ok(watch) => {
            if watch.sources.is_empty() {
                return output.error("No sources available", ExitCode::NoStreams);
            }
            let watch = WatchData {
                sources: sort_sources(watch.sources),
                ..watch
            };
            let mut lines: Vec<String> = watch
                .sources
                .iter()
                .enumerate()
                .map(|(i, s)| source_line(i, s))
                .collect();
            lines.extend(watch.tracks.iter().map(|t| format!("    sub: {} {}", t.label, t.src)));
            print_or_fail(output, &watch, &lines)
        }
        Err(e) => output.resolve_error("Source fetch failed", &e),
    }
}

// =============================================================================
// Info Command
// =============================================================================

/// `images` is set only when poster optimization is enabled
pub async fn info_cmd(
    cmd: InfoCmd,
    pipeline: &Pipeline,
    images: Option<&ImageClient>,
    output: &Output,
) -> ExitCode {
    output.info(format!("Getting info for: {}", cmd.title_id));

    match pipeline.title_detail(&cmd.title_id).await {
        Ok(mut detail) => {
            if let Some(images) = images.filter(|_| !detail.poster.is_empty()) {
                detail.poster = images.poster(&detail.poster, PosterSize::Medium).await;
            }
            let mut lines = vec![detail.to_string()];
            if !detail.poster.is_empty() {
                lines.push(format!("Poster: {}", detail.poster));
            }
            if !detail.genres.is_empty() {
                lines.push(format!("Genres: {}", detail.genres.join(", ")));
            }
            if !detail.description.is_empty() {
                lines.push(String::new());
                lines.push(detail.description.clone());
            }
            print_or_fail(output, &detail, &lines)
        }
        Err(e) => output.resolve_error("Info failed", &e),
    }
}

// =============================================================================
// Search Command
// =============================================================================

pub async fn search_cmd(cmd: SearchCmd, pipeline: &Pipeline, output: &Output) -> ExitCode {
    if cmd.query.trim().is_empty() {
        return output.error("Search query is empty", ExitCode::InvalidArgs);
    }
    output.info(format!("Searching for: {}", cmd.query));

    match pipeline.search(&cmd.query, cmd.page).await {
        Ok(page) => {
            let mut lines: Vec<String> = page
                .titles
                .iter()
                .map(|t| format!("{:<32} {}", t.id, t.title))
                .collect();
            lines.push(format!(
                "page {}/{}{}",
                page.current_page,
                page.total_pages,
                if page.has_next_page { " (more)" } else { "" }
            ));
            print_or_fail(output, &page, &lines)
        }
        Err(e) => output.resolve_error("Search failed", &e),
    }
}

// =============================================================================
// Home Command
// =============================================================================

pub async fn home_cmd(cmd: HomeCmd, pipeline: &Pipeline, output: &Output) -> ExitCode {
    output.info("Fetching catalog home...");

    match pipeline.home().await {
        Ok(home) => {
            let mut lines = Vec::new();
            for (name, titles) in home.sections() {
                if titles.is_empty() {
                    continue;
                }
                lines.push(format!("{}:", name));
                lines.extend(
                    titles
                        .iter()
                        .take(cmd.limit)
                        .map(|t| format!("  {:<32} {}", t.id, t.title)),
                );
            }
            if !home.genres.is_empty() {
                lines.push(format!("Genres: {}", home.genres.join(", ")));
            }
            print_or_fail(output, &home, &lines)
        }
        Err(e) => output.resolve_error("Home failed", &e),
    }
}
