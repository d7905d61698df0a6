//! HTTP surface (§6): `/watch.m3u8` and `/segment.ts`. Grounded on
//! `dog4ik-media-server/src/server/mod.rs`'s `Query<T>` extractor wrapper
//! (mapped rejections go through `AppError`) and
//! `src/server/public_api.rs`'s `ReaderStream` + `Body::from_stream` file
//! streaming, with `main.rs`'s permissive `CorsLayer` applied at the router
//! level instead of per-handler.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};

use crate::app_error::AppError;
use crate::config::Config;
use crate::poller::{self, SegmentRequest};
use crate::stream::registry::StreamsRegistry;
use crate::transcoder;

#[derive(Clone)]
pub struct AppState {
    pub config: &'static Config,
    pub registry: StreamsRegistry,
}

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SegmentQuery {
    pub file: String,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/watch.m3u8", get(watch))
        .route("/segment.ts", get(segment))
        .layer(cors)
        .with_state(state)
}

/// Admits a new stream, probes + spawns its transcoder, and returns the
/// synthesized VOD manifest (§4.1, §6).
async fn watch(
    State(state): State<AppState>,
    query: Result<Query<WatchQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) =
        query.map_err(|_| AppError::bad_request("missing or invalid `url` query parameter"))?;

    let identifier = loop {
        let candidate = generate_identifier();
        if !state.registry.contains(&candidate) {
            break candidate;
        }
    };

    let Some(stream) = state.registry.try_insert(identifier.clone(), query.url.clone()) else {
        return Err(AppError::admission("maximum concurrent streams reached"));
    };

    match transcoder::spawn(state.config, &identifier, &query.url, 0).await {
        Ok(result) => {
            stream.adopt_child(result.child, 0, state.config).await;
            stream.start_self_destructor(state.config).await;
            Ok((
                [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                result.manifest,
            )
                .into_response())
        }
        Err(err) => {
            stream.kill(true, &state.config.transcode_dir).await;
            Err(err)
        }
    }
}

/// Streams a single MPEG-TS segment, waiting for the transcoder to produce
/// it (§4.4) and restarting it on a detected seek.
async fn segment(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Response, AppError> {
    let request = SegmentRequest::parse(&query.file)
        .ok_or_else(|| AppError::bad_request(format!("invalid segment filename: {}", query.file)))?;

    let path = poller::poll_for_segment(state.config, state.registry.clone(), request).await?;

    let file = tokio::fs::File::open(&path).await?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, "video/mp2t")], body).into_response())
}

/// A filename-safe hex identifier, exactly the 8 characters every other
/// module (`SegmentRequest::parse`, the manifest/segment filename layout in
/// §3) assumes as the fixed prefix length.
fn generate_identifier() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_filename_safe_and_eight_characters() {
        let id = generate_identifier();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
