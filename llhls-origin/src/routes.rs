use std::convert::Infallible;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::StreamExt;
use hls::BlockingWait;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/playlist.m3u8", get(playlist))
        .route("/segment", get(segment))
        .route("/part", get(part))
        .route("/init", get(init))
        .route("/master.m3u8", get(master))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PlaylistQuery {
    #[serde(rename = "_HLS_msn")]
    msn: Option<u64>,
    #[serde(rename = "_HLS_part")]
    part: Option<usize>,
    #[serde(rename = "_HLS_skip")]
    skip: Option<String>,
}

/// Blocking playlist reload per §4.8: with no `_HLS_msn`, render immediately;
/// with one, suspend until that segment/part completes (or return 400 if
/// it's already outside the window).
async fn playlist(
    State(state): State<AppState>,
    Query(query): Query<PlaylistQuery>,
) -> ServerResult<Response> {
    let skip = query.skip.as_deref() == Some("YES") || query.skip.as_deref() == Some("v2");
    let manifest = match query.msn {
        None => {
            let mut store = state.pipeline.store.lock().await;
            let waiter = store.plain();
            drop(store);
            if let Some(rx) = waiter {
                let _ = rx.await;
            }
            let mut store = state.pipeline.store.lock().await;
            store.render_manifest(skip)
        }
        Some(msn) => {
            let wait = {
                let mut store = state.pipeline.store.lock().await;
                store.begin_blocking(msn, query.part, skip)?
            };
            match wait {
                BlockingWait::Ready(manifest) => manifest,
                BlockingWait::Pending(rx) => {
                    let _ = rx.await;
                    let mut store = state.pipeline.store.lock().await;
                    store.render_manifest(skip)
                }
            }
        }
    };

    Ok(([(CONTENT_TYPE, "application/vnd.apple.mpegurl")], manifest).into_response())
}

#[derive(Debug, Deserialize)]
struct SegmentQuery {
    msn: u64,
}

async fn segment(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> ServerResult<Response> {
    let subscription = {
        let mut store = state.pipeline.store.lock().await;
        store
            .subscribe_segment(query.msn)
            .ok_or_else(|| ServerError::BadQuery(format!("segment {} not found", query.msn)))?
    };
    Ok(stream_subscription(subscription, state.pipeline.content_type))
}

#[derive(Debug, Deserialize)]
struct PartQuery {
    msn: u64,
    part: usize,
}

async fn part(
    State(state): State<AppState>,
    Query(query): Query<PartQuery>,
) -> ServerResult<Response> {
    let subscription = {
        let mut store = state.pipeline.store.lock().await;
        store
            .subscribe_partial(query.msn, query.part)
            .ok_or_else(|| {
                ServerError::BadQuery(format!("part {} of segment {} not found", query.part, query.msn))
            })?
    };
    Ok(stream_subscription(subscription, state.pipeline.content_type))
}

/// Turns a primed + live `Subscription` into a chunked streaming response,
/// per §5's "multi-producer-single-consumer channel per subscriber, primed
/// with the already-buffered bytes on subscribe" model.
fn stream_subscription(subscription: hls::Subscription, content_type: &'static str) -> Response {
    let primed = futures::stream::once(async move { Ok::<Bytes, Infallible>(subscription.primed) });
    let live = ReceiverStream::new(subscription.receiver).map(Ok::<Bytes, Infallible>);
    let body = axum::body::Body::from_stream(primed.chain(live));
    ([(CONTENT_TYPE, content_type)], body).into_response()
}

/// Awaits the first production of the init segment; 400s immediately if
/// this variant never produces one (TS self-describes per segment instead).
async fn init(State(state): State<AppState>) -> ServerResult<Response> {
    if state.pipeline.content_type != "video/mp4" {
        return Err(ServerError::NoInit);
    }
    let bytes = state.pipeline.init.get_or_init(|| std::future::pending()).await;
    Ok(([(CONTENT_TYPE, "video/mp4")], bytes.clone()).into_response())
}

/// Multi-variant master referencing the single child playlist this binary
/// produces, with an audio group when the stream carries an audio track.
async fn master(State(_state): State<AppState>) -> Response {
    let out = "#EXTM3U\n\
         #EXT-X-VERSION:9\n\
         #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"main\",AUTOSELECT=YES,DEFAULT=YES,URI=\"playlist.m3u8\"\n\
         #EXT-X-STREAM-INF:AUDIO=\"audio\"\n\
         playlist.m3u8\n";
    ([(CONTENT_TYPE, "application/vnd.apple.mpegurl")], out).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::sync::OnceCell;
    use tower::ServiceExt;

    use super::*;
    use crate::pipeline::PipelineHandle;
    use crate::state::new_store;

    fn test_state() -> AppState {
        let store = new_store(Some(6), 2.0, 0.5, true);
        let pipeline =
            PipelineHandle { store, init: Arc::new(OnceCell::new()), content_type: "video/mp4" };
        AppState::new(pipeline, 2.0, 0.5)
    }

    #[tokio::test]
    async fn segment_out_of_window_is_400() {
        let state = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/segment?msn=999")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn init_returns_400_for_ts_variant() {
        let store = new_store(Some(6), 2.0, 0.5, false);
        let pipeline =
            PipelineHandle { store, init: Arc::new(OnceCell::new()), content_type: "video/mp2t" };
        let state = AppState::new(pipeline, 2.0, 0.5);
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/init")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn master_playlist_references_child_playlist() {
        let state = test_state();
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/master.m3u8")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("playlist.m3u8"));
    }

    #[tokio::test]
    async fn plain_playlist_request_blocks_until_first_segment() {
        let state = test_state();
        let store = state.pipeline.store.clone();
        let app = router(state);

        let request = app.oneshot(
            axum::http::Request::builder()
                .uri("/playlist.m3u8")
                .body(axum::body::Body::empty())
                .unwrap(),
        );

        let publish = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let mut store = store.lock().await;
            store.continuous_segment(0, true, chrono::Utc::now());
        };

        let (response, _) = tokio::join!(request, publish);
        let response = response.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
