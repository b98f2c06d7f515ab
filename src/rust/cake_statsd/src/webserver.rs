use anyhow::Result;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use cake_queue_tracker::{QueueTracker, StatsResponse};
use futures_util::{stream, Stream, StreamExt};
use std::{convert::Infallible, future::Future, sync::Arc};
use tokio::net::TcpListener;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// Builds the HTTP API over a shared tracker.
pub fn build_router(tracker: Arc<QueueTracker>) -> Router {
    Router::new()
        .route("/api/stats", get(handle_stats))
        .route("/api/history", get(handle_history))
        .route("/events", get(handle_events))
        .route("/health", get(handle_health))
        .with_state(tracker)
}

/// Serves the API on `listen_address` until `shutdown` resolves.
pub async fn run_webserver<F>(listen_address: &str, tracker: Arc<QueueTracker>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(listen_address).await?;
    info!("Webserver listening on: [{listen_address}]");
    axum::serve(listener, build_router(tracker))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Webserver stopped");
    Ok(())
}

async fn handle_stats(State(tracker): State<Arc<QueueTracker>>) -> impl IntoResponse {
    let latest = tracker.latest();
    Json(StatsResponse::clone(&latest))
}

async fn handle_history(State(tracker): State<Arc<QueueTracker>>) -> impl IntoResponse {
    Json(tracker.history().snapshot())
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Sends the current snapshot straight away, then one event per poll.
/// A client that falls behind the broadcast buffer skips what it missed.
async fn handle_events(
    State(tracker): State<Arc<QueueTracker>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let current = tracker.latest();
    let updates = BroadcastStream::new(tracker.subscribe())
        .filter_map(|update| async move { update.ok() });
    let events = stream::once(async move { current })
        .chain(updates)
        .map(|response| Ok(stats_event(&response)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn stats_event(response: &StatsResponse) -> Event {
    Event::default().json_data(response).unwrap_or_else(|e| {
        warn!("Unable to encode stats event: {e}");
        Event::default().comment("encode error")
    })
}
