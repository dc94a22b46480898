//! Buffered and streaming proxy endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use futures::{stream, Stream};
use serde_json::Value;

use super::{ApiError, AppState};
use crate::agent_core::{ProxyRequest, StreamEmitter};

/// `POST /proxy`: one upstream call, answered with the normalized envelope.
pub async fn proxy(
    State(state): State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let envelope = state.gateway.call(&req).await?;
    Ok(Json(envelope))
}

/// `POST /proxy/stream`: the same call relayed as progress events.
///
/// Validation failures are answered with a plain 400 before the event stream
/// opens; everything after that is reported in-stream.
pub async fn proxy_stream(
    State(state): State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let Json(req) = payload?;
    let prepared = state.gateway.prepare(&req)?;
    let rx = StreamEmitter::spawn(Arc::clone(&state.gateway), prepared);

    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Event::default().json_data(&event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
