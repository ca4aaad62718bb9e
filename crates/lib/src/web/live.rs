//! GET /api/live: the dashboard's server-sent event stream.

use std::convert::Infallible;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::{
        IntoResponse,
        sse::{KeepAlive, Sse},
    },
};
use futures_util::StreamExt;

use super::AppState;
use super::error::ApiResult;
use crate::auth::Role;
use crate::bus::LiveFeed;
use crate::bus::feed::HEARTBEAT_TEXT;

/// Authenticate once, then relay bus events until the client goes away.
///
/// The feed lives inside the response stream: whichever way the stream ends
/// (client abort, server shutdown, write error) dropping it unsubscribes.
pub(super) async fn live_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let ctx = state.guard().require_session(&headers, &Role::ALL).await?;

    let feed = LiveFeed::open(state.bus(), state.clock().as_ref());
    tracing::info!(
        user_id = ctx.user_id,
        subscriber = feed.subscription_id(),
        "live feed connected"
    );

    let mut closing = state.closing();
    let stream = feed
        .into_stream()
        .map(|message| Ok::<_, Infallible>(message.to_sse_event()))
        .take_until(async move {
            let _ = closing.wait_for(|closed| *closed).await;
        });

    let keep_alive = KeepAlive::new()
        .interval(state.config().feed.heartbeat)
        .text(HEARTBEAT_TEXT);

    Ok((
        [(header::CONNECTION, "keep-alive")],
        Sse::new(stream).keep_alive(keep_alive),
    ))
}
