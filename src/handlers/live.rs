//! Server-sent event streams over the notification hub. Staff listen to the
//! whole floor, a customer only to their own table.

use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::{
    auth::{CustomerSession, StaffUser},
    notifications::{Audience, Subscription},
    AppState,
};

fn into_stream(subscription: Subscription) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold(subscription, |mut subscription| async move {
        loop {
            let broadcast = subscription.recv().await?;
            match SseEvent::default()
                .event(broadcast.kind.to_string())
                .json_data(&broadcast)
            {
                Ok(event) => return Some((Ok(event), subscription)),
                Err(e) => warn!(error = %e, "Failed to encode live event"),
            }
        }
    })
}

/// GET /live
pub async fn staff_stream(
    State(state): State<AppState>,
    staff: StaffUser,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    debug!(staff = %staff.user_id, "Staff subscribed to live events");
    Sse::new(into_stream(state.hub.subscribe(Audience::Staff))).keep_alive(KeepAlive::default())
}

/// GET /sessions/current/live
pub async fn table_stream(
    State(state): State<AppState>,
    CustomerSession(session): CustomerSession,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    debug!(table_id = %session.table_id, "Table subscribed to live events");
    Sse::new(into_stream(state.hub.subscribe(Audience::Table(session.table_id))))
        .keep_alive(KeepAlive::default())
}

pub fn live_routes() -> Router<AppState> {
    Router::new()
        .route("/live", get(staff_stream))
        .route("/sessions/current/live", get(table_stream))
}
