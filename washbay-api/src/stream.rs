use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

/// GET /v1/capacity/stream
/// Optional push channel layered above polling: subscribers get a
/// `capacity_changed` event whenever a write moves a counter. The sync
/// protocol treats this purely as a hint to re-poll sooner; polling alone
/// remains the authoritative contract.
pub async fn capacity_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.capacity_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match Event::default().event("capacity_changed").json_data(&event) {
                Ok(sse_event) => Some(Ok(sse_event)),
                Err(_) => None,
            },
            // Lagged receivers just skip; the next poll reconciles them.
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
