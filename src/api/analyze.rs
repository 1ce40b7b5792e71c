use crate::error::ApiError;
use crate::session::{Session, SessionEvent};
use crate::AppState;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::Utc;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub line: String,
}

/// POST /api/analyze - run a full analysis, streaming lifecycle events.
///
/// The session task is detached from the connection: a client disconnect
/// stops delivery but the in-flight workers run to completion and the
/// aggregate is still persisted.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let line = request.line.trim().to_string();
    if line.is_empty() {
        return Err(ApiError::BadRequest(
            "line must be a non-empty string".to_string(),
        ));
    }

    info!("New analysis request ({} chars)", line.len());

    let session = Session::new(
        state.config.clone(),
        state.generator.clone(),
        state.archive.clone(),
    );
    let (tx, mut rx) = mpsc::channel::<SessionEvent>(64);

    tokio::spawn(async move { session.run(line, tx).await });

    let keepalive = Duration::from_secs(state.config.keepalive_secs.max(1));
    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(keepalive);
        heartbeat.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    yield Ok(sse_event(&SessionEvent::Ping { timestamp: Utc::now() }));
                }
                received = rx.recv() => match received {
                    Some(event) => {
                        let terminal = matches!(event, SessionEvent::Done { .. });
                        yield Ok(sse_event(&event));
                        if terminal {
                            // Dropping the stream stops the heartbeat on
                            // every exit path, including disconnects.
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    };

    Ok(Sse::new(stream))
}

fn sse_event(event: &SessionEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.payload().to_string())
}
