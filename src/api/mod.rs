//! axum handlers.
//!
//! Errors found before a stream starts are `(StatusCode, String)`; after
//! that every outcome, failures included, is an SSE event.

pub mod analysis;
pub mod repositories;
pub mod search;

use std::convert::Infallible;

use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{Stream, StreamExt};
use serde::Serialize;

use crate::models::{AnalysisEvent, SearchEvent};

pub type ApiError = (StatusCode, String);

/// An event that knows its SSE event name.
pub trait NamedEvent: Serialize {
    fn event_name(&self) -> &'static str;
}

impl NamedEvent for AnalysisEvent {
    fn event_name(&self) -> &'static str {
        self.name()
    }
}

impl NamedEvent for SearchEvent {
    fn event_name(&self) -> &'static str {
        self.name()
    }
}

fn encode<E: NamedEvent>(event: &E) -> Event {
    let name = event.event_name();
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::warn!("Could not encode {name} event: {e}");
            Event::default()
                .event("failed")
                .data(format!("{{\"error\":\"unencodable {name} event\"}}"))
        })
}

pub(crate) fn into_sse<E>(
    events: impl Stream<Item = E> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    E: NamedEvent + Send + 'static,
{
    Sse::new(events.map(|event| Ok(encode(&event)))).keep_alive(KeepAlive::default())
}

pub(crate) fn internal_error(err: impl std::fmt::Display) -> ApiError {
    tracing::error!("Request failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
