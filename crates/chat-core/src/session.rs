//! Session lifecycle: the active thread and the transcript it owns
//!
//! Every request is tagged with the thread id that was current when it was
//! issued. Events are applied only while that id is still current, so a
//! `reset()` during a live stream leaves the fresh transcript untouched by the
//! tail of the old stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::Event;
use crate::forecast::Forecaster;
use crate::series::HistoricalSeries;
use crate::transcript::{Change, ORPHAN_FORECAST_NOTICE, Transcript};
use crate::wire::ChatRequest;

/// Session shared between the request issuer and whoever resets it
pub type SessionHandle = Arc<Mutex<Session>>;

/// Identifier of one conversation thread on the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request captured under the session lock, ready to send
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub thread_id: ThreadId,
    pub request: ChatRequest,
}

/// The active thread and its transcript
#[derive(Debug)]
pub struct Session {
    thread_id: ThreadId,
    transcript: Transcript,
    greeting: String,
}

impl Session {
    /// New session on a fresh thread, transcript holding only the greeting
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        Self {
            thread_id: ThreadId::generate(),
            transcript: Transcript::new(greeting.clone()),
            greeting,
        }
    }

    /// Wrap into a shareable handle
    pub fn into_handle(self) -> SessionHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Whether `thread_id` is the current thread
    pub fn is_current(&self, thread_id: &ThreadId) -> bool {
        self.thread_id == *thread_id
    }

    /// Start over: greeting-only transcript on a new thread.
    ///
    /// Returns the new thread id, which always differs from the previous one.
    pub fn reset(&mut self) -> &ThreadId {
        let previous = std::mem::replace(&mut self.thread_id, ThreadId::generate());
        while self.thread_id == previous {
            self.thread_id = ThreadId::generate();
        }
        self.transcript = Transcript::new(self.greeting.clone());

        info!(previous = %previous, current = %self.thread_id, "session reset");
        &self.thread_id
    }

    /// Append the user's prompt and capture the request for the current thread
    pub fn begin_request(&mut self, prompt: impl Into<String>) -> PendingRequest {
        let prompt = prompt.into();
        self.transcript.push_user(prompt.clone());
        PendingRequest {
            thread_id: self.thread_id.clone(),
            request: ChatRequest::new(prompt, self.thread_id.as_str()),
        }
    }

    /// Apply an event from a stream started under `thread_id`.
    ///
    /// Returns `None` and leaves the transcript alone when the thread is no
    /// longer current.
    pub fn apply_tagged(&mut self, thread_id: &ThreadId, event: Event) -> Option<Change> {
        if !self.is_current(thread_id) {
            debug!(
                stale = %thread_id,
                current = %self.thread_id,
                kind = %event.kind(),
                "discarding stale event"
            );
            return None;
        }
        Some(self.transcript.apply_mut(event))
    }

    /// Append an error entry for a request issued under `thread_id`
    pub fn push_error_tagged(
        &mut self,
        thread_id: &ThreadId,
        message: impl Into<String>,
    ) -> Option<Change> {
        if !self.is_current(thread_id) {
            debug!(stale = %thread_id, "discarding stale error");
            return None;
        }
        Some(self.transcript.push_error(message))
    }

    /// Compute a forecast for the latest chart and apply it as a forecast event.
    ///
    /// Failures become a plain-text notice; the chart keeps no overlay.
    pub fn forecast_latest_chart(&mut self, forecaster: &dyn Forecaster) -> Change {
        let Some((_, payload)) = self.transcript.latest_chart() else {
            return self.transcript.push_notice(ORPHAN_FORECAST_NOTICE);
        };

        let closes = HistoricalSeries::from_chart_payload(payload).closes();
        match forecaster.forecast(&closes) {
            Ok(points) => self.transcript.apply_mut(Event::forecast(points)),
            Err(err) => {
                warn!(error = %err, observations = closes.len(), "forecast failed");
                self.transcript.apply_mut(Event::forecast_unavailable(err.to_string()))
            }
        }
    }
}
