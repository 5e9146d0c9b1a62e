//! Streaming chat client
//!
//! One request at a time per session: the prompt is recorded and the request
//! captured under the session lock, the body is streamed through the record
//! decoder and the event router, and each event is applied under the lock
//! with the thread id captured at send time.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::ORIGIN;
use std::pin::{Pin, pin};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ChatConfig;
use crate::decoder::records;
use crate::error::{ChatError, Result};
use crate::event::route;
use crate::session::{SessionHandle, ThreadId};
use crate::wire::ChatRequest;

/// Response body as a stream of raw chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Opens the response stream for one chat request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `request` and return its body.
    ///
    /// A non-2xx answer is an error carrying the status and the body text.
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// HTTP transport backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    origin: Option<String>,
}

impl HttpTransport {
    /// Build from configuration
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.chat_url(),
            origin: config.allowed_origins.single().map(str::to_string),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %self.url, thread_id = %request.thread_id))]
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream> {
        debug!("opening chat stream");

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(origin) = &self.origin {
            builder = builder.header(ORIGIN, origin);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(status = status.as_u16(), error = %err, "failed to read error body");
                    format!("<body unavailable: {err}>")
                }
            };
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from));
        Ok(Box::pin(body))
    }
}

/// What one streamed response did to the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Events applied to the transcript
    pub applied: usize,
    /// Events discarded because the session was reset mid-stream
    pub stale: usize,
    /// Non-blank records that did not become events
    pub dropped: usize,
}

/// Feed a byte stream into the session, tagged with `thread_id`.
///
/// The session lock is taken once per event. A transport error ends the
/// stream; events applied before it stay applied.
pub async fn pump<S, B, E>(
    session: &SessionHandle,
    thread_id: &ThreadId,
    chunks: S,
) -> std::result::Result<StreamSummary, E>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut summary = StreamSummary::default();
    let mut records = pin!(records(chunks));

    while let Some(record) = records.next().await {
        let record = record?;
        if record.trim().is_empty() {
            continue;
        }
        let Some(event) = route(&record) else {
            summary.dropped += 1;
            continue;
        };

        match session.lock().await.apply_tagged(thread_id, event) {
            Some(_) => summary.applied += 1,
            None => summary.stale += 1,
        }
    }

    Ok(summary)
}

/// Chat client bound to one session
pub struct ChatClient<T = HttpTransport> {
    transport: T,
    session: SessionHandle,
}

impl ChatClient<HttpTransport> {
    /// HTTP client for `session`
    pub fn new(config: &ChatConfig, session: SessionHandle) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(config)?, session))
    }
}

impl<T: ChatTransport> ChatClient<T> {
    /// Client over a custom transport
    pub fn with_transport(transport: T, session: SessionHandle) -> Self {
        Self { transport, session }
    }

    /// The session this client writes into
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Send a prompt and stream the answer into the transcript.
    ///
    /// Transport failures are recorded as a single error entry and also
    /// returned. Nothing is retried.
    #[instrument(skip(self, prompt))]
    pub async fn send(&self, prompt: impl Into<String> + Send) -> Result<StreamSummary> {
        let pending = self.session.lock().await.begin_request(prompt);
        let thread_id = pending.thread_id;

        let result = match self.transport.open(&pending.request).await {
            Ok(body) => pump(&self.session, &thread_id, body).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(summary) => {
                info!(
                    thread_id = %thread_id,
                    applied = summary.applied,
                    stale = summary.stale,
                    dropped = summary.dropped,
                    "chat stream finished"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(thread_id = %thread_id, error = %err, "chat request failed");
                self.session
                    .lock()
                    .await
                    .push_error_tagged(&thread_id, err.to_string());
                Err(err)
            }
        }
    }
}
