//! Streaming transcript assembly for a market-data chat agent
//!
//! The backend answers each prompt with a chunked body of newline-delimited
//! JSON records. This crate turns that body into a conversation transcript:
//!
//! - [`decoder`]: bytes to records, independent of chunk boundaries
//! - [`event`]: records to typed events; bad or unknown records are dropped
//! - [`transcript`]: the reducer that applies events to the transcript
//! - [`series`]: historical prices merged with a forecast overlay
//! - [`forecast`]: the forecast contract and a polynomial implementation
//! - [`session`]: thread id, reset, and stale-stream discard
//! - [`client`]: the HTTP request and the streaming pump
//! - [`render`]: read-only terminal projection of the transcript
//!
//! # Example
//!
//! ```rust,no_run
//! use chat_core::{ChatClient, ChatConfig, Session, render};
//!
//! #[tokio::main]
//! async fn main() -> chat_core::Result<()> {
//!     let config = ChatConfig::builder().from_env()?.build()?;
//!     let session = Session::new(config.greeting.clone()).into_handle();
//!     let client = ChatClient::new(&config, session.clone())?;
//!
//!     client.send("How did NVDA trade this month?").await?;
//!     println!("{}", render::render_transcript(session.lock().await.transcript()));
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod forecast;
pub mod render;
pub mod series;
pub mod session;
pub mod transcript;
pub mod wire;

pub use client::{ChatClient, ChatTransport, HttpTransport, StreamSummary, pump};
pub use config::{AllowedOrigins, ChatConfig, ForecastConfig};
pub use decoder::{RecordDecoder, records};
pub use error::{ChatError, Result};
pub use event::{Event, EventKind, ForecastOutcome, RouteError, parse_event, route};
pub use forecast::{ClosePoint, ForecastError, ForecastPoint, Forecaster, PolynomialForecaster};
pub use series::{HistoricalSeries, SeriesDate, SeriesPoint, merge_chart};
pub use session::{PendingRequest, Session, SessionHandle, ThreadId};
pub use transcript::{Change, EntryBody, EntryKind, Role, Transcript, TranscriptEntry};
pub use wire::{ChatRequest, PromptObject};
