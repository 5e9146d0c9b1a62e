//! Typed events parsed from stream records
//!
//! Each record is `{"type": ..., "content"?: ..., "data"?: ...}`. Structured
//! payloads are kept opaque: their shape belongs to the backend tools that
//! produced them, and they are only checked for presence here.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::forecast::ForecastPoint;

/// Event kinds understood by the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    Chart,
    BalanceSheet,
    AnalystRating,
    News,
    Forecast,
}

impl EventKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Chart => "chart",
            Self::BalanceSheet => "balance_sheet",
            Self::AnalystRating => "analyst_rating",
            Self::News => "news",
            Self::Forecast => "forecast",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "chart" => Ok(Self::Chart),
            "balance_sheet" => Ok(Self::BalanceSheet),
            "analyst_rating" => Ok(Self::AnalystRating),
            "news" => Ok(Self::News),
            "forecast" => Ok(Self::Forecast),
            other => Err(RouteError::UnknownKind(other.to_string())),
        }
    }
}

/// Historical price series, column-oriented (`{"Close": {"<ms>": price}, ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartPayload(pub Value);

/// Balance sheet table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BalanceSheetPayload(pub Value);

/// List of analyst rating periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalystRatingPayload(pub Value);

/// List of news articles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewsPayload(pub Value);

/// What a `forecast` record carried
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutcome {
    /// Ordered future points
    Points(Vec<ForecastPoint>),
    /// The collaborator could not produce a forecast; carries its notice
    Unavailable(String),
}

/// A parsed stream event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Incremental assistant text
    Text(String),
    Chart(ChartPayload),
    BalanceSheet(BalanceSheetPayload),
    AnalystRating(AnalystRatingPayload),
    News(NewsPayload),
    Forecast(ForecastOutcome),
}

impl Event {
    /// Kind tag of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Text(_) => EventKind::Text,
            Event::Chart(_) => EventKind::Chart,
            Event::BalanceSheet(_) => EventKind::BalanceSheet,
            Event::AnalystRating(_) => EventKind::AnalystRating,
            Event::News(_) => EventKind::News,
            Event::Forecast(_) => EventKind::Forecast,
        }
    }

    /// Shorthand for a text delta
    pub fn text(content: impl Into<String>) -> Self {
        Event::Text(content.into())
    }

    /// Shorthand for a forecast carrying points
    pub fn forecast(points: Vec<ForecastPoint>) -> Self {
        Event::Forecast(ForecastOutcome::Points(points))
    }

    /// Shorthand for a forecast that could not be computed
    pub fn forecast_unavailable(notice: impl Into<String>) -> Self {
        Event::Forecast(ForecastOutcome::Unavailable(notice.into()))
    }

    /// Encode as one NDJSON record, without the trailing newline
    pub fn to_record(&self) -> String {
        let kind = self.kind().as_str();
        let value = match self {
            Event::Text(content) => json!({ "type": kind, "content": content }),
            Event::Chart(ChartPayload(data))
            | Event::BalanceSheet(BalanceSheetPayload(data))
            | Event::AnalystRating(AnalystRatingPayload(data))
            | Event::News(NewsPayload(data)) => json!({ "type": kind, "data": data }),
            Event::Forecast(ForecastOutcome::Points(points)) => {
                json!({ "type": kind, "data": points })
            }
            Event::Forecast(ForecastOutcome::Unavailable(notice)) => {
                json!({ "type": kind, "data": notice })
            }
        };
        value.to_string()
    }
}

/// Why a record did not become an event
#[derive(Debug, Error)]
pub enum RouteError {
    /// Not a JSON object
    #[error("record is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No `type` field
    #[error("record has no type tag")]
    MissingType,

    /// `type` names a kind this client does not know
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// Known kind without its `content`/`data` field
    #[error("{kind} record has no payload")]
    MissingPayload { kind: EventKind },

    /// Payload present but of the wrong shape
    #[error("{kind} payload is invalid: {reason}")]
    InvalidPayload { kind: EventKind, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Parse one record into an event
pub fn parse_event(record: &str) -> Result<Event, RouteError> {
    let raw: RawRecord = serde_json::from_str(record.trim())?;
    let kind: EventKind = raw.kind.as_deref().ok_or(RouteError::MissingType)?.parse()?;

    let event = match kind {
        EventKind::Text => Event::Text(parse_text(raw.content)?),
        EventKind::Chart => Event::Chart(ChartPayload(require_data(kind, raw.data)?)),
        EventKind::BalanceSheet => {
            Event::BalanceSheet(BalanceSheetPayload(require_data(kind, raw.data)?))
        }
        EventKind::AnalystRating => {
            Event::AnalystRating(AnalystRatingPayload(require_data(kind, raw.data)?))
        }
        EventKind::News => Event::News(NewsPayload(require_data(kind, raw.data)?)),
        EventKind::Forecast => Event::Forecast(parse_forecast(require_data(kind, raw.data)?)?),
    };
    Ok(event)
}

fn require_data(kind: EventKind, data: Option<Value>) -> Result<Value, RouteError> {
    data.ok_or(RouteError::MissingPayload { kind })
}

fn parse_text(content: Option<Value>) -> Result<String, RouteError> {
    let kind = EventKind::Text;
    match content {
        Some(Value::String(content)) => Ok(content),
        Some(other) => Err(RouteError::InvalidPayload {
            kind,
            reason: format!("expected string content, got {}", json_type(&other)),
        }),
        None => Err(RouteError::MissingPayload { kind }),
    }
}

fn parse_forecast(data: Value) -> Result<ForecastOutcome, RouteError> {
    match data {
        Value::String(notice) => Ok(ForecastOutcome::Unavailable(notice)),
        Value::Array(_) => serde_json::from_value::<Vec<ForecastPoint>>(data)
            .map(ForecastOutcome::Points)
            .map_err(|e| RouteError::InvalidPayload {
                kind: EventKind::Forecast,
                reason: e.to_string(),
            }),
        other => Err(RouteError::InvalidPayload {
            kind: EventKind::Forecast,
            reason: format!("expected a point list or notice, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Route a record, logging and discarding anything that is not an event.
///
/// Blank records are skipped silently, unknown kinds at debug level, and
/// malformed records with a warning. None of these stop the stream.
pub fn route(record: &str) -> Option<Event> {
    if record.trim().is_empty() {
        return None;
    }

    match parse_event(record) {
        Ok(event) => {
            debug!(kind = %event.kind(), "routed record");
            Some(event)
        }
        Err(RouteError::UnknownKind(kind)) => {
            debug!(%kind, "ignoring record of unknown kind");
            None
        }
        Err(err) => {
            warn!(error = %err, record = %preview(record), "dropping malformed record");
            None
        }
    }
}

fn preview(record: &str) -> String {
    const MAX: usize = 120;
    let mut out: String = record.chars().take(MAX).collect();
    if record.chars().count() > MAX {
        out.push_str("...");
    }
    out
}
