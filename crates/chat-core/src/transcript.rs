//! Conversation transcript and the event reducer that builds it
//!
//! The transcript is append-only with one exception: a `forecast` event
//! decorates the nearest preceding chart entry in place, because forecasts
//! are computed after the chart they belong to has already been shown.
//!
//! Rules, in priority order:
//!
//! - `forecast`: attach (or replace) the overlay on the closest chart entry
//!   scanning backwards from the tail; with no chart anywhere, append a
//!   plain-text notice instead.
//! - `text`: extend the last entry when it is assistant plain text, otherwise
//!   start a new assistant plain-text entry.
//! - structured kinds: always append a new entry, never merged.

use serde::{Deserialize, Serialize};

use crate::event::{
    AnalystRatingPayload, BalanceSheetPayload, ChartPayload, Event, ForecastOutcome, NewsPayload,
};
use crate::forecast::ForecastPoint;

/// Notice appended when a forecast arrives with no chart to decorate
pub const ORPHAN_FORECAST_NOTICE: &str =
    "A price forecast arrived, but there is no chart in this conversation to attach it to.";

/// Who authored an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Type tag of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    PlainText,
    Chart,
    BalanceSheet,
    AnalystRating,
    News,
    Error,
}

/// Kind-specific part of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryBody {
    PlainText,
    Error,
    Chart {
        data: ChartPayload,
        /// Forecast overlay; only charts carry one
        forecast: Option<Vec<ForecastPoint>>,
    },
    BalanceSheet { data: BalanceSheetPayload },
    AnalystRating { data: AnalystRatingPayload },
    News { data: NewsPayload },
}

/// One chat bubble worth of state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    #[serde(flatten)]
    pub body: EntryBody,
}

impl TranscriptEntry {
    /// Plain text written by the user
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            body: EntryBody::PlainText,
        }
    }

    /// Plain text written by the assistant
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            body: EntryBody::PlainText,
        }
    }

    /// User-visible failure
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            body: EntryBody::Error,
        }
    }

    fn structured(body: EntryBody) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            body,
        }
    }

    /// Type tag of this entry
    pub fn kind(&self) -> EntryKind {
        match self.body {
            EntryBody::PlainText => EntryKind::PlainText,
            EntryBody::Error => EntryKind::Error,
            EntryBody::Chart { .. } => EntryKind::Chart,
            EntryBody::BalanceSheet { .. } => EntryKind::BalanceSheet,
            EntryBody::AnalystRating { .. } => EntryKind::AnalystRating,
            EntryBody::News { .. } => EntryKind::News,
        }
    }

    /// Forecast overlay, for chart entries that have one
    pub fn forecast(&self) -> Option<&[ForecastPoint]> {
        match &self.body {
            EntryBody::Chart { forecast, .. } => forecast.as_deref(),
            _ => None,
        }
    }

    fn is_assistant_text(&self) -> bool {
        self.role == Role::Assistant && self.body == EntryBody::PlainText
    }
}

/// What applying an event did to the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new entry was appended at this index
    Appended(usize),
    /// The entry at this index grew by a text delta
    Extended(usize),
    /// A forecast overlay was set on the chart entry at this index
    Attached(usize),
}

impl Change {
    /// Index of the affected entry
    pub fn index(&self) -> usize {
        match *self {
            Change::Appended(i) | Change::Extended(i) | Change::Attached(i) => i,
        }
    }
}

/// Ordered conversation log; never empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredTranscript")]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

/// Serialized form, validated before it becomes a [`Transcript`]
#[derive(Deserialize)]
struct StoredTranscript {
    entries: Vec<TranscriptEntry>,
}

impl TryFrom<StoredTranscript> for Transcript {
    type Error = &'static str;

    fn try_from(stored: StoredTranscript) -> Result<Self, Self::Error> {
        if stored.entries.is_empty() {
            return Err("transcript must hold at least one entry");
        }
        Ok(Self {
            entries: stored.entries,
        })
    }
}

impl Transcript {
    /// Fresh transcript holding only the greeting
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            entries: vec![TranscriptEntry::assistant(greeting)],
        }
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries (at least 1)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a transcript holds at least the greeting
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&TranscriptEntry> {
        self.entries.get(index)
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Append the user's prompt
    pub fn push_user(&mut self, content: impl Into<String>) -> Change {
        self.push(TranscriptEntry::user(content))
    }

    /// Append a user-visible error
    pub fn push_error(&mut self, content: impl Into<String>) -> Change {
        self.push(TranscriptEntry::error(content))
    }

    /// Append a standalone assistant notice, never coalesced with prior text
    pub fn push_notice(&mut self, content: impl Into<String>) -> Change {
        self.push(TranscriptEntry::assistant(content))
    }

    /// Nearest chart entry from the tail, with its index.
    ///
    /// Linear reverse scan; transcripts are bounded by one conversation.
    pub fn latest_chart(&self) -> Option<(usize, &ChartPayload)> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, entry)| match &entry.body {
                EntryBody::Chart { data, .. } => Some((index, data)),
                _ => None,
            })
    }

    /// Reducer form: consume the transcript and return it with `event` applied
    pub fn apply(mut self, event: Event) -> Self {
        self.apply_mut(event);
        self
    }

    /// Apply one event in place.
    ///
    /// Each rule performs a single push or a single field write, so there is
    /// no intermediate state between the old and the new transcript.
    pub fn apply_mut(&mut self, event: Event) -> Change {
        match event {
            Event::Forecast(ForecastOutcome::Points(points)) => self.attach_forecast(points),
            Event::Forecast(ForecastOutcome::Unavailable(notice)) => {
                self.push_notice(format!("Forecast unavailable: {notice}"))
            }
            Event::Text(delta) => self.append_text(delta),
            Event::Chart(data) => self.push(TranscriptEntry::structured(EntryBody::Chart {
                data,
                forecast: None,
            })),
            Event::BalanceSheet(data) => {
                self.push(TranscriptEntry::structured(EntryBody::BalanceSheet { data }))
            }
            Event::AnalystRating(data) => {
                self.push(TranscriptEntry::structured(EntryBody::AnalystRating { data }))
            }
            Event::News(data) => self.push(TranscriptEntry::structured(EntryBody::News { data })),
        }
    }

    fn attach_forecast(&mut self, points: Vec<ForecastPoint>) -> Change {
        let Some(index) = self.latest_chart().map(|(index, _)| index) else {
            return self.push_notice(ORPHAN_FORECAST_NOTICE);
        };

        if let EntryBody::Chart { forecast, .. } = &mut self.entries[index].body {
            *forecast = Some(points);
        }
        Change::Attached(index)
    }

    fn append_text(&mut self, delta: String) -> Change {
        let last_index = self.entries.len().saturating_sub(1);
        if let Some(last) = self.entries.last_mut().filter(|e| e.is_assistant_text()) {
            last.content.push_str(&delta);
            return Change::Extended(last_index);
        }
        self.push(TranscriptEntry::assistant(delta))
    }

    fn push(&mut self, entry: TranscriptEntry) -> Change {
        self.entries.push(entry);
        Change::Appended(self.entries.len() - 1)
    }
}
