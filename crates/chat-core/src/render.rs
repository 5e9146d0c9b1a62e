//! Terminal rendering of transcript entries
//!
//! Read-only projection: nothing here mutates a transcript.

use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use serde_json::Value;

use crate::event::{AnalystRatingPayload, BalanceSheetPayload, ChartPayload, NewsPayload};
use crate::forecast::ForecastPoint;
use crate::series::{HistoricalSeries, SeriesDate, SeriesPoint};
use crate::transcript::{EntryBody, Role, Transcript, TranscriptEntry};

/// Merged points shown under a chart
pub const SERIES_TAIL: usize = 8;

const MAX_BALANCE_COLUMNS: usize = 4;
const MAX_BALANCE_ROWS: usize = 20;
const MAX_NEWS_ITEMS: usize = 10;

/// Render every entry, separated by blank lines
pub fn render_transcript(transcript: &Transcript) -> String {
    render_entries(transcript.entries())
}

/// Render a slice of entries, separated by blank lines
pub fn render_entries(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(render_entry)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render one entry
pub fn render_entry(entry: &TranscriptEntry) -> String {
    let speaker = match entry.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };

    let body = match &entry.body {
        EntryBody::PlainText => entry.content.clone(),
        EntryBody::Error => format!("Error: {}", entry.content),
        EntryBody::Chart { data, forecast } => render_chart(data, forecast.as_deref()),
        EntryBody::BalanceSheet { data } => render_balance_sheet(data),
        EntryBody::AnalystRating { data } => render_analyst_ratings(data),
        EntryBody::News { data } => render_news(data),
    };

    format!("{speaker}> {body}")
}

fn render_chart(data: &ChartPayload, forecast: Option<&[ForecastPoint]>) -> String {
    let history = HistoricalSeries::from_chart_payload(data);
    let merged = history.merge(forecast);

    let mut summary = format!("Price chart ({} points)", history.len());
    let last_close = merged
        .iter()
        .rev()
        .find_map(|p| p.historical_price.map(|price| (p.date, price)));
    if let Some((date, price)) = last_close {
        summary.push_str(&format!(", last close {price:.2} on {date}"));
    }
    if let Some(end) = forecast.and_then(<[ForecastPoint]>::last) {
        summary.push_str(&format!(", forecast to {:.2} by {}", end.price, end.date));
    }

    if merged.is_empty() {
        return summary;
    }
    format!("{summary}\n{}", series_table(&merged, SERIES_TAIL))
}

/// Table of the last `tail` merged points
pub fn series_table(points: &[SeriesPoint], tail: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Date", "Close", "Forecast", "Volume"]);

    let start = points.len().saturating_sub(tail);
    for point in &points[start..] {
        table.add_row(vec![
            point.date.to_string(),
            price_cell(point.historical_price),
            price_cell(point.forecast_price),
            format!("{:.0}", point.volume),
        ]);
    }
    table
}

fn price_cell(price: Option<f64>) -> String {
    price.map(|p| format!("{p:.2}")).unwrap_or_default()
}

/// `{columns, index, data}` split layout, as produced for balance sheets
fn render_balance_sheet(data: &BalanceSheetPayload) -> String {
    let payload = &data.0;
    if let Some(notice) = payload.as_str() {
        return notice.to_string();
    }

    let (Some(columns), Some(index), Some(rows)) = (
        payload.get("columns").and_then(Value::as_array),
        payload.get("index").and_then(Value::as_array),
        payload.get("data").and_then(Value::as_array),
    ) else {
        return format!("Balance sheet\n{}", compact(payload));
    };

    let shown = columns.len().min(MAX_BALANCE_COLUMNS);
    let mut header = vec!["Item".to_string()];
    header.extend(columns.iter().take(shown).map(column_label));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    for (label, row) in index.iter().zip(rows).take(MAX_BALANCE_ROWS) {
        let mut cells = vec![scalar(label)];
        let values = row.as_array().map(Vec::as_slice).unwrap_or_default();
        cells.extend(values.iter().take(shown).map(number));
        table.add_row(cells);
    }

    let mut out = format!("Balance sheet\n{table}");
    if index.len() > MAX_BALANCE_ROWS {
        out.push_str(&format!("\n({} more rows)", index.len() - MAX_BALANCE_ROWS));
    }
    out
}

/// List of per-period records
fn render_analyst_ratings(data: &AnalystRatingPayload) -> String {
    let payload = &data.0;
    if let Some(notice) = payload.as_str() {
        return notice.to_string();
    }

    let Some(records) = payload.as_array().filter(|r| !r.is_empty()) else {
        return "No analyst ratings".to_string();
    };
    let Some(first) = records.first().and_then(Value::as_object) else {
        return format!("Analyst ratings\n{}", compact(payload));
    };

    let keys: Vec<&String> = first.keys().collect();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(keys.iter().map(|k| k.as_str()).collect::<Vec<_>>());
    for record in records {
        let row: Vec<String> = keys
            .iter()
            .map(|k| record.get(k.as_str()).map(scalar).unwrap_or_default())
            .collect();
        table.add_row(row);
    }

    format!("Analyst ratings\n{table}")
}

/// Article list; titles may sit at the top level or under `content`
fn render_news(data: &NewsPayload) -> String {
    let Some(articles) = data.0.as_array() else {
        return format!("News\n{}", compact(&data.0));
    };
    if articles.is_empty() {
        return "No news".to_string();
    }

    let mut out = String::from("News");
    for article in articles.iter().take(MAX_NEWS_ITEMS) {
        let inner = article.get("content").filter(|c| c.is_object()).unwrap_or(article);
        let title = inner
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("(untitled)");
        let publisher = inner
            .get("publisher")
            .and_then(Value::as_str)
            .or_else(|| inner.pointer("/provider/displayName").and_then(Value::as_str));

        out.push_str("\n  - ");
        out.push_str(title);
        if let Some(publisher) = publisher {
            out.push_str(&format!(" ({publisher})"));
        }
    }
    if articles.len() > MAX_NEWS_ITEMS {
        out.push_str(&format!("\n  ... {} more", articles.len() - MAX_NEWS_ITEMS));
    }
    out
}

/// Millisecond column keys shown as dates
fn column_label(value: &Value) -> String {
    match value.as_i64() {
        Some(ms) => SeriesDate::Timestamp(ms).to_string(),
        None => scalar(value),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn number(value: &Value) -> String {
    match value.as_f64() {
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.2}"),
        None => scalar(value),
    }
}

fn compact(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_text_and_error_entries() {
        let mut transcript = Transcript::new("hello");
        transcript.push_user("hi");
        transcript.push_error("HTTP 500: boom");

        let out = render_transcript(&transcript);
        assert_eq!(out, "assistant> hello\n\nyou> hi\n\nassistant> Error: HTTP 500: boom");
    }

    #[test]
    fn test_chart_with_forecast() {
        let chart = Event::Chart(ChartPayload(json!({
            "Close": {"1706745600000": 10.0, "1706832000000": 12.0},
            "Volume": {"1706745600000": 1500}
        })));
        let forecast = Event::forecast(vec![ForecastPoint {
            date: NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
            price: 13.5,
        }]);
        let transcript = Transcript::new("hello").apply(chart).apply(forecast);

        let out = render_entry(&transcript.entries()[1]);
        assert!(
            out.starts_with("assistant> Price chart (2 points), last close 12.00 on 2024-02-02")
        );
        assert!(out.contains("forecast to 13.50 by 2024-03-03"));
        assert!(out.contains("1500"));
        assert!(out.contains("2024-03-03"));
    }

    #[test]
    fn test_series_table_keeps_tail() {
        let history =
            HistoricalSeries::from_maps((1..=20).map(|i| (i.to_string(), f64::from(i))), None);
        let table = series_table(&history.merge(None), 3).to_string();
        assert!(table.contains("20.00"));
        assert!(table.contains("18.00"));
        assert!(!table.contains("17.00"));
    }

    #[test]
    fn test_balance_sheet_split_layout() {
        let data = BalanceSheetPayload(json!({
            "columns": [1727654400000_i64, 1696032000000_i64],
            "index": ["Total Assets", "Total Debt"],
            "data": [[364980000000.0, 352583000000.0], [106629000000.0, null]]
        }));
        let out = render_balance_sheet(&data);
        assert!(out.contains("Total Assets"));
        assert!(out.contains("364980000000"));
        assert!(out.contains("2024-09-30"));
    }

    #[test]
    fn test_payload_notices_pass_through() {
        assert_eq!(
            render_balance_sheet(&BalanceSheetPayload(json!("No balance sheet data found."))),
            "No balance sheet data found."
        );
        assert_eq!(
            render_analyst_ratings(&AnalystRatingPayload(json!("No recommendations found."))),
            "No recommendations found."
        );
    }

    #[test]
    fn test_analyst_ratings_table() {
        let data = AnalystRatingPayload(json!([
            {"period": "0m", "strongBuy": 12, "buy": 20, "hold": 5},
            {"period": "-1m", "strongBuy": 11, "buy": 21, "hold": 6}
        ]));
        let out = render_analyst_ratings(&data);
        assert!(out.contains("strongBuy"));
        assert!(out.contains("-1m"));
        assert!(out.contains("21"));
    }

    #[test]
    fn test_news_both_layouts() {
        let data = NewsPayload(json!([
            {"title": "Chip demand surges", "publisher": "Wire"},
            {"content": {"title": "Earnings beat", "provider": {"displayName": "Daily"}}}
        ]));
        let out = render_news(&data);
        assert!(out.contains("- Chip demand surges (Wire)"));
        assert!(out.contains("- Earnings beat (Daily)"));
    }
}
