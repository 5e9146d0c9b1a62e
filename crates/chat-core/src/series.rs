//! Historical series and forecast overlay merging
//!
//! A chart entry carries a historical price map keyed by millisecond
//! timestamps; a forecast overlay is an ordered list of dated prices. The
//! merged sequence is what a line chart plots: historical points first, then
//! a bridge point duplicating the last historical price on both lines so the
//! two lines meet, then the forecast points.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::event::ChartPayload;
use crate::forecast::{ClosePoint, ForecastPoint};

/// X-axis value of a merged point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesDate {
    /// Milliseconds since the Unix epoch (historical keys)
    Timestamp(i64),
    /// Calendar day (forecast dates)
    Day(NaiveDate),
}

impl SeriesDate {
    /// Calendar day of this point, when representable
    pub fn day(&self) -> Option<NaiveDate> {
        match *self {
            SeriesDate::Timestamp(ms) => {
                DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
            }
            SeriesDate::Day(day) => Some(day),
        }
    }
}

impl fmt::Display for SeriesDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.day()) {
            (_, Some(day)) => write!(f, "{}", day.format("%Y-%m-%d")),
            (SeriesDate::Timestamp(ms), None) => write!(f, "{ms}"),
            (SeriesDate::Day(day), None) => write!(f, "{day}"),
        }
    }
}

/// One renderable point of a merged series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub date: SeriesDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_price: Option<f64>,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HistoricalPoint {
    timestamp: i64,
    price: f64,
    volume: f64,
}

/// Historical prices sorted by timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalSeries {
    points: Vec<HistoricalPoint>,
}

impl HistoricalSeries {
    /// Build from a price map and an optional volume map keyed the same way.
    ///
    /// Keys are sorted by numeric value; keys that are not numbers are skipped.
    /// Missing volumes default to 0.
    pub fn from_maps<K>(
        prices: impl IntoIterator<Item = (K, f64)>,
        volumes: Option<&HashMap<String, f64>>,
    ) -> Self
    where
        K: AsRef<str>,
    {
        let mut points: Vec<HistoricalPoint> = prices
            .into_iter()
            .filter_map(|(key, price)| {
                let key = key.as_ref();
                let Some(timestamp) = parse_timestamp(key) else {
                    debug!(%key, "skipping non-numeric series key");
                    return None;
                };
                let volume = volumes.and_then(|v| v.get(key)).copied().unwrap_or(0.0);
                Some(HistoricalPoint {
                    timestamp,
                    price,
                    volume,
                })
            })
            .collect();

        points.sort_by_key(|p| p.timestamp);
        Self { points }
    }

    /// Extract the `Close` and `Volume` columns of a chart payload
    pub fn from_chart_payload(payload: &ChartPayload) -> Self {
        let prices = numeric_column(&payload.0, &["Close", "close"]);
        let volumes = numeric_column(&payload.0, &["Volume", "volume"]);
        let volumes = (!volumes.is_empty()).then_some(volumes);
        Self::from_maps(prices, volumes.as_ref())
    }

    /// Number of historical points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no historical points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Daily closes for the forecast collaborator
    pub fn closes(&self) -> Vec<ClosePoint> {
        self.points
            .iter()
            .filter_map(|p| {
                SeriesDate::Timestamp(p.timestamp)
                    .day()
                    .map(|date| ClosePoint { date, close: p.price })
            })
            .collect()
    }

    /// Merge with an optional forecast into one plottable sequence.
    ///
    /// Without a forecast (or with an empty one) the result is the historical
    /// points alone. With one, the result is historical points, a bridge point
    /// and the forecast points, in that order. Forecast points are not
    /// re-sorted.
    pub fn merge(&self, forecast: Option<&[ForecastPoint]>) -> Vec<SeriesPoint> {
        let mut merged: Vec<SeriesPoint> = self
            .points
            .iter()
            .map(|p| SeriesPoint {
                date: SeriesDate::Timestamp(p.timestamp),
                historical_price: Some(p.price),
                forecast_price: None,
                volume: p.volume,
            })
            .collect();

        let Some(forecast) = forecast.filter(|f| !f.is_empty()) else {
            return merged;
        };

        merged.reserve(forecast.len() + 1);
        if let Some(last) = self.points.last() {
            merged.push(SeriesPoint {
                date: SeriesDate::Timestamp(last.timestamp),
                historical_price: Some(last.price),
                forecast_price: Some(last.price),
                volume: 0.0,
            });
        }

        merged.extend(forecast.iter().map(|p| SeriesPoint {
            date: SeriesDate::Day(p.date),
            historical_price: None,
            forecast_price: Some(p.price),
            volume: 0.0,
        }));

        merged
    }
}

/// Merge a chart payload with its forecast overlay
pub fn merge_chart(payload: &ChartPayload, forecast: Option<&[ForecastPoint]>) -> Vec<SeriesPoint> {
    HistoricalSeries::from_chart_payload(payload).merge(forecast)
}

fn parse_timestamp(key: &str) -> Option<i64> {
    let key = key.trim();
    key.parse::<i64>().ok().or_else(|| {
        key.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
    })
}

fn numeric_column(data: &Value, names: &[&str]) -> HashMap<String, f64> {
    let Some(column) = names.iter().find_map(|name| data.get(*name)).and_then(Value::as_object)
    else {
        return HashMap::new();
    };

    column
        .iter()
        .filter_map(|(key, value)| match value.as_f64() {
            Some(v) => Some((key.clone(), v)),
            None => {
                debug!(%key, "skipping non-numeric series value");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn forecast() -> Vec<ForecastPoint> {
        vec![
            ForecastPoint { date: day(2024, 3, 1), price: 13.0 },
            ForecastPoint { date: day(2024, 3, 31), price: 14.0 },
        ]
    }

    fn two_points() -> HistoricalSeries {
        HistoricalSeries::from_maps(
            [("1706745600000", 10.0), ("1706832000000", 12.0)],
            None,
        )
    }

    #[test]
    fn test_sorts_keys_numerically() {
        // lexicographic order would put "900" last
        let series =
            HistoricalSeries::from_maps([("1000", 2.0), ("900", 1.0), ("10000", 3.0)], None);
        let merged = series.merge(None);
        let dates: Vec<SeriesDate> = merged.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![
                SeriesDate::Timestamp(900),
                SeriesDate::Timestamp(1000),
                SeriesDate::Timestamp(10000)
            ]
        );
    }

    #[test]
    fn test_no_forecast_keeps_volume() {
        let mut volumes = HashMap::new();
        volumes.insert("1706745600000".to_string(), 5_000.0);
        let series = HistoricalSeries::from_maps(
            [("1706745600000", 10.0), ("1706832000000", 12.0)],
            Some(&volumes),
        );

        let merged = series.merge(None);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].volume, 5_000.0);
        assert_eq!(merged[1].volume, 0.0);
        assert!(merged.iter().all(|p| p.forecast_price.is_none()));
    }

    #[test]
    fn test_merge_continuity() {
        let merged = two_points().merge(Some(&forecast()));

        assert_eq!(merged.len(), 5);
        let bridge = &merged[2];
        assert_eq!(bridge.date, SeriesDate::Timestamp(1706832000000));
        assert_eq!(bridge.historical_price, Some(12.0));
        assert_eq!(bridge.forecast_price, Some(12.0));
        assert_eq!(bridge.volume, 0.0);

        assert_eq!(merged[3].date, SeriesDate::Day(day(2024, 3, 1)));
        assert_eq!(merged[3].historical_price, None);
        assert_eq!(merged[3].forecast_price, Some(13.0));
        assert_eq!(merged[4].forecast_price, Some(14.0));
    }

    #[test]
    fn test_forecast_order_preserved() {
        let mut reversed = forecast();
        reversed.reverse();
        let merged = two_points().merge(Some(&reversed));
        assert_eq!(merged[3].forecast_price, Some(14.0));
        assert_eq!(merged[4].forecast_price, Some(13.0));
    }

    #[test]
    fn test_empty_forecast_degrades_to_history() {
        let merged = two_points().merge(Some(&[]));
        assert_eq!(merged, two_points().merge(None));
    }

    #[test]
    fn test_forecast_without_history_has_no_bridge() {
        let merged = HistoricalSeries::default().merge(Some(&forecast()));
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|p| p.historical_price.is_none()));
    }

    #[test]
    fn test_from_chart_payload() {
        let payload = ChartPayload(json!({
            "Open": {"1706745600000": 9.5},
            "Close": {
                "1706832000000": 12.0,
                "1706745600000": 10.0,
                "bogus": 1.0,
                "1706918400000": null
            },
            "Volume": {"1706745600000": 100, "1706832000000": 200}
        }));

        let series = HistoricalSeries::from_chart_payload(&payload);
        assert_eq!(series.len(), 2);

        let merged = merge_chart(&payload, None);
        assert_eq!(merged[0].historical_price, Some(10.0));
        assert_eq!(merged[0].volume, 100.0);
        assert_eq!(merged[1].volume, 200.0);

        let closes = series.closes();
        assert_eq!(closes[0].date, day(2024, 2, 1));
        assert_eq!(closes[1].date, day(2024, 2, 2));
    }

    #[test]
    fn test_chart_payload_without_close_is_empty() {
        let series = HistoricalSeries::from_chart_payload(&ChartPayload(json!("no data")));
        assert!(series.is_empty());
        assert!(series.merge(Some(&forecast())).iter().all(|p| p.volume == 0.0));
    }

    #[test]
    fn test_point_serialization() {
        let merged = two_points().merge(Some(&forecast()));
        let value = serde_json::to_value(&merged[2..4]).unwrap();
        assert_eq!(
            value,
            json!([
                {
                    "date": 1706832000000_i64,
                    "historicalPrice": 12.0,
                    "forecastPrice": 12.0,
                    "volume": 0.0
                },
                {"date": "2024-03-01", "forecastPrice": 13.0, "volume": 0.0}
            ])
        );
    }

    #[test]
    fn test_series_date_display() {
        assert_eq!(SeriesDate::Timestamp(1706745600000).to_string(), "2024-02-01");
        assert_eq!(SeriesDate::Day(day(2024, 3, 1)).to_string(), "2024-03-01");
    }
}
