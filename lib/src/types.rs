use chrono::{DateTime, NaiveDate, Utc};
use derive_builder::Builder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bar width requested from the provider.
#[derive(
    Debug,
    Default,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
pub enum Interval {
    #[default]
    #[serde(rename = "1d")]
    #[strum(to_string = "1d")]
    Day,
    #[serde(rename = "1wk")]
    #[strum(to_string = "1wk")]
    Week,
    #[serde(rename = "1mo")]
    #[strum(to_string = "1mo")]
    Month,
}

#[derive(Builder)]
#[builder(setter(strip_option))]
pub struct HistoryRequest<'a> {
    pub(crate) ticker: &'a str,
    #[builder(default)]
    pub(crate) interval: Interval,
    /// Inclusive lower bound of the window.
    pub(crate) start: DateTime<Utc>,
    /// Exclusive upper bound of the window.
    pub(crate) end: DateTime<Utc>,
    #[builder(default = "true")]
    pub(crate) auto_adjust: bool,
}

/// One bar as returned by the provider, after the date has been derived
/// from the timestamp index.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<u64>,
}

/// A row of the output table. Every field but `ticker` is `None` on the
/// placeholder row emitted for tickers without any history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub date: Option<NaiveDate>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<u64>,
    pub ticker: String,
}

impl HistoryRow {
    pub fn placeholder(ticker: &str) -> Self {
        Self {
            date: None,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            ticker: ticker.to_string(),
        }
    }

    pub fn from_bar(ticker: &str, bar: PriceBar) -> Self {
        Self {
            date: Some(bar.date),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            ticker: ticker.to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.date.is_none()
    }
}

/// All rows fetched for a single ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerHistory {
    pub ticker: String,
    pub rows: Vec<HistoryRow>,
}

impl TickerHistory {
    /// Builds the row set for `ticker`. An empty series still yields one
    /// placeholder row so the ticker shows up in the output.
    pub fn from_bars(ticker: &str, bars: Vec<PriceBar>) -> Self {
        let rows = if bars.is_empty() {
            vec![HistoryRow::placeholder(ticker)]
        } else {
            bars.into_iter()
                .map(|bar| HistoryRow::from_bar(ticker, bar))
                .collect()
        };
        Self {
            ticker: ticker.to_string(),
            rows,
        }
    }

    pub fn is_empty_series(&self) -> bool {
        matches!(self.rows.as_slice(), [row] if row.is_placeholder())
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartError {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub meta: ChartMeta,
    /// Absent when the symbol exists but has no bars in the window.
    pub timestamp: Option<Vec<i64>>,
    pub indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    pub gmtoffset: i64,
    #[serde(alias = "exchangeTimezoneName", default)]
    pub exchange_timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
    #[serde(default)]
    pub adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub open: Vec<Option<Decimal>>,
    #[serde(default)]
    pub high: Vec<Option<Decimal>>,
    #[serde(default)]
    pub low: Vec<Option<Decimal>>,
    #[serde(default)]
    pub close: Vec<Option<Decimal>>,
    #[serde(default)]
    pub volume: Vec<Option<u64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdjClose {
    #[serde(default)]
    pub adjclose: Vec<Option<Decimal>>,
}
