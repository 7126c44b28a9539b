use std::{collections::HashSet, path::Path};

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use tracing::{debug, info, instrument};

use crate::error;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Which columns of the firm-quarter file to read.
#[derive(Debug, Clone)]
pub struct SourceColumns<'a> {
    pub ticker: &'a str,
    pub date: &'a str,
    pub delimiter: u8,
}

/// The distinct tickers found in a firm-quarter file.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerList {
    /// Unique tickers, in the order they first appear.
    pub tickers: Vec<String>,
    /// Earliest earnings-call date in the file, if any row has one.
    pub earliest_date: Option<NaiveDate>,
}

/// Reads the firm-quarter file at `path` and returns its distinct non-empty
/// tickers. Fails as a whole if any date in the date column is malformed.
#[instrument(skip_all, err, fields(path = %path.display()))]
pub async fn load_tickers(
    path: &Path,
    columns: &SourceColumns<'_>,
) -> Result<TickerList, error::Source> {
    let contents =
        tokio::fs::read(path)
            .await
            .map_err(|source| error::Source::Open {
                path: path.display().to_string(),
                source,
            })?;
    let list = parse_tickers(&contents, columns, &path.display().to_string())?;
    info!(
        num_tickers = list.tickers.len(),
        earliest_date = ?list.earliest_date,
        "Loaded tickers"
    );
    Ok(list)
}

/// Ticker values are trimmed before the blank check and dedup, so `" AAA "`
/// and `"AAA"` count as the same ticker.
fn parse_tickers(
    contents: &[u8],
    columns: &SourceColumns<'_>,
    origin: &str,
) -> Result<TickerList, error::Source> {
    let mut reader = ReaderBuilder::new()
        .delimiter(columns.delimiter)
        .from_reader(contents);
    let headers = reader.headers()?.clone();
    let column_index = |name: &str| {
        headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
            error::Source::MissingColumn {
                column: name.to_string(),
                path: origin.to_string(),
            }
        })
    };
    let ticker_idx = column_index(columns.ticker)?;
    let date_idx = column_index(columns.date)?;

    let mut seen = HashSet::new();
    let mut tickers = Vec::new();
    let mut earliest_date: Option<NaiveDate> = None;
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let raw_date = record.get(date_idx).unwrap_or_default().trim();
        if !raw_date.is_empty() {
            let date = parse_date(raw_date).ok_or_else(|| {
                error::Source::InvalidDate {
                    column: columns.date.to_string(),
                    value: raw_date.to_string(),
                    line,
                }
            })?;
            earliest_date = Some(earliest_date.map_or(date, |d| d.min(date)));
        }

        let ticker = record.get(ticker_idx).unwrap_or_default().trim();
        if ticker.is_empty() {
            debug!(line, "Skipping row without a ticker");
            continue;
        }
        if seen.insert(ticker.to_string()) {
            tickers.push(ticker.to_string());
        }
    }

    Ok(TickerList {
        tickers,
        earliest_date,
    })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|fmt| {
                NaiveDateTime::parse_from_str(value, fmt)
                    .ok()
                    .map(|dt| dt.date())
            })
        })
}
