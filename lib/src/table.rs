use std::{fs::File, path::Path};

use chrono::NaiveDate;
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    error,
    types::{HistoryRow, TickerHistory},
};

/// The concatenation of every ticker's rows, in the order the tickers were
/// processed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HistoryTable {
    rows: Vec<HistoryRow>,
    num_tickers: usize,
    num_empty: usize,
}

const HEADER: [&str; 8] =
    ["", "date", "open", "high", "low", "close", "volume", "ticker"];

/// A row as it appears on disk. The unnamed first column is the row's
/// position in the table.
#[derive(Serialize)]
struct Record<'a> {
    #[serde(rename = "")]
    index: usize,
    date: Option<NaiveDate>,
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    volume: Option<u64>,
    ticker: &'a str,
}

impl HistoryTable {
    pub fn push(&mut self, history: TickerHistory) {
        self.num_tickers += 1;
        if history.is_empty_series() {
            self.num_empty += 1;
        }
        self.rows.extend(history.rows);
    }

    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_tickers(&self) -> usize {
        self.num_tickers
    }

    /// Number of tickers represented only by a placeholder row.
    pub fn num_empty(&self) -> usize {
        self.num_empty
    }

    /// Writes the table as CSV to `path`, replacing any existing file.
    /// The parent directory must already exist.
    #[instrument(skip_all, err, fields(path = %path.display(), num_rows = self.rows.len()))]
    pub fn write_csv(&self, path: &Path) -> Result<(), error::FileIo> {
        let file = File::create(path).map_err(|source| {
            error::FileIo::CreateFile {
                path: path.display().to_string(),
                source,
            }
        })?;
        // Written up front so an empty table still carries the columns.
        let mut writer =
            WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(HEADER)?;
        for (index, row) in self.rows.iter().enumerate() {
            writer.serialize(Record {
                index,
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                ticker: &row.ticker,
            })?;
        }
        writer.flush().map_err(error::FileIo::FileWrite)?;
        debug!("Wrote histories");
        Ok(())
    }
}

impl FromIterator<TickerHistory> for HistoryTable {
    fn from_iter<I: IntoIterator<Item = TickerHistory>>(iter: I) -> Self {
        let mut table = Self::default();
        for history in iter {
            table.push(history);
        }
        table
    }
}
