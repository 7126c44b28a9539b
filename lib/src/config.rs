use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::{
    error::{self, Error},
    types::Interval,
};

pub const DEFAULT_INPUT: &str = "data/format/firmquarter_2020q4.csv";
pub const DEFAULT_OUTPUT: &str = "data/format/yfinance_stock_histories.csv";
pub const DEFAULT_START: &str = "2000-01-01";
pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
pub const DEFAULT_TICKER_COLUMN: &str = "ticker";
pub const DEFAULT_DATE_COLUMN: &str = "date_earningscall";

/// Optional overrides, read from a settings file or the command line.
/// Anything left unset falls back to the built-in defaults.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory that relative input and output paths are resolved against.
    pub root: Option<PathBuf>,
    /// The firm-quarter file listing the tickers.
    pub input: Option<PathBuf>,
    /// Where the concatenated histories are written.
    pub output: Option<PathBuf>,
    /// First day of history to request.
    pub start: Option<NaiveDate>,
    pub interval: Option<Interval>,
    /// Whether prices are adjusted for splits and dividends.
    pub auto_adjust: Option<bool>,
    pub base_url: Option<Url>,
    pub ticker_column: Option<String>,
    pub date_column: Option<String>,
    pub delimiter: Option<char>,
}

impl Settings {
    /// Fills every unset field of `self` from `fallback`.
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            root: self.root.or(fallback.root),
            input: self.input.or(fallback.input),
            output: self.output.or(fallback.output),
            start: self.start.or(fallback.start),
            interval: self.interval.or(fallback.interval),
            auto_adjust: self.auto_adjust.or(fallback.auto_adjust),
            base_url: self.base_url.or(fallback.base_url),
            ticker_column: self.ticker_column.or(fallback.ticker_column),
            date_column: self.date_column.or(fallback.date_column),
            delimiter: self.delimiter.or(fallback.delimiter),
        }
    }

    /// Resolves the settings into a [`Config`] whose window ends at `end`.
    pub fn into_config(self, end: DateTime<Utc>) -> Result<Config, Error> {
        let start = match self.start {
            Some(start) => start,
            None => DEFAULT_START.parse::<NaiveDate>().map_err(|_| {
                error::Validation::InvalidDate(DEFAULT_START.to_string())
            })?,
        };
        let start = start.and_time(NaiveTime::MIN).and_utc();
        if start >= end {
            return Err(error::Validation::EmptyWindow {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }

        let delimiter = self.delimiter.unwrap_or(',');
        if !delimiter.is_ascii() {
            return Err(error::Validation::InvalidDelimiter(delimiter).into());
        }

        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL)?,
        };
        if base_url.cannot_be_a_base() {
            return Err(error::Init::InvalidBaseUrl(base_url.to_string()).into());
        }

        Ok(Config {
            root: self.root.unwrap_or_else(|| PathBuf::from(".")),
            input: self.input.unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)),
            output: self
                .output
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            start,
            end,
            interval: self.interval.unwrap_or_default(),
            auto_adjust: self.auto_adjust.unwrap_or(true),
            base_url,
            ticker_column: self
                .ticker_column
                .unwrap_or_else(|| DEFAULT_TICKER_COLUMN.to_string()),
            date_column: self
                .date_column
                .unwrap_or_else(|| DEFAULT_DATE_COLUMN.to_string()),
            delimiter: delimiter as u8,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Directory that relative `input` and `output` paths resolve against.
    pub root: PathBuf,
    /// The firm-quarter file listing the tickers.
    pub input: PathBuf,
    /// Where the concatenated histories are written.
    pub output: PathBuf,
    /// The starting date to pull data from
    pub start: DateTime<Utc>,
    /// The instant to pull data up to, captured once per run
    pub end: DateTime<Utc>,
    /// The bar width for each row.
    pub interval: Interval,
    pub auto_adjust: bool,
    /// Root of the price provider's API.
    pub base_url: Url,
    pub ticker_column: String,
    pub date_column: String,
    pub delimiter: u8,
}

impl Config {
    pub fn input_path(&self) -> PathBuf {
        self.root.join(&self.input)
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2021-04-18T13:46:53Z".parse().unwrap()
    }

    #[test]
    fn defaults_match_the_batch_constants() {
        let config = Settings::default().into_config(now()).unwrap();
        assert_eq!(config.input_path(), PathBuf::from(".").join(DEFAULT_INPUT));
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(config.start.to_string(), "2000-01-01 00:00:00 UTC");
        assert_eq!(config.end, now());
        assert_eq!(config.interval, Interval::Day);
        assert!(config.auto_adjust);
        assert_eq!(config.base_url.as_str(), "https://query2.finance.yahoo.com/");
        assert_eq!(config.ticker_column, "ticker");
        assert_eq!(config.date_column, "date_earningscall");
        assert_eq!(config.delimiter, b',');
    }

    #[test]
    fn paths_resolve_against_root() {
        let config = Settings {
            root: Some(PathBuf::from("/data/project")),
            output: Some(PathBuf::from("/tmp/out.csv")),
            ..Default::default()
        }
        .into_config(now())
        .unwrap();
        assert_eq!(
            config.input_path(),
            PathBuf::from("/data/project/data/format/firmquarter_2020q4.csv")
        );
        assert_eq!(config.output_path(), PathBuf::from("/tmp/out.csv"));
    }

    #[test]
    fn earlier_settings_take_precedence() {
        let cli = Settings {
            start: NaiveDate::from_ymd_opt(2010, 1, 1),
            ..Default::default()
        };
        let file = Settings {
            start: NaiveDate::from_ymd_opt(2015, 1, 1),
            ticker_column: Some("symbol".to_string()),
            ..Default::default()
        };
        let merged = cli.or(file);
        assert_eq!(merged.start, NaiveDate::from_ymd_opt(2010, 1, 1));
        assert_eq!(merged.ticker_column.as_deref(), Some("symbol"));
    }

    #[test]
    fn start_after_end_is_rejected() {
        let err = Settings {
            start: NaiveDate::from_ymd_opt(2022, 1, 1),
            ..Default::default()
        }
        .into_config(now())
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(error::Validation::EmptyWindow { .. })
        ));
    }

    #[test]
    fn multibyte_delimiter_is_rejected() {
        let err = Settings {
            delimiter: Some('§'),
            ..Default::default()
        }
        .into_config(now())
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(error::Validation::InvalidDelimiter('§'))
        ));
    }

    #[test]
    fn non_base_url_is_rejected() {
        let err = Settings {
            base_url: Some(Url::parse("mailto:prices@example.com").unwrap()),
            ..Default::default()
        }
        .into_config(now())
        .unwrap_err();
        assert!(matches!(err, Error::Init(error::Init::InvalidBaseUrl(_))));
    }
}
