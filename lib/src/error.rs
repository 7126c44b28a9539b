use displaydoc::Display;
use thiserror::Error;

use crate::types::HistoryRequestBuilderError;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// Init error: {0}
    Init(#[from] Init),
    /// Invalid configuration: {0}
    Validation(#[from] Validation),
    /// Failed to load tickers: {0}
    Source(#[from] Source),
    /// Io: {0}
    File(#[from] FileIo),
    /// URL is not valid
    InvalidUrl(#[from] url::ParseError),
    /// Error sending request: {0}
    SendRequest(reqwest::Error),
    /// Failed to read response body: {0}
    ReadBody(reqwest::Error),
    /// Unexpected status code: {0}
    UnexpectedStatus(reqwest::Error),
    /// Failed to deserialize response: {0}
    Serde(#[from] serde_json::Error),
    /// Provider returned an error for {ticker}: {code}: {description}
    Provider {
        ticker: String,
        code: String,
        description: String,
    },
    /// Malformed response for {ticker}: {reason}
    MalformedResponse { ticker: String, reason: String },
    /// Invalid history request: {0}
    InvalidRequest(#[from] HistoryRequestBuilderError),
}

#[derive(Debug, Display, Error)]
pub enum Init {
    /// Failed to initialize the client: {0}
    ClientInitialization(reqwest::Error),
    /// Invalid base URL: {0}
    InvalidBaseUrl(String),
}

#[derive(Debug, Display, Error)]
pub enum Validation {
    /// Start date {start} is not before end {end}
    EmptyWindow { start: String, end: String },
    /// Delimiter must be a single byte, got '{0}'
    InvalidDelimiter(char),
    /// Invalid date {0}
    InvalidDate(String),
}

#[derive(Debug, Display, Error)]
pub enum Source {
    /// Error opening {path}: {source}
    Open {
        path: String,
        source: std::io::Error,
    },
    /// Error reading CSV: {0}
    Csv(#[from] csv::Error),
    /// Column `{column}` is missing from {path}
    MissingColumn { column: String, path: String },
    /// Unparseable date "{value}" in column `{column}` on line {line}
    InvalidDate {
        column: String,
        value: String,
        line: u64,
    },
}

#[derive(Debug, Display, Error)]
pub enum FileIo {
    /// Error writing CSV: {0}
    Csv(#[from] csv::Error),
    /// Error writing file: {0}
    FileWrite(std::io::Error),
    /// Error creating file {path}: {source}
    CreateFile {
        path: String,
        source: std::io::Error,
    },
}
