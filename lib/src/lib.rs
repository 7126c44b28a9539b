//! Downloads daily price history for every ticker listed in a firm-quarter
//! file and writes it out as a single CSV.

pub mod client;
pub mod config;
pub mod error;
pub mod service;
pub mod source;
pub mod table;
pub mod types;
