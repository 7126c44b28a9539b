use std::{path::PathBuf, str::FromStr};

use anyhow::{bail, Context, Error, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::fs;
use ticker_history::{
    config::{Config, Settings},
    service::Service,
    types::Interval,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter};
use url::Url;

/// Download daily price history for every ticker in a firm-quarter file
#[derive(Parser, Debug, Default)]
struct Args {
    /// Directory that relative input and output paths are resolved against
    #[clap(short, long)]
    root: Option<PathBuf>,
    /// The firm-quarter CSV listing the tickers
    #[clap(short, long)]
    input: Option<PathBuf>,
    /// Where to write the concatenated histories
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// The first day of history to request
    #[clap(short, long)]
    start: Option<NaiveDate>,
    /// The bar width: 1d, 1wk or 1mo
    #[clap(long, value_parser = Interval::from_str)]
    interval: Option<Interval>,
    /// Report raw prices instead of split and dividend adjusted ones
    #[clap(long)]
    no_adjust: bool,
    /// Root of the price provider's API
    #[clap(long, env = "TICKER_HISTORY_BASE_URL")]
    base_url: Option<Url>,
    /// Name of the ticker column in the input file
    #[clap(long)]
    ticker_column: Option<String>,
    /// Name of the earnings-call date column in the input file
    #[clap(long)]
    date_column: Option<String>,
    /// Field delimiter of the input file
    #[clap(long)]
    delimiter: Option<char>,
    /// File path to a YAML, TOML or JSON settings file. Flags given on the
    /// command line win over values in the file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Also write logs to a daily rolling file in this folder
    #[clap(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(args.log_dir.clone());
    let config: Config = args.try_into()?;
    let service = Service::new(config)?;
    let summary = service.run().await?;
    info!(?summary, "Done");
    Ok(())
}

fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender =
                tracing_appender::rolling::daily(dir, "ticker-history.log");
            let (non_blocking, guard) =
                tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(non_blocking)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    guard
}

impl From<&Args> for Settings {
    fn from(args: &Args) -> Self {
        Self {
            root: args.root.clone(),
            input: args.input.clone(),
            output: args.output.clone(),
            start: args.start,
            interval: args.interval,
            auto_adjust: args.no_adjust.then_some(false),
            base_url: args.base_url.clone(),
            ticker_column: args.ticker_column.clone(),
            date_column: args.date_column.clone(),
            delimiter: args.delimiter,
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let settings = Settings::from(&args);
        let settings = match args.config {
            Some(path) => settings.or(parse_config(path)?),
            None => settings,
        };
        let config = settings
            .into_config(Utc::now())
            .context("Invalid settings")?;
        Ok(config)
    }
}

fn parse_config(path: PathBuf) -> Result<Settings, Error> {
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read file: {:?}", path))?;

    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("");

    match extension {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| "Failed to parse YAML"),
        "toml" => {
            toml::from_str(&contents).with_context(|| "Failed to parse TOML")
        }
        "json" => serde_json::from_str(&contents)
            .with_context(|| "Failed to parse JSON"),
        _ => {
            bail!("Unknown extension")
        }
    }
}
