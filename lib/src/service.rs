use crate::{
    client::Client,
    config::Config,
    error::Error,
    source::{self, SourceColumns},
    table::HistoryTable,
    types::{HistoryRequestBuilder, TickerHistory},
};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, instrument};

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub num_tickers: usize,
    pub num_rows: usize,
    /// Tickers that only got a placeholder row.
    pub num_empty: usize,
}

pub struct Service {
    client: Client,
    config: Config,
}

impl Service {
    pub fn new(config: Config) -> Result<Self, Error> {
        let client = Client::new(config.base_url.clone())?;
        Ok(Self { client, config })
    }

    /// Loads the tickers, fetches every history in turn and writes the
    /// concatenated table. The first failure aborts the run.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<Summary, Error> {
        info!(
            input = %self.config.input_path().display(),
            output = %self.config.output_path().display(),
            interval = %self.config.interval,
            from = %self.config.start,
            to = %self.config.end,
            "Starting to fetch histories..."
        );
        let columns = SourceColumns {
            ticker: &self.config.ticker_column,
            date: &self.config.date_column,
            delimiter: self.config.delimiter,
        };
        let list =
            source::load_tickers(&self.config.input_path(), &columns).await?;
        let table = self.fetch_histories(&list.tickers).await?;
        table.write_csv(&self.config.output_path())?;

        let summary = Summary {
            num_tickers: table.num_tickers(),
            num_rows: table.len(),
            num_empty: table.num_empty(),
        };
        info!(
            num_tickers = summary.num_tickers,
            num_rows = summary.num_rows,
            num_empty = summary.num_empty,
            "Finished fetching histories!"
        );
        Ok(summary)
    }

    /// Fetches each ticker one after another, in order, and concatenates
    /// the results.
    #[instrument(skip_all, err, fields(num_tickers = tickers.len()))]
    pub async fn fetch_histories(
        &self,
        tickers: &[String],
    ) -> Result<HistoryTable, Error> {
        let progress_bar =
            ProgressBar::new(tickers.len() as u64).with_style(style());
        let table = stream::iter(tickers)
            .then(|ticker| {
                let pb = progress_bar.clone();
                async move {
                    pb.set_message(ticker.clone());
                    let history = self.fetch_history(ticker).await;
                    pb.inc(1);
                    history
                }
            })
            .try_fold(HistoryTable::default(), |mut table, history| async move {
                table.push(history);
                Ok::<_, Error>(table)
            })
            .await?;
        progress_bar.finish();
        Ok(table)
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_history(
        &self,
        ticker: &str,
    ) -> Result<TickerHistory, Error> {
        info!("Fetching history for ticker");
        let request = HistoryRequestBuilder::default()
            .ticker(ticker)
            .interval(self.config.interval)
            .start(self.config.start)
            .end(self.config.end)
            .auto_adjust(self.config.auto_adjust)
            .build()?;
        let bars = self.client.get_history(&request).await?;
        let history = TickerHistory::from_bars(ticker, bars);
        info!(num_rows = history.rows.len(), "Finished fetching history for ticker");
        Ok(history)
    }
}

fn style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed}] {bar:40.cyan/blue} {pos:>4}/{len:4} {percent}% {msg}",
    )
    .expect("always valid if tests pass")
}
