use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    StatusCode,
};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    error::{self, Error},
    types::{ChartResponse, ChartResult, HistoryRequest, PriceBar},
};

// The chart endpoint rejects requests without a browser-like agent.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const NOT_FOUND_CODE: &str = "Not Found";

#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
    base_url: Url,
}

impl Client {
    pub fn new(base_url: Url) -> Result<Self, error::Init> {
        if base_url.cannot_be_a_base() {
            return Err(error::Init::InvalidBaseUrl(base_url.to_string()));
        }
        let headers = HeaderMap::from_iter([
            (header::USER_AGENT, HeaderValue::from_static(USER_AGENT)),
            (header::ACCEPT, HeaderValue::from_static("application/json")),
        ]);
        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(error::Init::ClientInitialization)?;
        Ok(Self { inner, base_url })
    }

    fn chart_url(&self, request: &HistoryRequest<'_>) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| error::Init::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", request.ticker]);
        url.query_pairs_mut()
            .append_pair("period1", &request.start.timestamp().to_string())
            .append_pair("period2", &request.end.timestamp().to_string())
            .append_pair("interval", &request.interval.to_string())
            .append_pair("includeAdjustedClose", "true");
        Ok(url)
    }

    /// Fetches the bars for one ticker. An unknown symbol or a window
    /// without trades comes back as an empty vector.
    #[instrument(skip_all, err, fields(ticker = %request.ticker))]
    pub async fn get_history(
        &self,
        request: &HistoryRequest<'_>,
    ) -> Result<Vec<PriceBar>, Error> {
        let url = self.chart_url(request)?;
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(Error::SendRequest)?;
        let status = response.status();
        // Unknown symbols are reported as 404 with a regular chart body.
        let response = if status == StatusCode::NOT_FOUND {
            response
        } else {
            response
                .error_for_status()
                .map_err(Error::UnexpectedStatus)?
        };
        let body = response.bytes().await.map_err(Error::ReadBody)?;
        let chart: ChartResponse = serde_json::from_slice(&body)?;
        let bars = into_bars(request, chart)?;
        debug!(status = %status, num_results = %bars.len(), "Got response");
        Ok(bars)
    }
}

fn into_bars(
    request: &HistoryRequest<'_>,
    response: ChartResponse,
) -> Result<Vec<PriceBar>, Error> {
    let ticker = request.ticker;
    if let Some(err) = response.chart.error {
        if err.code == NOT_FOUND_CODE {
            warn!(description = %err.description, "No data found for ticker");
            return Ok(Vec::new());
        }
        return Err(Error::Provider {
            ticker: ticker.to_string(),
            code: err.code,
            description: err.description,
        });
    }
    let result = response
        .chart
        .result
        .ok_or_else(|| malformed(ticker, "neither result nor error present"))?;
    let Some(result) = result.into_iter().next() else {
        return Ok(Vec::new());
    };
    parse_result(ticker, result, request.auto_adjust)
}

fn parse_result(
    ticker: &str,
    result: ChartResult,
    auto_adjust: bool,
) -> Result<Vec<PriceBar>, Error> {
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .unwrap_or_default()
        .adjclose;

    let n = timestamps.len();
    for (name, len) in [
        ("open", quote.open.len()),
        ("high", quote.high.len()),
        ("low", quote.low.len()),
        ("close", quote.close.len()),
        ("volume", quote.volume.len()),
    ] {
        if len != n {
            return Err(malformed(
                ticker,
                &format!("{name} has {len} values for {n} timestamps"),
            ));
        }
    }

    let offset = result.meta.gmtoffset;
    let timezone = result
        .meta
        .exchange_timezone_name
        .as_deref()
        .and_then(|name| name.parse::<Tz>().ok());
    debug!(
        timezone = ?result.meta.exchange_timezone_name,
        offset,
        num_timestamps = n,
        "Parsing bars"
    );
    if timezone.is_none() {
        warn!(offset, "Unknown exchange timezone, using fixed offset");
    }
    let mut bars = Vec::with_capacity(n);
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = local_date(ts, timezone, offset)
            .ok_or_else(|| malformed(ticker, &format!("invalid timestamp {ts}")))?;
        let mut bar = PriceBar {
            date,
            open: quote.open[i],
            high: quote.high[i],
            low: quote.low[i],
            close: quote.close[i],
            volume: quote.volume[i],
        };
        // Rows the exchange did not trade on come back entirely null.
        if bar.open.is_none()
            && bar.high.is_none()
            && bar.low.is_none()
            && bar.close.is_none()
            && bar.volume.is_none()
        {
            continue;
        }
        if auto_adjust {
            adjust(&mut bar, adjclose.get(i).copied().flatten());
        }
        bars.push(bar);
    }
    Ok(bars)
}

/// Calendar day of `ts` at the exchange. The named timezone tracks daylight
/// saving across the history; `offset` is only the exchange's current one.
fn local_date(ts: i64, timezone: Option<Tz>, offset: i64) -> Option<NaiveDate> {
    match timezone {
        Some(tz) => tz.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive()),
        None => DateTime::from_timestamp(ts.checked_add(offset)?, 0)
            .map(|dt| dt.date_naive()),
    }
}

/// Rescales the bar so that `close` becomes the dividend and split
/// adjusted close. Leaves the bar untouched without a usable ratio.
fn adjust(bar: &mut PriceBar, adjclose: Option<Decimal>) {
    let Some(ratio) = adjclose
        .zip(bar.close)
        .and_then(|(adj, close)| adj.checked_div(close))
    else {
        return;
    };
    let scale = |price: Option<Decimal>| {
        price.and_then(|p| p.checked_mul(ratio)).map(|p| p.round_dp(6))
    };
    bar.open = scale(bar.open);
    bar.high = scale(bar.high);
    bar.low = scale(bar.low);
    bar.close = adjclose;
}

fn malformed(ticker: &str, reason: &str) -> Error {
    Error::MalformedResponse {
        ticker: ticker.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use mockito::Matcher;

    use super::*;
    use crate::types::{HistoryRequestBuilder, Interval};

    const TWO_DAYS: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"AAA","gmtoffset":-14400,"exchangeTimezoneName":"America/New_York"},
        "timestamp":[1609770600,1609857000],
        "indicators":{
            "quote":[{"open":[10.0,11.0],"high":[12.0,12.5],"low":[9.5,10.5],"close":[11.0,12.0],"volume":[1000,2000]}],
            "adjclose":[{"adjclose":[5.5,6.0]}]
        }}],"error":null}}"#;

    fn request(ticker: &str, auto_adjust: bool) -> HistoryRequest<'_> {
        HistoryRequestBuilder::default()
            .ticker(ticker)
            .interval(Interval::Day)
            .start(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .end(Utc.with_ymd_and_hms(2021, 4, 18, 13, 46, 53).unwrap())
            .auto_adjust(auto_adjust)
            .build()
            .unwrap()
    }

    fn parse(body: &str, auto_adjust: bool) -> Result<Vec<PriceBar>, Error> {
        into_bars(
            &request("AAA", auto_adjust),
            serde_json::from_str(body).unwrap(),
        )
    }

    fn client(server: &mockito::ServerGuard) -> Client {
        Client::new(Url::parse(&server.url()).unwrap()).unwrap()
    }

    #[test]
    fn dates_follow_exchange_offset() {
        let bars = parse(TWO_DAYS, false).unwrap();
        let dates: Vec<_> = bars.iter().map(|b| b.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
                NaiveDate::from_ymd_opt(2021, 1, 5).unwrap(),
            ]
        );
        assert_eq!(bars[0].open, Some(Decimal::new(10, 0)));
        assert_eq!(bars[1].volume, Some(2000));
    }

    #[test]
    fn dates_use_the_offset_in_effect_on_the_day() {
        // 23:30 EST on Jan 3rd, while the exchange currently sits at EDT.
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":-14400,"exchangeTimezoneName":"America/New_York"},
            "timestamp":[1609734600],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[1]}]}
        }],"error":null}}"#;
        let bars = parse(body, false).unwrap();
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2021, 1, 3).unwrap());
    }

    #[test]
    fn unknown_timezone_falls_back_to_offset() {
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":3600,"exchangeTimezoneName":"Mars/Olympus_Mons"},
            "timestamp":[1609801200],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[1]}]}
        }],"error":null}}"#;
        let bars = parse(body, false).unwrap();
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
    }

    #[test]
    fn out_of_range_timestamp_is_malformed() {
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":3600},
            "timestamp":[9223372036854775807],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[1]}]}
        }],"error":null}}"#;
        assert!(matches!(
            parse(body, false),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn auto_adjust_rescales_prices() {
        let bars = parse(TWO_DAYS, true).unwrap();
        assert_eq!(bars[0].close, Some(Decimal::new(55, 1)));
        assert_eq!(bars[0].open, Some(Decimal::new(5, 0)));
        assert_eq!(bars[0].high, Some(Decimal::new(6, 0)));
        assert_eq!(bars[0].volume, Some(1000));
    }

    #[test]
    fn all_null_rows_are_dropped() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},
            "timestamp":[1609770600,1609857000],
            "indicators":{"quote":[{"open":[null,11.0],"high":[null,12.5],"low":[null,10.5],"close":[null,12.0],"volume":[null,2000]}]}
        }],"error":null}}"#;
        let bars = parse(body, true).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, Some(Decimal::new(12, 0)));
    }

    #[test]
    fn missing_timestamps_mean_no_data() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse(body, true).unwrap().is_empty());
    }

    #[test]
    fn mismatched_lengths_are_malformed() {
        let body = r#"{"chart":{"result":[{"timestamp":[1609770600,1609857000],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[1]}]}
        }],"error":null}}"#;
        assert!(matches!(
            parse(body, true),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn provider_errors_are_fatal() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        assert!(matches!(
            parse(body, true),
            Err(Error::Provider { code, .. }) if code == "Bad Request"
        ));
    }

    #[tokio::test]
    async fn requests_the_chart_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v8/finance/chart/AAA")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("period1".into(), "946684800".into()),
                Matcher::UrlEncoded("period2".into(), "1618753613".into()),
                Matcher::UrlEncoded("interval".into(), "1d".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TWO_DAYS)
            .create_async()
            .await;

        let bars = client(&server)
            .get_history(&request("AAA", true))
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_empty_series() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v8/finance/chart/ZZZ")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#)
            .create_async()
            .await;

        let bars = client(&server)
            .get_history(&request("ZZZ", true))
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn server_errors_abort() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v8/finance/chart/AAA")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server)
            .get_history(&request("AAA", true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus(_)));
    }
}
