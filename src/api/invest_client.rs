use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::{Config, FundamentalRatios, Instrument, PriceBar};

use super::{ApiRateLimiter, MarketDataProvider};

const INSTRUMENTS_SERVICE: &str = "tinkoff.public.invest.api.contract.v1.InstrumentsService";
const MARKET_DATA_SERVICE: &str = "tinkoff.public.invest.api.contract.v1.MarketDataService";

/// Main trading board for shares on the exchange
const MAIN_BOARD: &str = "TQBR";

/// Price quotation split into integer units and nanoseconds of a unit.
/// The REST gateway serializes the 64-bit units field as a string.
#[derive(Debug, Default, Deserialize)]
struct Quotation {
    #[serde(default)]
    units: String,
    #[serde(default)]
    nano: i64,
}

impl Quotation {
    /// Convert to a plain price, rounded to two decimal places
    fn to_price(&self) -> f64 {
        let units: f64 = self.units.parse().unwrap_or(0.0);
        let price = units + self.nano as f64 / 1_000_000_000.0;
        (price * 100.0).round() / 100.0
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareItem {
    ticker: String,
    figi: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    asset_uid: String,
    #[serde(default)]
    class_code: String,
    #[serde(default)]
    for_qual_investor_flag: bool,
}

#[derive(Debug, Deserialize)]
struct SharesResponse {
    #[serde(default)]
    instruments: Vec<ShareItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandleItem {
    time: String,
    close: Quotation,
    #[serde(default)]
    is_complete: bool,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<CandleItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundamentalItem {
    pe_ratio_ttm: Option<f64>,
    price_to_book_ttm: Option<f64>,
    roe: Option<f64>,
    one_year_annual_revenue_growth_rate: Option<f64>,
    dividend_yield_daily_ttm: Option<f64>,
    total_debt_to_equity_mrq: Option<f64>,
    beta: Option<f64>,
    price_to_free_cash_flow_ttm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FundamentalsResponse {
    #[serde(default)]
    fundamentals: Vec<FundamentalItem>,
}

/// REST client for the broker's Invest API
pub struct InvestApiClient {
    client: Client,
    base_url: String,
    token: String,
    rate_limiter: ApiRateLimiter,
}

impl InvestApiClient {
    /// Create a new Invest API client
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("stock-screener/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    /// POST one service call and decode the JSON response. Every Invest
    /// API method is an HTTP POST against `<base>/<Service>/<Method>`.
    async fn call<T: DeserializeOwned>(&self, service: &str, method: &str, body: Value) -> Result<T> {
        self.rate_limiter.wait().await;

        let url = format!("{}/{}/{}", self.base_url, service, method);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Invest API request failed: {} - {}", status, text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketDataProvider for InvestApiClient {
    async fn list_instruments(&self) -> Result<Vec<Instrument>> {
        let response: SharesResponse = self
            .call(
                INSTRUMENTS_SERVICE,
                "Shares",
                json!({ "instrumentStatus": "INSTRUMENT_STATUS_BASE" }),
            )
            .await?;

        let instruments = response
            .instruments
            .into_iter()
            .filter(|share| share.class_code == MAIN_BOARD && !share.for_qual_investor_flag)
            .map(|share| Instrument {
                ticker: share.ticker,
                name: share.name,
                figi: share.figi,
                asset_uid: share.asset_uid,
            })
            .collect();

        Ok(instruments)
    }

    async fn get_candles(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let response: CandlesResponse = self
            .call(
                MARKET_DATA_SERVICE,
                "GetCandles",
                json!({
                    "figi": instrument.figi,
                    "from": format!("{}T00:00:00Z", from),
                    "to": format!("{}T23:59:59Z", to),
                    "interval": "CANDLE_INTERVAL_DAY",
                }),
            )
            .await?;

        let mut bars = Vec::with_capacity(response.candles.len());
        for candle in response.candles {
            if !candle.is_complete {
                continue;
            }
            let date = candle
                .time
                .get(..10)
                .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
                .ok_or_else(|| {
                    anyhow!("unparseable candle timestamp for {}: {}", instrument.ticker, candle.time)
                })?;
            bars.push(PriceBar { date, close: candle.close.to_price() });
        }

        Ok(bars)
    }

    async fn get_fundamentals(
        &self,
        instrument: &Instrument,
    ) -> Result<Option<FundamentalRatios>> {
        let response: FundamentalsResponse = self
            .call(
                INSTRUMENTS_SERVICE,
                "GetAssetFundamentals",
                json!({ "assets": [instrument.asset_uid] }),
            )
            .await?;

        Ok(response.fundamentals.into_iter().next().map(|item| FundamentalRatios {
            pe_ttm: item.pe_ratio_ttm,
            pb_ttm: item.price_to_book_ttm,
            roe: item.roe,
            revenue_growth_yoy: item.one_year_annual_revenue_growth_rate,
            div_yield: item.dividend_yield_daily_ttm,
            debt_to_equity: item.total_debt_to_equity_mrq,
            beta: item.beta,
            fcf_yield: item.price_to_free_cash_flow_ttm,
        }))
    }
}
