use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use url::Url;

use super::{PriceFetchError, PriceSource};
use crate::config::PriceSettings;

#[derive(Debug, Deserialize)]
struct SimplePrice {
    #[serde(default)]
    usd: Option<f64>,
}

/// CoinGecko `simple/price` client.
#[derive(Debug, Clone)]
pub struct CoinGeckoApi {
    http_client: Client,
    endpoint: Url,
}

impl CoinGeckoApi {
    pub fn new(settings: &PriceSettings, user_agent: &str) -> Result<Self> {
        let endpoint = Url::parse(&settings.api_url)
            .with_context(|| format!("Invalid price oracle url {}", settings.api_url))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client for price oracle")?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    fn request_url(&self, ids: &[String]) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("vs_currencies", "usd");
        url
    }
}

#[async_trait]
impl PriceSource for CoinGeckoApi {
    async fn fetch_prices(&self, ids: &[String]) -> Result<FxHashMap<String, f64>, PriceFetchError> {
        let url = self.request_url(ids);
        debug!("Fetching prices: {}", url);

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!(e).context("price request failed"))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceFetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(anyhow!("price oracle returned HTTP {}", status).into());
        }

        let body = response
            .json::<FxHashMap<String, SimplePrice>>()
            .await
            .map_err(|e| anyhow!(e).context("undecodable price response"))?;

        Ok(positive_prices(body))
    }
}

fn positive_prices(body: FxHashMap<String, SimplePrice>) -> FxHashMap<String, f64> {
    body.into_iter()
        .filter_map(|(id, price)| {
            price
                .usd
                .filter(|usd| usd.is_finite() && *usd > 0.0)
                .map(|usd| (id, usd))
        })
        .collect()
}
