use std::{collections::BTreeMap, sync::Arc, time::Duration};

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::{
    api::{PriceFetchError, PriceSource},
    config::PriceSettings,
};

/// Lifecycle of a [`PriceCache`]. Once fetched (either way) it is never fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStatus {
    Unfetched,
    FetchedOk,
    FetchedFailed,
}

/// Synchronous symbol → USD price lookup.
pub trait PriceLookup {
    /// `None` when the symbol has no positive price.
    fn price(&self, symbol: &str) -> Option<f64>;
}

impl PriceLookup for FxHashMap<String, f64> {
    fn price(&self, symbol: &str) -> Option<f64> {
        self.get(symbol)
            .or_else(|| self.get(&symbol.to_uppercase()))
            .copied()
            .filter(|price| *price > 0.0)
    }
}

/// Per-run memo of reward token prices.
///
/// All known symbols are priced in a single batch request on first use.
/// Several symbols may share an oracle id; each id is requested once and
/// its price fanned out to every symbol mapped to it.
pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    oracle_ids: BTreeMap<String, String>,
    max_retries: u32,
    retry_base_delay: Duration,
    prices: FxHashMap<String, f64>,
    status: PriceStatus,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>, settings: &PriceSettings) -> Self {
        Self::with_retry(
            source,
            settings.oracle_ids.clone(),
            settings.max_retries,
            Duration::from_secs(settings.retry_base_delay_secs),
        )
    }

    pub fn with_retry(
        source: Arc<dyn PriceSource>,
        oracle_ids: BTreeMap<String, String>,
        max_retries: u32,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            source,
            oracle_ids,
            max_retries,
            retry_base_delay,
            prices: FxHashMap::default(),
            status: PriceStatus::Unfetched,
        }
    }

    pub fn status(&self) -> PriceStatus {
        self.status
    }

    /// Price of `symbol`, fetching the batch first if this is the first lookup.
    pub async fn get_price(&mut self, symbol: &str) -> Option<f64> {
        self.ensure_loaded().await;
        self.price(symbol)
    }

    /// Perform the batch fetch unless one already happened.
    pub async fn ensure_loaded(&mut self) {
        if self.status != PriceStatus::Unfetched {
            return;
        }
        self.status = self.fetch_all().await;
    }

    /// Unique oracle ids, sorted.
    fn unique_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.oracle_ids.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    async fn fetch_all(&mut self) -> PriceStatus {
        let ids = self.unique_ids();
        if ids.is_empty() {
            warn!("No oracle ids configured, reward tokens will be unpriced");
            return PriceStatus::FetchedFailed;
        }

        for attempt in 0..self.max_retries {
            match self.source.fetch_prices(&ids).await {
                Ok(by_id) => {
                    self.fan_out(&by_id);
                    info!("Fetched prices for {} symbols", self.prices.len());
                    return PriceStatus::FetchedOk;
                },
                Err(PriceFetchError::RateLimited) if attempt + 1 < self.max_retries => {
                    let delay = backoff_delay(self.retry_base_delay, attempt);
                    warn!(
                        "Price oracle rate limited (attempt {}/{}), retrying in {:?}",
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    warn!("Batch price fetch failed: {}", e);
                    break;
                },
            }
        }

        PriceStatus::FetchedFailed
    }

    fn fan_out(&mut self, by_id: &FxHashMap<String, f64>) {
        for (symbol, id) in &self.oracle_ids {
            if let Some(price) = by_id.get(id).copied().filter(|p| *p > 0.0) {
                self.prices.insert(symbol.clone(), price);
            }
        }
    }
}

/// `base * 2^attempt`, saturating instead of overflowing for large attempt counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

impl PriceLookup for PriceCache {
    /// Exact symbol first, then its uppercase form.
    fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.price(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    /// Replays scripted responses and records each request's ids.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<FxHashMap<String, f64>, PriceFetchError>>>,
        calls: AtomicUsize,
        requested: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<FxHashMap<String, f64>, PriceFetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_prices(
            &self,
            ids: &[String],
        ) -> Result<FxHashMap<String, f64>, PriceFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(ids.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted").into()))
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> FxHashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn cache_for(source: Arc<ScriptedSource>, max_retries: u32) -> PriceCache {
        PriceCache::with_retry(
            source,
            PriceSettings::default().oracle_ids,
            max_retries,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_shared_oracle_id_fans_out() {
        let source = ScriptedSource::new(vec![Ok(prices(&[
            ("optimism", 1.8),
            ("balancer", 2.0),
            ("aura-finance", 0.0),
        ]))]);
        let mut cache = cache_for(source.clone(), 3);

        assert_eq!(cache.status(), PriceStatus::Unfetched);
        assert_eq!(cache.get_price("OP").await, Some(1.8));
        assert_eq!(cache.get_price("axlOP").await, Some(1.8));
        assert_eq!(cache.get_price("BAL").await, Some(2.0));
        // Zero price counts as missing.
        assert_eq!(cache.get_price("AURA").await, None);
        assert_eq!(cache.get_price("UNKNOWN").await, None);

        assert_eq!(cache.status(), PriceStatus::FetchedOk);
        assert_eq!(source.calls(), 1);

        let requested = source.requested.lock().unwrap()[0].clone();
        assert_eq!(requested.iter().filter(|id| *id == "optimism").count(), 1);
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_uppercase() {
        let source = ScriptedSource::new(vec![Ok(prices(&[("balancer", 2.0)]))]);
        let mut cache = cache_for(source, 3);

        assert_eq!(cache.get_price("bal").await, Some(2.0));
        // "axlOP" is stored as-is, so lowercasing it finds nothing.
        assert_eq!(cache.get_price("axlop").await, None);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_succeeds() {
        let source = ScriptedSource::new(vec![
            Err(PriceFetchError::RateLimited),
            Err(PriceFetchError::RateLimited),
            Ok(prices(&[("balancer", 2.0)])),
        ]);
        let mut cache = cache_for(source.clone(), 3);

        assert_eq!(cache.get_price("BAL").await, Some(2.0));
        assert_eq!(source.calls(), 3);
        assert_eq!(cache.status(), PriceStatus::FetchedOk);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_failed_and_never_refetch() {
        let source = ScriptedSource::new(vec![
            Err(PriceFetchError::RateLimited),
            Err(PriceFetchError::RateLimited),
            Err(PriceFetchError::RateLimited),
            Ok(prices(&[("balancer", 2.0)])),
        ]);
        let mut cache = cache_for(source.clone(), 3);

        assert_eq!(cache.get_price("BAL").await, None);
        assert_eq!(cache.status(), PriceStatus::FetchedFailed);
        assert_eq!(source.calls(), 3);

        assert_eq!(cache.get_price("BAL").await, None);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_retry() {
        let source = ScriptedSource::new(vec![
            Err(anyhow::anyhow!("connection reset").into()),
            Ok(prices(&[("balancer", 2.0)])),
        ]);
        let mut cache = cache_for(source.clone(), 3);

        assert_eq!(cache.get_price("BAL").await, None);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.status(), PriceStatus::FetchedFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_and_skips_sleep_after_last_attempt() {
        let source = ScriptedSource::new(vec![
            Err(PriceFetchError::RateLimited),
            Err(PriceFetchError::RateLimited),
            Err(PriceFetchError::RateLimited),
        ]);
        let mut cache = PriceCache::with_retry(
            source.clone(),
            PriceSettings::default().oracle_ids,
            3,
            Duration::from_secs(10),
        );

        let started = tokio::time::Instant::now();
        cache.ensure_loaded().await;

        // 10s after the first attempt, 20s after the second, none after the third.
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(source.calls(), 3);
        assert_eq!(cache.status(), PriceStatus::FetchedFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_backoff() {
        let source = ScriptedSource::new(vec![
            Err(PriceFetchError::RateLimited),
            Ok(prices(&[("balancer", 2.0)])),
        ]);
        let mut cache = PriceCache::with_retry(
            source,
            PriceSettings::default().oracle_ids,
            5,
            Duration::from_secs(4),
        );

        let started = tokio::time::Instant::now();
        assert_eq!(cache.get_price("BAL").await, Some(2.0));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 40), base * u32::MAX);
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_map_lookup_ignores_non_positive() {
        let map = prices(&[("BAL", 2.0), ("AURA", -1.0)]);
        assert_eq!(map.price("BAL"), Some(2.0));
        assert_eq!(map.price("AURA"), None);
    }
}
