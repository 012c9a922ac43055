//! Spot price polling, per spec §4.2. [`SpotPriceProvider`] is the external
//! collaborator boundary (cloud spot-price APIs are out of scope per spec
//! §1); [`PriceWatcher`] owns the bounded per-region price history and
//! volatility calculation, grounded in
//! `original_source/orchestrator/watcher.py::SpotPriceWatcher`.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use nomadctl_core::ControllerError;

/// Maximum number of samples retained per region before the oldest is
/// dropped, matching the Python original's `history[region].pop(0)` cap.
pub const HISTORY_CAPACITY: usize = 20;

/// External collaborator that actually talks to a cloud provider's spot
/// price API. Out of scope for this crate to implement concretely; callers
/// inject a real adapter in production and a fake in tests.
#[async_trait]
pub trait SpotPriceProvider: Send + Sync {
    async fn fetch_prices(
        &self,
        regions: &[String],
    ) -> Result<BTreeMap<String, f64>, ControllerError>;
}

/// Polls a [`SpotPriceProvider`] and retains a capped price history per
/// region so [`PriceWatcher::volatility`] can report a sample standard
/// deviation.
pub struct PriceWatcher<P> {
    provider: P,
    history: BTreeMap<String, VecDeque<f64>>,
}

impl<P: SpotPriceProvider> PriceWatcher<P> {
    pub fn new(provider: P) -> Self {
        PriceWatcher {
            provider,
            history: BTreeMap::new(),
        }
    }

    /// Fetches the latest price for each region and appends it to that
    /// region's history, evicting the oldest sample once the cap is hit.
    pub async fn poll(&mut self, regions: &[String]) -> Result<BTreeMap<String, f64>, ControllerError> {
        let prices = self.provider.fetch_prices(regions).await?;
        for (region, price) in &prices {
            let samples = self.history.entry(region.clone()).or_default();
            samples.push_back(*price);
            while samples.len() > HISTORY_CAPACITY {
                samples.pop_front();
            }
        }
        Ok(prices)
    }

    /// Sample standard deviation of a region's retained history, `0.0` when
    /// fewer than two samples exist (matches `statistics.stdev`'s
    /// precondition in the Python original).
    pub fn volatility(&self, region: &str) -> f64 {
        let samples = match self.history.get(region) {
            Some(s) if s.len() > 1 => s,
            _ => return 0.0,
        };
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider(BTreeMap<String, f64>);

    #[async_trait]
    impl SpotPriceProvider for FakeProvider {
        async fn fetch_prices(
            &self,
            regions: &[String],
        ) -> Result<BTreeMap<String, f64>, ControllerError> {
            Ok(regions
                .iter()
                .filter_map(|r| self.0.get(r).map(|p| (r.clone(), *p)))
                .collect())
        }
    }

    #[tokio::test]
    async fn volatility_is_zero_below_two_samples() {
        let mut prices = BTreeMap::new();
        prices.insert("us-east-1".to_string(), 0.05);
        let mut watcher = PriceWatcher::new(FakeProvider(prices));

        watcher.poll(&["us-east-1".to_string()]).await.unwrap();
        assert_eq!(watcher.volatility("us-east-1"), 0.0);
        assert_eq!(watcher.volatility("never-polled"), 0.0);
    }

    #[tokio::test]
    async fn volatility_matches_sample_stdev() {
        let mut watcher = PriceWatcher::new(FakeProvider(BTreeMap::new()));
        // inject history directly via repeated polls with a stub that varies.
        let samples = [0.10, 0.12, 0.11, 0.15];
        for s in samples {
            let mut prices = BTreeMap::new();
            prices.insert("us-east-1".to_string(), s);
            watcher.provider = FakeProvider(prices);
            watcher.poll(&["us-east-1".to_string()]).await.unwrap();
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (samples.len() as f64 - 1.0);
        let expected = variance.sqrt();
        assert!((watcher.volatility("us-east-1") - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_is_capped_at_twenty_samples() {
        let mut watcher = PriceWatcher::new(FakeProvider(BTreeMap::new()));
        for i in 0..25 {
            let mut prices = BTreeMap::new();
            prices.insert("us-east-1".to_string(), i as f64);
            watcher.provider = FakeProvider(prices);
            watcher.poll(&["us-east-1".to_string()]).await.unwrap();
        }
        assert_eq!(watcher.history.get("us-east-1").unwrap().len(), HISTORY_CAPACITY);
    }
}
