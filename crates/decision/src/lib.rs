//! Pure migration decision logic, per spec §4.3. `evaluate` performs no I/O
//! so it is exhaustively unit-testable; this is the definitive Rust
//! rendition of `original_source/orchestrator/decision_engine.py`.

use std::collections::BTreeMap;

use nomadctl_core::job::{Action, Decision, DecisionReason, Policy, WorkloadType};
use nomadctl_core::ControllerError;

pub struct DecisionEngine {
    policy: Policy,
}

impl DecisionEngine {
    pub fn new(policy: Policy) -> Self {
        DecisionEngine { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Evaluates whether `current_region` should migrate, given the latest
    /// `prices` sample for every candidate region. Mirrors
    /// `DecisionEngine.evaluate` step for step:
    /// 1. find the cheapest region (ties broken lexicographically by name),
    /// 2. stay if it's already the current region,
    /// 3. compute the absolute price delta,
    /// 4. resolve the workload's threshold (`short` hard opt-out),
    /// 5. stay within threshold, migrate past it.
    pub fn evaluate(
        &self,
        prices: &BTreeMap<String, f64>,
        current_region: &str,
        workload_type: Option<WorkloadType>,
    ) -> Result<Decision, ControllerError> {
        if prices.is_empty() {
            return Err(ControllerError::InvalidInput(
                "no price samples to evaluate".to_string(),
            ));
        }

        let (cheapest_region, cheapest_price) = cheapest(prices);

        if cheapest_region == current_region {
            return Ok(Decision::stay(DecisionReason::AlreadyCheapest));
        }

        let current_price = *prices.get(current_region).ok_or_else(|| {
            ControllerError::InvalidInput(format!("no price sample for region {current_region:?}"))
        })?;

        let threshold = match self.threshold_for(workload_type) {
            Some(t) => t,
            None => return Ok(Decision::stay(DecisionReason::WorkloadShortNoMigrate)),
        };

        let delta = current_price - cheapest_price;

        if delta > threshold {
            Ok(Decision::migrate(cheapest_region))
        } else {
            Ok(Decision::stay(DecisionReason::WithinThreshold))
        }
    }

    /// `short` workloads never migrate regardless of the policy map;
    /// everything else resolves to `max(class_threshold, global_threshold)`,
    /// falling back to the global threshold alone when the class is absent
    /// from the policy (i.e. an unrecognized or `unknown` workload type).
    fn threshold_for(&self, workload_type: Option<WorkloadType>) -> Option<f64> {
        let workload_type = workload_type.unwrap_or(WorkloadType::Unknown);
        if workload_type == WorkloadType::Short {
            return None;
        }
        match self.policy.workload_thresholds.get(&workload_type) {
            Some(Some(class_threshold)) => {
                Some(class_threshold.max(self.policy.price_spike_threshold))
            }
            Some(None) => None,
            None => Some(self.policy.price_spike_threshold),
        }
    }
}

/// Returns `(region, price)` of the cheapest region, breaking ties by
/// lexicographically-smallest region name. Relies on `BTreeMap` iterating
/// in ascending key order so the first minimum seen is also the smallest
/// name among ties.
fn cheapest(prices: &BTreeMap<String, f64>) -> (String, f64) {
    let mut iter = prices.iter();
    let (mut best_region, mut best_price) = iter.next().expect("prices is non-empty");
    for (region, price) in iter {
        if price < best_price {
            best_region = region;
            best_price = price;
        }
    }
    (best_region.clone(), *best_price)
}

pub fn action_of(decision: &Decision) -> Action {
    decision.action
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(r, p)| (r.to_string(), *p)).collect()
    }

    #[test]
    fn stays_when_current_region_is_cheapest() {
        // scenario 1: prices = {us-east-1: 0.10, us-west-2: 0.20}, current = us-east-1
        let engine = DecisionEngine::new(Policy::default());
        let prices = prices(&[("us-east-1", 0.10), ("us-west-2", 0.20)]);
        let decision = engine
            .evaluate(&prices, "us-east-1", Some(WorkloadType::Medium))
            .unwrap();
        assert_eq!(decision.action, Action::Stay);
        assert_eq!(decision.reason, DecisionReason::AlreadyCheapest);
    }

    #[test]
    fn migrates_on_spike() {
        // scenario 2: prices = {us-east-1: 0.50, us-west-2: 0.10}, price_spike_threshold = 0.05
        let mut policy = Policy::default();
        policy.price_spike_threshold = 0.05;
        let engine = DecisionEngine::new(policy);
        let prices = prices(&[("us-east-1", 0.50), ("us-west-2", 0.10)]);
        let decision = engine
            .evaluate(&prices, "us-east-1", Some(WorkloadType::Medium))
            .unwrap();
        assert_eq!(decision.action, Action::Migrate);
        assert_eq!(decision.target_region.as_deref(), Some("us-west-2"));
        assert_eq!(decision.reason, DecisionReason::PriceSpike);
    }

    #[test]
    fn stays_within_threshold() {
        // scenario 3: prices = {us-east-1: 0.12, us-west-2: 0.10}, threshold = 0.05
        // delta = 0.12 - 0.10 = 0.02 < 0.05
        let mut policy = Policy::default();
        policy.price_spike_threshold = 0.05;
        let engine = DecisionEngine::new(policy);
        let prices = prices(&[("us-east-1", 0.12), ("us-west-2", 0.10)]);
        let decision = engine
            .evaluate(&prices, "us-east-1", Some(WorkloadType::Medium))
            .unwrap();
        assert_eq!(decision.action, Action::Stay);
        assert_eq!(decision.reason, DecisionReason::WithinThreshold);
    }

    #[test]
    fn short_workloads_never_migrate() {
        // scenario 4: prices = {us-east-1: 1.00, us-west-2: 0.01}, workload_type = short
        let engine = DecisionEngine::new(Policy::default());
        let prices = prices(&[("us-east-1", 1.00), ("us-west-2", 0.01)]);
        let decision = engine
            .evaluate(&prices, "us-east-1", Some(WorkloadType::Short))
            .unwrap();
        assert_eq!(decision.action, Action::Stay);
        assert_eq!(decision.reason, DecisionReason::WorkloadShortNoMigrate);
    }

    #[test]
    fn class_threshold_dominates_spike_threshold() {
        // scenario 5: prices = {us-east-1: 0.15, us-west-2: 0.10}, price_spike_threshold = 0.01,
        // workload_thresholds.long = 0.12 -> effective threshold = max(0.12, 0.01) = 0.12
        // delta = 0.15 - 0.10 = 0.05 < 0.12
        let mut policy = Policy::default();
        policy.price_spike_threshold = 0.01;
        policy.workload_thresholds.insert(WorkloadType::Long, Some(0.12));
        let engine = DecisionEngine::new(policy);
        let prices = prices(&[("us-east-1", 0.15), ("us-west-2", 0.10)]);
        let decision = engine
            .evaluate(&prices, "us-east-1", Some(WorkloadType::Long))
            .unwrap();
        assert_eq!(decision.action, Action::Stay);
        assert_eq!(decision.reason, DecisionReason::WithinThreshold);
    }

    #[test]
    fn ties_break_lexicographically() {
        let mut policy = Policy::default();
        policy.price_spike_threshold = 0.01;
        let engine = DecisionEngine::new(policy);
        let prices = prices(&[("us-west-2", 0.30), ("us-east-1", 0.05), ("eu-west-1", 0.05)]);
        let decision = engine
            .evaluate(&prices, "us-west-2", Some(WorkloadType::Long))
            .unwrap();
        // cheapest tie between eu-west-1/us-east-1 at equal price: eu-west-1 wins lexicographically
        assert_eq!(decision.action, Action::Migrate);
        assert_eq!(decision.target_region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn unknown_workload_falls_back_to_global_threshold() {
        let mut policy = Policy::default();
        policy.price_spike_threshold = 0.01;
        let engine = DecisionEngine::new(policy);
        // global threshold 0.01; delta = 0.20 - 0.05 = 0.15 > 0.01
        let prices = prices(&[("us-east-1", 0.20), ("us-west-2", 0.05)]);
        let decision = engine.evaluate(&prices, "us-east-1", None).unwrap();
        assert_eq!(decision.action, Action::Migrate);
    }
}
