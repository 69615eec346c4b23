//! Plan staleness: deciding whether a cached plan still fits the data.
//!
//! A cached plan carries a [`PlanFingerprint`]: when it was planned, when it
//! was last checked, the transaction id seen at that time and the statistics
//! the planner read. Once the minimum replan interval has passed and the
//! store has committed new transactions, the recorded statistics are compared
//! against live ones. The tolerated relative change shrinks with the plan's
//! age from the initial towards the target threshold.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::query::metadata::{GraphStatistics, GraphStatisticsSnapshot};

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_millis(&self) -> u64;
}

/// System time since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Clock reading `millis`.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sets the clock.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Shape of the threshold decay between the two replan intervals.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceAlgorithm {
    /// `initial * e^(-k t)`
    #[default]
    Exponential,
    /// `initial / (1 + k t)`
    Inverse,
    /// Constant initial threshold.
    None,
}

/// Decides when to re-check a plan and how much statistics drift it
/// tolerates at a given age.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsDivergenceCalculator {
    initial_threshold: f64,
    target_threshold: f64,
    min_replan_millis: u64,
    target_replan_millis: u64,
    algorithm: DivergenceAlgorithm,
}

impl StatsDivergenceCalculator {
    /// Calculator decaying from `initial_threshold` at `min_replan_interval`
    /// to `target_threshold` at `target_replan_interval`.
    pub fn new(
        initial_threshold: f64,
        target_threshold: f64,
        min_replan_interval: Duration,
        target_replan_interval: Duration,
        algorithm: DivergenceAlgorithm,
    ) -> Self {
        Self {
            initial_threshold,
            target_threshold,
            min_replan_millis: min_replan_interval.as_millis() as u64,
            target_replan_millis: target_replan_interval.as_millis() as u64,
            algorithm,
        }
    }

    /// True once the minimum replan interval has passed since `last_check`.
    pub fn should_check(&self, now: u64, last_check: u64) -> bool {
        now.saturating_sub(last_check) >= self.min_replan_millis
    }

    /// Tolerated relative change for a plan created `millis_since_creation`
    /// ago, always within `[target_threshold, initial_threshold]`.
    pub fn decay(&self, millis_since_creation: u64) -> f64 {
        let (initial, target) = (self.initial_threshold, self.target_threshold);
        if millis_since_creation <= self.min_replan_millis {
            return initial;
        }
        if millis_since_creation >= self.target_replan_millis {
            return match self.algorithm {
                DivergenceAlgorithm::None => initial,
                _ => target,
            };
        }
        let span = (self.target_replan_millis - self.min_replan_millis) as f64;
        let t = (millis_since_creation - self.min_replan_millis) as f64;
        let threshold = match self.algorithm {
            DivergenceAlgorithm::Exponential => {
                let k = (initial.ln() - target.ln()) / span;
                initial * (-k * t).exp()
            }
            DivergenceAlgorithm::Inverse => {
                let k = (initial / target - 1.0) / span;
                initial / (1.0 + k * t)
            }
            DivergenceAlgorithm::None => initial,
        };
        threshold.clamp(target.min(initial), initial)
    }
}

/// Staleness bookkeeping stored with a cached plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanFingerprint {
    /// When the plan was created.
    pub creation_millis: u64,
    /// When the plan was last found reusable.
    pub last_check_millis: u64,
    /// Last committed transaction id seen by a check.
    pub tx_id: i64,
    /// Statistics read while planning.
    pub snapshot: GraphStatisticsSnapshot,
}

/// Shared, updatable handle to a [`PlanFingerprint`]; checks refresh it in
/// place.
#[derive(Debug)]
pub struct PlanFingerprintReference(Mutex<PlanFingerprint>);

impl PlanFingerprintReference {
    /// Wraps `fingerprint`.
    pub fn new(fingerprint: PlanFingerprint) -> Self {
        Self(Mutex::new(fingerprint))
    }

    /// Copy of the current fingerprint.
    pub fn fingerprint(&self) -> PlanFingerprint {
        self.0.lock().clone()
    }
}

/// Outcome of a staleness check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReusabilityState {
    /// Cached value may be used.
    Reusable,
    /// Cached value must be dropped and recomputed.
    NeedsReplan {
        /// Age of the cached plan.
        seconds_since_replan: u64,
        /// What drifted, when known.
        reason: Option<String>,
    },
}

/// Runs staleness checks against live statistics.
#[derive(Clone)]
pub struct StalenessCaller {
    clock: Arc<dyn Clock>,
    tx_id: Arc<dyn Fn() -> i64 + Send + Sync>,
    statistics: Arc<dyn GraphStatistics>,
    divergence: StatsDivergenceCalculator,
}

impl StalenessCaller {
    /// Caller reading time from `clock`, the last committed transaction id
    /// from `tx_id` and live values from `statistics`.
    pub fn new(
        clock: Arc<dyn Clock>,
        tx_id: Arc<dyn Fn() -> i64 + Send + Sync>,
        statistics: Arc<dyn GraphStatistics>,
        divergence: StatsDivergenceCalculator,
    ) -> Self {
        Self {
            clock,
            tx_id,
            statistics,
            divergence,
        }
    }

    /// Fingerprint of a plan created now from `snapshot`.
    pub fn fingerprint(&self, snapshot: GraphStatisticsSnapshot) -> PlanFingerprint {
        let now = self.clock.now_millis();
        PlanFingerprint {
            creation_millis: now,
            last_check_millis: now,
            tx_id: (self.tx_id)(),
            snapshot,
        }
    }

    /// Checks the plan behind `reference`, refreshing it when reusable.
    pub fn reusability(&self, reference: &PlanFingerprintReference) -> ReusabilityState {
        let now = self.clock.now_millis();
        let mut fingerprint = reference.0.lock();
        if !self
            .divergence
            .should_check(now, fingerprint.last_check_millis)
        {
            return ReusabilityState::Reusable;
        }
        let tx_id = (self.tx_id)();
        if tx_id == fingerprint.tx_id {
            fingerprint.last_check_millis = now;
            return ReusabilityState::Reusable;
        }

        let age = now.saturating_sub(fingerprint.creation_millis);
        let threshold = self.divergence.decay(age);
        let live = fingerprint.snapshot.recompute(self.statistics.as_ref());
        match fingerprint.snapshot.diverges(&live, threshold) {
            Some((key, before, after)) => ReusabilityState::NeedsReplan {
                seconds_since_replan: age / 1000,
                reason: Some(format!(
                    "cardinality of {key} changed from {before} to {after}, \
                     which exceeds the divergence threshold {threshold:.3}"
                )),
            },
            None => {
                fingerprint.last_check_millis = now;
                fingerprint.tx_id = tx_id;
                ReusabilityState::Reusable
            }
        }
    }
}
