//! In-memory metric store.
//!
//! Gauges and counters live in two maps, each behind its own lock. Every
//! update holds the write lock for the whole read-modify-write, so concurrent
//! counter deltas to the same id never lose an increment. A batch takes both
//! locks once and is applied as a unit.
//!
//! Counter totals are kept as `i128` so the sum of `i64` deltas is exact and
//! independent of arrival order; reads clamp the total into `i64`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use api_types::MetricKind;
use api_types::MetricSample;
use api_types::MetricValue;

#[derive(Debug, Default)]
struct Maps {
    gauges: RwLock<HashMap<String, f64>>,
    counters: RwLock<HashMap<String, i128>>,
}

/// Shared handle to the authoritative metric state.
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    maps: Arc<Maps>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one validated sample: gauges overwrite, counters add.
    pub fn apply(&self, sample: &MetricSample) {
        match sample.value {
            MetricValue::Gauge(value) => {
                let mut gauges = self.maps.gauges.write().expect("poisoned");
                set_gauge(&mut gauges, &sample.id, value);
            }
            MetricValue::Counter(delta) => {
                let mut counters = self.maps.counters.write().expect("poisoned");
                add_counter(&mut counters, &sample.id, delta);
            }
        }
    }

    /// Apply a batch of validated samples under both write locks.
    pub fn apply_batch(&self, samples: &[MetricSample]) {
        // lock order: gauges, then counters
        let mut gauges = self.maps.gauges.write().expect("poisoned");
        let mut counters = self.maps.counters.write().expect("poisoned");
        for sample in samples {
            match sample.value {
                MetricValue::Gauge(value) => set_gauge(&mut gauges, &sample.id, value),
                MetricValue::Counter(delta) => add_counter(&mut counters, &sample.id, delta),
            }
        }
    }

    /// Current value of a series, `None` if it was never written.
    pub fn get(&self, kind: MetricKind, id: &str) -> Option<MetricValue> {
        match kind {
            MetricKind::Gauge => self
                .maps
                .gauges
                .read()
                .expect("poisoned")
                .get(id)
                .copied()
                .map(MetricValue::Gauge),
            MetricKind::Counter => self
                .maps
                .counters
                .read()
                .expect("poisoned")
                .get(id)
                .map(|total| MetricValue::Counter(clamp_total(*total))),
        }
    }

    pub fn exists(&self, kind: MetricKind, id: &str) -> bool {
        match kind {
            MetricKind::Gauge => self.maps.gauges.read().expect("poisoned").contains_key(id),
            MetricKind::Counter => self
                .maps
                .counters
                .read()
                .expect("poisoned")
                .contains_key(id),
        }
    }

    /// All series as one view, sorted by id then kind.
    pub fn list(&self) -> Vec<MetricSample> {
        let mut all: Vec<MetricSample> = {
            let gauges = self.maps.gauges.read().expect("poisoned");
            let counters = self.maps.counters.read().expect("poisoned");
            gauges
                .iter()
                .map(|(id, value)| MetricSample::gauge(id.clone(), *value))
                .chain(
                    counters
                        .iter()
                        .map(|(id, total)| MetricSample::counter(id.clone(), clamp_total(*total))),
                )
                .collect()
        };
        all.sort_by(|a, b| a.id.cmp(&b.id).then(a.kind().cmp(&b.kind())));
        all
    }
}

fn set_gauge(gauges: &mut HashMap<String, f64>, id: &str, value: f64) {
    if let Some(slot) = gauges.get_mut(id) {
        *slot = value;
    } else {
        gauges.insert(id.to_string(), value);
    }
}

fn add_counter(counters: &mut HashMap<String, i128>, id: &str, delta: i64) {
    let delta = i128::from(delta);
    if let Some(total) = counters.get_mut(id) {
        // only reachable after ~2^64 maximal deltas
        *total = total.saturating_add(delta);
    } else {
        counters.insert(id.to_string(), delta);
    }
}

fn clamp_total(total: i128) -> i64 {
    i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
}
