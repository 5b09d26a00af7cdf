//! Periodic sampling into a shared snapshot.
//!
//! The poll loop is the only writer of the [`Collector`]'s state; the report
//! loop reads whole snapshots through [`Collector::snapshot`]. Both go through
//! one lock, so a reader never sees a half-written poll.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use api_types::RANDOM_VALUE;
use sysinfo::Pid;
use sysinfo::System;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

/// Gauge readings of the last poll plus the running poll tally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub gauges: BTreeMap<String, f64>,
    pub poll_count: i64,
}

/// Source of gauge readings for one poll.
///
/// Sampling cannot fail: readings that are unavailable are left out or zero.
pub trait Sampler: Send {
    fn sample(&mut self) -> BTreeMap<String, f64>;
}

/// Host and process readings through `sysinfo`, plus `RandomValue`.
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!("Process metrics unavailable: {e}"))
            .ok();
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SystemSampler {
    fn sample(&mut self) -> BTreeMap<String, f64> {
        let mut gauges = BTreeMap::new();

        self.system.refresh_memory();
        gauges.insert("TotalMemory".to_string(), self.system.total_memory() as f64);
        gauges.insert("FreeMemory".to_string(), self.system.free_memory() as f64);

        // cpu usage is a delta between two refreshes, so the first poll reads 0
        self.system.refresh_cpu();
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            gauges.insert(format!("CPUutilization{}", i + 1), f64::from(cpu.cpu_usage()));
        }

        if let Some(pid) = self.pid {
            if self.system.refresh_process(pid) {
                if let Some(process) = self.system.process(pid) {
                    gauges.insert("Alloc".to_string(), process.memory() as f64);
                    gauges.insert("VirtualMemory".to_string(), process.virtual_memory() as f64);
                    gauges.insert("ProcessCPU".to_string(), f64::from(process.cpu_usage()));
                }
            }
        }

        gauges.insert(RANDOM_VALUE.to_string(), rand::random::<f64>());
        gauges
    }
}

#[derive(Debug, Default)]
struct State {
    snapshot: Snapshot,
}

/// Owner of the agent's snapshot.
#[derive(Debug, Default)]
pub struct Collector {
    state: RwLock<State>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the gauges and count one poll.
    pub fn record(&self, gauges: BTreeMap<String, f64>) {
        let mut state = self.state.write().expect("poisoned");
        state.snapshot.gauges = gauges;
        state.snapshot.poll_count += 1;
    }

    /// Take one reading from `sampler` and record it.
    ///
    /// Sampling runs outside the lock.
    pub fn poll(&self, sampler: &mut dyn Sampler) {
        let gauges = sampler.sample();
        self.record(gauges);
    }

    /// A consistent copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().expect("poisoned").snapshot.clone()
    }

    /// Poll on a fixed interval until cancelled. The first poll is immediate.
    pub async fn run(&self, mut sampler: impl Sampler, interval: Duration, cancel: CancellationToken) {
        info!(interval_sec = interval.as_secs_f32(), "Starting poll loop");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll(&mut sampler);
                    debug!(poll_count = self.snapshot().poll_count, "Polled metrics");
                }
            }
        }
        info!("Poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use similar_asserts::assert_eq;

    use super::*;

    struct Fixed(f64);

    impl Sampler for Fixed {
        fn sample(&mut self) -> BTreeMap<String, f64> {
            self.0 += 1.0;
            BTreeMap::from([("Alloc".to_string(), self.0)])
        }
    }

    #[test]
    fn each_poll_replaces_gauges_and_counts_once() {
        let collector = Collector::new();
        let mut sampler = Fixed(0.0);

        collector.poll(&mut sampler);
        collector.poll(&mut sampler);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.poll_count, 2);
        assert_eq!(snapshot.gauges, BTreeMap::from([("Alloc".to_string(), 2.0)]));
    }

    #[test]
    fn system_sampler_reports_core_gauges() {
        let mut sampler = SystemSampler::new();

        let gauges = sampler.sample();

        assert!(gauges.contains_key("TotalMemory"));
        assert!(gauges.contains_key("FreeMemory"));
        let random = gauges[RANDOM_VALUE];
        assert!((0.0..1.0).contains(&random));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn poll_loop_runs_until_cancelled() {
        let collector = Arc::new(Collector::new());
        let cancel = CancellationToken::new();
        let task = {
            let collector = collector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                collector
                    .run(Fixed(0.0), Duration::from_secs(2), cancel)
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(4500)).await;
        cancel.cancel();
        task.await.unwrap();

        // ticks at 0s, 2s and 4s
        assert_eq!(collector.snapshot().poll_count, 3);
    }
}
