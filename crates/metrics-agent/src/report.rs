//! Report cycle: fan the current snapshot out to every delivery channel.
//!
//! Every channel gets every sample; channels are independent of each other
//! and one failing does not stop the rest. The number of pushes in flight is
//! bounded by a semaphore sized by the rate limit.
//!
//! `PollCount` is sent as a delta against the tally each channel last got
//! through. The mark only moves once that channel's counter push succeeds, so
//! a failed or cancelled cycle is folded into the next delta instead of lost.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use api_types::MetricSample;
use api_types::MetricValue;
use api_types::POLL_COUNT;
use futures::future::join_all;
use metric_comm::CommError;
use metric_comm::Delivery;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::collector::Collector;

/// Outcome tally of one report cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub delivered: usize,
    pub failed: usize,
}

pub struct ReportLoop {
    collector: Arc<Collector>,
    deliveries: Vec<Box<dyn Delivery>>,
    /// poll tally acknowledged per delivery, same order as `deliveries`
    acked_polls: Mutex<Vec<i64>>,
    limiter: Semaphore,
    interval: Duration,
}

impl ReportLoop {
    pub fn new(
        collector: Arc<Collector>,
        deliveries: Vec<Box<dyn Delivery>>,
        rate_limit: usize,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            acked_polls: Mutex::new(vec![0; deliveries.len()]),
            deliveries,
            limiter: Semaphore::new(rate_limit.max(1)),
            interval,
        }
    }

    /// Report the current snapshot once over every channel.
    ///
    /// Failures are logged and counted; they never end the cycle early.
    #[instrument(skip(self))]
    pub async fn report_once(&self) -> CycleSummary {
        let snapshot = self.collector.snapshot();
        let gauges: Vec<MetricSample> = snapshot
            .gauges
            .iter()
            .map(|(name, value)| MetricSample::gauge(name.clone(), *value))
            .collect();
        let reports: Vec<Vec<MetricSample>> = self
            .acked_polls
            .lock()
            .expect("poisoned")
            .iter()
            .map(|acked| {
                let mut samples = gauges.clone();
                samples.push(MetricSample::counter(POLL_COUNT, snapshot.poll_count - acked));
                samples
            })
            .collect();

        let pushes = self
            .deliveries
            .iter()
            .zip(&reports)
            .enumerate()
            .flat_map(|(index, (delivery, samples))| {
                delivery.split(samples).into_iter().map(move |push| async move {
                    let carries_polls = push.iter().any(is_poll_count);
                    let ok = self.push(delivery.as_ref(), push).await;
                    (index, carries_polls, ok)
                })
            })
            .collect::<Vec<_>>();

        let started = Instant::now();
        let outcomes = join_all(pushes).await;

        let mut summary = CycleSummary::default();
        let mut acked = self.acked_polls.lock().expect("poisoned");
        for (index, carries_polls, ok) in outcomes {
            if ok {
                summary.delivered += 1;
                if carries_polls {
                    acked[index] = snapshot.poll_count;
                }
            } else {
                summary.failed += 1;
            }
        }
        drop(acked);
        info!(
            delivered = summary.delivered,
            failed = summary.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "Report cycle finished"
        );
        summary
    }

    async fn push(&self, delivery: &dyn Delivery, samples: &[MetricSample]) -> bool {
        let Ok(_permit) = self.limiter.acquire().await else {
            return false;
        };
        let channel = delivery.channel();
        match delivery.deliver(samples).await {
            Ok(()) => {
                debug!(%channel, samples = samples.len(), "Delivered metrics");
                true
            }
            Err(report) => {
                match report.current_context() {
                    CommError::ConnectionFailed { attempts } => {
                        warn!(
                            %channel,
                            attempts,
                            "Connection failed, push deferred to the next cycle"
                        );
                    }
                    CommError::Cancelled => {
                        debug!(%channel, "Delivery cancelled");
                    }
                    _ => {
                        error!(%channel, "Delivery failed: {report:?}");
                    }
                }
                false
            }
        }
    }

    /// Report on a fixed interval until cancelled.
    ///
    /// The first report happens one interval after start. A slow cycle
    /// delays the next one instead of stacking up.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_sec = self.interval.as_secs_f32(),
            channels = self.deliveries.len(),
            "Starting report loop"
        );
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = self.report_once() => {}
                    }
                }
            }
        }
        info!("Report loop stopped");
    }
}

fn is_poll_count(sample: &MetricSample) -> bool {
    sample.id == POLL_COUNT && matches!(sample.value, MetricValue::Counter(_))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use error_stack::Report;
    use metric_comm::Channel;
    use metric_comm::CommResult;
    use similar_asserts::assert_eq;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        pushes: Mutex<Vec<Vec<MetricSample>>>,
        accepted: Mutex<Vec<MetricSample>>,
        outage: AtomicBool,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Recorder {
        /// `PollCount` total as a server would have accumulated it.
        fn accepted_polls(&self) -> i64 {
            self.accepted
                .lock()
                .expect("poisoned")
                .iter()
                .filter(|s| is_poll_count(s))
                .map(|s| match s.value {
                    MetricValue::Counter(delta) => delta,
                    MetricValue::Gauge(_) => 0,
                })
                .sum()
        }
    }

    struct FakeDelivery {
        channel: Channel,
        fail: bool,
        delay: Duration,
        recorder: Arc<Recorder>,
    }

    impl FakeDelivery {
        fn boxed(channel: Channel, fail: bool, recorder: &Arc<Recorder>) -> Box<dyn Delivery> {
            Box::new(Self {
                channel,
                fail,
                delay: Duration::from_millis(100),
                recorder: recorder.clone(),
            })
        }
    }

    #[async_trait]
    impl Delivery for FakeDelivery {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn deliver(&self, samples: &[MetricSample]) -> CommResult<()> {
            let now = self.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.recorder.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.recorder
                .pushes
                .lock()
                .expect("poisoned")
                .push(samples.to_vec());
            if self.fail || self.recorder.outage.load(Ordering::SeqCst) {
                return Err(Report::new(CommError::ConnectionFailed { attempts: 4 }));
            }
            self.recorder
                .accepted
                .lock()
                .expect("poisoned")
                .extend_from_slice(samples);
            Ok(())
        }
    }

    fn collector_with_polls(polls: usize) -> Arc<Collector> {
        let collector = Arc::new(Collector::new());
        for _ in 0..polls {
            collector.record(BTreeMap::from([
                ("Alloc".to_string(), 1.0),
                ("FreeMemory".to_string(), 2.0),
            ]));
        }
        collector
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn failing_channel_does_not_stop_the_others() {
        let recorder = Arc::new(Recorder::default());
        let report = ReportLoop::new(
            collector_with_polls(2),
            vec![
                FakeDelivery::boxed(Channel::Path, true, &recorder),
                FakeDelivery::boxed(Channel::Json, false, &recorder),
            ],
            8,
            Duration::from_secs(10),
        );

        let summary = report.report_once().await;

        // three samples per channel: two gauges and PollCount
        assert_eq!(summary, CycleSummary {
            delivered: 3,
            failed: 3
        });
        assert_eq!(recorder.pushes.lock().expect("poisoned").len(), 6);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn concurrency_is_bounded_by_rate_limit() {
        let recorder = Arc::new(Recorder::default());
        let report = ReportLoop::new(
            collector_with_polls(1),
            vec![
                FakeDelivery::boxed(Channel::Path, false, &recorder),
                FakeDelivery::boxed(Channel::Json, false, &recorder),
                FakeDelivery::boxed(Channel::Rpc, false, &recorder),
            ],
            2,
            Duration::from_secs(10),
        );

        let summary = report.report_once().await;

        assert_eq!(summary.delivered, 9);
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 2);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn poll_count_is_reported_once_per_cycle() {
        let recorder = Arc::new(Recorder::default());
        let collector = collector_with_polls(5);
        let report = ReportLoop::new(
            collector.clone(),
            vec![FakeDelivery::boxed(Channel::Json, false, &recorder)],
            1,
            Duration::from_secs(10),
        );

        report.report_once().await;
        report.report_once().await;

        let counters: Vec<MetricSample> = recorder
            .pushes
            .lock()
            .expect("poisoned")
            .iter()
            .flatten()
            .filter(|s| s.id == api_types::POLL_COUNT)
            .cloned()
            .collect();
        assert_eq!(counters, vec![
            MetricSample::counter(api_types::POLL_COUNT, 5),
            MetricSample::counter(api_types::POLL_COUNT, 0),
        ]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn failed_cycle_is_folded_into_next_poll_count() {
        let recorder = Arc::new(Recorder::default());
        let collector = collector_with_polls(5);
        let report = ReportLoop::new(
            collector.clone(),
            vec![FakeDelivery::boxed(Channel::Json, false, &recorder)],
            1,
            Duration::from_secs(10),
        );

        recorder.outage.store(true, Ordering::SeqCst);
        let summary = report.report_once().await;
        assert_eq!(summary.delivered, 0);

        recorder.outage.store(false, Ordering::SeqCst);
        for _ in 0..5 {
            collector.record(BTreeMap::new());
        }
        report.report_once().await;

        assert_eq!(collector.snapshot().poll_count, 10);
        assert_eq!(recorder.accepted_polls(), 10);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn cancelled_cycle_is_delivered_later() {
        let recorder = Arc::new(Recorder::default());
        let collector = collector_with_polls(4);
        let report = ReportLoop::new(
            collector.clone(),
            vec![FakeDelivery::boxed(Channel::Path, false, &recorder)],
            1,
            Duration::from_secs(10),
        );

        // each push takes 100ms, so the cycle is dropped before PollCount goes out
        let interrupted =
            tokio::time::timeout(Duration::from_millis(150), report.report_once()).await;
        assert!(interrupted.is_err());
        assert_eq!(recorder.accepted_polls(), 0);

        collector.record(BTreeMap::new());
        report.report_once().await;

        assert_eq!(recorder.accepted_polls(), 5);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn channels_track_poll_count_independently() {
        let steady = Arc::new(Recorder::default());
        let flaky = Arc::new(Recorder::default());
        let collector = collector_with_polls(5);
        let report = ReportLoop::new(
            collector.clone(),
            vec![
                FakeDelivery::boxed(Channel::Batch, false, &steady),
                FakeDelivery::boxed(Channel::Rpc, false, &flaky),
            ],
            4,
            Duration::from_secs(10),
        );

        flaky.outage.store(true, Ordering::SeqCst);
        report.report_once().await;
        assert_eq!(steady.accepted_polls(), 5);
        assert_eq!(flaky.accepted_polls(), 0);

        flaky.outage.store(false, Ordering::SeqCst);
        for _ in 0..3 {
            collector.record(BTreeMap::new());
        }
        report.report_once().await;

        assert_eq!(steady.accepted_polls(), 8);
        assert_eq!(flaky.accepted_polls(), 8);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn loop_reports_on_interval_and_stops_on_cancel() {
        let recorder = Arc::new(Recorder::default());
        let report = Arc::new(ReportLoop::new(
            collector_with_polls(1),
            vec![FakeDelivery::boxed(Channel::Batch, false, &recorder)],
            1,
            Duration::from_secs(10),
        ));
        let cancel = CancellationToken::new();
        let task = {
            let report = report.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { report.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(recorder.pushes.lock().expect("poisoned").is_empty());

        tokio::time::sleep(Duration::from_secs(16)).await;
        cancel.cancel();
        task.await.unwrap();

        // cycles at 10s and 20s, three samples each
        assert_eq!(recorder.pushes.lock().expect("poisoned").len(), 6);
    }
}
