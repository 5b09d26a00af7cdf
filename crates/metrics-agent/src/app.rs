use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metric_comm::build_delivery;
use metric_comm::Delivery;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utils::shutdown::spawn_signal_handler;

use crate::collector::Collector;
use crate::collector::SystemSampler;
use crate::config::AgentArgs;
use crate::report::ReportLoop;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Task manager for the poll and report loops
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token,
        }
    }

    /// Start the poll loop and the report loop over one collector.
    pub fn spawn_all_tasks(&mut self, args: &AgentArgs) -> Result<()> {
        let collector = Arc::new(Collector::new());
        let client_config = args.client_config();
        let deliveries = args
            .channels()
            .into_iter()
            .map(|channel| build_delivery(channel, &client_config, self.cancellation_token.clone()))
            .collect::<Result<Vec<Box<dyn Delivery>>, _>>()
            .map_err(|report| anyhow::anyhow!("{report:?}"))?;

        let poll_task = {
            let collector = collector.clone();
            let interval = args.poll_interval();
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                collector.run(SystemSampler::new(), interval, token).await;
            })
        };
        self.tasks.push(poll_task);

        let report_task = {
            let report = ReportLoop::new(
                collector,
                deliveries,
                args.rate_limit(),
                args.report_interval(),
            );
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                report.run(token).await;
            })
        };
        self.tasks.push(report_task);

        Ok(())
    }

    /// Wait for cancellation or for a task to end on its own.
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        tokio::select! {
            () = self.cancellation_token.cancelled() => {
                tracing::info!("Shutting down agent tasks");
            }
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                self.cancellation_token.cancel();
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly");
            }
        }
        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if task.is_finished() {
                    continue;
                }
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }
}

/// Run the agent until a shutdown signal arrives.
pub async fn run(args: AgentArgs) -> Result<()> {
    let token = CancellationToken::new();
    let signals = spawn_signal_handler(token.clone())?;

    let mut tasks = Tasks::new(token.clone());
    tasks.spawn_all_tasks(&args)?;
    let result = tasks.wait_for_completion().await;

    token.cancel();
    if let Err(e) = signals.await {
        tracing::error!("Signal handler failed: {e}");
    }
    result
}
