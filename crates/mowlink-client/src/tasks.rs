// ============================================
// File: crates/mowlink-client/src/tasks.rs
// ============================================
//! # Background Tasks
//!
//! Recurring jobs bound to one broker connection.
//!
//! Main Components:
//!   - PeriodicJob: one unit of recurring work
//!   - spawn_recurring: runs a job, sleeps, re-arms, until cancelled
//!   - ResyncTask: BLE sync so the device keeps streaming reports
//!   - RefreshTask: keeps the iot token valid and re-sends report config
//!
//! ⚠️ Important Note for Next Developer:
//!   - The delay is re-armed AFTER each run, so slow runs never overlap
//!   - Both jobs skip their run while the link is not ready
//!   - Cancelling the connection token stops the loop even mid-sleep
//!
//! Last Modified: v0.1.0 - Initial recurring tasks
// ============================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mowlink_common::types::IotId;
use mowlink_core::protocol::DeviceCommand;
use mowlink_transport::Broker;

use crate::bus::{ClientEvent, EventBus};
use crate::error::Result;
use crate::services::authority::SessionAuthority;
use crate::services::correlator::CommandCorrelator;

/// Consecutive failures after which errors are logged at `error`.
const FAILURE_ESCALATION: u32 = 3;

/// One unit of recurring work.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in logs and error events.
    fn name(&self) -> &'static str;

    /// Runs once. `Ok(false)` means the run was skipped.
    async fn run_once(&self) -> Result<bool>;
}

/// Spawns `job` to run every `interval` until `cancel` fires.
///
/// The first run happens one `interval` after spawning.
pub fn spawn_recurring<J: PeriodicJob>(
    job: Arc<J>,
    interval: Duration,
    cancel: CancellationToken,
    bus: Arc<EventBus<ClientEvent>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(task = job.name(), interval_secs = interval.as_secs(), "Recurring task started");
        let mut failures = 0u32;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = job.run_once() => outcome,
            };

            match outcome {
                Ok(true) => {
                    failures = 0;
                    debug!(task = job.name(), "Recurring task ran");
                }
                Ok(false) => debug!(task = job.name(), "Recurring task skipped"),
                Err(e) => {
                    failures += 1;
                    if failures >= FAILURE_ESCALATION {
                        error!(task = job.name(), failures, error = %e, "Recurring task failing");
                    } else {
                        warn!(task = job.name(), error = %e, "Recurring task failed");
                    }
                    bus.publish(&ClientEvent::error(job.name(), &e));
                }
            }
        }

        info!(task = job.name(), "Recurring task stopped");
    })
}

// ============================================
// ResyncTask
// ============================================

/// Re-sends BLE sync to keep the device reporting.
pub struct ResyncTask {
    correlator: CommandCorrelator,
    broker: Arc<dyn Broker>,
    iot_id: IotId,
}

impl ResyncTask {
    /// Creates the task for `iot_id`.
    #[must_use]
    pub fn new(correlator: CommandCorrelator, broker: Arc<dyn Broker>, iot_id: IotId) -> Self {
        Self {
            correlator,
            broker,
            iot_id,
        }
    }
}

#[async_trait]
impl PeriodicJob for ResyncTask {
    fn name(&self) -> &'static str {
        "resync"
    }

    async fn run_once(&self) -> Result<bool> {
        if !self.broker.state().is_up() {
            return Ok(false);
        }
        self.correlator
            .send(&self.iot_id, &DeviceCommand::ble_sync())
            .await?;
        Ok(true)
    }
}

// ============================================
// RefreshTask
// ============================================

/// Refreshes the session, re-binds the broker and re-sends report config.
pub struct RefreshTask {
    authority: Arc<SessionAuthority>,
    broker: Arc<dyn Broker>,
    correlator: CommandCorrelator,
    iot_id: IotId,
    report: DeviceCommand,
}

impl RefreshTask {
    /// Creates the task for `iot_id`, re-sending `report` after each refresh.
    #[must_use]
    pub fn new(
        authority: Arc<SessionAuthority>,
        broker: Arc<dyn Broker>,
        correlator: CommandCorrelator,
        iot_id: IotId,
        report: DeviceCommand,
    ) -> Self {
        Self {
            authority,
            broker,
            correlator,
            iot_id,
            report,
        }
    }
}

#[async_trait]
impl PeriodicJob for RefreshTask {
    fn name(&self) -> &'static str {
        "refresh"
    }

    async fn run_once(&self) -> Result<bool> {
        if !self.broker.state().is_up() {
            return Ok(false);
        }
        let session = self.authority.ensure_fresh().await?;
        self.broker.set_iot_token(session.iot_token.clone());
        self.correlator.send(&self.iot_id, &self.report).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        runs: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl PeriodicJob for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> Result<bool> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ClientError::transport("down"))
            } else {
                Ok(true)
            }
        }
    }

    fn counting(fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            runs: AtomicU32::new(0),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_interval_until_cancelled() {
        let job = counting(false);
        let cancel = CancellationToken::new();
        let handle = spawn_recurring(
            Arc::clone(&job),
            Duration::from_secs(160),
            cancel.clone(),
            Arc::new(EventBus::new()),
        );

        tokio::time::sleep(Duration::from_secs(159)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(160)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_rearm_and_publish_errors() {
        let job = counting(true);
        let bus = Arc::new(EventBus::new());
        let errors = Arc::new(Mutex::new(Vec::new()));
        {
            let errors = Arc::clone(&errors);
            bus.subscribe(move |e: &ClientEvent| {
                if let ClientEvent::Error { operation, .. } = e {
                    errors.lock().push(operation.clone());
                }
                Ok(())
            });
        }

        let cancel = CancellationToken::new();
        let handle = spawn_recurring(Arc::clone(&job), Duration::from_secs(60), cancel.clone(), bus);
        tokio::time::sleep(Duration::from_secs(181)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(job.runs.load(Ordering::SeqCst), 3);
        assert_eq!(*errors.lock(), vec!["counting"; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_skips_when_link_down() {
        use crate::services::correlator::{MockCommandSink, PendingQueue};
        use mowlink_transport::{LinkState, MockBroker};

        let mut sink = MockCommandSink::new();
        sink.expect_deliver().times(0);
        let correlator = CommandCorrelator::new(
            Arc::new(sink),
            Arc::new(PendingQueue::new()),
            4,
            Duration::from_secs(5),
        );
        let broker = Arc::new(MockBroker::new());
        broker.set_state(LinkState::Disconnected);

        let task = ResyncTask::new(correlator, broker, IotId::parse("dev-1").unwrap());
        assert!(!task.run_once().await.unwrap());
    }
}
