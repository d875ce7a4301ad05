//! Bounded intake queue and the dispatcher that turns submission events into
//! reconciliation tasks.

use super::ledger::LedgerApplier;
use super::reconciler::{PollPolicy, ReconcileOutcome, ReconciliationTask};
use crate::domain::order::{OrderNumber, SubmissionEvent};
use crate::domain::ports::SharedOracle;
use crate::error::{LoyaltyError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What `enqueue` does when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OverflowPolicy {
    /// Wait for room (backpressure on the producer).
    #[default]
    Block,
    /// Fail immediately with [`LoyaltyError::QueueFull`].
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct IntakeConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            capacity: 6,
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Producer side of the intake queue. Cheap to clone.
#[derive(Clone)]
pub struct IntakeQueue {
    sender: mpsc::Sender<SubmissionEvent>,
    overflow: OverflowPolicy,
    accepting: CancellationToken,
}

impl IntakeQueue {
    pub(crate) fn channel(
        config: IntakeConfig,
        accepting: CancellationToken,
    ) -> (Self, mpsc::Receiver<SubmissionEvent>) {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let queue = Self {
            sender,
            overflow: config.overflow,
            accepting,
        };
        (queue, receiver)
    }

    pub async fn enqueue(&self, event: SubmissionEvent) -> Result<()> {
        if self.accepting.is_cancelled() {
            return Err(LoyaltyError::QueueClosed);
        }

        match self.overflow {
            OverflowPolicy::Block => tokio::select! {
                biased;
                _ = self.accepting.cancelled() => Err(LoyaltyError::QueueClosed),
                sent = self.sender.send(event) => sent.map_err(|_| LoyaltyError::QueueClosed),
            },
            OverflowPolicy::Reject => self.sender.try_send(event).map_err(|e| match e {
                TrySendError::Full(rejected) => {
                    warn!(order = %rejected.order, "intake queue full, submission rejected");
                    LoyaltyError::QueueFull
                }
                TrySendError::Closed(_) => LoyaltyError::QueueClosed,
            }),
        }
    }
}

/// Tally of how every dispatched task ended, returned on shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub credited: usize,
    pub invalidated: usize,
    pub already_final: usize,
    pub given_up: usize,
    pub abandoned: usize,
    pub cancelled: usize,
    pub ledger_failed: usize,
    /// Events still queued when shutdown began; those orders stay NEW.
    pub dropped: usize,
    /// Submissions ignored because the same order already had a running task.
    pub duplicates: usize,
    pub panicked: usize,
}

impl PipelineReport {
    fn record(&mut self, joined: std::result::Result<ReconcileOutcome, JoinError>) {
        match joined {
            Ok(ReconcileOutcome::Credited { .. }) => self.credited += 1,
            Ok(ReconcileOutcome::Invalidated { .. }) => self.invalidated += 1,
            Ok(ReconcileOutcome::AlreadyFinal { .. }) => self.already_final += 1,
            Ok(ReconcileOutcome::GivenUp { .. }) => self.given_up += 1,
            Ok(ReconcileOutcome::Abandoned { .. }) => self.abandoned += 1,
            Ok(ReconcileOutcome::Cancelled { .. }) => self.cancelled += 1,
            Ok(ReconcileOutcome::LedgerFailed { .. }) => self.ledger_failed += 1,
            Err(e) => {
                error!(error = %e, "reconciliation task failed to complete");
                self.panicked += 1;
            }
        }
    }

    /// Number of tasks that ran to any end.
    pub fn finished(&self) -> usize {
        self.credited
            + self.invalidated
            + self.already_final
            + self.given_up
            + self.abandoned
            + self.cancelled
            + self.ledger_failed
            + self.panicked
    }
}

/// Removes an order from the in-flight set when its task ends, including by panic.
struct InFlight {
    orders: Arc<Mutex<HashSet<OrderNumber>>>,
    order: OrderNumber,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock_in_flight(&self.orders).remove(&self.order);
    }
}

/// The set stays consistent even if a holder panicked, so poisoning is recovered.
fn lock_in_flight(orders: &Mutex<HashSet<OrderNumber>>) -> MutexGuard<'_, HashSet<OrderNumber>> {
    orders.lock().unwrap_or_else(|poisoned| {
        warn!("in-flight order set was poisoned, recovering");
        poisoned.into_inner()
    })
}

struct Dispatcher {
    receiver: mpsc::Receiver<SubmissionEvent>,
    oracle: SharedOracle,
    ledger: LedgerApplier,
    policy: PollPolicy,
    shutdown: CancellationToken,
    in_flight: Arc<Mutex<HashSet<OrderNumber>>>,
}

impl Dispatcher {
    async fn run(mut self) -> PipelineReport {
        let mut tasks = JoinSet::new();
        let mut report = PipelineReport::default();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => report.record(joined),
                event = self.receiver.recv() => match event {
                    Some(event) => self.spawn(&mut tasks, &mut report, event),
                    None => break,
                },
            }
        }

        self.receiver.close();
        while let Ok(event) = self.receiver.try_recv() {
            warn!(order = %event.order, "dropping queued submission on shutdown");
            report.dropped += 1;
        }

        info!(running = tasks.len(), "waiting for reconciliation tasks");
        while let Some(joined) = tasks.join_next().await {
            report.record(joined);
        }
        report
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<ReconcileOutcome>,
        report: &mut PipelineReport,
        event: SubmissionEvent,
    ) {
        let fresh = lock_in_flight(&self.in_flight).insert(event.order.clone());
        if !fresh {
            debug!(order = %event.order, "order already being reconciled");
            report.duplicates += 1;
            return;
        }

        let guard = InFlight {
            orders: self.in_flight.clone(),
            order: event.order.clone(),
        };
        let task = ReconciliationTask::new(
            event,
            self.oracle.clone(),
            self.ledger.clone(),
            self.policy.clone(),
            self.shutdown.child_token(),
        );
        tasks.spawn(async move {
            let _guard = guard;
            task.run().await
        });
    }
}

/// Owns the intake queue, the dispatcher and every task it starts.
pub struct ReconciliationPipeline {
    intake: IntakeQueue,
    shutdown: CancellationToken,
    dispatcher: JoinHandle<PipelineReport>,
}

impl ReconciliationPipeline {
    /// Starts the dispatcher on the current runtime.
    pub fn start(
        intake: IntakeConfig,
        policy: PollPolicy,
        oracle: SharedOracle,
        ledger: LedgerApplier,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (queue, receiver) = IntakeQueue::channel(intake, shutdown.clone());
        info!(
            capacity = intake.capacity,
            overflow = ?intake.overflow,
            "reconciliation pipeline started"
        );

        let dispatcher = Dispatcher {
            receiver,
            oracle,
            ledger,
            policy,
            shutdown: shutdown.clone(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        };

        Self {
            intake: queue,
            shutdown,
            dispatcher: tokio::spawn(dispatcher.run()),
        }
    }

    pub fn intake(&self) -> IntakeQueue {
        self.intake.clone()
    }

    /// Stops intake, cancels running tasks and waits for all of them to end.
    pub async fn shutdown(self) -> Result<PipelineReport> {
        info!("shutting down reconciliation pipeline");
        self.shutdown.cancel();
        let report = self
            .dispatcher
            .await
            .map_err(|e| LoyaltyError::Internal(format!("dispatcher failed: {e}")))?;
        info!(?report, "reconciliation pipeline stopped");
        Ok(report)
    }
}
