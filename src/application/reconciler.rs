//! Per-order reconciliation task.
//!
//! A task polls the accrual service for exactly one order on a fixed interval
//! until it sees a terminal status, runs out of attempts, passes its
//! deadline, hits a permanent error, or observes shutdown.

use super::ledger::{ApplyOutcome, LedgerApplier, Resolution};
use crate::domain::accrual::OracleStatus;
use crate::domain::money::Money;
use crate::domain::order::{OrderStatus, SubmissionEvent};
use crate::domain::ports::SharedOracle;
use crate::error::OracleError;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Polling bounds for one order.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay before each poll.
    pub interval: Duration,
    /// Wall-clock budget measured from task start.
    pub deadline: Duration,
    /// Maximum number of oracle calls.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(120),
            max_attempts: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    DeadlineExceeded,
    AttemptsExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Credited { accrual: Money, attempts: u32 },
    Invalidated { attempts: u32 },
    /// A terminal result was found but the order was already final in the store.
    AlreadyFinal { attempts: u32 },
    GivenUp {
        reason: GiveUpReason,
        attempts: u32,
        last_status: OrderStatus,
    },
    /// The accrual service answered with something unusable.
    Abandoned { reason: String, attempts: u32 },
    Cancelled { attempts: u32 },
    /// The terminal result could not be written and is lost for this run.
    LedgerFailed { reason: String, attempts: u32 },
}

pub struct ReconciliationTask {
    event: SubmissionEvent,
    oracle: SharedOracle,
    ledger: LedgerApplier,
    policy: PollPolicy,
    shutdown: CancellationToken,
}

impl ReconciliationTask {
    pub fn new(
        event: SubmissionEvent,
        oracle: SharedOracle,
        ledger: LedgerApplier,
        policy: PollPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            event,
            oracle,
            ledger,
            policy,
            shutdown,
        }
    }

    pub async fn run(self) -> ReconcileOutcome {
        let span = info_span!(
            "reconcile",
            order = %self.event.order,
            owner = %self.event.owner
        );
        self.poll_loop().instrument(span).await
    }

    async fn poll_loop(self) -> ReconcileOutcome {
        let deadline = Instant::now() + self.policy.deadline;
        let mut attempts: u32 = 0;
        let mut delay = self.policy.interval;
        let mut last_status = OrderStatus::New;

        debug!(policy = ?self.policy, "reconciliation started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(attempts, "reconciliation cancelled by shutdown");
                    return ReconcileOutcome::Cancelled { attempts };
                }
                // a poll due exactly at the deadline still runs
                _ = sleep(delay) => {}
                _ = sleep_until(deadline) => {
                    return self.give_up(GiveUpReason::DeadlineExceeded, attempts, last_status);
                }
            }

            attempts += 1;
            delay = self.policy.interval;

            // An oracle call that has started is allowed to finish.
            match self.oracle.fetch_status(&self.event.order).await {
                Ok(report) => match report.status {
                    OracleStatus::Processed => {
                        let accrual = report.accrual.unwrap_or(Money::ZERO);
                        return self.settle(Resolution::Processed(accrual), attempts).await;
                    }
                    OracleStatus::Invalid => {
                        return self.settle(Resolution::Invalid, attempts).await;
                    }
                    OracleStatus::Processing => {
                        debug!(attempts, "order is processing");
                        if last_status == OrderStatus::New {
                            match self
                                .ledger
                                .record_processing(&self.event.order, &self.event.owner)
                                .await
                            {
                                Ok(()) => last_status = OrderStatus::Processing,
                                Err(e) => warn!(error = %e, "failed to record PROCESSING status"),
                            }
                        }
                    }
                    OracleStatus::Registered => {
                        debug!(attempts, "order registered, not yet processing");
                    }
                },
                Err(OracleError::Transient(reason)) => {
                    warn!(attempts, %reason, "transient accrual failure");
                }
                Err(OracleError::RateLimited { retry_after }) => {
                    warn!(attempts, ?retry_after, "accrual service rate limited");
                    delay = retry_after;
                }
                Err(OracleError::Permanent(reason)) => {
                    error!(attempts, %reason, "abandoning reconciliation");
                    return ReconcileOutcome::Abandoned { reason, attempts };
                }
            }

            if attempts >= self.policy.max_attempts {
                return self.give_up(GiveUpReason::AttemptsExhausted, attempts, last_status);
            }
        }
    }

    fn give_up(
        &self,
        reason: GiveUpReason,
        attempts: u32,
        last_status: OrderStatus,
    ) -> ReconcileOutcome {
        warn!(?reason, attempts, %last_status, "giving up on order");
        ReconcileOutcome::GivenUp {
            reason,
            attempts,
            last_status,
        }
    }

    async fn settle(&self, resolution: Resolution, attempts: u32) -> ReconcileOutcome {
        match self
            .ledger
            .apply_result(&self.event.order, &self.event.owner, resolution)
            .await
        {
            Ok(ApplyOutcome::Applied) => match resolution {
                Resolution::Processed(accrual) => ReconcileOutcome::Credited { accrual, attempts },
                Resolution::Invalid => ReconcileOutcome::Invalidated { attempts },
            },
            Ok(ApplyOutcome::AlreadyFinal) => ReconcileOutcome::AlreadyFinal { attempts },
            Err(e) => {
                // Not retried here; the order stays in its last stored status.
                error!(error = %e, ?resolution, "failed to apply reconciliation result");
                ReconcileOutcome::LedgerFailed {
                    reason: e.to_string(),
                    attempts,
                }
            }
        }
    }
}
