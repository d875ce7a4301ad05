use super::dispatcher::IntakeQueue;
use crate::domain::account::UserId;
use crate::domain::order::{Order, OrderNumber, SubmissionEvent};
use crate::domain::ports::{OrderInsert, SharedStore};
use crate::error::{LoyaltyError, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored as NEW and handed to the pipeline.
    Accepted,
    /// The same user already submitted this number; nothing changed.
    AlreadySubmitted,
}

/// Order intake: validation, registration and hand-off to reconciliation.
#[derive(Clone)]
pub struct OrderService {
    store: SharedStore,
    intake: IntakeQueue,
}

impl OrderService {
    pub fn new(store: SharedStore, intake: IntakeQueue) -> Self {
        Self { store, intake }
    }

    /// Registers `raw` for `owner` and enqueues it for reconciliation.
    ///
    /// # Errors
    ///
    /// * [`LoyaltyError::Validation`] for an empty number.
    /// * [`LoyaltyError::InvalidOrderNumber`] when the Luhn check fails.
    /// * [`LoyaltyError::Conflict`] when another user owns the number.
    /// * [`LoyaltyError::QueueFull`] / [`LoyaltyError::QueueClosed`] when the
    ///   pipeline cannot take the event. The order is already stored as NEW
    ///   in that case and is not retried.
    pub async fn submit_order(&self, owner: &UserId, raw: &str) -> Result<SubmitOutcome> {
        let number = OrderNumber::parse(raw.trim())?;

        if let Some(existing) = self.store.order_owner(&number).await? {
            return resolve_existing(&number, owner, existing);
        }

        match self.store.insert_order(&number, owner).await? {
            OrderInsert::Inserted => {}
            // lost a race with a concurrent submission
            OrderInsert::Exists(existing) => return resolve_existing(&number, owner, existing),
        }

        let event = SubmissionEvent {
            order: number.clone(),
            owner: owner.clone(),
        };
        if let Err(e) = self.intake.enqueue(event).await {
            warn!(order = %number, %owner, error = %e, "order stored but not queued for reconciliation");
            return Err(e);
        }

        info!(order = %number, %owner, "order accepted");
        Ok(SubmitOutcome::Accepted)
    }

    pub async fn orders(&self, owner: &UserId) -> Result<Vec<Order>> {
        self.store.orders_by_owner(owner).await
    }
}

fn resolve_existing(number: &OrderNumber, owner: &UserId, existing: UserId) -> Result<SubmitOutcome> {
    if &existing == owner {
        Ok(SubmitOutcome::AlreadySubmitted)
    } else {
        Err(LoyaltyError::Conflict(format!(
            "order {number} was submitted by another user"
        )))
    }
}
