#![allow(dead_code)]

use async_trait::async_trait;
use loyalty_accrual::application::reconciler::PollPolicy;
use loyalty_accrual::domain::accrual::{AccrualReport, OracleStatus};
use loyalty_accrual::domain::luhn;
use loyalty_accrual::domain::money::Money;
use loyalty_accrual::domain::order::OrderNumber;
use loyalty_accrual::domain::ports::AccrualOracle;
use loyalty_accrual::error::OracleError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Answer = Result<AccrualReport, OracleError>;

/// Per-order canned answers. Once an order's script runs out the oracle
/// keeps reporting PROCESSING.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<String, VecDeque<Answer>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, order: &str, answers: Vec<Answer>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(order.to_string(), answers.into());
    }

    pub fn calls(&self, order: &str) -> usize {
        self.calls.lock().unwrap().get(order).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AccrualOracle for ScriptedOracle {
    async fn fetch_status(&self, order: &OrderNumber) -> Answer {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(order.as_str().to_string())
            .or_default() += 1;

        self.scripts
            .lock()
            .unwrap()
            .get_mut(order.as_str())
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Ok(report(order.as_str(), OracleStatus::Processing, None)))
    }
}

pub fn report(order: &str, status: OracleStatus, accrual_minor: Option<i64>) -> AccrualReport {
    AccrualReport {
        order: order.to_string(),
        status,
        accrual: accrual_minor.map(Money::from_minor),
    }
}

pub fn processing(order: &str) -> Answer {
    Ok(report(order, OracleStatus::Processing, None))
}

pub fn processed(order: &str, accrual_minor: i64) -> Answer {
    Ok(report(order, OracleStatus::Processed, Some(accrual_minor)))
}

/// Appends the Luhn check digit to `payload`.
pub fn luhn_number(payload: u64) -> String {
    let payload = payload.to_string();
    let digit = luhn::check_digit(&payload).unwrap();
    format!("{payload}{digit}")
}

/// Reference bounds with a short interval so paused-clock tests stay readable.
pub fn quick_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(1),
        deadline: Duration::from_secs(120),
        max_attempts: 12,
    }
}
