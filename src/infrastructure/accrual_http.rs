//! HTTP client for the external accrual service.
//!
//! Issues `GET {base}/api/orders/{number}` and classifies every outcome into
//! an [`AccrualReport`] or an [`OracleError`].

use crate::domain::accrual::{AccrualReport, OracleStatus};
use crate::domain::money::Money;
use crate::domain::order::OrderNumber;
use crate::domain::ports::AccrualOracle;
use crate::error::{LoyaltyError, OracleError};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Accrual client configuration.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL of the accrual service, e.g. `http://localhost:8081`.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Used when a 429 carries no parseable `Retry-After`.
    pub default_retry_after: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(5),
            default_retry_after: Duration::from_secs(60),
        }
    }
}

impl OracleConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct AccrualResponse {
    order: String,
    status: String,
    #[serde(default)]
    accrual: Option<serde_json::Number>,
}

pub struct HttpAccrualOracle {
    client: Client,
    config: OracleConfig,
}

impl HttpAccrualOracle {
    pub fn new(config: OracleConfig) -> Result<Self, LoyaltyError> {
        if config.base_url.is_empty() {
            return Err(LoyaltyError::Config(
                "accrual service address not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LoyaltyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn order_url(&self, order: &OrderNumber) -> String {
        format!(
            "{}/api/orders/{}",
            self.config.base_url.trim_end_matches('/'),
            order
        )
    }

    fn retry_after(&self, response: &reqwest::Response) -> Duration {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_retry_after)
    }
}

/// Parses a 200 body. Anything that does not match the wire contract is permanent.
pub fn parse_report(body: &[u8], expected: &OrderNumber) -> Result<AccrualReport, OracleError> {
    let response: AccrualResponse = serde_json::from_slice(body)
        .map_err(|e| OracleError::Permanent(format!("malformed accrual response: {e}")))?;

    let status = OracleStatus::parse(&response.status).ok_or_else(|| {
        OracleError::Permanent(format!("unrecognized accrual status {:?}", response.status))
    })?;

    if response.order != expected.as_str() {
        return Err(OracleError::Permanent(format!(
            "response is for order {} instead of {}",
            response.order, expected
        )));
    }

    let accrual = response
        .accrual
        .map(|n| {
            let value: Decimal = n
                .to_string()
                .parse()
                .map_err(|e| OracleError::Permanent(format!("unreadable accrual {n}: {e}")))?;
            Money::from_decimal_rounded(value)
                .map_err(|e| OracleError::Permanent(format!("unusable accrual {n}: {e}")))
        })
        .transpose()?;

    Ok(AccrualReport {
        order: response.order,
        status,
        accrual,
    })
}

#[async_trait]
impl AccrualOracle for HttpAccrualOracle {
    async fn fetch_status(&self, order: &OrderNumber) -> Result<AccrualReport, OracleError> {
        let url = self.order_url(order);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Transient(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        debug!(%order, %status, "accrual service responded");
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(OracleError::RateLimited {
                    retry_after: self.retry_after(&response),
                });
            }
            // The service has not registered the order yet.
            StatusCode::NO_CONTENT => {
                return Err(OracleError::Transient(
                    "order not yet registered with the accrual service".to_string(),
                ));
            }
            s if s.is_server_error() => {
                return Err(OracleError::Transient(format!(
                    "accrual service returned {s}"
                )));
            }
            s if !s.is_success() => {
                return Err(OracleError::Permanent(format!(
                    "accrual service returned {s}"
                )));
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OracleError::Transient(format!("failed to read accrual response: {e}")))?;
        parse_report(&body, order)
    }
}
