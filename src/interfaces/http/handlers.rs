use super::AppState;
use crate::application::orders::SubmitOutcome;
use crate::domain::account::{UserBalance, UserId, Withdrawal};
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderStatus};
use crate::error::{LoyaltyError, Result};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Money>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            number: order.number.as_str().to_string(),
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order.submitted_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub current: Money,
    pub withdrawn: Money,
}

impl From<UserBalance> for BalanceView {
    fn from(balance: UserBalance) -> Self {
        Self {
            current: balance.current,
            withdrawn: balance.withdrawn,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Money,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalView {
    pub order: String,
    pub sum: Money,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalView {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.order.as_str().to_string(),
            sum: withdrawal.sum,
            processed_at: withdrawal.processed_at,
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn submit_order(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    body: String,
) -> Result<StatusCode> {
    if body.trim().is_empty() {
        return Err(LoyaltyError::Validation("empty order number".into()));
    }
    match state.orders.submit_order(&user, &body).await? {
        SubmitOutcome::Accepted => Ok(StatusCode::ACCEPTED),
        SubmitOutcome::AlreadySubmitted => Ok(StatusCode::OK),
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Result<Response> {
    let orders = state.orders.orders(&user).await?;
    Ok(list_response(orders.into_iter().map(OrderView::from).collect()))
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Result<Json<BalanceView>> {
    let balance = state.balances.balance(&user).await?;
    Ok(Json(balance.into()))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    payload: std::result::Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(request) =
        payload.map_err(|e| LoyaltyError::Validation(format!("bad withdrawal request: {e}")))?;
    state
        .balances
        .withdraw(&user, &request.order, request.sum)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Result<Response> {
    let withdrawals = state.balances.withdrawals(&user).await?;
    Ok(list_response(
        withdrawals.into_iter().map(WithdrawalView::from).collect(),
    ))
}

/// `204 No Content` for an empty list, the JSON array otherwise.
fn list_response<T: Serialize>(items: Vec<T>) -> Response {
    if items.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(items).into_response()
    }
}
