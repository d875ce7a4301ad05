//! Domain types: money, orders, balances, and the ports the application layer
//! talks to (store and accrual oracle).

pub mod account;
pub mod accrual;
pub mod luhn;
pub mod money;
pub mod order;
pub mod ports;
