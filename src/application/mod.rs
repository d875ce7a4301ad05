//! Application layer: order intake, the reconciliation pipeline and the
//! balance service, all written against the ports in [`crate::domain::ports`].

pub mod dispatcher;
pub mod ledger;
pub mod orders;
pub mod reconciler;
pub mod withdrawals;
