//! Wholesale accounts domain module.
//!
//! Business buyers: lifecycle status, pricing tier, payment terms, approval
//! policy and the credit counter charged by credit/invoice orders. Pure domain
//! logic (no IO, no storage).

pub mod account;
pub mod credit;

pub use account::{AccountStatus, ApprovalPolicy, PaymentTerms, WholesaleAccount};
pub use credit::{CreditCharge, CreditError};
