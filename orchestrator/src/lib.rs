//! Off-chain half of the redemption ledger: derives users' accounts, batches
//! their calls into sponsored transactions, runs them through worker
//! processes and reconciles the receipts into application state.

pub mod account;
pub mod authorize;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod observe;
pub mod protocol;
pub mod receipt;
pub mod reconcile;
pub mod redeem;
pub mod relay;
pub mod store;
pub mod submit;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, GaslessError, Result};
