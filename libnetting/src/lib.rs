pub mod amount;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod error;
pub mod helpers;
pub mod ledger;
pub mod merkle;
pub mod node;
pub mod registry;
pub mod storage;
pub mod transfer;

#[cfg(test)]
mod tests;
