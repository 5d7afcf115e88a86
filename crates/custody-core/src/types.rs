//! Core domain types for the agent wallet.

pub mod balance;
pub mod order;
pub mod transaction;
pub mod wallet;

pub use balance::*;
pub use order::*;
pub use transaction::*;
pub use wallet::*;
