//! Client for the custody service.

pub mod client;
pub mod wallet_api;

pub use client::RemoteClient;
pub use wallet_api::{HttpWalletApi, WalletApi, CRYPTO_TX_ID, ORDERS_API, WALLETS_API};
