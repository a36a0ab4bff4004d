//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Jupiter: routing quotes, swap transactions, token search and prices
//! - Solana: RPC client and the sealed agent-wallet key store
//! - GoPlus: token security facts
//! - CoinGecko: SOL/USD conversion rate
//! - Store: file-backed ledger, positions and automations
//! - CLI: Command-line interface definitions

pub mod cli;
pub mod coingecko;
pub mod goplus;
pub mod jupiter;
pub mod solana;
pub mod store;

pub use cli::CliApp;
pub use coingecko::{CoinGeckoConfig, CoinGeckoRate};
pub use goplus::{GoPlusClient, GoPlusConfig};
pub use jupiter::{JupiterClient, JupiterPriceClient, JupiterTokenRegistry};
pub use solana::{FileKeyStore, SolanaClient};
pub use store::{FileAutomationStore, JsonPositionStore, JsonlTradeLedger};
