//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Route quotes and swap transaction building
//! - Chain RPC (balances, submission, confirmation)
//! - Token registries, prices, conversion rate and security metadata
//! - Durable stores for keys, trades, positions and automations

pub mod routing;
pub mod chain;
pub mod market_data;
pub mod storage;
pub mod mocks;

pub use routing::{QuoteError, QuoteParams, QuoteService, RouteQuote, SwapTransaction};
pub use chain::{ChainError, ChainRpc, ConfirmOutcome, SendOptions, TokenHolding};
pub use market_data::{
    MarketDataError, PriceError, PriceSource, RateSource, RegistryError, RegistryTier, SecurityError,
    SecurityService, TokenRegistry,
};
pub use storage::{
    AutomationStore, AutomationStoreError, HistoryQuery, KeyStore, KeyStoreError, LedgerError, PositionStore,
    PositionStoreError, TradeLedger, WalletInfo,
};
