//! Jupiter Adapter
//!
//! Route quotes and swap transactions (`QuoteService`), token search
//! (`TokenRegistry`) and USD prices (`PriceSource`).

mod client;
mod price;
mod quote;
mod swap;
mod token_list;

pub use client::{JupiterClient, JupiterConfig};
pub use price::JupiterPriceClient;
pub use quote::{QuoteRequest, QuoteResponse};
pub use swap::{SwapRequest, SwapResponse};
pub use token_list::{JupiterToken, JupiterTokenConfig, JupiterTokenRegistry};
