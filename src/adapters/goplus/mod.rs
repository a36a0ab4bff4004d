//! GoPlus Security Adapter
//!
//! Implements `SecurityService` over the GoPlus Solana token_security API:
//! - honeypot flags (closable, non-transferable, transfer hook, mutable balance)
//! - mint and freeze authority status
//! - holder concentration and creator holdings
//! - pool liquidity and LP burn evidence

mod client;
mod types;

pub use client::{GoPlusClient, GoPlusConfig};
pub use types::{GoPlusToken, SecurityResponse};
