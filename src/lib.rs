#![allow(dead_code, unused_imports, unused_variables)]
//! memeterm - agent-wallet memecoin trading core for Solana/Jupiter
//!
//! Turns a structured trade instruction into a safety-gated on-chain swap,
//! records every execution, and closes positions automatically when a
//! stop-loss or take-profit level is crossed.
//!
//! # Modules
//!
//! - `domain`: Core types (TokenIdentity, SafetyAssessment, Position, TradeRecord, RiskParams)
//! - `ports`: Trait abstractions (QuoteService, ChainRpc, PriceSource, KeyStore, TradeLedger)
//! - `adapters`: External implementations (Jupiter, Solana, GoPlus, CoinGecko, file stores, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Resolver, safety evaluator, executors, orchestrator, price feed, automation

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
