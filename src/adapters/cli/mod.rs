//! CLI Adapter
//!
//! Command-line interface for the memeterm trading terminal.
//! Uses clap derive macros for argument parsing; results are JSON.

mod commands;
pub mod output;

pub use commands::{
    ActivateCmd, ActivityCmd, BuyAmount, BuyCmd, CliApp, Command, DeactivateCmd, HistoryCmd, InstructCmd,
    PlaybooksCmd, ResolveCmd, SafetyCmd, SellCmd, TradeCmd, WalletCmd, WithdrawCmd,
};
