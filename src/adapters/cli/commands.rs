//! CLI command definitions
//!
//! Every command accepts `--config` and `--user`; the binary wires the
//! services and prints one JSON document per invocation.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::domain::trade::{TradeAmount, TradeInstruction, TradeIntent};

/// memeterm - agent-wallet memecoin trading terminal for Solana/Jupiter
#[derive(Parser, Debug)]
#[command(
    name = "memeterm",
    version = env!("CARGO_PKG_VERSION"),
    about = "Agent-wallet memecoin trading terminal for Solana/Jupiter",
    long_about = "memeterm resolves tokens, gates every trade behind a safety score, executes \
                  swaps and transfers from a sealed agent wallet, and watches open positions \
                  for stop-loss and take-profit exits."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// User the agent wallet belongs to
    #[arg(short, long, global = true, value_name = "ID", default_value = "default")]
    pub user: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Agent wallet management
    #[command(subcommand)]
    Wallet(WalletCmd),

    /// Buy or sell a token
    #[command(subcommand)]
    Trade(TradeCmd),

    /// Execute a structured instruction from an intent parser
    Instruct(InstructCmd),

    /// Resolve a ticker, name or mint to a token
    Resolve(ResolveCmd),

    /// Safety-score a token
    Safety(SafetyCmd),

    /// Trade and transfer history
    History(HistoryCmd),

    /// Open positions marked to market
    Portfolio,

    /// Automation playbooks
    #[command(subcommand)]
    Playbooks(PlaybooksCmd),

    /// Recent activity log
    Activity(ActivityCmd),

    /// Watch open positions for stop-loss/take-profit until Ctrl-C
    Monitor,
}

#[derive(Subcommand, Debug)]
pub enum WalletCmd {
    /// Deploy the agent wallet (idempotent)
    Create,
    /// Show the wallet address
    Show,
    /// Show the SOL balance
    Balance,
    /// Send SOL or an SPL token out of the agent wallet
    Withdraw(WithdrawCmd),
}

#[derive(Args, Debug)]
pub struct WithdrawCmd {
    /// Recipient address
    #[arg(value_name = "TO")]
    pub to: String,

    /// Amount in whole units
    #[arg(value_name = "AMOUNT")]
    pub amount: f64,

    /// SPL token mint; SOL when omitted
    #[arg(long, value_name = "MINT")]
    pub mint: Option<String>,

    /// Token decimals; read from the wallet's holding when omitted
    #[arg(long, value_name = "N")]
    pub decimals: Option<u8>,
}

#[derive(Subcommand, Debug)]
pub enum TradeCmd {
    Buy(BuyCmd),
    Sell(SellCmd),
}

#[derive(Args, Debug)]
pub struct BuyCmd {
    /// Ticker, name or mint address
    #[arg(value_name = "TOKEN")]
    pub token: String,

    #[command(flatten)]
    pub amount: BuyAmount,

    /// Stop-loss percentage
    #[arg(long, value_name = "PCT")]
    pub sl: Option<f64>,

    /// Take-profit percentage
    #[arg(long, value_name = "PCT")]
    pub tp: Option<f64>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct BuyAmount {
    /// Spend this much SOL
    #[arg(long, value_name = "SOL")]
    pub sol: Option<f64>,

    /// Spend this many USD worth of SOL
    #[arg(long, value_name = "USD")]
    pub usd: Option<f64>,

    /// Spend this share of the SOL balance
    #[arg(long, value_name = "PCT")]
    pub pct: Option<f64>,
}

#[derive(Args, Debug)]
pub struct SellCmd {
    /// Ticker, name or mint address
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Share of the holding to sell
    #[arg(long, value_name = "PCT", default_value = "100")]
    pub pct: f64,
}

#[derive(Args, Debug)]
pub struct InstructCmd {
    /// `{"intent":"BUY","token_query":"BONK","amount_usd":50}`
    #[arg(value_name = "JSON")]
    pub json: String,
}

#[derive(Args, Debug)]
pub struct ResolveCmd {
    #[arg(value_name = "QUERY")]
    pub query: String,
}

#[derive(Args, Debug)]
pub struct SafetyCmd {
    #[arg(value_name = "MINT")]
    pub mint: String,
}

#[derive(Args, Debug)]
pub struct HistoryCmd {
    /// Maximum number of records
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum PlaybooksCmd {
    /// Catalogue plus this user's activations
    List,
    Activate(ActivateCmd),
    Deactivate(DeactivateCmd),
}

#[derive(Args, Debug)]
pub struct ActivateCmd {
    #[arg(value_name = "PLAYBOOK")]
    pub id: String,

    /// Custom parameters merged over the playbook defaults
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub params: String,
}

#[derive(Args, Debug)]
pub struct DeactivateCmd {
    #[arg(value_name = "PLAYBOOK")]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ActivityCmd {
    #[arg(short, long, default_value_t = crate::application::DEFAULT_ACTIVITY_LIMIT)]
    pub limit: usize,
}

impl BuyCmd {
    pub fn instruction(&self) -> TradeInstruction {
        let amount = match (self.amount.sol, self.amount.usd, self.amount.pct) {
            (Some(sol), _, _) => TradeAmount::Sol(sol),
            (None, Some(usd), _) => TradeAmount::Usd(usd),
            (None, None, pct) => TradeAmount::Pct(pct.unwrap_or_default()),
        };
        TradeInstruction::new(TradeIntent::Buy, self.token.clone())
            .with_amount(amount)
            .with_exits(self.sl, self.tp)
    }
}

impl SellCmd {
    pub fn instruction(&self) -> TradeInstruction {
        TradeInstruction::sell_pct(self.token.clone(), self.pct)
    }
}

impl InstructCmd {
    pub fn instruction(&self) -> serde_json::Result<TradeInstruction> {
        serde_json::from_str(&self.json)
    }
}
