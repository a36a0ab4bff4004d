//! Configuration Loader
//!
//! Loads `memeterm.toml`, applies environment overrides and validates the
//! result. Every section has defaults, so an empty file is a valid config.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::coingecko::CoinGeckoConfig;
use crate::adapters::goplus::GoPlusConfig;
use crate::adapters::jupiter::{JupiterConfig, JupiterTokenConfig};
use crate::application::automation::{ExitFailurePolicy, DEFAULT_RECONCILE_INTERVAL};
use crate::application::execution::ExecutorConfig;
use crate::application::orchestrator::OrchestratorConfig;
use crate::application::retry::RetryPolicy;
use crate::domain::risk::RiskParams;
use crate::ports::chain::SendOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config/memeterm.toml";

/// Main configuration structure matching memeterm.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub risk: RiskSection,
    pub execution: ExecutionSection,
    pub jupiter: JupiterSection,
    pub solana: SolanaSection,
    pub security: SecuritySection,
    pub prices: PricesSection,
    pub automation: AutomationSection,
    pub storage: StorageSection,
    pub wallet: WalletSection,
    pub logging: LoggingSection,
}

/// Portfolio-level risk limits applied by the orchestrator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    /// Largest buy as a percentage of the SOL balance
    pub max_position_pct: f64,
    /// Default stop-loss for new positions
    pub stop_loss_pct: f64,
    /// Default take-profit for new positions
    pub take_profit_pct: f64,
    /// Refuse buys once today's realized loss exceeds this share of the wallet
    pub daily_drawdown_pct: f64,
    /// 0 disables the limit
    pub max_open_positions: usize,
}

impl Default for RiskSection {
    fn default() -> Self {
        let params = RiskParams::default();
        Self {
            max_position_pct: params.max_position_pct,
            stop_loss_pct: params.stop_loss_pct,
            take_profit_pct: params.take_profit_pct,
            daily_drawdown_pct: params.daily_drawdown_pct,
            max_open_positions: params.max_open_positions,
        }
    }
}

/// Swap/transfer executor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Dust threshold in input base units
    pub min_trade_base_units: u64,
    /// SOL kept back for fees
    pub gas_reserve_lamports: u64,
    /// Single-swap cap as a percentage of the SOL balance
    pub max_trade_balance_pct: f64,
    /// Slippage escalation ladder, strictly increasing
    pub slippage_ladder_bps: Vec<u16>,
    pub sell_slippage_bps: u16,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub confirm_timeout_secs: u64,
    pub skip_preflight: bool,
    pub max_send_retries: usize,
    pub explorer_url: String,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let exec = ExecutorConfig::default();
        Self {
            min_trade_base_units: exec.min_trade_base_units,
            gas_reserve_lamports: exec.gas_reserve_lamports,
            max_trade_balance_pct: exec.max_trade_balance_fraction * 100.0,
            slippage_ladder_bps: exec.slippage_ladder_bps,
            sell_slippage_bps: crate::domain::risk::SELL_SLIPPAGE_BPS,
            retry_attempts: 3,
            retry_backoff_ms: 2_000,
            confirm_timeout_secs: exec.confirm_timeout.as_secs(),
            skip_preflight: true,
            max_send_retries: 3,
            explorer_url: exec.explorer_base_url,
        }
    }
}

/// Jupiter API configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JupiterSection {
    /// Swap API base URL (quote + swap)
    pub api_url: String,
    pub token_api_url: String,
    pub price_api_url: String,
    /// Optional API key, sent as `x-api-key`
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Priority fee level: "medium", "high", "veryHigh"
    pub priority_level: String,
    pub max_priority_fee_lamports: u64,
    pub dynamic_slippage: bool,
}

impl Default for JupiterSection {
    fn default() -> Self {
        let swap = JupiterConfig::default();
        Self {
            api_url: swap.api_base_url,
            token_api_url: JupiterTokenConfig::default().token_api_url,
            price_api_url: "https://api.jup.ag/price/v3".to_string(),
            api_key: None,
            timeout_secs: swap.timeout.as_secs(),
            priority_level: swap.priority_level,
            max_priority_fee_lamports: swap.max_priority_fee_lamports,
            dynamic_slippage: swap.dynamic_slippage,
        }
    }
}

/// Solana RPC configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolanaSection {
    pub rpc_url: String,
    /// "processed", "confirmed" or "finalized"
    pub commitment: String,
    pub confirm_poll_ms: u64,
}

impl Default for SolanaSection {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            confirm_poll_ms: 500,
        }
    }
}

/// Token security service section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub api_url: String,
    pub timeout_secs: u64,
    /// 0 disables the assessment cache
    pub cache_ttl_secs: u64,
}

impl Default for SecuritySection {
    fn default() -> Self {
        let goplus = GoPlusConfig::default();
        Self {
            api_url: goplus.api_url,
            timeout_secs: goplus.timeout.as_secs(),
            cache_ttl_secs: 300,
        }
    }
}

/// Price feed and SOL/USD rate section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricesSection {
    pub poll_interval_secs: u64,
    pub rate_api_url: String,
    pub rate_cache_secs: u64,
    /// Used when the rate source is unreachable
    pub fallback_sol_usd: f64,
}

impl Default for PricesSection {
    fn default() -> Self {
        let rate = CoinGeckoConfig::default();
        Self {
            poll_interval_secs: 3,
            rate_api_url: rate.api_url,
            rate_cache_secs: rate.cache_ttl.as_secs(),
            fallback_sol_usd: rate.fallback_rate,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationSection {
    pub on_exit_failure: ExitFailurePolicy,
    /// How often `monitor` re-reads open positions from the store
    pub reconcile_secs: u64,
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            on_exit_failure: ExitFailurePolicy::default(),
            reconcile_secs: DEFAULT_RECONCILE_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory for wallets, trades, positions and automations. `~` is expanded.
    pub data_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: "~/.memeterm".to_string(),
        }
    }
}

/// Agent wallet sealing. Prefer WALLET_ENCRYPTION_KEY over putting the key here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletSection {
    /// 64 hex chars (AES-256 key)
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter when neither RUST_LOG nor --verbose/--debug is given
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file, with environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

/// Like `load_config`, except that a missing file at the default path means
/// built-in defaults (still subject to environment overrides)
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        let mut config = Config::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        return Ok(config);
    }
    load_config(path)
}

fn check_pct(name: &str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let low_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !low_ok || value > 100.0 || !value.is_finite() {
        return Err(ConfigError::ValidationError(format!("{} must be 0-100, got {}", name, value)));
    }
    Ok(())
}

fn check_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!("{} cannot be empty", name)));
    }
    Ok(())
}

impl Config {
    /// Environment wins over the file for endpoints and secrets
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = set("SOLANA_RPC_URL") {
            self.solana.rpc_url = url;
        }
        if let Some(key) = set("JUPITER_API_KEY") {
            self.jupiter.api_key = Some(key);
        }
        if let Some(key) = set("WALLET_ENCRYPTION_KEY") {
            self.wallet.encryption_key = Some(key);
        }
        if let Some(dir) = set("MEMETERM_DATA_DIR") {
            self.storage.data_dir = dir;
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_pct("max_position_pct", self.risk.max_position_pct, false)?;
        check_pct("stop_loss_pct", self.risk.stop_loss_pct, false)?;
        check_pct("daily_drawdown_pct", self.risk.daily_drawdown_pct, false)?;
        // take-profit targets above +100% are normal for memecoins
        if !(self.risk.take_profit_pct > 0.0) || !self.risk.take_profit_pct.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "take_profit_pct must be > 0, got {}",
                self.risk.take_profit_pct
            )));
        }

        check_pct("max_trade_balance_pct", self.execution.max_trade_balance_pct, false)?;
        let ladder = &self.execution.slippage_ladder_bps;
        if ladder.is_empty() {
            return Err(ConfigError::ValidationError("slippage_ladder_bps cannot be empty".to_string()));
        }
        if ladder.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ValidationError(format!(
                "slippage_ladder_bps must be strictly increasing, got {:?}",
                ladder
            )));
        }
        if self.execution.retry_attempts == 0 {
            return Err(ConfigError::ValidationError("retry_attempts must be > 0".to_string()));
        }
        if self.execution.confirm_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("confirm_timeout_secs must be > 0".to_string()));
        }

        check_url("jupiter.api_url", &self.jupiter.api_url)?;
        check_url("jupiter.token_api_url", &self.jupiter.token_api_url)?;
        check_url("jupiter.price_api_url", &self.jupiter.price_api_url)?;
        check_url("solana.rpc_url", &self.solana.rpc_url)?;
        check_url("security.api_url", &self.security.api_url)?;
        check_url("prices.rate_api_url", &self.prices.rate_api_url)?;

        if !matches!(self.solana.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            return Err(ConfigError::ValidationError(format!(
                "commitment must be processed, confirmed or finalized, got '{}'",
                self.solana.commitment
            )));
        }
        if self.prices.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError("poll_interval_secs must be > 0".to_string()));
        }
        if !(self.prices.fallback_sol_usd > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "fallback_sol_usd must be > 0, got {}",
                self.prices.fallback_sol_usd
            )));
        }
        if self.automation.reconcile_secs == 0 {
            return Err(ConfigError::ValidationError("reconcile_secs must be > 0".to_string()));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError("data_dir cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.data_dir).into_owned())
    }
}

impl From<&RiskSection> for RiskParams {
    fn from(risk: &RiskSection) -> Self {
        RiskParams {
            max_position_pct: risk.max_position_pct,
            stop_loss_pct: risk.stop_loss_pct,
            take_profit_pct: risk.take_profit_pct,
            daily_drawdown_pct: risk.daily_drawdown_pct,
            max_open_positions: risk.max_open_positions,
        }
    }
}

impl From<&ExecutionSection> for ExecutorConfig {
    fn from(exec: &ExecutionSection) -> Self {
        ExecutorConfig {
            min_trade_base_units: exec.min_trade_base_units,
            gas_reserve_lamports: exec.gas_reserve_lamports,
            max_trade_balance_fraction: exec.max_trade_balance_pct / 100.0,
            slippage_ladder_bps: exec.slippage_ladder_bps.clone(),
            retry: RetryPolicy::new(exec.retry_attempts, Duration::from_millis(exec.retry_backoff_ms)),
            confirm_timeout: Duration::from_secs(exec.confirm_timeout_secs),
            send_options: SendOptions {
                skip_preflight: exec.skip_preflight,
                max_retries: Some(exec.max_send_retries),
            },
            explorer_base_url: exec.explorer_url.clone(),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        OrchestratorConfig {
            risk: RiskParams::from(&config.risk),
            fallback_sol_usd: config.prices.fallback_sol_usd,
            sell_slippage_bps: config.execution.sell_slippage_bps,
        }
    }
}

impl From<&JupiterSection> for JupiterConfig {
    fn from(jupiter: &JupiterSection) -> Self {
        JupiterConfig {
            api_base_url: jupiter.api_url.clone(),
            api_key: jupiter.api_key.clone(),
            timeout: Duration::from_secs(jupiter.timeout_secs),
            priority_level: jupiter.priority_level.clone(),
            max_priority_fee_lamports: jupiter.max_priority_fee_lamports,
            dynamic_slippage: jupiter.dynamic_slippage,
        }
    }
}

impl From<&JupiterSection> for JupiterTokenConfig {
    fn from(jupiter: &JupiterSection) -> Self {
        JupiterTokenConfig {
            token_api_url: jupiter.token_api_url.clone(),
            api_key: jupiter.api_key.clone(),
            timeout: Duration::from_secs(jupiter.timeout_secs),
        }
    }
}

impl From<&SecuritySection> for GoPlusConfig {
    fn from(security: &SecuritySection) -> Self {
        GoPlusConfig {
            api_url: security.api_url.clone(),
            timeout: Duration::from_secs(security.timeout_secs),
        }
    }
}

impl From<&PricesSection> for CoinGeckoConfig {
    fn from(prices: &PricesSection) -> Self {
        CoinGeckoConfig {
            api_url: prices.rate_api_url.clone(),
            cache_ttl: Duration::from_secs(prices.rate_cache_secs),
            fallback_rate: prices.fallback_sol_usd,
            ..CoinGeckoConfig::default()
        }
    }
}
