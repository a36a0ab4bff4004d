//! memeterm - agent-wallet memecoin trading terminal for Solana/Jupiter

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use memeterm::adapters::cli::output;
use memeterm::adapters::cli::{CliApp, Command, PlaybooksCmd, TradeCmd, WalletCmd};
use memeterm::adapters::coingecko::{CoinGeckoConfig, CoinGeckoRate};
use memeterm::adapters::goplus::{GoPlusClient, GoPlusConfig};
use memeterm::adapters::jupiter::{
    JupiterClient, JupiterConfig, JupiterPriceClient, JupiterTokenConfig, JupiterTokenRegistry,
};
use memeterm::adapters::solana::{parse_encryption_key, FileKeyStore, SolanaClient};
use memeterm::adapters::store::{FileAutomationStore, JsonPositionStore, JsonlTradeLedger};
use memeterm::application::{
    AutomationEngine, ExecutorConfig, OrchestratorConfig, PortfolioService, PriceFeed, SafetyEvaluator,
    SwapExecutor, TokenResolver, TradeOrchestrator, TransferExecutor, WalletLocks, WalletService,
};
use memeterm::config::{load_or_default, Config};
use memeterm::domain::playbook::catalogue;
use memeterm::ports::{ChainRpc, HistoryQuery, PositionStore, PriceSource, QuoteService, RateSource, TradeLedger};

#[tokio::main]
async fn main() {
    // Load .env file if it exists (secrets go here, not in memeterm.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_or_default(&app.config)
        .with_context(|| format!("Failed to load configuration from {}", app.config.display()));
    let level = config.as_ref().map(|c| c.logging.level.as_str()).unwrap_or("warn");
    init_logging(app.verbose, app.debug, level);

    let result = match config {
        Ok(config) => run(app, config).await,
        Err(e) => Err(e),
    };
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{:#}", e);
            output::failure(&format!("{:#}", e))
        }
    };
    println!("{}", output::pretty(&report));

    let code = output::exit_code(output::status_of(&report));
    if code != 0 {
        std::process::exit(code);
    }
}

/// RUST_LOG wins; otherwise --debug, --verbose or the configured level.
/// Logs go to stderr so stdout stays pure JSON.
fn init_logging(verbose: bool, debug: bool, configured: &str) {
    let fallback = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Services that need no agent key
struct Terminal {
    config: Config,
    chain: Arc<dyn ChainRpc>,
    quotes: Arc<dyn QuoteService>,
    prices: Arc<dyn PriceSource>,
    rates: Arc<dyn RateSource>,
    resolver: Arc<TokenResolver>,
    safety: Arc<SafetyEvaluator>,
    ledger: Arc<dyn TradeLedger>,
    positions: Arc<dyn PositionStore>,
    automations: Arc<FileAutomationStore>,
}

/// Everything that signs with the agent wallet
struct Trading {
    wallets: WalletService,
    orchestrator: Arc<TradeOrchestrator>,
    engine: AutomationEngine,
    feed: PriceFeed,
}

impl Terminal {
    fn build(config: Config) -> Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let commitment = match config.solana.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        };
        let chain = SolanaClient::with_commitment(
            config.solana.rpc_url.clone(),
            commitment,
            Duration::from_millis(config.solana.confirm_poll_ms),
        );

        let quotes: Arc<dyn QuoteService> = Arc::new(
            JupiterClient::with_config(JupiterConfig::from(&config.jupiter))
                .context("Failed to create Jupiter client")?,
        );
        let registry = JupiterTokenRegistry::with_config(JupiterTokenConfig::from(&config.jupiter))
            .context("Failed to create Jupiter token registry")?;
        let prices = JupiterPriceClient::with_url(
            &config.jupiter.price_api_url,
            config.jupiter.api_key.clone(),
            Duration::from_secs(config.jupiter.timeout_secs),
        )
        .context("Failed to create Jupiter price client")?;
        let security = GoPlusClient::with_config(GoPlusConfig::from(&config.security))
            .context("Failed to create GoPlus client")?;
        let rates = CoinGeckoRate::with_config(CoinGeckoConfig::from(&config.prices))
            .context("Failed to create CoinGecko client")?;

        let resolver = TokenResolver::new(Arc::new(registry), quotes.clone());
        let safety = SafetyEvaluator::with_ttl(
            Arc::new(security),
            Duration::from_secs(config.security.cache_ttl_secs),
        );

        Ok(Self {
            chain: Arc::new(chain),
            quotes,
            prices: Arc::new(prices),
            rates: Arc::new(rates),
            resolver: Arc::new(resolver),
            safety: Arc::new(safety),
            ledger: Arc::new(JsonlTradeLedger::open(&data_dir)),
            positions: Arc::new(JsonPositionStore::open(&data_dir)),
            automations: Arc::new(FileAutomationStore::open(&data_dir)),
            config,
        })
    }

    fn trading(&self) -> Result<Trading> {
        let hex_key = self
            .config
            .wallet
            .encryption_key
            .as_deref()
            .ok_or_else(|| anyhow!("WALLET_ENCRYPTION_KEY is not set (64 hex chars)"))?;
        let key = parse_encryption_key(hex_key).context("Invalid wallet encryption key")?;
        let keys = Arc::new(FileKeyStore::open(&self.config.data_dir(), &key).context("Failed to open key store")?);

        let exec = ExecutorConfig::from(&self.config.execution);
        let swaps = SwapExecutor::with_config(self.quotes.clone(), self.chain.clone(), keys.clone(), exec.clone());
        let transfers = TransferExecutor::with_config(self.chain.clone(), keys.clone(), exec);

        let locks = Arc::new(WalletLocks::new());
        let orchestrator = Arc::new(
            TradeOrchestrator::new(
                self.resolver.clone(),
                self.safety.clone(),
                Arc::new(swaps),
                self.chain.clone(),
                self.rates.clone(),
                self.ledger.clone(),
                self.positions.clone(),
                OrchestratorConfig::from(&self.config),
            )
            .with_locks(locks.clone()),
        );

        let feed = PriceFeed::with_interval(
            self.prices.clone(),
            Duration::from_secs(self.config.prices.poll_interval_secs),
        );
        let engine = AutomationEngine::new(
            orchestrator.clone(),
            feed.clone(),
            self.positions.clone(),
            self.automations.clone(),
            self.config.automation.on_exit_failure,
        )
        .with_reconcile_interval(Duration::from_secs(self.config.automation.reconcile_secs));
        let wallets = WalletService::new(
            keys,
            self.chain.clone(),
            Arc::new(transfers),
            self.ledger.clone(),
            self.automations.clone(),
            locks,
        );

        Ok(Trading {
            wallets,
            orchestrator,
            engine,
            feed,
        })
    }
}

impl Trading {
    async fn address(&self, user: &str) -> Result<String> {
        self.wallets
            .wallet(user)
            .await?
            .map(|w| w.public_key)
            .ok_or_else(|| anyhow!("No wallet for user {}; run `memeterm wallet create` first", user))
    }
}

async fn run(app: CliApp, config: Config) -> Result<Value> {
    let terminal = Terminal::build(config)?;
    let user = app.user.as_str();

    match app.command {
        Command::Resolve(cmd) => {
            let resolution = terminal.resolver.resolve(&cmd.query).await?;
            Ok(output::success(&resolution))
        }
        Command::Safety(cmd) => {
            let assessment = terminal.safety.evaluate(&cmd.mint, None).await;
            Ok(output::success(&assessment))
        }
        Command::Wallet(cmd) => wallet_command(&terminal.trading()?, user, cmd).await,
        Command::Trade(cmd) => {
            let instruction = match &cmd {
                TradeCmd::Buy(buy) => buy.instruction(),
                TradeCmd::Sell(sell) => sell.instruction(),
            };
            let trading = terminal.trading()?;
            let wallet = trading.address(user).await?;
            let outcome = trading.orchestrator.process(&wallet, &instruction).await;
            Ok(output::with_status(outcome.status, &outcome))
        }
        Command::Instruct(cmd) => {
            let instruction = cmd.instruction().context("Malformed instruction JSON")?;
            let trading = terminal.trading()?;
            let wallet = trading.address(user).await?;
            let outcome = trading.orchestrator.process(&wallet, &instruction).await;
            Ok(output::with_status(outcome.status, &outcome))
        }
        Command::History(cmd) => {
            let wallet = terminal.trading()?.address(user).await?;
            let records = terminal
                .ledger
                .history(&HistoryQuery::wallet(wallet).with_limit(cmd.limit))
                .await?;
            Ok(output::success(&json!({ "records": records })))
        }
        Command::Portfolio => {
            let wallet = terminal.trading()?.address(user).await?;
            let portfolio = PortfolioService::new(
                terminal.positions.clone(),
                terminal.chain.clone(),
                terminal.prices.clone(),
                terminal.rates.clone(),
            );
            Ok(output::success(&portfolio.summary(&wallet).await?))
        }
        Command::Playbooks(cmd) => playbooks_command(&terminal, user, cmd).await,
        Command::Activity(cmd) => {
            let entries = terminal.trading()?.engine.activity(user, cmd.limit).await?;
            Ok(output::success(&json!({ "activity": entries })))
        }
        Command::Monitor => monitor_command(&terminal.trading()?, user).await,
    }
}

async fn wallet_command(trading: &Trading, user: &str, cmd: WalletCmd) -> Result<Value> {
    match cmd {
        WalletCmd::Create => Ok(output::success(&trading.wallets.create_wallet(user).await?)),
        WalletCmd::Show => match trading.wallets.wallet(user).await? {
            Some(info) => Ok(output::success(&info)),
            None => Ok(output::failure(&format!("No wallet for user {}", user))),
        },
        WalletCmd::Balance => Ok(output::success(&trading.wallets.balance(user).await?)),
        WalletCmd::Withdraw(cmd) => {
            let outcome = trading
                .wallets
                .withdraw(user, &cmd.to, cmd.amount, cmd.mint.as_deref(), cmd.decimals)
                .await?;
            Ok(output::with_status(outcome.status, &outcome))
        }
    }
}

async fn playbooks_command(terminal: &Terminal, user: &str, cmd: PlaybooksCmd) -> Result<Value> {
    if let PlaybooksCmd::List = cmd {
        // listing needs no wallet key
        use memeterm::ports::AutomationStore;
        let active = terminal.automations.list(user).await?;
        return Ok(output::success(&json!({ "playbooks": catalogue(), "active": active })));
    }

    let engine = terminal.trading()?.engine;
    match cmd {
        PlaybooksCmd::Activate(cmd) => {
            let params: Value = serde_json::from_str(&cmd.params).context("Malformed --params JSON")?;
            Ok(output::success(&engine.activate(user, &cmd.id, &params).await?))
        }
        PlaybooksCmd::Deactivate(cmd) => {
            let removed = engine.deactivate(user, &cmd.id).await?;
            if removed {
                Ok(output::success(&json!({ "playbook": cmd.id, "enabled": false })))
            } else {
                Ok(output::failure(&format!("Playbook {} is not active", cmd.id)))
            }
        }
        PlaybooksCmd::List => Ok(output::success(&json!({ "playbooks": catalogue() }))),
    }
}

async fn monitor_command(trading: &Trading, user: &str) -> Result<Value> {
    let wallet = trading.address(user).await?;
    let watched = trading.engine.start_monitoring(user, &wallet).await?;
    tracing::info!("Monitoring {} position(s) for {}; Ctrl-C to stop", watched, wallet);
    eprintln!("Monitoring {} position(s). Press Ctrl-C to stop.", watched);

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received");

    let still_watched = trading.engine.watched_positions().await;
    trading.engine.stop_monitoring().await;
    trading.feed.stop().await;

    Ok(output::success(&json!({
        "wallet": wallet,
        "watched_at_start": watched,
        "watched_at_stop": still_watched.len(),
    })))
}
