pub mod automation;
pub mod execution;
pub mod orchestrator;
pub mod portfolio;
pub mod price_feed;
pub mod resolver;
pub mod retry;
pub mod safety;
pub mod swap_executor;
pub mod transfer_executor;
pub mod wallet;

pub use automation::{AutomationEngine, AutomationError, ExitFailurePolicy, DEFAULT_ACTIVITY_LIMIT};
pub use execution::{ExecFailure, ExecutorConfig, Fill, TxOutcome};
pub use orchestrator::{OrchestratorConfig, TradeEvent, TradeOrchestrator, TradeOutcome, WalletLocks};
pub use portfolio::{PortfolioError, PortfolioService};
pub use price_feed::{PriceFeed, PriceUpdate};
pub use resolver::{ResolveError, ResolverConfig, TokenResolver};
pub use retry::RetryPolicy;
pub use safety::SafetyEvaluator;
pub use swap_executor::{SwapExecutor, SwapRequest};
pub use transfer_executor::{TransferExecutor, TransferRequest};
pub use wallet::{WalletBalance, WalletService, WalletServiceError};
