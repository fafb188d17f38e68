#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand, ValueEnum};
use eyre::Context as _;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt as _;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::prelude::*;

mod allowance;
mod amount;
mod cli_output;
mod config;
mod errors;
mod financial_math;
mod fsutil;
mod history;
mod ledger;
mod orchestrator;
mod pair;
mod paths;
mod portfolio;
mod quote;
mod reconcile;
mod retry;
mod slippage;
mod store;

use crate::amount::{format_amount_base_to_ui_string, format_amount_for_display, parse_positive_amount};
use crate::config::BlockbankConfig;
use crate::errors::SwapError;
use crate::history::{FileStorage, HistoryStore};
use crate::ledger::evm::{parse_address, EvmLedger};
use crate::ledger::Ledger as _;
use crate::orchestrator::{ActionOutcome, Orchestrator, SwapIntent};
use crate::pair::{Direction, Pair};
use crate::paths::BlockbankPaths;
use crate::quote::{QuoteApply, QuoteBoard, QuoteEngine, QuoteInput};
use crate::slippage::SlippageTolerance;
use alloy::primitives::{Address, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliDirection {
    /// Sell token A (BBUSD) for token B (BBETH).
    AToB,
    /// Sell token B (BBETH) for token A (BBUSD).
    BToA,
}

impl From<CliDirection> for Direction {
    fn from(v: CliDirection) -> Self {
        match v {
            CliDirection::AToB => Self::AToB,
            CliDirection::BToA => Self::BToA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliToken {
    A,
    B,
}

#[derive(Parser, Debug)]
#[command(name = "blockbank", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print the effective configuration (file plus environment overrides).
    Config,

    /// Print the contract's ETH/USD oracle price.
    Price,

    /// Show token balances and their USD value.
    Portfolio {
        /// Account to inspect. Defaults to the configured or wallet-reported account.
        #[arg(long)]
        account: Option<String>,
    },

    /// Mint test tokens from a token's faucet.
    Faucet {
        #[arg(long, value_enum)]
        token: CliToken,
        #[arg(long)]
        account: Option<String>,
    },

    /// Estimate the output for selling `amount`.
    ///
    /// With `--watch`, reads edits from stdin, one per line: an amount, `flip`, `a-to-b`, or `b-to-a`.
    Quote {
        #[arg(required_unless_present = "watch")]
        amount: Option<String>,
        #[arg(long, value_enum, default_value_t = CliDirection::AToB)]
        direction: CliDirection,
        #[arg(long, default_value_t = false)]
        watch: bool,
    },

    /// Swap `amount` of the sell token (or `max` for the whole balance).
    ///
    /// If the allowance does not cover the amount, an approval for exactly that amount is sent
    /// first; the swap follows once the re-read allowance covers it.
    Swap {
        amount: String,
        #[arg(long, value_enum, default_value_t = CliDirection::AToB)]
        direction: CliDirection,
        /// Slippage tolerance in percent, 0 to 50. Defaults to the configured value.
        #[arg(long)]
        slippage: Option<String>,
        #[arg(long)]
        account: Option<String>,
        /// Skip the confirmation prompt (required for non-interactive shells).
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Local and on-chain transaction history.
    History {
        #[command(subcommand)]
        cmd: HistoryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List transactions, newest first.
    List {
        /// Rebuild from the contract's event log instead of the local cache.
        #[arg(long, default_value_t = false)]
        onchain: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Delete the local history.
    Clear,
}

fn init_logging(paths: &BlockbankPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("blockbank.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

/// `--account`, then the configured account, then the wallet's first account.
async fn resolve_owner(
    cfg: &BlockbankConfig,
    ledger: &EvmLedger,
    account: Option<&str>,
) -> eyre::Result<Address> {
    if let Some(a) = account.or(cfg.wallet.account.as_deref()) {
        return parse_address(a);
    }
    ledger
        .wallet_accounts()
        .await
        .context("ask wallet for accounts (or set --account / BLOCKBANK_ACCOUNT)")?
        .first()
        .copied()
        .ok_or_else(|| eyre::eyre!("wallet reported no accounts; pass --account"))
}

fn history_store(paths: &BlockbankPaths) -> HistoryStore<FileStorage> {
    HistoryStore::load(FileStorage::new(paths))
}

async fn run_quote(
    cfg: &BlockbankConfig,
    ledger: EvmLedger,
    pair: Pair,
    amount: Option<String>,
    direction: Direction,
    watch: bool,
) -> eyre::Result<()> {
    let engine = QuoteEngine::new(ledger);
    if !watch {
        let text = amount.unwrap_or_default();
        let amount_in = parse_positive_amount(&text, pair.sell_token(direction).decimals);
        let out = engine.quote(amount_in, direction).await?;
        return cli_output::print_json(&quote_json(&pair, direction, amount_in, out, None));
    }

    let (in_tx, in_rx) = mpsc::channel(32);
    let (up_tx, mut up_rx) = mpsc::channel(32);
    if let Some(a) = amount {
        in_tx.send(QuoteInput::Amount(a)).await.context("queue initial amount")?;
    }
    let feed = tokio::spawn(quote::watch_quotes(
        engine,
        pair.clone(),
        direction,
        Duration::from_millis(cfg.swap.quote_debounce_ms),
        in_rx,
        up_tx,
    ));
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let input = match line.trim() {
                "" => continue,
                "flip" | "switch" => QuoteInput::Flip,
                "a-to-b" => QuoteInput::Direction(Direction::AToB),
                "b-to-a" => QuoteInput::Direction(Direction::BToA),
                other => QuoteInput::Amount(other.to_owned()),
            };
            if in_tx.send(input).await.is_err() {
                break;
            }
        }
    });
    while let Some(u) = up_rx.recv().await {
        let err = (u.outcome == QuoteApply::Failed).then_some("quote request failed");
        cli_output::print_json(&quote_json(
            &pair,
            u.direction,
            u.amount,
            u.quote.map(|q| q.amount_out),
            err,
        ))?;
    }
    feed.await.context("quote feed")?;
    Ok(())
}

fn quote_json(
    pair: &Pair,
    direction: Direction,
    amount_in: Option<U256>,
    amount_out: Option<U256>,
    error: Option<&str>,
) -> serde_json::Value {
    let sell = pair.sell_token(direction);
    let buy = pair.buy_token(direction);
    serde_json::json!({
        "direction": direction.to_string(),
        "sell": sell.symbol,
        "buy": buy.symbol,
        "amount_in": amount_in.map(|a| format_amount_base_to_ui_string(a, sell.decimals)),
        "amount_out": amount_out.map(|a| format_amount_for_display(a, buy.decimals)),
        "error": error,
    })
}

struct SwapArgs {
    amount: String,
    direction: Direction,
    slippage: Option<String>,
    account: Option<String>,
    yes: bool,
}

async fn run_swap(
    cfg: &BlockbankConfig,
    paths: &BlockbankPaths,
    ledger: EvmLedger,
    pair: Pair,
    args: SwapArgs,
) -> eyre::Result<()> {
    let tolerance = match args.slippage.as_deref() {
        Some(s) => SlippageTolerance::parse(s)?,
        None => SlippageTolerance::parse(&cfg.swap.default_slippage_percent)
            .context("swap.default_slippage_percent in config.toml")?,
    };
    if tolerance.is_high_risk() {
        cli_output::warn_high_slippage(tolerance);
    }

    let direction = args.direction;
    let sell = pair.sell_token(direction).clone();
    let owner = resolve_owner(cfg, &ledger, args.account.as_deref()).await?;
    let balance = ledger.balance_of(sell.address, owner).await.ok();
    let sell_amount = if args.amount.trim().eq_ignore_ascii_case("max") {
        balance.filter(|b| !b.is_zero())
    } else {
        parse_positive_amount(&args.amount, sell.decimals)
    };

    cli_output::confirm_or_bail(
        &format!(
            "Swap {} {} ({}) from {owner} with {}% slippage tolerance.",
            args.amount.trim(),
            sell.symbol,
            pair.label(direction),
            tolerance.percent()
        ),
        args.yes,
    )?;

    let engine = QuoteEngine::new(ledger.clone());
    let mut orch = Orchestrator::new(ledger, history_store(paths), pair, owner);
    let mut phases = orch.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match phases.recv().await {
                Ok(p) => cli_output::print_phase(p),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "phase printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    orch.refresh_allowance(direction).await;

    // At most an approval followed by the swap.
    let mut board = QuoteBoard::default();
    let mut result: Result<Option<ActionOutcome>, SwapError> = Ok(None);
    for _ in 0_u8..2_u8 {
        let ticket = board.request(sell_amount, direction);
        board.apply(ticket, engine.quote(sell_amount, direction).await);
        let quote = sell_amount.and_then(|a| board.quote_for(a, direction));
        let intent = SwapIntent {
            direction,
            sell_amount,
            quote,
            tolerance,
            sell_balance: balance,
        };
        match orch.request_action(&intent).await {
            Ok(outcome) => {
                if let Some(n) = orch.active_notice(Instant::now()) {
                    cli_output::print_notice(n);
                }
                let approved_enough = matches!(
                    outcome,
                    ActionOutcome::Approved {
                        ready_to_swap: true,
                        ..
                    }
                );
                result = Ok(Some(outcome));
                if !approved_enough {
                    break;
                }
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    drop(orch);
    drop(printer.await);

    match result {
        Ok(Some(outcome)) => cli_output::print_json(&outcome),
        Ok(None) => Ok(()),
        Err(e) => {
            cli_output::print_json(&serde_json::json!({
                "ok": false,
                "code": e.code(),
                "input_rejection": e.is_input_rejection(),
                "error": e.to_string(),
            }))?;
            Err(eyre::Report::new(e))
        }
    }
}

async fn run_history(
    cfg: &BlockbankConfig,
    paths: &BlockbankPaths,
    cmd: HistoryCommand,
) -> eyre::Result<()> {
    match cmd {
        HistoryCommand::List {
            onchain: false,
            limit,
            ..
        } => {
            let store = history_store(paths);
            let n = limit.unwrap_or(usize::MAX);
            let rows: Vec<_> = store.records().iter().take(n).collect();
            cli_output::print_json_pretty(&rows)
        }
        HistoryCommand::List {
            onchain: true,
            limit,
            account,
        } => {
            let ledger = EvmLedger::from_config(cfg)?;
            let owner = resolve_owner(cfg, &ledger, account.as_deref()).await?;
            let reconciler = reconcile::HistoryReconciler::new(ledger, cfg.pair()?);
            let mut rows = reconciler.rebuild(owner).await?;
            rows.truncate(limit.unwrap_or(usize::MAX));
            cli_output::print_json_pretty(&rows)
        }
        HistoryCommand::Clear => {
            let removed = history_store(paths).clear()?;
            cli_output::print_json(&serde_json::json!({ "cleared": removed }))
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = BlockbankPaths::discover()?;
    paths.ensure_private_dirs()?;
    let _log_guard = init_logging(&paths);

    let cfg = store::ConfigStore::new(&paths)
        .load_or_init_default()
        .context("load config")?;

    match cli.cmd {
        Command::Paths => cli_output::print_json(&paths),
        Command::Config => cli_output::print_json_pretty(&cfg),
        Command::Price => {
            let ledger = EvmLedger::from_config(&cfg)?;
            let p = ledger.oracle_price().await?;
            cli_output::print_json(&serde_json::json!({
                "price": p.price.to_string(),
                "decimals": p.decimals,
                "eth_usd": format_amount_base_to_ui_string(p.price, p.decimals),
            }))
        }
        Command::Portfolio { account } => {
            let ledger = EvmLedger::from_config(&cfg)?;
            let owner = resolve_owner(&cfg, &ledger, account.as_deref()).await?;
            let snap = portfolio::snapshot(&ledger, &cfg.pair()?, owner).await?;
            cli_output::print_json_pretty(&snap)
        }
        Command::Faucet { token, account } => {
            let ledger = EvmLedger::from_config(&cfg)?;
            let pair = cfg.pair()?;
            let owner = resolve_owner(&cfg, &ledger, account.as_deref()).await?;
            let t = match token {
                CliToken::A => &pair.token_a,
                CliToken::B => &pair.token_b,
            };
            let tx = portfolio::faucet(&ledger, owner, t.address)
                .await
                .with_context(|| format!("{} faucet", t.symbol))?;
            cli_output::print_json(&serde_json::json!({
                "token": t.symbol,
                "tx_hash": format!("{tx:#x}"),
            }))
        }
        Command::Quote {
            amount,
            direction,
            watch,
        } => {
            let ledger = EvmLedger::from_config(&cfg)?;
            let pair = cfg.pair()?;
            run_quote(&cfg, ledger, pair, amount, direction.into(), watch).await
        }
        Command::Swap {
            amount,
            direction,
            slippage,
            account,
            yes,
        } => {
            let ledger = EvmLedger::from_config(&cfg)?;
            let pair = cfg.pair()?;
            let args = SwapArgs {
                amount,
                direction: direction.into(),
                slippage,
                account,
                yes,
            };
            run_swap(&cfg, &paths, ledger, pair, args).await
        }
        Command::History { cmd } => run_history(&cfg, &paths, cmd).await,
    }
}
