use crate::amount::{format_amount_base_to_ui_string, format_balance};
use crate::financial_math::{format_compact, sum_f64, ui_to_f64, usd_value};
use crate::ledger::{Confirmation, Ledger, OraclePrice};
use crate::pair::Pair;
use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

const NATIVE_SYMBOL: &str = "ETH";
const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub symbol: String,
    /// Full-precision amount.
    pub amount: String,
    /// Truncated for display.
    pub display: String,
    pub usd_value: f64,
    pub usd_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub owner: Address,
    pub eth_usd: f64,
    /// Non-zero holdings only.
    pub holdings: Vec<Holding>,
    pub total_usd: f64,
    pub total_usd_display: String,
}

/// Oracle price as a float USD value.
pub fn price_to_f64(p: OraclePrice) -> f64 {
    ui_to_f64(&format_amount_base_to_ui_string(p.price, p.decimals))
}

fn holding(symbol: &str, amount: U256, decimals: u8, unit_usd: f64) -> Holding {
    let ui = format_amount_base_to_ui_string(amount, decimals);
    let value = usd_value(ui_to_f64(&ui), unit_usd);
    Holding {
        symbol: symbol.to_owned(),
        display: format_balance(Some(amount), decimals),
        amount: ui,
        usd_value: value,
        usd_display: format_compact(value),
    }
}

/// Balances of both tokens plus native ETH, valued in USD.
///
/// Token A is treated as a dollar stablecoin; token B and native ETH use the oracle price.
pub async fn snapshot<L: Ledger>(ledger: &L, pair: &Pair, owner: Address) -> eyre::Result<PortfolioSnapshot> {
    let a = ledger.balance_of(pair.token_a.address, owner).await?;
    let b = ledger.balance_of(pair.token_b.address, owner).await?;
    let native = ledger.native_balance(owner).await?;
    let eth_usd = price_to_f64(ledger.oracle_price().await?);

    let holdings: Vec<Holding> = [
        (NATIVE_SYMBOL, native, NATIVE_DECIMALS, eth_usd),
        (pair.token_b.symbol.as_str(), b, pair.token_b.decimals, eth_usd),
        (pair.token_a.symbol.as_str(), a, pair.token_a.decimals, 1.0_f64),
    ]
    .into_iter()
    .filter(|(_, amount, _, _)| !amount.is_zero())
    .map(|(symbol, amount, decimals, unit)| holding(symbol, amount, decimals, unit))
    .collect();

    let total_usd = sum_f64(&holdings.iter().map(|h| h.usd_value).collect::<Vec<_>>());
    Ok(PortfolioSnapshot {
        owner,
        eth_usd,
        holdings,
        total_usd,
        total_usd_display: format_compact(total_usd),
    })
}

/// Mint test tokens from `token`'s faucet and wait for it to land.
pub async fn faucet<L: Ledger>(ledger: &L, owner: Address, token: Address) -> eyre::Result<B256> {
    let tx = ledger.submit_faucet(owner, token).await?;
    tracing::info!(%tx, %token, "faucet submitted");
    match ledger.wait_for_confirmation(tx).await? {
        Confirmation::Confirmed { .. } => Ok(tx),
        Confirmation::Reverted => eyre::bail!("faucet transaction {tx:#x} reverted"),
    }
}
