use crate::ledger::evm::parse_address;
use crate::pair::{Pair, TokenInfo};
use eyre::Context as _;
use serde::{Deserialize, Serialize};

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const SEPOLIA_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";

/// Default deployment of the swap contract and its two tokens on Sepolia.
pub const DEFAULT_SWAP_CONTRACT: &str = "0x1113997E5491012dF8BD1402C8e67465905cB3C7";
pub const DEFAULT_BBUSD: &str = "0x7297075a92D2b3144119889ef4f991726A3afFE4";
pub const DEFAULT_BBETH: &str = "0xaDcCCF2eA5bF1069FC14c01505c928d357b171ee";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Human label only; the chain id is what gets checked.
    pub name: String,
    pub chain_id: u64,
    /// Read endpoint used for balances, quotes, receipts and event logs.
    pub rpc_url: String,
    /// Additional read endpoints to try if the primary fails.
    pub fallback_rpc_urls: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "sepolia".into(),
            chain_id: SEPOLIA_CHAIN_ID,
            rpc_url: SEPOLIA_RPC_URL.into(),
            fallback_rpc_urls: vec![
                "https://rpc.sepolia.org".into(),
                "https://rpc.ankr.com/eth_sepolia".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// JSON-RPC endpoint of the signing wallet (Frame, Clef, an unlocked dev node).
    ///
    /// Writes are sent here with `eth_sendTransaction`; the wallet owns the keys.
    pub rpc_url: String,
    /// Account to act as. If unset, the first account reported by the wallet is used.
    pub account: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:1248".into(),
            account: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub swap: String,
    pub token_a: TokenConfig,
    pub token_b: TokenConfig,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            swap: DEFAULT_SWAP_CONTRACT.into(),
            token_a: TokenConfig {
                symbol: "BBUSD".into(),
                address: DEFAULT_BBUSD.into(),
                decimals: 6,
            },
            token_b: TokenConfig {
                symbol: "BBETH".into(),
                address: DEFAULT_BBETH.into(),
                decimals: 18,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Decimal string, e.g. `"0.5"`. Kept as a string so TOML floats never round it.
    pub default_slippage_percent: String,
    pub confirmation_timeout_seconds: u64,
    pub quote_debounce_ms: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            default_slippage_percent: "0.5".into(),
            confirmation_timeout_seconds: 180,
            quote_debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// First block scanned when rebuilding history from events. `0` means genesis.
    pub log_from_block: u64,
    /// Optional `eth_getLogs` window size for providers that cap block ranges.
    pub log_chunk_blocks: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockbankConfig {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub contracts: ContractsConfig,
    pub swap: SwapConfig,
    pub history: HistoryConfig,
}

impl BlockbankConfig {
    pub fn pair(&self) -> eyre::Result<Pair> {
        let token = |t: &TokenConfig| -> eyre::Result<TokenInfo> {
            Ok(TokenInfo {
                symbol: t.symbol.trim().to_owned(),
                address: parse_address(&t.address)
                    .with_context(|| format!("token {} address", t.symbol))?,
                decimals: t.decimals,
            })
        };
        let pair = Pair {
            token_a: token(&self.contracts.token_a)?,
            token_b: token(&self.contracts.token_b)?,
            swap_contract: parse_address(&self.contracts.swap).context("swap contract address")?,
        };
        if pair.token_a.symbol.eq_ignore_ascii_case(&pair.token_b.symbol) {
            eyre::bail!("token_a and token_b must have distinct symbols");
        }
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pair_is_sepolia_deployment() -> eyre::Result<()> {
        let cfg = BlockbankConfig::default();
        let p = cfg.pair()?;
        assert_eq!(cfg.network.chain_id, SEPOLIA_CHAIN_ID);
        assert_eq!(p.token_a.symbol, "BBUSD");
        assert_eq!(p.token_a.decimals, 6);
        assert_eq!(p.token_b.decimals, 18);
        assert_eq!(p.swap_contract, parse_address(DEFAULT_SWAP_CONTRACT)?);
        Ok(())
    }

    #[test]
    fn partial_toml_keeps_defaults() -> eyre::Result<()> {
        let cfg: BlockbankConfig = toml::from_str(
            r#"
[network]
rpc_url = "http://localhost:8545"

[history]
log_chunk_blocks = 5000
"#,
        )?;
        assert_eq!(cfg.network.rpc_url, "http://localhost:8545");
        assert_eq!(cfg.network.chain_id, SEPOLIA_CHAIN_ID);
        assert_eq!(cfg.history.log_chunk_blocks, Some(5000));
        assert_eq!(cfg.swap.quote_debounce_ms, 300);
        Ok(())
    }

    #[test]
    fn rejects_bad_addresses_and_duplicate_symbols() {
        let mut cfg = BlockbankConfig::default();
        cfg.contracts.swap = "0x1234".into();
        assert!(cfg.pair().is_err());

        let mut cfg = BlockbankConfig::default();
        cfg.contracts.token_b.symbol = "bbusd".into();
        assert!(cfg.pair().is_err());
    }
}
