use super::{Confirmation, Ledger, OraclePrice, SwapEvent};
use crate::config::BlockbankConfig;
use crate::pair::{Direction, Pair};
use crate::retry::{try_all_with_backoff, BackoffConfig};
use alloy::{
    network::TransactionBuilder as _,
    primitives::{Address, Bytes, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, Filter, Log, TransactionReceipt, TransactionRequest},
    sol,
    sol_types::{SolCall as _, SolEvent},
};
use eyre::Context as _;
use reqwest::Client;
use std::{str::FromStr as _, time::Duration};
use tokio::time::sleep;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

type EvmProvider = RootProvider;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) returns (bool);
        function faucet() external;
    }
}

sol! {
    #[sol(rpc)]
    contract IBlockBankSwap {
        event SwappedBbusdToBbeth(address indexed user, uint256 bbusdIn, uint256 bbethOut);
        event SwappedBbethToBbusd(address indexed user, uint256 bbethIn, uint256 bbusdOut);

        function swapBbusdToBbeth(uint256 bbusdAmount, uint256 minBbethOut) external;
        function swapBbethToBbusd(uint256 bbethAmount, uint256 minBbusdOut) external;
        function getEstimatedBbethForBbusd(uint256 bbusdAmount) external view returns (uint256);
        function getEstimatedBbusdForBbeth(uint256 bbethAmount) external view returns (uint256);
        function getEthUsdPrice() external view returns (uint256 price, uint8 decimals);
    }
}

/// Live ledger: reads through the public RPC (with fallbacks), writes through the wallet RPC.
///
/// The wallet endpoint is expected to sign (`eth_sendTransaction`), so no key material ever
/// passes through this process.
#[derive(Debug, Clone)]
pub struct EvmLedger {
    pub chain_id: u64,
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
    pub wallet_rpc_url: String,
    pub pair: Pair,
    pub confirmation_timeout: Duration,
    pub log_from_block: u64,
    pub log_chunk_blocks: Option<u64>,
}

impl EvmLedger {
    pub fn from_config(cfg: &BlockbankConfig) -> eyre::Result<Self> {
        Ok(Self {
            chain_id: cfg.network.chain_id,
            rpc_url: cfg.network.rpc_url.clone(),
            fallback_rpc_urls: cfg.network.fallback_rpc_urls.clone(),
            wallet_rpc_url: cfg.wallet.rpc_url.clone(),
            pair: cfg.pair()?,
            confirmation_timeout: Duration::from_secs(cfg.swap.confirmation_timeout_seconds),
            log_from_block: cfg.history.log_from_block,
            log_chunk_blocks: cfg.history.log_chunk_blocks.filter(|n| *n > 0),
        })
    }

    fn provider_for_url(url: &str) -> eyre::Result<EvmProvider> {
        let u: reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .connect_timeout(DEFAULT_RPC_CONNECT_TIMEOUT)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(RootProvider::new(rpc_client))
    }

    fn wallet_provider(&self) -> eyre::Result<EvmProvider> {
        Self::provider_for_url(&self.wallet_rpc_url)
    }

    fn all_rpc_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.fallback_rpc_urls.len());
        if !self.rpc_url.trim().is_empty() {
            urls.push(self.rpc_url.trim().to_owned());
        }
        for u in &self.fallback_rpc_urls {
            let t = u.trim();
            if t.is_empty() || urls.iter().any(|x| x == t) {
                continue;
            }
            urls.push(t.to_owned());
        }
        urls
    }

    async fn with_fallback_and_backoff<T, Fut>(
        &self,
        context_label: &'static str,
        f: impl Fn(EvmProvider) -> Fut + Sync,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: std::future::Future<Output = eyre::Result<T>> + Send,
    {
        let urls = self.all_rpc_urls();
        let cfg = BackoffConfig::default();
        try_all_with_backoff(
            &urls,
            &cfg,
            |u| {
                let u = u.clone();
                let f = &f;
                async move {
                    let p = Self::provider_for_url(&u)?;
                    f(p).await
                }
            },
            context_label,
        )
        .await
    }

    /// Accounts the wallet endpoint is willing to sign for.
    pub async fn wallet_accounts(&self) -> eyre::Result<Vec<Address>> {
        let p = self.wallet_provider()?;
        p.get_accounts().await.context("eth_accounts")
    }

    async fn send_via_wallet(
        &self,
        from: Address,
        to: Address,
        calldata: Vec<u8>,
    ) -> eyre::Result<B256> {
        let mut tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(Bytes::from(calldata));
        tx.chain_id = Some(self.chain_id);
        let p = self.wallet_provider()?;
        let pending = p
            .send_transaction(tx)
            .await
            .context("eth_sendTransaction")?;
        Ok(*pending.tx_hash())
    }

    async fn get_tx_receipt(&self, tx: B256) -> eyre::Result<Option<TransactionReceipt>> {
        self.with_fallback_and_backoff("get tx receipt", |p| async move {
            p.get_transaction_receipt(tx)
                .await
                .context("get transaction receipt")
        })
        .await
    }

    async fn latest_block(&self) -> eyre::Result<u64> {
        self.with_fallback_and_backoff("get block number", |p| async move {
            p.get_block_number().await.context("get block number")
        })
        .await
    }

    async fn logs_in_range(
        &self,
        base: Filter,
        from_block: u64,
        to_block: Option<u64>,
    ) -> eyre::Result<Vec<Log>> {
        let filter = match to_block {
            Some(to) => base.from_block(from_block).to_block(to),
            None if from_block == 0 => base.from_block(BlockNumberOrTag::Earliest),
            None => base.from_block(from_block),
        };
        self.with_fallback_and_backoff("get logs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await.context("eth_getLogs") }
        })
        .await
    }

    /// Scan from the configured start block to head, in fixed windows when configured.
    async fn scan_logs(&self, base: Filter) -> eyre::Result<Vec<Log>> {
        let Some(chunk) = self.log_chunk_blocks else {
            return self.logs_in_range(base, self.log_from_block, None).await;
        };
        let head = self.latest_block().await?;
        let mut out = vec![];
        let mut from = self.log_from_block;
        while from <= head {
            let to = from.saturating_add(chunk - 1).min(head);
            tracing::debug!(from, to, "scanning swap events");
            out.extend(self.logs_in_range(base.clone(), from, Some(to)).await?);
            from = to.saturating_add(1);
        }
        Ok(out)
    }
}

fn event_from_log<E, F>(log: &Log, amounts: F) -> eyre::Result<SwapEvent>
where
    E: SolEvent,
    F: FnOnce(&E) -> (U256, U256),
{
    let decoded = log
        .log_decode::<E>()
        .with_context(|| format!("decode {}", E::SIGNATURE))?;
    let (amount_in, amount_out) = amounts(&decoded.inner.data);
    Ok(SwapEvent {
        tx_hash: log
            .transaction_hash
            .ok_or_else(|| eyre::eyre!("log missing transaction hash"))?,
        block_number: log
            .block_number
            .ok_or_else(|| eyre::eyre!("log missing block number"))?,
        log_index: log.log_index.unwrap_or(0),
        amount_in,
        amount_out,
    })
}

impl Ledger for EvmLedger {
    async fn balance_of(&self, token: Address, owner: Address) -> eyre::Result<U256> {
        self.with_fallback_and_backoff("erc20 balance", |p| async move {
            let c = IERC20::new(token, &p);
            c.balanceOf(owner).call().await.context("erc20 balanceOf")
        })
        .await
    }

    async fn native_balance(&self, owner: Address) -> eyre::Result<U256> {
        self.with_fallback_and_backoff("get balance", |p| async move {
            p.get_balance(owner).await.context("get balance")
        })
        .await
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> eyre::Result<U256> {
        self.with_fallback_and_backoff("erc20 allowance", |p| async move {
            let c = IERC20::new(token, &p);
            c.allowance(owner, spender)
                .call()
                .await
                .context("erc20 allowance")
        })
        .await
    }

    async fn estimated_output(&self, direction: Direction, amount_in: U256) -> eyre::Result<U256> {
        let swap = self.pair.swap_contract;
        self.with_fallback_and_backoff("estimate output", |p| async move {
            let c = IBlockBankSwap::new(swap, &p);
            match direction {
                Direction::AToB => c
                    .getEstimatedBbethForBbusd(amount_in)
                    .call()
                    .await
                    .context("getEstimatedBbethForBbusd"),
                Direction::BToA => c
                    .getEstimatedBbusdForBbeth(amount_in)
                    .call()
                    .await
                    .context("getEstimatedBbusdForBbeth"),
            }
        })
        .await
    }

    async fn oracle_price(&self) -> eyre::Result<OraclePrice> {
        let swap = self.pair.swap_contract;
        self.with_fallback_and_backoff("oracle price", |p| async move {
            let c = IBlockBankSwap::new(swap, &p);
            let r = c.getEthUsdPrice().call().await.context("getEthUsdPrice")?;
            Ok(OraclePrice {
                price: r.price,
                decimals: r.decimals,
            })
        })
        .await
    }

    async fn submit_approve(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> eyre::Result<B256> {
        let calldata = IERC20::approveCall {
            spender,
            value: amount,
        }
        .abi_encode();
        self.send_via_wallet(owner, token, calldata).await
    }

    async fn submit_swap(
        &self,
        owner: Address,
        direction: Direction,
        amount_in: U256,
        min_out: U256,
    ) -> eyre::Result<B256> {
        let calldata = match direction {
            Direction::AToB => IBlockBankSwap::swapBbusdToBbethCall {
                bbusdAmount: amount_in,
                minBbethOut: min_out,
            }
            .abi_encode(),
            Direction::BToA => IBlockBankSwap::swapBbethToBbusdCall {
                bbethAmount: amount_in,
                minBbusdOut: min_out,
            }
            .abi_encode(),
        };
        self.send_via_wallet(owner, self.pair.swap_contract, calldata)
            .await
    }

    async fn submit_faucet(&self, owner: Address, token: Address) -> eyre::Result<B256> {
        self.send_via_wallet(owner, token, IERC20::faucetCall {}.abi_encode())
            .await
    }

    async fn wait_for_confirmation(&self, tx: B256) -> eyre::Result<Confirmation> {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > self.confirmation_timeout {
                eyre::bail!("timed out waiting for tx receipt");
            }
            if let Some(r) = self.get_tx_receipt(tx).await? {
                if r.status() {
                    return Ok(Confirmation::Confirmed {
                        block_number: r.block_number,
                    });
                }
                return Ok(Confirmation::Reverted);
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn swap_events(&self, direction: Direction, user: Address) -> eyre::Result<Vec<SwapEvent>> {
        let signature = match direction {
            Direction::AToB => IBlockBankSwap::SwappedBbusdToBbeth::SIGNATURE_HASH,
            Direction::BToA => IBlockBankSwap::SwappedBbethToBbusd::SIGNATURE_HASH,
        };
        let base = Filter::new()
            .address(self.pair.swap_contract)
            .event_signature(signature)
            .topic1(user.into_word());
        let logs = self.scan_logs(base).await?;

        logs.iter()
            .map(|log| match direction {
                Direction::AToB => event_from_log::<IBlockBankSwap::SwappedBbusdToBbeth, _>(
                    log,
                    |e| (e.bbusdIn, e.bbethOut),
                ),
                Direction::BToA => event_from_log::<IBlockBankSwap::SwappedBbethToBbusd, _>(
                    log,
                    |e| (e.bbethIn, e.bbusdOut),
                ),
            })
            .collect()
    }

    async fn block_timestamp(&self, block_number: u64) -> eyre::Result<u64> {
        self.with_fallback_and_backoff("get block", |p| async move {
            let b = p
                .get_block_by_number(BlockNumberOrTag::Number(block_number))
                .await
                .context("get block")?
                .ok_or_else(|| eyre::eyre!("block {block_number} not found"))?;
            Ok(b.header.timestamp)
        })
        .await
    }
}

pub fn parse_address(s: &str) -> eyre::Result<Address> {
    Address::from_str(s.trim()).context("parse evm address")
}
