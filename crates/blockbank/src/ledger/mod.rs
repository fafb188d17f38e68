//! The remote ledger as seen by the swap client.
//!
//! Everything the core needs from the chain goes through [`Ledger`]: token reads, the contract's
//! pricing function, approve/swap writes, confirmation waits, and the swap event log. The live
//! implementation is [`evm::EvmLedger`].

pub mod evm;
#[cfg(test)]
pub mod mock;

use crate::pair::Direction;
use alloy::primitives::{Address, B256, U256};
use std::future::Future;

/// Oracle value as returned by the contract: `price / 10^decimals` USD per ETH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePrice {
    pub price: U256,
    pub decimals: u8,
}

/// Final state of a submitted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block_number: Option<u64> },
    Reverted,
}

/// One decoded swap event for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub amount_in: U256,
    pub amount_out: U256,
}

pub trait Ledger: Send + Sync {
    fn balance_of(
        &self,
        token: Address,
        owner: Address,
    ) -> impl Future<Output = eyre::Result<U256>> + Send;

    fn native_balance(&self, owner: Address) -> impl Future<Output = eyre::Result<U256>> + Send;

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = eyre::Result<U256>> + Send;

    /// The contract's estimated output for selling `amount_in` in `direction`.
    fn estimated_output(
        &self,
        direction: Direction,
        amount_in: U256,
    ) -> impl Future<Output = eyre::Result<U256>> + Send;

    fn oracle_price(&self) -> impl Future<Output = eyre::Result<OraclePrice>> + Send;

    /// Submit `approve(spender, amount)` on `token`. Resolves once the wallet accepts the write.
    fn submit_approve(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = eyre::Result<B256>> + Send;

    /// Submit the direction's swap function with `(amount_in, min_out)`.
    fn submit_swap(
        &self,
        owner: Address,
        direction: Direction,
        amount_in: U256,
        min_out: U256,
    ) -> impl Future<Output = eyre::Result<B256>> + Send;

    /// Test-token mint.
    fn submit_faucet(
        &self,
        owner: Address,
        token: Address,
    ) -> impl Future<Output = eyre::Result<B256>> + Send;

    fn wait_for_confirmation(
        &self,
        tx: B256,
    ) -> impl Future<Output = eyre::Result<Confirmation>> + Send;

    /// All swap events in `direction` with `user` as the indexed participant.
    fn swap_events(
        &self,
        direction: Direction,
        user: Address,
    ) -> impl Future<Output = eyre::Result<Vec<SwapEvent>>> + Send;

    /// Block timestamp in seconds.
    fn block_timestamp(&self, block_number: u64)
        -> impl Future<Output = eyre::Result<u64>> + Send;
}
