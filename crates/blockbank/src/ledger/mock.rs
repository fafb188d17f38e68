use super::{Confirmation, Ledger, OraclePrice, SwapEvent};
use crate::pair::Direction;
use alloy::primitives::{Address, B256, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Scriptable in-memory ledger. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub balances: HashMap<(Address, Address), U256>,
    /// `None` makes the allowance read fail.
    pub allowance: Option<U256>,
    /// Allowance the ledger reports after an approval confirms.
    pub allowance_after_approve: Option<U256>,
    /// Output per unit of input, scaled by 1e18 (`amount_out = amount_in * rate / 1e18`).
    pub rate_wad: U256,
    pub estimate_fails: bool,
    pub reject_writes: bool,
    pub revert_writes: bool,
    pub confirm_fails: bool,
    pub events: HashMap<(Direction, Address), Vec<SwapEvent>>,
    pub block_times: HashMap<u64, u64>,

    pub approvals: Vec<(Address, Address, U256)>,
    pub swaps: Vec<(Direction, U256, U256)>,
    pub estimate_calls: usize,
    pub block_lookups: usize,
    nonce: u8,
}

impl MockLedger {
    pub fn new() -> Self {
        let me = Self::default();
        me.state().allowance = Some(U256::ZERO);
        me.state().rate_wad = U256::from(1_000_000_000_000_000_000_u128);
        me
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_hash(&self) -> B256 {
        let mut s = self.state();
        s.nonce = s.nonce.wrapping_add(1);
        B256::repeat_byte(s.nonce)
    }
}

impl Ledger for MockLedger {
    async fn balance_of(&self, token: Address, owner: Address) -> eyre::Result<U256> {
        Ok(self
            .state()
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn native_balance(&self, _owner: Address) -> eyre::Result<U256> {
        Ok(U256::ZERO)
    }

    async fn allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> eyre::Result<U256> {
        self.state()
            .allowance
            .ok_or_else(|| eyre::eyre!("allowance read failed"))
    }

    async fn estimated_output(&self, _direction: Direction, amount_in: U256) -> eyre::Result<U256> {
        let mut s = self.state();
        s.estimate_calls += 1;
        if s.estimate_fails {
            eyre::bail!("estimate reverted");
        }
        Ok(amount_in * s.rate_wad / U256::from(1_000_000_000_000_000_000_u128))
    }

    async fn oracle_price(&self) -> eyre::Result<OraclePrice> {
        Ok(OraclePrice {
            price: U256::from(300_000_000_000_u64),
            decimals: 8,
        })
    }

    async fn submit_approve(
        &self,
        _owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> eyre::Result<B256> {
        if self.state().reject_writes {
            eyre::bail!("user rejected the request");
        }
        self.state().approvals.push((token, spender, amount));
        Ok(self.next_hash())
    }

    async fn submit_swap(
        &self,
        _owner: Address,
        direction: Direction,
        amount_in: U256,
        min_out: U256,
    ) -> eyre::Result<B256> {
        if self.state().reject_writes {
            eyre::bail!("user rejected the request");
        }
        self.state().swaps.push((direction, amount_in, min_out));
        Ok(self.next_hash())
    }

    async fn submit_faucet(&self, _owner: Address, _token: Address) -> eyre::Result<B256> {
        Ok(self.next_hash())
    }

    async fn wait_for_confirmation(&self, _tx: B256) -> eyre::Result<Confirmation> {
        let mut s = self.state();
        if s.confirm_fails {
            eyre::bail!("timed out waiting for tx receipt");
        }
        if s.revert_writes {
            return Ok(Confirmation::Reverted);
        }
        if let Some(a) = s.allowance_after_approve.take() {
            s.allowance = Some(a);
        }
        Ok(Confirmation::Confirmed {
            block_number: Some(1),
        })
    }

    async fn swap_events(&self, direction: Direction, user: Address) -> eyre::Result<Vec<SwapEvent>> {
        Ok(self
            .state()
            .events
            .get(&(direction, user))
            .cloned()
            .unwrap_or_default())
    }

    async fn block_timestamp(&self, block_number: u64) -> eyre::Result<u64> {
        let mut s = self.state();
        s.block_lookups += 1;
        s.block_times
            .get(&block_number)
            .copied()
            .ok_or_else(|| eyre::eyre!("block {block_number} not found"))
    }
}
