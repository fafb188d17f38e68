//! Rebuild a user's swap history from the contract's event log.
//!
//! This is a read-only projection: it never touches the local history store, and running it
//! twice against the same ledger state yields the same sequence.

use crate::amount::format_amount_base_to_ui_string;
use crate::history::{TransactionRecord, TxStatus};
use crate::ledger::{Ledger, SwapEvent};
use crate::pair::{Direction, Pair};
use alloy::primitives::{Address, B256};
use eyre::Context as _;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct HistoryReconciler<L> {
    ledger: L,
    pair: Pair,
}

struct Found {
    direction: Direction,
    event: SwapEvent,
}

impl<L: Ledger> HistoryReconciler<L> {
    pub const fn new(ledger: L, pair: Pair) -> Self {
        Self { ledger, pair }
    }

    /// Every swap `user` made, newest first. Ties on timestamp fall back to block number and log
    /// index, both descending.
    pub async fn rebuild(&self, user: Address) -> eyre::Result<Vec<TransactionRecord>> {
        let mut found: Vec<Found> = vec![];
        let mut seen: HashSet<(B256, u64)> = HashSet::new();
        for direction in Direction::ALL {
            let events = self
                .ledger
                .swap_events(direction, user)
                .await
                .with_context(|| format!("swap events {}", self.pair.label(direction)))?;
            tracing::debug!(%direction, count = events.len(), "fetched swap events");
            for event in events {
                if seen.insert((event.tx_hash, event.log_index)) {
                    found.push(Found { direction, event });
                }
            }
        }

        let mut block_ms: BTreeMap<u64, i64> = BTreeMap::new();
        for f in &found {
            if block_ms.contains_key(&f.event.block_number) {
                continue;
            }
            let secs = self
                .ledger
                .block_timestamp(f.event.block_number)
                .await
                .with_context(|| format!("timestamp for block {}", f.event.block_number))?;
            let ms = i64::try_from(secs)
                .ok()
                .and_then(|s| s.checked_mul(1000))
                .ok_or_else(|| eyre::eyre!("block {} timestamp out of range", f.event.block_number))?;
            block_ms.insert(f.event.block_number, ms);
        }

        let mut keyed = found
            .into_iter()
            .map(|f| {
                let ts = block_ms.get(&f.event.block_number).copied().unwrap_or_default();
                let key = (ts, f.event.block_number, f.event.log_index);
                (key, self.record(f.direction, &f.event, ts))
            })
            .collect::<Vec<_>>();
        keyed.sort_by(|(a, _), (b, _)| b.cmp(a));
        let records = keyed.into_iter().map(|(_, r)| r).collect();
        Ok(records)
    }

    fn record(&self, direction: Direction, event: &SwapEvent, timestamp: i64) -> TransactionRecord {
        let sell = self.pair.sell_token(direction);
        let buy = self.pair.buy_token(direction);
        TransactionRecord {
            hash: format!("{:#x}", event.tx_hash),
            from_symbol: sell.symbol.clone(),
            to_symbol: buy.symbol.clone(),
            from_amount: format_amount_base_to_ui_string(event.amount_in, sell.decimals),
            to_amount: format_amount_base_to_ui_string(event.amount_out, buy.decimals),
            timestamp,
            status: TxStatus::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::pair::fixtures;
    use alloy::primitives::U256;

    const USER: Address = Address::repeat_byte(0x07);

    fn ev(hash: u8, block: u64, log_index: u64, amount_in: u64, amount_out: u64) -> SwapEvent {
        SwapEvent {
            tx_hash: B256::repeat_byte(hash),
            block_number: block,
            log_index,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
        }
    }

    fn ledger_with_events() -> MockLedger {
        let ledger = MockLedger::new();
        {
            let mut s = ledger.state();
            s.events.insert(
                (Direction::AToB, USER),
                vec![ev(1, 10, 0, 100_000_000, 50_000_000_000_000_000), ev(3, 30, 2, 1_000_000, 1)],
            );
            s.events.insert(
                (Direction::BToA, USER),
                vec![ev(2, 20, 0, 1_000_000_000_000_000_000, 3_000_000_000)],
            );
            s.block_times.extend([(10, 1_000), (20, 2_000), (30, 3_000)]);
        }
        ledger
    }

    #[tokio::test]
    async fn merges_directions_newest_first() -> eyre::Result<()> {
        let r = HistoryReconciler::new(ledger_with_events(), fixtures::pair());
        let out = r.rebuild(USER).await?;
        let stamps: Vec<i64> = out.iter().map(|x| x.timestamp).collect();
        assert_eq!(stamps, vec![3_000_000, 2_000_000, 1_000_000]);

        let b_to_a = out.get(1).ok_or_else(|| eyre::eyre!("missing record"))?;
        assert_eq!(b_to_a.from_symbol, "BBETH");
        assert_eq!(b_to_a.from_amount, "1");
        assert_eq!(b_to_a.to_amount, "3000");

        let oldest = out.get(2).ok_or_else(|| eyre::eyre!("missing record"))?;
        assert_eq!(oldest.from_amount, "100");
        assert_eq!(oldest.to_amount, "0.05");
        assert!(out.iter().all(|x| x.status == TxStatus::Success));
        Ok(())
    }

    #[tokio::test]
    async fn rebuild_is_idempotent_and_deduplicated() -> eyre::Result<()> {
        let ledger = ledger_with_events();
        ledger
            .state()
            .events
            .entry((Direction::AToB, USER))
            .or_default()
            .push(ev(1, 10, 0, 100_000_000, 50_000_000_000_000_000));
        let r = HistoryReconciler::new(ledger, fixtures::pair());
        let first = r.rebuild(USER).await?;
        let second = r.rebuild(USER).await?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 3, "repeated log entry collapses");
        Ok(())
    }

    #[tokio::test]
    async fn block_timestamps_are_fetched_once_per_block() -> eyre::Result<()> {
        let ledger = ledger_with_events();
        ledger
            .state()
            .events
            .entry((Direction::BToA, USER))
            .or_default()
            .push(ev(4, 20, 1, 1, 1));
        let r = HistoryReconciler::new(ledger.clone(), fixtures::pair());
        r.rebuild(USER).await?;
        assert_eq!(ledger.state().block_lookups, 3);
        Ok(())
    }

    #[tokio::test]
    async fn user_without_events_has_empty_history() -> eyre::Result<()> {
        let r = HistoryReconciler::new(ledger_with_events(), fixtures::pair());
        assert!(r.rebuild(Address::repeat_byte(0x99)).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_block_is_an_error() {
        let ledger = ledger_with_events();
        ledger.state().block_times.clear();
        let r = HistoryReconciler::new(ledger, fixtures::pair());
        assert!(r.rebuild(USER).await.is_err());
    }
}
