//! The approve / swap state machine.
//!
//! One action runs at a time. A user action either approves the pending sell amount or, if the
//! current allowance already covers it, submits the swap. Both branches wait for on-ledger
//! confirmation. Every failure returns the machine to [`Phase::Idle`] with nothing recorded.
//!
//! Single flight is structural: [`Orchestrator::request_action`] takes `&mut self` and only
//! returns once the machine is back in `Idle`, so a second action cannot start while one is
//! in flight.

use crate::allowance::needs_approval;
use crate::amount::{format_amount_base_to_ui_string, format_amount_for_display};
use crate::errors::{SwapError, WriteKind};
use crate::history::{HistoryStorage, HistoryStore, TransactionRecord, TxStatus};
use crate::ledger::{Confirmation, Ledger};
use crate::pair::{Direction, Pair};
use crate::slippage::{min_out, SlippageTolerance};
use alloy::primitives::{Address, B256, U256};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// How long a success notice stays visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

const PHASE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Approving,
    ApproveConfirming { tx_hash: B256 },
    Swapping,
    SwapConfirming { tx_hash: B256 },
    Success { tx_hash: B256 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    ApproveRequested,
    SwapRequested,
    WriteAccepted(B256),
    Confirmed,
    Failed,
    Settled,
}

impl Phase {
    /// Transition function. `None` means the event is not valid in this phase.
    pub const fn next(self, event: PhaseEvent) -> Option<Self> {
        match (self, event) {
            (Self::Idle, PhaseEvent::ApproveRequested) => Some(Self::Approving),
            (Self::Idle, PhaseEvent::SwapRequested) => Some(Self::Swapping),
            (Self::Approving, PhaseEvent::WriteAccepted(tx_hash)) => {
                Some(Self::ApproveConfirming { tx_hash })
            }
            (Self::Swapping, PhaseEvent::WriteAccepted(tx_hash)) => {
                Some(Self::SwapConfirming { tx_hash })
            }
            (Self::ApproveConfirming { .. }, PhaseEvent::Confirmed)
            | (Self::Success { .. }, PhaseEvent::Settled) => Some(Self::Idle),
            (Self::SwapConfirming { tx_hash }, PhaseEvent::Confirmed) => {
                Some(Self::Success { tx_hash })
            }
            (
                Self::Approving
                | Self::ApproveConfirming { .. }
                | Self::Swapping
                | Self::SwapConfirming { .. },
                PhaseEvent::Failed,
            ) => Some(Self::Idle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    ApprovalConfirmed,
    SwapConfirmed,
}

/// Transient success signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub tx_hash: B256,
    pub expires_at: Instant,
}

impl Notice {
    pub fn is_active(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Everything the user has on screen when they press the action button.
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub direction: Direction,
    /// Parsed sell amount; `None` when the input was empty or invalid.
    pub sell_amount: Option<U256>,
    /// Latest applicable quote for exactly `(sell_amount, direction)`.
    pub quote: Option<U256>,
    pub tolerance: SlippageTolerance,
    /// Known sell-token balance, if it has been read.
    pub sell_balance: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutcome {
    Approved {
        tx_hash: B256,
        /// Allowance re-read after confirmation; `None` if the read failed.
        allowance: Option<U256>,
        ready_to_swap: bool,
    },
    Swapped {
        tx_hash: B256,
        min_out: U256,
        record: TransactionRecord,
        persisted: bool,
    },
}

pub struct Orchestrator<L, S> {
    ledger: L,
    history: HistoryStore<S>,
    pair: Pair,
    owner: Address,
    /// Last allowance read, keyed by the token it was read for.
    allowance: Option<(Address, U256)>,
    phase: Phase,
    phase_tx: broadcast::Sender<Phase>,
    notice: Option<Notice>,
}

impl<L: Ledger, S: HistoryStorage> Orchestrator<L, S> {
    pub fn new(ledger: L, history: HistoryStore<S>, pair: Pair, owner: Address) -> Self {
        let (phase_tx, _rx) = broadcast::channel(PHASE_CHANNEL_CAPACITY);
        Self {
            ledger,
            history,
            pair,
            owner,
            allowance: None,
            phase: Phase::Idle,
            phase_tx,
            notice: None,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Observe every phase transition, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// The current success notice, if it has not expired.
    pub fn active_notice(&self, now: Instant) -> Option<&Notice> {
        self.notice.as_ref().filter(|n| n.is_active(now))
    }

    /// Known allowance for the direction's sell token.
    pub fn allowance_for(&self, direction: Direction) -> Option<U256> {
        let token = self.pair.sell_token(direction).address;
        self.allowance
            .filter(|(t, _)| *t == token)
            .map(|(_, v)| v)
    }

    /// Re-read the allowance for the direction's sell token. A failed read leaves it unknown.
    pub async fn refresh_allowance(&mut self, direction: Direction) -> Option<U256> {
        let token = self.pair.sell_token(direction).address;
        match self
            .ledger
            .allowance(token, self.owner, self.pair.swap_contract)
            .await
        {
            Ok(v) => {
                self.allowance = Some((token, v));
                Some(v)
            }
            Err(e) => {
                tracing::warn!(error = %e, token = %token, "allowance read failed; treating as unknown");
                self.allowance = None;
                None
            }
        }
    }

    fn transition(&mut self, event: PhaseEvent) {
        let from = self.phase;
        match from.next(event) {
            Some(to) => {
                tracing::info!(?from, ?to, "phase transition");
                self.phase = to;
                // No subscribers is fine.
                drop(self.phase_tx.send(to));
            }
            None => {
                tracing::warn!(?from, ?event, "ignored invalid phase event");
            }
        }
    }

    fn fail(&mut self, err: SwapError) -> SwapError {
        tracing::warn!(code = err.code(), error = %err, "action failed");
        self.transition(PhaseEvent::Failed);
        err
    }

    fn validate(&self, intent: &SwapIntent) -> Result<U256, SwapError> {
        let amount = intent
            .sell_amount
            .filter(|a| !a.is_zero())
            .ok_or(SwapError::NoAmount)?;
        if intent.sell_balance.is_some_and(|b| amount > b) {
            return Err(SwapError::InsufficientBalance(
                self.pair.sell_token(intent.direction).symbol.clone(),
            ));
        }
        Ok(amount)
    }

    /// Run one user action to completion: an approval if the allowance gate says so, else the swap.
    pub async fn request_action(&mut self, intent: &SwapIntent) -> Result<ActionOutcome, SwapError> {
        let amount = self.validate(intent)?;
        if needs_approval(self.allowance_for(intent.direction), amount) {
            self.approve(intent.direction, amount).await
        } else {
            let quote = intent.quote.ok_or(SwapError::NoQuote)?;
            self.swap(intent, amount, quote).await
        }
    }

    async fn approve(&mut self, direction: Direction, amount: U256) -> Result<ActionOutcome, SwapError> {
        let token = self.pair.sell_token(direction).address;
        self.transition(PhaseEvent::ApproveRequested);
        let submitted = self
            .ledger
            .submit_approve(self.owner, token, self.pair.swap_contract, amount)
            .await;
        let tx_hash = submitted.map_err(|e| {
            self.fail(SwapError::WalletRejected(WriteKind::Approve, format!("{e:#}")))
        })?;
        self.transition(PhaseEvent::WriteAccepted(tx_hash));
        self.confirm(WriteKind::Approve, tx_hash).await?;
        self.transition(PhaseEvent::Confirmed);

        let allowance = self.refresh_allowance(direction).await;
        self.notice = Some(Notice {
            kind: NoticeKind::ApprovalConfirmed,
            tx_hash,
            expires_at: Instant::now() + NOTICE_TTL,
        });
        Ok(ActionOutcome::Approved {
            tx_hash,
            allowance,
            ready_to_swap: !needs_approval(allowance, amount),
        })
    }

    async fn swap(
        &mut self,
        intent: &SwapIntent,
        amount: U256,
        quote: U256,
    ) -> Result<ActionOutcome, SwapError> {
        let bound = min_out(quote, intent.tolerance);
        self.transition(PhaseEvent::SwapRequested);
        let submitted = self
            .ledger
            .submit_swap(self.owner, intent.direction, amount, bound)
            .await;
        let tx_hash = submitted.map_err(|e| {
            self.fail(SwapError::WalletRejected(WriteKind::Swap, format!("{e:#}")))
        })?;
        self.transition(PhaseEvent::WriteAccepted(tx_hash));
        self.confirm(WriteKind::Swap, tx_hash).await?;
        self.transition(PhaseEvent::Confirmed);

        let sell = self.pair.sell_token(intent.direction);
        let buy = self.pair.buy_token(intent.direction);
        let record = TransactionRecord {
            hash: format!("{tx_hash:#x}"),
            from_symbol: sell.symbol.clone(),
            to_symbol: buy.symbol.clone(),
            from_amount: format_amount_base_to_ui_string(amount, sell.decimals),
            to_amount: format_amount_for_display(quote, buy.decimals),
            timestamp: chrono::Utc::now().timestamp_millis(),
            status: TxStatus::Success,
        };
        let persisted = match self.history.append(record.clone()) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, tx = %tx_hash, "swap confirmed but history write failed");
                false
            }
        };
        self.notice = Some(Notice {
            kind: NoticeKind::SwapConfirmed,
            tx_hash,
            expires_at: Instant::now() + NOTICE_TTL,
        });
        self.transition(PhaseEvent::Settled);
        // The swap spent from the allowance.
        self.refresh_allowance(intent.direction).await;

        Ok(ActionOutcome::Swapped {
            tx_hash,
            min_out: bound,
            record,
            persisted,
        })
    }

    async fn confirm(&mut self, kind: WriteKind, tx_hash: B256) -> Result<(), SwapError> {
        let outcome = self.ledger.wait_for_confirmation(tx_hash).await;
        match outcome {
            Ok(Confirmation::Confirmed { block_number }) => {
                tracing::info!(%kind, tx = %tx_hash, ?block_number, "confirmed");
                Ok(())
            }
            Ok(Confirmation::Reverted) => Err(self.fail(SwapError::Reverted(kind, tx_hash))),
            Err(e) => Err(self.fail(SwapError::ConfirmationFailed(
                kind,
                tx_hash,
                format!("{e:#}"),
            ))),
        }
    }
}
