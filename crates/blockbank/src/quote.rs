//! Output estimates for a pending sell amount.
//!
//! Requests are identified by the `(amount, direction)` that produced them plus a generation
//! counter. Only the newest request may change what is displayed; anything it superseded is
//! dropped on arrival.

use crate::amount::{format_amount_for_display, parse_amount_ui_to_base};
use crate::ledger::Ledger;
use crate::pair::{switch_direction, Direction, Pair};
use alloy::primitives::U256;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Thin wrapper over the ledger's pricing function.
#[derive(Debug, Clone)]
pub struct QuoteEngine<L> {
    ledger: L,
}

impl<L: Ledger> QuoteEngine<L> {
    pub const fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// `Ok(None)` means "no quote": the amount is absent or zero and nothing was requested.
    pub async fn quote(
        &self,
        sell_amount: Option<U256>,
        direction: Direction,
    ) -> eyre::Result<Option<U256>> {
        let Some(amount) = sell_amount.filter(|a| !a.is_zero()) else {
            return Ok(None);
        };
        self.ledger
            .estimated_output(direction, amount)
            .await
            .map(Some)
    }
}

/// Identity of one quote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteTicket {
    pub generation: u64,
    pub amount: Option<U256>,
    pub direction: Direction,
}

/// A quote tied to the input that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_in: U256,
    pub direction: Direction,
    pub amount_out: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteApply {
    Applied,
    /// A newer request exists; the result was discarded.
    Stale,
    /// The request failed; the displayed quote is now unset.
    Failed,
}

/// Latest-request-wins holder of the displayed quote.
#[derive(Debug, Clone, Default)]
pub struct QuoteBoard {
    generation: u64,
    current: Option<QuoteTicket>,
    displayed: Option<Quote>,
}

impl QuoteBoard {
    /// Register new input. Any quote for different input stops being displayed immediately.
    pub fn request(&mut self, amount: Option<U256>, direction: Direction) -> QuoteTicket {
        self.generation = self.generation.wrapping_add(1);
        let ticket = QuoteTicket {
            generation: self.generation,
            amount,
            direction,
        };
        self.current = Some(ticket);
        if self
            .displayed
            .is_some_and(|q| Some(q.amount_in) != amount || q.direction != direction)
        {
            self.displayed = None;
        }
        ticket
    }

    pub fn is_current(&self, ticket: &QuoteTicket) -> bool {
        self.current.as_ref() == Some(ticket)
    }

    pub fn apply(&mut self, ticket: QuoteTicket, result: eyre::Result<Option<U256>>) -> QuoteApply {
        if !self.is_current(&ticket) {
            tracing::debug!(
                generation = ticket.generation,
                latest = self.generation,
                "discarding superseded quote"
            );
            return QuoteApply::Stale;
        }
        match (result, ticket.amount) {
            (Ok(Some(out)), Some(amount_in)) => {
                self.displayed = Some(Quote {
                    amount_in,
                    direction: ticket.direction,
                    amount_out: out,
                });
                QuoteApply::Applied
            }
            (Ok(_), _) => {
                self.displayed = None;
                QuoteApply::Applied
            }
            (Err(e), _) => {
                tracing::warn!(error = %e, direction = %ticket.direction, "quote request failed");
                self.displayed = None;
                QuoteApply::Failed
            }
        }
    }

    /// The displayed quote, but only if it was produced by exactly this input.
    pub fn quote_for(&self, amount_in: U256, direction: Direction) -> Option<U256> {
        self.displayed
            .filter(|q| q.amount_in == amount_in && q.direction == direction)
            .map(|q| q.amount_out)
    }

    pub const fn displayed(&self) -> Option<Quote> {
        self.displayed
    }
}

/// One edit of the swap form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteInput {
    /// Raw sell amount as typed, parsed at the current sell token's decimals.
    Amount(String),
    Direction(Direction),
    /// Switch tokens: the displayed output becomes the new sell amount.
    Flip,
}

/// What the feed publishes after each applied (non-stale) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteUpdate {
    pub amount: Option<U256>,
    pub direction: Direction,
    pub outcome: QuoteApply,
    pub quote: Option<Quote>,
}

/// Drive quotes from a stream of input edits.
///
/// Each edit starts a new request after `debounce`. If another edit arrives during the debounce,
/// the earlier request never reaches the ledger; if one arrives while the ledger call is in
/// flight, its result is discarded by the board. Returns when `inputs` closes and every
/// outstanding request has settled.
pub async fn watch_quotes<L>(
    engine: QuoteEngine<L>,
    pair: Pair,
    initial_direction: Direction,
    debounce: Duration,
    mut inputs: mpsc::Receiver<QuoteInput>,
    updates: mpsc::Sender<QuoteUpdate>,
) -> QuoteBoard
where
    L: Ledger + Clone + 'static,
{
    let mut board = QuoteBoard::default();
    let mut amount: Option<U256> = None;
    let mut direction = initial_direction;
    let (latest_tx, _latest_rx) = watch::channel(0_u64);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(QuoteTicket, eyre::Result<Option<U256>>)>();
    let mut in_flight = 0_usize;
    let mut inputs_open = true;

    while inputs_open || in_flight > 0 {
        tokio::select! {
            msg = inputs.recv(), if inputs_open => {
                let Some(msg) = msg else {
                    inputs_open = false;
                    continue;
                };
                match msg {
                    QuoteInput::Amount(text) => {
                        amount = parse_amount_ui_to_base(&text, pair.sell_token(direction).decimals);
                    }
                    QuoteInput::Direction(d) if d != direction => {
                        direction = d;
                    }
                    QuoteInput::Direction(_) => continue,
                    QuoteInput::Flip => {
                        let shown = board
                            .displayed()
                            .map(|q| format_amount_for_display(q.amount_out, pair.buy_token(direction).decimals))
                            .unwrap_or_default();
                        let (flipped, text) = switch_direction(direction, &shown);
                        direction = flipped;
                        amount = parse_amount_ui_to_base(&text, pair.sell_token(direction).decimals);
                    }
                }
                let ticket = board.request(amount, direction);
                latest_tx.send_replace(ticket.generation);
                let latest = latest_tx.subscribe();
                let engine = engine.clone();
                let done = done_tx.clone();
                in_flight += 1;
                tokio::spawn(async move {
                    tokio::time::sleep(debounce).await;
                    if *latest.borrow() != ticket.generation {
                        drop(done.send((ticket, Ok(None))));
                        return;
                    }
                    let res = engine.quote(ticket.amount, ticket.direction).await;
                    drop(done.send((ticket, res)));
                });
            }
            Some((ticket, res)) = done_rx.recv() => {
                in_flight = in_flight.saturating_sub(1);
                let outcome = board.apply(ticket, res);
                if outcome != QuoteApply::Stale {
                    let update = QuoteUpdate {
                        amount: ticket.amount,
                        direction: ticket.direction,
                        outcome,
                        quote: board.displayed(),
                    };
                    if updates.send(update).await.is_err() {
                        tracing::debug!("quote update receiver dropped");
                    }
                }
            }
        }
    }
    board
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::pair::fixtures;

    fn amt(v: u64) -> Option<U256> {
        Some(U256::from(v))
    }

    #[tokio::test]
    async fn zero_or_missing_amount_never_reaches_ledger() -> eyre::Result<()> {
        let ledger = MockLedger::new();
        let engine = QuoteEngine::new(ledger.clone());
        assert_eq!(engine.quote(None, Direction::AToB).await?, None);
        assert_eq!(engine.quote(Some(U256::ZERO), Direction::AToB).await?, None);
        assert_eq!(ledger.state().estimate_calls, 0);
        assert_eq!(engine.quote(amt(5), Direction::AToB).await?, amt(5));
        Ok(())
    }

    #[test]
    fn superseded_result_is_discarded() {
        let mut board = QuoteBoard::default();
        let first = board.request(amt(100), Direction::AToB);
        let second = board.request(amt(200), Direction::AToB);
        assert_eq!(board.apply(first, Ok(amt(1))), QuoteApply::Stale);
        assert_eq!(board.displayed(), None);
        assert_eq!(board.apply(second, Ok(amt(2))), QuoteApply::Applied);
        assert_eq!(board.quote_for(U256::from(200_u64), Direction::AToB), amt(2));
    }

    #[test]
    fn same_amount_other_direction_is_a_new_request() {
        let mut board = QuoteBoard::default();
        let a = board.request(amt(100), Direction::AToB);
        assert_eq!(board.apply(a, Ok(amt(7))), QuoteApply::Applied);
        let b = board.request(amt(100), Direction::BToA);
        assert_eq!(board.displayed(), None, "quote for the old direction must not linger");
        assert_eq!(board.apply(a, Ok(amt(7))), QuoteApply::Stale);
        assert_eq!(board.quote_for(U256::from(100_u64), Direction::BToA), None);
        assert!(board.is_current(&b));
    }

    #[test]
    fn failure_unsets_displayed_quote() {
        let mut board = QuoteBoard::default();
        let t = board.request(amt(1), Direction::AToB);
        board.apply(t, Ok(amt(9)));
        let again = board.request(amt(1), Direction::AToB);
        assert_eq!(board.displayed().map(|q| q.amount_out), amt(9));
        assert_eq!(
            board.apply(again, Err(eyre::eyre!("rpc down"))),
            QuoteApply::Failed
        );
        assert_eq!(board.displayed(), None);
    }

    #[tokio::test]
    async fn watch_skips_requests_superseded_during_debounce() -> eyre::Result<()> {
        let ledger = MockLedger::new();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (up_tx, mut up_rx) = mpsc::channel(8);
        for a in ["1", "12", "123"] {
            in_tx.send(QuoteInput::Amount(a.to_owned())).await?;
        }
        drop(in_tx);

        let board = watch_quotes(
            QuoteEngine::new(ledger.clone()),
            fixtures::pair(),
            Direction::AToB,
            Duration::from_millis(50),
            in_rx,
            up_tx,
        )
        .await;

        assert_eq!(ledger.state().estimate_calls, 1, "only the last edit is quoted");
        assert_eq!(
            board.quote_for(U256::from(123_000_000_u64), Direction::AToB),
            amt(123_000_000)
        );
        let update = up_rx
            .recv()
            .await
            .ok_or_else(|| eyre::eyre!("no update published"))?;
        assert_eq!(update.amount, amt(123_000_000));
        assert_eq!(update.outcome, QuoteApply::Applied);
        Ok(())
    }

    #[tokio::test]
    async fn flip_carries_displayed_output_into_sell_amount() -> eyre::Result<()> {
        let ledger = MockLedger::new();
        // 1 BBUSD (6 decimals) -> 0.0005 BBETH (18 decimals)
        ledger.state().rate_wad = U256::from(500_000_000_000_000_000_000_000_000_u128);
        let (in_tx, in_rx) = mpsc::channel(8);
        let (up_tx, mut up_rx) = mpsc::channel(8);
        let feed = tokio::spawn(watch_quotes(
            QuoteEngine::new(ledger.clone()),
            fixtures::pair(),
            Direction::AToB,
            Duration::ZERO,
            in_rx,
            up_tx,
        ));

        in_tx.send(QuoteInput::Amount("1".to_owned())).await?;
        let first = up_rx.recv().await.ok_or_else(|| eyre::eyre!("no quote"))?;
        assert_eq!(
            first.quote.map(|q| q.amount_out),
            Some(U256::from(500_000_000_000_000_u64))
        );

        in_tx.send(QuoteInput::Flip).await?;
        let flipped = up_rx.recv().await.ok_or_else(|| eyre::eyre!("no quote"))?;
        assert_eq!(flipped.direction, Direction::BToA);
        assert_eq!(flipped.amount, Some(U256::from(500_000_000_000_000_u64)));

        drop(in_tx);
        feed.await?;
        Ok(())
    }

    #[tokio::test]
    async fn failed_estimate_unsets_the_displayed_quote() -> eyre::Result<()> {
        let ledger = MockLedger::new();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (up_tx, mut up_rx) = mpsc::channel(8);
        let feed = tokio::spawn(watch_quotes(
            QuoteEngine::new(ledger.clone()),
            fixtures::pair(),
            Direction::AToB,
            Duration::ZERO,
            in_rx,
            up_tx,
        ));

        in_tx.send(QuoteInput::Amount("2".to_owned())).await?;
        let ok = up_rx.recv().await.ok_or_else(|| eyre::eyre!("no quote"))?;
        assert_eq!(ok.outcome, QuoteApply::Applied);
        assert_eq!(ok.quote.map(|q| q.amount_out), amt(2_000_000));

        ledger.state().estimate_fails = true;
        in_tx.send(QuoteInput::Amount("3".to_owned())).await?;
        let failed = up_rx.recv().await.ok_or_else(|| eyre::eyre!("no update"))?;
        assert_eq!(failed.outcome, QuoteApply::Failed);
        assert_eq!(failed.amount, amt(3_000_000));
        assert_eq!(failed.quote, None, "no stale output left behind");

        drop(in_tx);
        let board = feed.await?;
        assert_eq!(board.displayed(), None);
        assert_eq!(ledger.state().estimate_calls, 2);
        Ok(())
    }
}
