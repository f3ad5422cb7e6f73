// Working set of open trade ideas. The tracker owns them end to end:
// accept with duplicate protection, batched price polling, and removal
// on close. Persistence is best effort after the accept itself.

use crate::db::Store;
use crate::exchange::MarketDataSource;
use crate::models::{IdeaStatus, Side, TradeIdea};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to an idea handed to [`SignalTracker::accept`]
#[derive(Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// The symbol already has an open idea; the new one is dropped
    DuplicateSymbol,
}

/// An idea that just closed, with the price that closed it
#[derive(Debug, Clone)]
pub struct ClosedIdea {
    pub idea: TradeIdea,
    pub exit_price: f64,
    pub realized_pct: f64,
    pub outcome: IdeaStatus,
}

pub struct SignalTracker {
    ideas: Vec<TradeIdea>,
    market: Arc<dyn MarketDataSource>,
    store: Option<Arc<Store>>,
}

impl SignalTracker {
    pub fn new(market: Arc<dyn MarketDataSource>, store: Option<Arc<Store>>) -> Self {
        Self {
            ideas: Vec::new(),
            market,
            store,
        }
    }

    pub fn open_count(&self) -> usize {
        self.ideas.len()
    }

    /// Symbols currently holding an open idea; the scanner skips these
    pub fn open_symbols(&self) -> HashSet<String> {
        self.ideas.iter().map(|i| i.symbol.clone()).collect()
    }

    /// Take ownership of a new idea. At most one idea per symbol may be
    /// open; a second one for the same symbol is dropped, not queued.
    /// The durable record is written before the idea enters the working
    /// set, so a crash cannot leave a tracked idea with no history row.
    pub async fn accept(&mut self, idea: TradeIdea) -> crate::Result<AcceptOutcome> {
        if self.ideas.iter().any(|i| i.symbol == idea.symbol) {
            info!(symbol = %idea.symbol, "duplicate symbol, dropping idea");
            return Ok(AcceptOutcome::DuplicateSymbol);
        }

        if let Some(store) = &self.store {
            store.save_open_signal(&idea).await?;
        }

        info!(
            symbol = %idea.symbol,
            side = idea.side.as_str(),
            entry = idea.entry,
            stop = idea.stop,
            target = idea.first_target(),
            "tracking idea"
        );
        self.ideas.push(idea);
        Ok(AcceptOutcome::Accepted)
    }

    /// One polling pass: batch-fetch prices for every open symbol and
    /// close whatever hit its first target or its stop. The target is
    /// checked first, so a bar that spans both counts as a win.
    pub async fn poll(&mut self) -> crate::Result<Vec<ClosedIdea>> {
        if self.ideas.is_empty() {
            return Ok(Vec::new());
        }

        let symbols: Vec<String> = self.ideas.iter().map(|i| i.symbol.clone()).collect();
        let tickers = self.market.fetch_tickers(&symbols).await?;

        let mut closed = Vec::new();
        self.ideas.retain(|idea| {
            let Some(ticker) = tickers.get(&idea.symbol) else {
                return true;
            };
            match resolve(idea, ticker.last) {
                Some(outcome) => {
                    closed.push(ClosedIdea {
                        idea: idea.clone(),
                        exit_price: ticker.last,
                        realized_pct: idea.realized_pct(ticker.last),
                        outcome,
                    });
                    false
                }
                None => true,
            }
        });

        for close in &closed {
            info!(
                symbol = %close.idea.symbol,
                exit = close.exit_price,
                pct = close.realized_pct,
                outcome = ?close.outcome,
                "idea closed"
            );
            if let Some(store) = &self.store {
                if let Err(e) = store
                    .close_latest_open(&close.idea.symbol, close.exit_price, close.outcome)
                    .await
                {
                    warn!(symbol = %close.idea.symbol, error = %e, "failed to persist close");
                }
            }
        }

        Ok(closed)
    }
}

/// Did this price close the idea, and as what.
/// An idea without targets can still stop out.
fn resolve(idea: &TradeIdea, price: f64) -> Option<IdeaStatus> {
    let target = idea.first_target();
    match idea.side {
        Side::Long => {
            if target.is_some_and(|t| price >= t) {
                Some(IdeaStatus::ClosedWin)
            } else if price <= idea.stop {
                Some(IdeaStatus::ClosedLoss)
            } else {
                None
            }
        }
        Side::Short => {
            if target.is_some_and(|t| price <= t) {
                Some(IdeaStatus::ClosedWin)
            } else if price >= idea.stop {
                Some(IdeaStatus::ClosedLoss)
            } else {
                None
            }
        }
    }
}
