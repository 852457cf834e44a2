//! In-memory record of closed trades.
//!
//! The actor appends one entry per confirmed close; the summary feeds
//! status displays. Durable persistence is an external concern.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quorum_trade_core::Side;

/// One closed trade, realized PnL included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub pair: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
    /// What closed the trade ("decision", "stop_loss", an emergency
    /// reason, ...).
    pub reason: String,
}

impl ClosedTrade {
    /// Realized PnL for a fill at `exit_price`.
    #[must_use]
    pub fn realized_pnl(side: Side, size: Decimal, entry: Decimal, exit: Decimal) -> Decimal {
        match side {
            Side::Long => (exit - entry) * size,
            Side::Short => (entry - exit) * size,
            Side::None => Decimal::ZERO,
        }
    }
}

/// Aggregate view over the closed trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub num_trades: usize,
    pub wins: usize,
    pub total_pnl: Decimal,
    pub win_rate: f64,
}

/// Closed-trade log for one engine run.
#[derive(Debug, Default)]
pub struct TradeHistory {
    trades: Vec<ClosedTrade>,
}

impl TradeHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trade: ClosedTrade) {
        tracing::info!(
            "closed {:?} {} {} @ {} -> {} (pnl {}, {})",
            trade.side,
            trade.size,
            trade.pair,
            trade.entry_price,
            trade.exit_price,
            trade.pnl,
            trade.reason
        );
        self.trades.push(trade);
    }

    #[must_use]
    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    #[must_use]
    pub fn summary(&self) -> HistorySummary {
        let num_trades = self.trades.len();
        let wins = self
            .trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .count();
        let total_pnl = self.trades.iter().map(|t| t.pnl).sum();
        let win_rate = if num_trades == 0 {
            0.0
        } else {
            wins as f64 / num_trades as f64
        };
        HistorySummary {
            num_trades,
            wins,
            total_pnl,
            win_rate,
        }
    }
}
