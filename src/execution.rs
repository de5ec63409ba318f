//! Trades and trade sinks.
//!
//! [`Trade`] is emitted for each fill between an incoming order and a resting order.
//! Trades are handed to a [`TradeSink`]: [`LogTradeSink`] writes one JSON line per trade,
//! [`InMemoryTradeSink`] keeps them for tests and diagnostics.

use crate::types::{OrderId, Side, TradeId};
use log::{info, warn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

/// One execution. `price` is always the resting order's price.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub incoming_order_id: OrderId,
    pub resting_order_id: OrderId,
    pub price: Decimal,
    pub quantity: u64,
    pub aggressor_side: Side,
}

impl Trade {
    pub fn buy_order_id(&self) -> OrderId {
        match self.aggressor_side {
            Side::Buy => self.incoming_order_id,
            Side::Sell => self.resting_order_id,
        }
    }

    pub fn sell_order_id(&self) -> OrderId {
        match self.aggressor_side {
            Side::Buy => self.resting_order_id,
            Side::Sell => self.incoming_order_id,
        }
    }
}

/// Receives trades as they happen. Called while the book lock is held, so
/// implementations must not call back into the book.
pub trait TradeSink: Send + Sync {
    fn record(&self, trade: &Trade);
}

/// Logs one JSON line per trade under the `trades` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTradeSink;

impl TradeSink for LogTradeSink {
    fn record(&self, trade: &Trade) {
        match serde_json::to_string(trade) {
            Ok(line) => info!(target: "trades", "{}", line),
            Err(e) => warn!("trade {} could not be serialized: {}", trade.trade_id.0, e),
        }
    }
}

/// In-memory sink that stores trades. Clone shares the same backing buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTradeSink {
    trades: Arc<Mutex<Vec<Trade>>>,
}

impl InMemoryTradeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.trades.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.lock().is_empty()
    }

    /// Total executed quantity across all recorded trades.
    pub fn total_quantity(&self) -> u64 {
        self.trades.lock().iter().map(|t| t.quantity).sum()
    }

    pub fn clear(&self) {
        self.trades.lock().clear();
    }
}

impl TradeSink for InMemoryTradeSink {
    fn record(&self, trade: &Trade) {
        self.trades.lock().push(trade.clone());
    }
}
