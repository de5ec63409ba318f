//! Price-time priority matching.
//!
//! [`MatchingEngine`] subscribes to an [`OrderBook`] and, on every add or modify,
//! crosses the affected order against the opposite side with [`match_incoming`].
//! It runs inside the book's critical section, so matching completes before the
//! mutating call returns and no other caller can observe a half-matched book.

use crate::events::{EventKind, OrderEvent, OrderObserver};
use crate::execution::{Trade, TradeSink};
use crate::order_book::{BookState, OrderBook};
use crate::types::{OrderId, SubscriptionId};
use log::{debug, trace};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Crosses a live order against resting liquidity on the opposite side.
///
/// Walks the opposite side best-first while the order still has quantity and the
/// price test passes. Each fill executes at the resting order's price; orders
/// reaching zero are removed from their side and the index. Any remainder of the
/// incoming order stays where it already rests. Returns the trades in execution order.
pub fn match_incoming(book: &mut BookState, incoming_id: OrderId) -> Vec<Trade> {
    let Some(incoming) = book.get(incoming_id).cloned() else {
        return Vec::new();
    };
    let contra = incoming.side().opposite();
    let mut remaining = incoming.quantity();
    let mut trades = Vec::new();

    while remaining > 0 {
        let Some(resting) = book.best(contra) else {
            trace!("order {} stops matching: {:?} side empty", incoming_id, contra);
            break;
        };
        if !incoming.crosses(resting) {
            trace!(
                "order {} stops matching: price {} does not cross {}",
                incoming_id,
                incoming.price(),
                resting.price()
            );
            break;
        }
        let resting_id = resting.id();
        let price = resting.price();
        let quantity = remaining.min(resting.quantity());

        book.fill(resting_id, quantity);
        book.fill(incoming_id, quantity);
        remaining -= quantity;

        let trade = Trade {
            trade_id: book.next_trade_id(),
            incoming_order_id: incoming_id,
            resting_order_id: resting_id,
            price,
            quantity,
            aggressor_side: incoming.side(),
        };
        debug!(
            "fill trade_id={} incoming={} resting={} price={} quantity={} incoming_remaining={}",
            trade.trade_id.0, incoming_id, resting_id, price, quantity, remaining
        );
        trades.push(trade);
    }
    trades
}

/// Observer that runs [`match_incoming`] for added and modified orders and
/// forwards the resulting trades to a [`TradeSink`].
///
/// Holds a weak back-reference to the book it is attached to so it can detach
/// itself without keeping the book alive.
pub struct MatchingEngine {
    book: Weak<OrderBook>,
    subscription: Mutex<Option<SubscriptionId>>,
    sink: Arc<dyn TradeSink>,
}

impl fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("subscription", &*self.subscription.lock())
            .finish_non_exhaustive()
    }
}

impl MatchingEngine {
    /// Creates an engine and registers it on `book`.
    pub fn attach(book: &Arc<OrderBook>, sink: Arc<dyn TradeSink>) -> Arc<Self> {
        let engine = Arc::new(Self {
            book: Arc::downgrade(book),
            subscription: Mutex::new(None),
            sink,
        });
        let subscription = book.register(engine.clone());
        *engine.subscription.lock() = Some(subscription);
        engine
    }

    /// Stops matching on the attached book. Returns `false` if already detached
    /// or the book is gone. Must not be called from inside an observer callback.
    pub fn detach(&self) -> bool {
        let Some(subscription) = self.subscription.lock().take() else {
            return false;
        };
        match self.book.upgrade() {
            Some(book) => book.unregister(subscription),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

impl OrderObserver for MatchingEngine {
    fn on_order_event(&self, event: &OrderEvent, book: &mut BookState) {
        match event.kind {
            EventKind::Add | EventKind::Modify => {
                for trade in match_incoming(book, event.order.id()) {
                    self.sink.record(&trade);
                }
            }
            EventKind::Delete => {
                trace!("order {} deleted, nothing to match", event.order.id());
            }
        }
    }
}
