//! Single-entry matching engine facade.
//!
//! Owns one [`OrderBook`] with a [`MatchingEngine`] attached, assigns order ids,
//! and validates input before it reaches the book. Cloning an [`Engine`] gives
//! another handle to the same book, so it can be handed to many trader threads.

use crate::events::{FnObserver, OrderEvent};
use crate::execution::{LogTradeSink, TradeSink};
use crate::matching::MatchingEngine;
use crate::order_book::{InvariantViolation, OrderBook};
use crate::types::{Order, OrderError, OrderId, OrderSnapshot, Side, SubscriptionId};
use log::{info, warn};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single-instrument matching engine.
///
/// Use [`Engine::submit`] to place orders; matching runs before the call returns.
/// Use [`Engine::amend`] and [`Engine::cancel`] to change resting orders.
#[derive(Clone, Debug)]
pub struct Engine {
    book: Arc<OrderBook>,
    matcher: Arc<MatchingEngine>,
    next_order_id: Arc<AtomicU64>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine that logs its trades.
    pub fn new() -> Self {
        Self::with_trade_sink(Arc::new(LogTradeSink))
    }

    /// Creates an engine that hands every trade to `sink`.
    pub fn with_trade_sink(sink: Arc<dyn TradeSink>) -> Self {
        let book = Arc::new(OrderBook::new());
        let matcher = MatchingEngine::attach(&book, sink);
        Self {
            book,
            matcher,
            next_order_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Places a limit order and matches it. Returns the new order's id; the order
    /// may already be fully filled by the time this returns.
    pub fn submit(&self, price: Decimal, quantity: u64, side: Side) -> Result<OrderId, OrderError> {
        let order_id = OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let order = match Order::new(order_id, side, price, quantity) {
            Ok(order) => order,
            Err(e) => {
                warn!("order rejected side={:?} price={} quantity={}: {}", side, price, quantity, e);
                return Err(e);
            }
        };
        self.book.add(order)?;
        info!(
            "order submitted order_id={} side={:?} price={} quantity={}",
            order_id, side, price, quantity
        );
        Ok(order_id)
    }

    /// Replaces the remaining quantity of a live order; it loses time priority and
    /// is matched again. Zero cancels. Returns `false` if the order is not live.
    pub fn amend(&self, order_id: OrderId, new_quantity: u64) -> bool {
        let found = self.book.modify(order_id, new_quantity);
        if found {
            info!("order amended order_id={} quantity={}", order_id, new_quantity);
        } else {
            info!("amend ignored, order not found order_id={}", order_id);
        }
        found
    }

    /// Cancels a live order. Returns `false` if the order is not live.
    pub fn cancel(&self, order_id: OrderId) -> bool {
        let found = self.book.delete(order_id);
        if found {
            info!("order canceled order_id={}", order_id);
        } else {
            info!("cancel ignored, order not found order_id={}", order_id);
        }
        found
    }

    /// Live orders on `side`, best first.
    pub fn snapshot(&self, side: Side) -> Vec<OrderSnapshot> {
        self.book.snapshot(side)
    }

    /// Live orders on `side` at exactly `price`, in time priority.
    pub fn view(&self, side: Side, price: Decimal) -> Vec<Order> {
        self.book.view(side, price)
    }

    /// Calls `handler` for every add, modify and delete, inside the book's
    /// critical section. The handler must not call back into this engine.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&OrderEvent) + Send + Sync + 'static,
    {
        self.book.register(Arc::new(FnObserver(handler)))
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.book.unregister(subscription)
    }

    pub fn best_bid(&self) -> Option<Order> {
        self.book.best_bid()
    }

    pub fn best_ask(&self) -> Option<Order> {
        self.book.best_ask()
    }

    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.book.get(order_id)
    }

    /// The underlying book, for observers that need [`OrderBook::register`] directly.
    pub fn book(&self) -> &Arc<OrderBook> {
        &self.book
    }

    pub fn matcher(&self) -> &Arc<MatchingEngine> {
        &self.matcher
    }

    /// Checks the book's structural invariants.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        self.book.verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::execution::InMemoryTradeSink;
    use parking_lot::Mutex;

    fn init_log() {
        let _ = env_logger::try_init();
    }

    fn engine() -> (Engine, InMemoryTradeSink) {
        init_log();
        let sink = InMemoryTradeSink::new();
        (Engine::with_trade_sink(Arc::new(sink.clone())), sink)
    }

    #[test]
    fn engine_submit_matches_and_records_trade() {
        let (engine, sink) = engine();
        let sell = engine.submit(Decimal::from(100), 10, Side::Sell).unwrap();
        let buy = engine.submit(Decimal::from(100), 10, Side::Buy).unwrap();
        let trades = sink.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].buy_order_id(), buy);
        assert_eq!(trades[0].sell_order_id(), sell);
        assert!(engine.best_bid().is_none());
        assert!(engine.best_ask().is_none());
    }

    #[test]
    fn engine_assigns_increasing_ids() {
        let (engine, _) = engine();
        let a = engine.submit(Decimal::from(100), 1, Side::Buy).unwrap();
        let b = engine.submit(Decimal::from(99), 1, Side::Buy).unwrap();
        assert!(b > a);
    }

    #[test]
    fn engine_rejects_invalid_orders() {
        let (engine, _) = engine();
        assert_eq!(
            engine.submit(Decimal::ZERO, 10, Side::Buy),
            Err(OrderError::InvalidPrice(Decimal::ZERO))
        );
        assert_eq!(
            engine.submit(Decimal::from(100), 0, Side::Sell),
            Err(OrderError::InvalidQuantity)
        );
        assert!(engine.snapshot(Side::Buy).is_empty());
        assert!(engine.snapshot(Side::Sell).is_empty());
    }

    #[test]
    fn engine_submit_then_cancel() {
        let (engine, _) = engine();
        let id = engine.submit(Decimal::from(100), 5, Side::Sell).unwrap();
        assert!(engine.cancel(id));
        assert!(engine.best_ask().is_none());
        assert!(!engine.cancel(id));
    }

    #[test]
    fn engine_amend_unknown_returns_false() {
        let (engine, _) = engine();
        assert!(!engine.amend(OrderId(999), 10));
    }

    #[test]
    fn engine_amend_zero_cancels() {
        let (engine, _) = engine();
        let id = engine.submit(Decimal::from(100), 5, Side::Buy).unwrap();
        assert!(engine.amend(id, 0));
        assert!(engine.order(id).is_none());
        engine.verify().unwrap();
    }

    #[test]
    fn subscribe_receives_lifecycle_events() {
        let (engine, _) = engine();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        let sub = engine.subscribe(move |e: &OrderEvent| seen.lock().push((e.kind, e.order.id())));
        let id = engine.submit(Decimal::from(100), 5, Side::Buy).unwrap();
        engine.amend(id, 6);
        engine.cancel(id);
        assert!(engine.unsubscribe(sub));
        engine.submit(Decimal::from(100), 5, Side::Buy).unwrap();
        assert_eq!(
            *events.lock(),
            vec![
                (EventKind::Add, id),
                (EventKind::Modify, id),
                (EventKind::Delete, id),
            ]
        );
    }

    #[test]
    fn cloned_handles_share_one_book() {
        let (engine, sink) = engine();
        let other = engine.clone();
        engine.submit(Decimal::from(100), 5, Side::Sell).unwrap();
        other.submit(Decimal::from(100), 5, Side::Buy).unwrap();
        assert_eq!(sink.len(), 1);
        assert!(engine.snapshot(Side::Sell).is_empty());
    }

    #[test]
    fn handler_can_debug_format_engine() {
        let (engine, _) = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (inner, out) = (engine.clone(), seen.clone());
        let subscription = engine.subscribe(move |_event: &OrderEvent| {
            out.lock().push(format!("{:?}", inner));
        });
        engine.submit(Decimal::from(100), 5, Side::Buy).unwrap();
        assert!(engine.unsubscribe(subscription));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("<locked>"), "{}", seen[0]);
        assert!(format!("{:?}", engine).contains("orders: 1"));
    }
}
