//! Single-instrument order book: bids and asks under price-time priority.
//!
//! Orders live in one arena keyed by [`OrderId`]. Each side is a sorted map from
//! `(price, priority)` to the order id, so the best order is the first entry and
//! any order can be removed in O(log n) because its key is derived from the order
//! itself. The arena and both sides form one consistency domain and sit behind a
//! single lock, together with the observer list; events are delivered inside the
//! same critical section as the mutation that caused them.

use crate::events::{EventKind, OrderEvent, OrderObserver};
use crate::types::{Order, OrderError, OrderId, OrderSnapshot, Side, SubscriptionId, TradeId};
use log::debug;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Bids sort by price descending, then priority ascending.
type BidKey = (Reverse<Decimal>, u64);
/// Asks sort by price ascending, then priority ascending.
type AskKey = (Decimal, u64);

/// A broken structural invariant. Seeing one means the index and the side
/// structures have diverged; there is no recovery.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("order {0} is indexed but missing from its side")]
    MissingFromSide(OrderId),
    #[error("order {0} is on a side but missing from the index")]
    MissingFromIndex(OrderId),
    #[error("order {0} is filed under a key that does not match its price, priority or side")]
    StaleKey(OrderId),
    #[error("order {0} is live with zero quantity")]
    EmptyOrder(OrderId),
    #[error("book is crossed: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },
}

/// The locked contents of an [`OrderBook`].
///
/// Observers receive `&mut BookState` while the lock is held. Read accessors are
/// public; structural mutation is restricted to the crate so that every change
/// keeps the arena and both sides in step.
#[derive(Debug)]
pub struct BookState {
    orders: HashMap<OrderId, Order>,
    bids: BTreeMap<BidKey, OrderId>,
    asks: BTreeMap<AskKey, OrderId>,
    next_priority: u64,
    next_trade_id: u64,
}

impl Default for BookState {
    fn default() -> Self {
        Self {
            orders: HashMap::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            next_priority: 1,
            next_trade_id: 1,
        }
    }
}

impl BookState {
    /// Number of live orders.
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Top of `side` without removing it.
    pub fn best(&self, side: Side) -> Option<&Order> {
        let id = match side {
            Side::Buy => self.bids.values().next(),
            Side::Sell => self.asks.values().next(),
        }?;
        self.orders.get(id)
    }

    pub fn best_bid(&self) -> Option<&Order> {
        self.best(Side::Buy)
    }

    pub fn best_ask(&self) -> Option<&Order> {
        self.best(Side::Sell)
    }

    /// All live orders on `side`, best first.
    pub fn side_orders(&self, side: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
        let ids: Box<dyn Iterator<Item = &OrderId> + '_> = match side {
            Side::Buy => Box::new(self.bids.values()),
            Side::Sell => Box::new(self.asks.values()),
        };
        Box::new(ids.filter_map(move |id| self.orders.get(id)))
    }

    /// Live orders on `side` at exactly `price`, in time priority.
    pub fn view(&self, side: Side, price: Decimal) -> Vec<Order> {
        let ids: Vec<OrderId> = match side {
            Side::Buy => self
                .bids
                .range((Reverse(price), 0)..=(Reverse(price), u64::MAX))
                .map(|(_, id)| *id)
                .collect(),
            Side::Sell => self
                .asks
                .range((price, 0)..=(price, u64::MAX))
                .map(|(_, id)| *id)
                .collect(),
        };
        ids.iter()
            .filter_map(|id| self.orders.get(id))
            .cloned()
            .collect()
    }

    /// `(order_id, price, quantity, priority)` for every order on `side`, best first.
    pub fn snapshot(&self, side: Side) -> Vec<OrderSnapshot> {
        self.side_orders(side).map(OrderSnapshot::from).collect()
    }

    /// Checks index/side consistency, quantities, and that the book is not crossed.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        for (key, id) in &self.bids {
            let order = self
                .orders
                .get(id)
                .ok_or(InvariantViolation::MissingFromIndex(*id))?;
            if order.side() != Side::Buy || *key != (Reverse(order.price()), order.priority()) {
                return Err(InvariantViolation::StaleKey(*id));
            }
        }
        for (key, id) in &self.asks {
            let order = self
                .orders
                .get(id)
                .ok_or(InvariantViolation::MissingFromIndex(*id))?;
            if order.side() != Side::Sell || *key != (order.price(), order.priority()) {
                return Err(InvariantViolation::StaleKey(*id));
            }
        }
        for order in self.orders.values() {
            if order.is_filled() {
                return Err(InvariantViolation::EmptyOrder(order.id()));
            }
            let filed = match order.side() {
                Side::Buy => self.bids.get(&(Reverse(order.price()), order.priority())),
                Side::Sell => self.asks.get(&(order.price(), order.priority())),
            };
            if filed != Some(&order.id()) {
                return Err(InvariantViolation::MissingFromSide(order.id()));
            }
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price() >= ask.price() {
                return Err(InvariantViolation::Crossed {
                    bid: bid.price(),
                    ask: ask.price(),
                });
            }
        }
        Ok(())
    }

    fn is_balanced(&self) -> bool {
        self.orders.len() == self.bids.len() + self.asks.len()
    }

    fn take_priority(&mut self) -> u64 {
        let priority = self.next_priority;
        self.next_priority += 1;
        priority
    }

    pub(crate) fn next_trade_id(&mut self) -> TradeId {
        let id = TradeId(self.next_trade_id);
        self.next_trade_id += 1;
        id
    }

    fn link(&mut self, order: &Order) {
        match order.side() {
            Side::Buy => {
                self.bids
                    .insert((Reverse(order.price()), order.priority()), order.id());
            }
            Side::Sell => {
                self.asks.insert((order.price(), order.priority()), order.id());
            }
        }
    }

    fn unlink(&mut self, order: &Order) -> bool {
        match order.side() {
            Side::Buy => self
                .bids
                .remove(&(Reverse(order.price()), order.priority()))
                .is_some(),
            Side::Sell => self
                .asks
                .remove(&(order.price(), order.priority()))
                .is_some(),
        }
    }

    /// Files a new order with a fresh priority. Returns the order as stored.
    pub(crate) fn insert(&mut self, mut order: Order) -> Result<Order, OrderError> {
        if self.orders.contains_key(&order.id()) {
            return Err(OrderError::DuplicateOrderId(order.id()));
        }
        order.validate()?;
        let priority = self.take_priority();
        let quantity = order.quantity();
        order.set_quantity(quantity, priority);
        self.link(&order);
        self.orders.insert(order.id(), order.clone());
        Ok(order)
    }

    /// Removes an order from the index and its side.
    pub(crate) fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let order = self.orders.remove(&order_id)?;
        let linked = self.unlink(&order);
        debug_assert!(linked, "order {} was indexed but not on its side", order_id);
        Some(order)
    }

    /// Sets a new non-zero quantity and sends the order to the back of its price level.
    pub(crate) fn reprioritize(&mut self, order_id: OrderId, quantity: u64) -> Option<Order> {
        debug_assert!(quantity > 0, "zero quantity must go through remove");
        let mut order = self.orders.remove(&order_id)?;
        self.unlink(&order);
        let priority = self.take_priority();
        order.set_quantity(quantity, priority);
        self.link(&order);
        self.orders.insert(order_id, order.clone());
        Some(order)
    }

    /// Applies an execution to a live order, removing it once nothing is left.
    /// Returns the remaining quantity, or `None` if the order is not live.
    pub(crate) fn fill(&mut self, order_id: OrderId, quantity: u64) -> Option<u64> {
        let order = self.orders.get_mut(&order_id)?;
        order.fill(quantity);
        let remaining = order.quantity();
        if remaining == 0 {
            self.remove(order_id);
        }
        Some(remaining)
    }
}

struct Inner {
    state: BookState,
    observers: Vec<(SubscriptionId, Arc<dyn OrderObserver>)>,
    next_subscription: u64,
}

impl Inner {
    fn emit(&mut self, kind: EventKind, order: Order) {
        let event = OrderEvent::new(kind, order);
        debug!(
            "order event kind={:?} order_id={} observers={}",
            event.kind,
            event.order.id(),
            self.observers.len()
        );
        let Inner {
            state, observers, ..
        } = self;
        for (_, observer) in observers.iter() {
            observer.on_order_event(&event, state);
        }
    }

    fn delete(&mut self, order_id: OrderId) -> bool {
        match self.state.remove(order_id) {
            Some(order) => {
                self.emit(EventKind::Delete, order);
                true
            }
            None => false,
        }
    }
}

/// Shared order book handle.
///
/// Mutations (`add`, `modify`, `delete`) and observer (un)registration take the
/// write lock; reads take the read lock. Observers run under the write lock, so a
/// subscriber such as the matching engine completes before the mutating call returns.
pub struct OrderBook {
    inner: RwLock<Inner>,
}

/// Never blocks: while a mutation holds the lock (for example when an observer
/// formats the engine) the contents are reported as locked.
impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(inner) => f
                .debug_struct("OrderBook")
                .field("orders", &inner.state.len())
                .field("observers", &inner.observers.len())
                .finish(),
            None => f
                .debug_struct("OrderBook")
                .field("state", &format_args!("<locked>"))
                .finish_non_exhaustive(),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: BookState::default(),
                observers: Vec::new(),
                next_subscription: 1,
            }),
        }
    }

    /// Files `order` on its side and in the index, then emits [`EventKind::Add`].
    pub fn add(&self, order: Order) -> Result<(), OrderError> {
        let mut inner = self.inner.write();
        let order = inner.state.insert(order)?;
        inner.emit(EventKind::Add, order);
        debug_assert!(inner.state.is_balanced(), "index and sides diverged after add");
        Ok(())
    }

    /// Replaces the remaining quantity of a live order. The order loses its time
    /// priority and emits [`EventKind::Modify`]. A quantity of zero cancels the
    /// order and emits [`EventKind::Delete`]. Returns `false` if the id is not live.
    pub fn modify(&self, order_id: OrderId, new_quantity: u64) -> bool {
        let mut inner = self.inner.write();
        let found = if new_quantity == 0 {
            inner.delete(order_id)
        } else {
            match inner.state.reprioritize(order_id, new_quantity) {
                Some(order) => {
                    inner.emit(EventKind::Modify, order);
                    true
                }
                None => false,
            }
        };
        debug_assert!(inner.state.is_balanced(), "index and sides diverged after modify");
        found
    }

    /// Removes a live order and emits [`EventKind::Delete`]. Returns `false` if the id is not live.
    pub fn delete(&self, order_id: OrderId) -> bool {
        let mut inner = self.inner.write();
        let found = inner.delete(order_id);
        debug_assert!(inner.state.is_balanced(), "index and sides diverged after delete");
        found
    }

    /// Adds an observer at the end of the delivery order.
    pub fn register(&self, observer: Arc<dyn OrderObserver>) -> SubscriptionId {
        let mut inner = self.inner.write();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.observers.push((id, observer));
        id
    }

    /// Returns `true` if the subscription existed.
    pub fn unregister(&self, subscription: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.observers.len();
        inner.observers.retain(|(id, _)| *id != subscription);
        inner.observers.len() != before
    }

    /// Runs `f` against a consistent view of the book.
    pub fn read<R>(&self, f: impl FnOnce(&BookState) -> R) -> R {
        f(&self.inner.read().state)
    }

    pub fn best_bid(&self) -> Option<Order> {
        self.read(|state| state.best_bid().cloned())
    }

    pub fn best_ask(&self) -> Option<Order> {
        self.read(|state| state.best_ask().cloned())
    }

    pub fn view(&self, side: Side, price: Decimal) -> Vec<Order> {
        self.read(|state| state.view(side, price))
    }

    pub fn snapshot(&self, side: Side) -> Vec<OrderSnapshot> {
        self.read(|state| state.snapshot(side))
    }

    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.read(|state| state.get(order_id).cloned())
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.read(|state| state.contains(order_id))
    }

    pub fn len(&self) -> usize {
        self.read(|state| state.len())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|state| state.is_empty())
    }

    pub fn verify(&self) -> Result<(), InvariantViolation> {
        self.read(|state| state.verify())
    }
}
