//! Core types and IDs for the order book.
//!
//! All identifiers are newtype wrappers. [`Order`] carries immutable identity
//! (id, side, price) and the two mutable fields that define its queue position:
//! remaining quantity and priority.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Unique order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade identifier, monotonic per book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TradeId(pub u64);

/// Handle returned by observer registration; pass it back to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side an order of this side trades against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Rejections for malformed orders. These are caller contract violations and
/// are returned before the order touches the book.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("order {0} is already live")]
    DuplicateOrderId(OrderId),
}

/// A plain limit order.
///
/// `priority` is the queue key within a price level: lower is earlier. The book
/// assigns it on insert and again on every quantity change, so the value set by
/// [`Order::new`] is only a placeholder until the order is added.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawOrder")]
pub struct Order {
    id: OrderId,
    side: Side,
    price: Decimal,
    quantity: u64,
    priority: u64,
}

impl Order {
    /// Validates and builds an order. Price and quantity must be strictly positive.
    pub fn new(id: OrderId, side: Side, price: Decimal, quantity: u64) -> Result<Self, OrderError> {
        let order = Self {
            id,
            side,
            price,
            quantity,
            priority: 0,
        };
        order.validate()?;
        Ok(order)
    }

    /// Rejects non-positive price or quantity.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.price <= Decimal::ZERO {
            return Err(OrderError::InvalidPrice(self.price));
        }
        if self.quantity == 0 {
            return Err(OrderError::InvalidQuantity);
        }
        Ok(())
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Remaining unfilled quantity.
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn priority(&self) -> u64 {
        self.priority
    }

    /// True when nothing is left to fill.
    pub fn is_filled(&self) -> bool {
        self.quantity == 0
    }

    /// Replaces the remaining quantity and the priority together. The two must
    /// never be observed apart, since the side structures are keyed on priority.
    pub fn set_quantity(&mut self, quantity: u64, priority: u64) {
        self.quantity = quantity;
        self.priority = priority;
    }

    /// Reduces remaining quantity by an executed amount. Keeps priority.
    pub(crate) fn fill(&mut self, quantity: u64) {
        debug_assert!(quantity <= self.quantity, "fill exceeds remaining quantity");
        self.quantity -= quantity.min(self.quantity);
    }

    /// Whether this order, as the incoming side, trades against `resting`.
    pub fn crosses(&self, resting: &Order) -> bool {
        match self.side {
            Side::Buy => self.price >= resting.price,
            Side::Sell => self.price <= resting.price,
        }
    }
}

/// Wire shape of [`Order`]; deserialized orders pass the same checks as [`Order::new`].
#[derive(serde::Deserialize)]
struct RawOrder {
    id: OrderId,
    side: Side,
    price: Decimal,
    quantity: u64,
    #[serde(default)]
    priority: u64,
}

impl TryFrom<RawOrder> for Order {
    type Error = OrderError;

    fn try_from(raw: RawOrder) -> Result<Self, Self::Error> {
        let mut order = Order::new(raw.id, raw.side, raw.price, raw.quantity)?;
        order.priority = raw.priority;
        Ok(order)
    }
}

/// Read-only view of a live order, used for diagnostics and snapshots.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub price: Decimal,
    pub quantity: u64,
    pub priority: u64,
}

impl From<&Order> for OrderSnapshot {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            price: order.price,
            quantity: order.quantity,
            priority: order.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_non_positive_price() {
        let err = Order::new(OrderId(1), Side::Buy, Decimal::ZERO, 10).unwrap_err();
        assert_eq!(err, OrderError::InvalidPrice(Decimal::ZERO));
        let err = Order::new(OrderId(1), Side::Buy, Decimal::from(-5), 10).unwrap_err();
        assert!(matches!(err, OrderError::InvalidPrice(_)));
    }

    #[test]
    fn new_rejects_zero_quantity() {
        let err = Order::new(OrderId(1), Side::Sell, Decimal::from(100), 0).unwrap_err();
        assert_eq!(err, OrderError::InvalidQuantity);
    }

    #[test]
    fn set_quantity_moves_priority_with_quantity() {
        let mut order = Order::new(OrderId(1), Side::Buy, Decimal::from(100), 10).unwrap();
        order.set_quantity(40, 7);
        assert_eq!(order.quantity(), 40);
        assert_eq!(order.priority(), 7);
    }

    #[test]
    fn fill_keeps_priority() {
        let mut order = Order::new(OrderId(1), Side::Sell, Decimal::from(100), 10).unwrap();
        order.set_quantity(10, 3);
        order.fill(4);
        assert_eq!(order.quantity(), 6);
        assert_eq!(order.priority(), 3);
        order.fill(6);
        assert!(order.is_filled());
    }

    #[test]
    fn crosses_uses_incoming_side() {
        let buy = Order::new(OrderId(1), Side::Buy, Decimal::from(100), 1).unwrap();
        let cheap_ask = Order::new(OrderId(2), Side::Sell, Decimal::from(99), 1).unwrap();
        let rich_ask = Order::new(OrderId(3), Side::Sell, Decimal::from(101), 1).unwrap();
        assert!(buy.crosses(&cheap_ask));
        assert!(!buy.crosses(&rich_ask));
        assert!(!rich_ask.crosses(&buy));
        assert!(cheap_ask.crosses(&buy));
    }

    #[test]
    fn deserialize_validates_like_new() {
        let err = serde_json::from_str::<Order>(
            r#"{"id":7,"side":"Buy","price":"-5","quantity":3,"priority":0}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("price must be positive"), "{}", err);
        assert!(serde_json::from_str::<Order>(
            r#"{"id":7,"side":"Sell","price":"100","quantity":0,"priority":0}"#
        )
        .is_err());

        let order: Order =
            serde_json::from_str(r#"{"id":7,"side":"Buy","price":"100.5","quantity":3,"priority":9}"#)
                .unwrap();
        assert_eq!(order.price(), Decimal::new(1005, 1));
        assert_eq!(order.priority(), 9);
    }

    #[test]
    fn duplicate_id_error_mentions_order() {
        let err = OrderError::DuplicateOrderId(OrderId(42));
        assert_eq!(err.to_string(), "order 42 is already live");
    }
}
