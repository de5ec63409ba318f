//! Book lifecycle events and the observer interface.
//!
//! Every mutating book operation emits one [`OrderEvent`] after the mutation is
//! applied. Observers are called synchronously, in registration order, inside the
//! book's critical section, and receive the locked [`BookState`] directly.

use crate::order_book::BookState;
use crate::types::Order;

/// What happened to the order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    Add,
    Modify,
    Delete,
}

/// An event together with the order as it stood when the event fired.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order: Order,
}

impl OrderEvent {
    pub fn new(kind: EventKind, order: Order) -> Self {
        Self { kind, order }
    }
}

/// Subscriber to book events.
///
/// `book` is the state the event was applied to, already consistent with it.
/// Implementations must not call back into the owning [`crate::OrderBook`]:
/// its lock is held for the duration of the call and is not reentrant.
/// Formatting the book or the engine with `{:?}` is safe and shows it as locked.
pub trait OrderObserver: Send + Sync {
    fn on_order_event(&self, event: &OrderEvent, book: &mut BookState);
}

/// Adapts a plain closure into an observer that only looks at the event.
pub struct FnObserver<F>(pub F);

impl<F> OrderObserver for FnObserver<F>
where
    F: Fn(&OrderEvent) + Send + Sync,
{
    fn on_order_event(&self, event: &OrderEvent, _book: &mut BookState) {
        (self.0)(event)
    }
}
