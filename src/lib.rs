//! # LOB Matching Engine
//!
//! Single-instrument continuous double auction: an in-memory limit order book with
//! price-time priority matching, partial fills, and synchronous lifecycle events.
//!
//! ## Entry point
//!
//! Use [`Engine`] as the single entry point: create with [`Engine::new`] (or
//! [`Engine::with_trade_sink`]), then [`Engine::submit`], [`Engine::amend`] and
//! [`Engine::cancel`]. An `Engine` is cheap to clone and safe to share between threads.
//!
//! ## Example
//!
//! ```rust
//! use lob_matching_engine::{Engine, InMemoryTradeSink, Side};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let trades = InMemoryTradeSink::new();
//! let engine = Engine::with_trade_sink(Arc::new(trades.clone()));
//! let ask = engine.submit(Decimal::from(100), 10, Side::Sell).unwrap();
//! engine.submit(Decimal::from(101), 4, Side::Buy).unwrap();
//!
//! assert_eq!(trades.trades()[0].price, Decimal::from(100));
//! assert_eq!(engine.order(ask).unwrap().quantity(), 6);
//! ```
//!
//! ## Lower-level API
//!
//! [`OrderBook`] and [`MatchingEngine`] can be wired by hand: create the book in an
//! `Arc`, [`MatchingEngine::attach`] to it, and register further [`OrderObserver`]s.
//! [`match_incoming`] runs the matching algorithm on a locked [`BookState`].

pub mod engine;
pub mod events;
pub mod execution;
pub mod matching;
pub mod order_book;
pub mod order_flow;
pub mod types;

pub use engine::Engine;
pub use events::{EventKind, FnObserver, OrderEvent, OrderObserver};
pub use execution::{InMemoryTradeSink, LogTradeSink, Trade, TradeSink};
pub use matching::{match_incoming, MatchingEngine};
pub use order_book::{BookState, InvariantViolation, OrderBook};
pub use order_flow::{replay_into_engine, OrderFlow, OrderFlowConfig, OrderInstruction, ReplaySummary};
pub use types::{Order, OrderError, OrderId, OrderSnapshot, Side, SubscriptionId, TradeId};
