//! Synthetic order flow.
//!
//! Deterministic, configurable stream of submit/amend/cancel instructions for
//! replay tests, concurrency tests and benchmarks. Same seed ⇒ same stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::engine::Engine;
use crate::types::{OrderError, OrderId, Side};

/// Configuration for the order flow. All ranges are inclusive; reversed bounds
/// are swapped and `quantity_min` is raised to 1 by [`OrderFlow::new`].
#[derive(Clone, Debug)]
pub struct OrderFlowConfig {
    /// RNG seed. Same seed ⇒ same instruction stream.
    pub seed: u64,
    /// Number of instructions produced by [`OrderFlow::all_instructions`].
    pub num_instructions: usize,
    /// Probability of Buy (0.0..=1.0). Sell otherwise.
    pub buy_ratio: f64,
    /// Price range in ticks.
    pub price_min: i64,
    pub price_max: i64,
    /// Decimal places of one tick: 2 means prices like 100.25.
    pub price_scale: u32,
    pub quantity_min: u64,
    pub quantity_max: u64,
    /// Probability that an instruction amends an earlier submission.
    pub amend_ratio: f64,
    /// Probability that an instruction cancels an earlier submission.
    pub cancel_ratio: f64,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_instructions: 1000,
            buy_ratio: 0.5,
            price_min: 9900,
            price_max: 10400,
            price_scale: 2,
            quantity_min: 1,
            quantity_max: 10,
            amend_ratio: 0.2,
            cancel_ratio: 0.1,
        }
    }
}

/// One thing a trader does to the book. Amend and cancel refer to an earlier
/// submission of the same stream by position, since ids are assigned by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderInstruction {
    Submit { side: Side, price: Decimal, quantity: u64 },
    Amend { submission: usize, quantity: u64 },
    Cancel { submission: usize },
}

/// Deterministic instruction stream. Create with [`OrderFlow::new`].
pub struct OrderFlow {
    rng: StdRng,
    config: OrderFlowConfig,
    submissions: usize,
}

impl OrderFlow {
    pub fn new(mut config: OrderFlowConfig) -> Self {
        if config.price_min > config.price_max {
            std::mem::swap(&mut config.price_min, &mut config.price_max);
        }
        if config.quantity_min > config.quantity_max {
            std::mem::swap(&mut config.quantity_min, &mut config.quantity_max);
        }
        config.quantity_min = config.quantity_min.max(1);
        config.quantity_max = config.quantity_max.max(config.quantity_min);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            rng,
            config,
            submissions: 0,
        }
    }

    /// Generates the next instruction. The first one is always a submission.
    pub fn next_instruction(&mut self) -> OrderInstruction {
        if self.submissions > 0 {
            let r = self.rng.gen::<f64>();
            if r < self.config.amend_ratio {
                let submission = self.rng.gen_range(0..self.submissions);
                // Amends never cancel; a zero here would overlap with Cancel.
                let quantity = self
                    .rng
                    .gen_range(self.config.quantity_min..=self.config.quantity_max);
                return OrderInstruction::Amend {
                    submission,
                    quantity,
                };
            }
            if r < self.config.amend_ratio + self.config.cancel_ratio {
                let submission = self.rng.gen_range(0..self.submissions);
                return OrderInstruction::Cancel { submission };
            }
        }
        self.submissions += 1;
        let side = if self.rng.gen::<f64>() < self.config.buy_ratio {
            Side::Buy
        } else {
            Side::Sell
        };
        let ticks = self
            .rng
            .gen_range(self.config.price_min..=self.config.price_max);
        let quantity = self
            .rng
            .gen_range(self.config.quantity_min..=self.config.quantity_max);
        OrderInstruction::Submit {
            side,
            price: Decimal::new(ticks, self.config.price_scale),
            quantity,
        }
    }

    pub fn take_instructions(&mut self, n: usize) -> Vec<OrderInstruction> {
        (0..n).map(|_| self.next_instruction()).collect()
    }

    /// Returns the full stream as defined by `config.num_instructions`.
    pub fn all_instructions(&mut self) -> Vec<OrderInstruction> {
        self.take_instructions(self.config.num_instructions)
    }
}

/// Counts from one replay.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub submitted: usize,
    /// Total quantity across all submissions.
    pub submitted_quantity: u64,
    pub amended: usize,
    pub canceled: usize,
    /// Amends and cancels that hit an order already filled or canceled.
    pub not_found: usize,
    /// Ids in submission order, so callers can map positions back to orders.
    pub order_ids: Vec<OrderId>,
}

/// Replays instructions into the engine, returning counts (or the first rejection).
pub fn replay_into_engine(
    engine: &Engine,
    instructions: impl IntoIterator<Item = OrderInstruction>,
) -> Result<ReplaySummary, OrderError> {
    let mut summary = ReplaySummary::default();
    for instruction in instructions {
        match instruction {
            OrderInstruction::Submit {
                side,
                price,
                quantity,
            } => {
                let id = engine.submit(price, quantity, side)?;
                summary.submitted += 1;
                summary.submitted_quantity += quantity;
                summary.order_ids.push(id);
            }
            OrderInstruction::Amend {
                submission,
                quantity,
            } => match summary.order_ids.get(submission) {
                Some(id) if engine.amend(*id, quantity) => summary.amended += 1,
                _ => summary.not_found += 1,
            },
            OrderInstruction::Cancel { submission } => match summary.order_ids.get(submission) {
                Some(id) if engine.cancel(*id) => summary.canceled += 1,
                _ => summary.not_found += 1,
            },
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let c = OrderFlowConfig {
            seed: 42,
            num_instructions: 50,
            ..Default::default()
        };
        let a = OrderFlow::new(c.clone()).all_instructions();
        let b = OrderFlow::new(c).all_instructions();
        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_different_stream() {
        let a = OrderFlow::new(OrderFlowConfig {
            seed: 1,
            num_instructions: 20,
            ..Default::default()
        })
        .all_instructions();
        let b = OrderFlow::new(OrderFlowConfig {
            seed: 2,
            num_instructions: 20,
            ..Default::default()
        })
        .all_instructions();
        assert_ne!(a, b, "different seeds should produce different instructions");
    }

    #[test]
    fn amends_and_cancels_refer_to_earlier_submissions() {
        let instructions = OrderFlow::new(OrderFlowConfig {
            seed: 7,
            num_instructions: 200,
            amend_ratio: 0.3,
            cancel_ratio: 0.3,
            ..Default::default()
        })
        .all_instructions();
        assert!(matches!(instructions[0], OrderInstruction::Submit { .. }));
        let mut submitted = 0;
        for instruction in &instructions {
            match instruction {
                OrderInstruction::Submit { price, quantity, .. } => {
                    assert!(*price >= Decimal::new(9900, 2) && *price <= Decimal::new(10400, 2));
                    assert!(*quantity >= 1 && *quantity <= 10);
                    submitted += 1;
                }
                OrderInstruction::Amend { submission, quantity } => {
                    assert!(*submission < submitted);
                    assert!(*quantity > 0);
                }
                OrderInstruction::Cancel { submission } => assert!(*submission < submitted),
            }
        }
    }

    #[test]
    fn reversed_ranges_are_normalised() {
        let instructions = OrderFlow::new(OrderFlowConfig {
            seed: 3,
            num_instructions: 100,
            price_min: 10,
            price_max: 5,
            quantity_min: 8,
            quantity_max: 0,
            ..Default::default()
        })
        .all_instructions();
        assert_eq!(instructions.len(), 100);
        for instruction in &instructions {
            match instruction {
                OrderInstruction::Submit { price, quantity, .. } => {
                    assert!(*price >= Decimal::new(5, 2) && *price <= Decimal::new(10, 2));
                    assert!(*quantity >= 1 && *quantity <= 8);
                }
                OrderInstruction::Amend { quantity, .. } => {
                    assert!(*quantity >= 1 && *quantity <= 8)
                }
                OrderInstruction::Cancel { .. } => {}
            }
        }
    }

    #[test]
    fn replay_into_engine_succeeds() {
        let engine = Engine::new();
        let instructions = OrderFlow::new(OrderFlowConfig {
            seed: 123,
            num_instructions: 100,
            ..Default::default()
        })
        .all_instructions();
        let summary = replay_into_engine(&engine, instructions).unwrap();
        assert_eq!(
            summary.submitted + summary.amended + summary.canceled + summary.not_found,
            100
        );
        assert_eq!(summary.order_ids.len(), summary.submitted);
        engine.verify().unwrap();
    }
}
