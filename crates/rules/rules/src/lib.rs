//! Pure rule evaluation for the telemetry and alerting path: the schedule
//! predicate and condition-tree evaluator behind `evaluate(rule, metrics,
//! now, timezone) -> fires?`. No I/O, no mutable state — the alerting
//! worker owns everything around this boundary (candidate rule loading,
//! cooldown checks, persistence).

pub mod error;
pub mod evaluate;
pub mod schedule;

pub use error::EvalError;
pub use evaluate::{evaluate, Verdict};
pub use schedule::is_scheduled;
