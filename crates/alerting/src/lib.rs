//! Alerting worker (C6) and health/staleness computation (C8): consumes
//! `rule_engine` tasks, evaluates candidate rules through `factoryops-rules`,
//! enforces the per-(rule, device) cooldown as the atomic commit barrier for
//! alert persistence, and enqueues `notifications` tasks. See
//! [`worker::AlertingWorker`] for the entry point and [`health::HealthComputer`]
//! for the on-demand device/factory health derivations.

pub mod error;
pub mod health;
pub mod rule_cache;
pub mod worker;

pub use error::AlertingError;
pub use health::{FactoryHealthSnapshot, HealthComputer};
pub use rule_cache::RuleCache;
pub use worker::{AlertingWorker, RuleEvalTask};
