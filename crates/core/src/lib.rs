pub mod alert;
pub mod condition;
pub mod cooldown;
pub mod device;
pub mod factory;
pub mod health;
pub mod parameter;
pub mod rule;
pub mod telemetry;
pub mod types;

pub use alert::Alert;
pub use condition::{Comparator, ConditionError, ConditionTree, GroupOperator, LeafResult, MAX_CONDITION_DEPTH};
pub use cooldown::RuleCooldown;
pub use device::Device;
pub use factory::Factory;
pub use parameter::{DataType, DeviceParameter};
pub use rule::{
    NotificationChannel, Rule, RuleScope, RuleValidationError, ScheduleConfig, ScheduleType,
    Severity,
};
pub use telemetry::{MetricNumber, MetricValue, TelemetryPoint};
pub use types::{AlertId, DeviceId, FactoryId, ParameterId, RuleId};
