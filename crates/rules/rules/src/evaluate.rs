//! The rule evaluator: `evaluate(rule, metrics, now, timezone) -> fires?`.
//!
//! This is a pure function with no side effects and no I/O; the alerting
//! worker is responsible for everything around it (loading candidate
//! rules, cooldown checks, persistence). Keeping it pure is what makes the
//! purity invariant in the system's testable properties checkable by unit
//! test alone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use factoryops_core::{LeafResult, MetricValue, Rule};

use crate::error::EvalError;
use crate::schedule::is_scheduled;

/// Outcome of evaluating one rule against one telemetry message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The rule's schedule and condition tree both held: it fires.
    Fires,
    /// The rule did not fire, either because it is not currently scheduled
    /// or because its condition tree evaluated to false or undetermined.
    DoesNotFire,
}

/// Evaluate a single rule against one telemetry message at `now`, in the
/// rule's factory timezone.
///
/// Returns [`Verdict::DoesNotFire`] whenever the schedule predicate is
/// false or the condition tree's root is false or undetermined — an
/// undetermined root is explicitly treated as not-firing, never as an
/// error.
pub fn evaluate(rule: &Rule, metrics: &MetricValue, now: DateTime<Utc>, tz: Tz) -> Result<Verdict, EvalError> {
    if !is_scheduled(rule.schedule_type, &rule.schedule_config, now, tz) {
        return Ok(Verdict::DoesNotFire);
    }
    let root = rule
        .conditions
        .evaluate(metrics)
        .map_err(|source| EvalError::MalformedConditionTree {
            rule_id: rule.id,
            source,
        })?;
    Ok(match root {
        LeafResult::True => Verdict::Fires,
        LeafResult::False | LeafResult::Undetermined => Verdict::DoesNotFire,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_core::{
        Comparator, ConditionTree, FactoryId, GroupOperator, NotificationChannel, RuleId,
        RuleScope, ScheduleConfig, ScheduleType, Severity,
    };
    use std::collections::HashMap;

    fn metrics(pairs: &[(&str, f64)]) -> MetricValue {
        let mut m = HashMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), *v);
        }
        MetricValue::from_map(m)
    }

    fn overheat_rule() -> Rule {
        Rule {
            id: RuleId::new(1),
            factory_id: FactoryId::new(1),
            name: "Overheat".into(),
            description: None,
            scope: RuleScope::Global,
            conditions: ConditionTree::Group {
                operator: GroupOperator::And,
                conditions: vec![
                    ConditionTree::Leaf {
                        parameter: "spindle_temp".into(),
                        op: Comparator::Gt,
                        threshold: 80.0,
                    },
                    ConditionTree::Leaf {
                        parameter: "coolant_flow".into(),
                        op: Comparator::Lt,
                        threshold: 5.0,
                    },
                ],
            },
            cooldown_minutes: 15,
            is_active: true,
            schedule_type: ScheduleType::Always,
            schedule_config: ScheduleConfig::default(),
            severity: Severity::Critical,
            notification_channels: vec![NotificationChannel::Email],
            device_ids: vec![],
        }
    }

    #[test]
    fn fires_when_conditions_and_schedule_hold() {
        let rule = overheat_rule();
        let verdict = evaluate(
            &rule,
            &metrics(&[("spindle_temp", 82.5), ("coolant_flow", 3.2)]),
            Utc::now(),
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(verdict, Verdict::Fires);
    }

    #[test]
    fn does_not_fire_when_condition_false() {
        let rule = overheat_rule();
        let verdict = evaluate(
            &rule,
            &metrics(&[("spindle_temp", 50.0), ("coolant_flow", 3.2)]),
            Utc::now(),
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(verdict, Verdict::DoesNotFire);
    }

    #[test]
    fn undetermined_root_does_not_fire() {
        let mut rule = overheat_rule();
        rule.conditions = ConditionTree::Leaf {
            parameter: "missing_param".into(),
            op: Comparator::Gt,
            threshold: 1.0,
        };
        let verdict = evaluate(&rule, &metrics(&[]), Utc::now(), Tz::UTC).unwrap();
        assert_eq!(verdict, Verdict::DoesNotFire);
    }

    #[test]
    fn is_pure() {
        let rule = overheat_rule();
        let m = metrics(&[("spindle_temp", 82.5), ("coolant_flow", 3.2)]);
        let now = Utc::now();
        let a = evaluate(&rule, &m, now, Tz::UTC).unwrap();
        let b = evaluate(&rule, &m, now, Tz::UTC).unwrap();
        assert_eq!(a, b);
    }
}
