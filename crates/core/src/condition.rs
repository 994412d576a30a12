//! The boolean condition tree evaluated against a telemetry message.
//!
//! A [`ConditionTree`] is either a leaf comparing one metric against a
//! threshold, or a group combining child trees with `AND`/`OR`. Evaluation
//! is tri-state: a leaf referencing a metric absent from the message yields
//! [`LeafResult::Undetermined`] rather than `false`, and groups propagate
//! that third state per the rules in [`crate::condition`]'s module docs.

use serde::{Deserialize, Serialize};

use crate::telemetry::MetricValue;

/// Maximum nesting depth of a condition tree, bounding evaluation cost and
/// JSON size.
pub const MAX_CONDITION_DEPTH: usize = 8;

/// Comparison operator for a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
    /// Equal, within floating-point tolerance.
    Eq,
    /// Not equal, within floating-point tolerance.
    Neq,
}

impl Comparator {
    /// Relative tolerance used for `eq`/`neq` comparisons:
    /// `|a - b| <= 1e-9 * max(1, |a|, |b|)`.
    const RELATIVE_EPSILON: f64 = 1e-9;

    /// Apply this comparator to an observed value against a threshold.
    #[must_use]
    pub fn apply(self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => observed > threshold,
            Self::Lt => observed < threshold,
            Self::Gte => observed >= threshold,
            Self::Lte => observed <= threshold,
            Self::Eq => Self::approx_eq(observed, threshold),
            Self::Neq => !Self::approx_eq(observed, threshold),
        }
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        let tolerance = Self::RELATIVE_EPSILON * 1.0_f64.max(a.abs()).max(b.abs());
        (a - b).abs() <= tolerance
    }
}

/// Logical combinator for a group node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOperator {
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
}

/// A recursive boolean expression over parameter comparators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionTree {
    /// Compares one metric against a fixed threshold.
    Leaf {
        /// The metric key to look up in the telemetry message.
        parameter: String,
        /// The comparison to apply.
        op: Comparator,
        /// The fixed right-hand side of the comparison.
        threshold: f64,
    },
    /// Combines child trees with a logical operator.
    Group {
        /// `AND` or `OR`.
        operator: GroupOperator,
        /// Child condition trees, each at most [`MAX_CONDITION_DEPTH`] - 1
        /// levels deep from here.
        conditions: Vec<ConditionTree>,
    },
}

/// Tri-state evaluation result for one node of a condition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafResult {
    /// The node's comparison holds.
    True,
    /// The node's comparison does not hold.
    False,
    /// The referenced parameter was absent from the telemetry message.
    Undetermined,
}

impl LeafResult {
    fn from_bool(b: bool) -> Self {
        if b { Self::True } else { Self::False }
    }
}

/// Error returned when a condition tree cannot be evaluated at all (distinct
/// from a leaf being undetermined, which is a normal outcome).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    /// The tree nests deeper than [`MAX_CONDITION_DEPTH`].
    #[error("condition tree exceeds max depth of {MAX_CONDITION_DEPTH}")]
    TooDeep,
    /// A group node had no children.
    #[error("condition group has no children")]
    EmptyGroup,
}

impl ConditionTree {
    /// Evaluate this tree against a set of observed metrics.
    ///
    /// Evaluation is explicit-stack free recursion bounded by
    /// [`MAX_CONDITION_DEPTH`], checked up front so a malformed rule fails
    /// fast rather than evaluating to an arbitrary depth.
    pub fn evaluate(&self, metrics: &MetricValue) -> Result<LeafResult, ConditionError> {
        self.check_depth(0)?;
        Ok(self.evaluate_unchecked(metrics))
    }

    fn check_depth(&self, depth: usize) -> Result<(), ConditionError> {
        if depth >= MAX_CONDITION_DEPTH {
            return Err(ConditionError::TooDeep);
        }
        match self {
            Self::Leaf { .. } => Ok(()),
            Self::Group { conditions, .. } => {
                if conditions.is_empty() {
                    return Err(ConditionError::EmptyGroup);
                }
                for child in conditions {
                    child.check_depth(depth + 1)?;
                }
                Ok(())
            }
        }
    }

    fn evaluate_unchecked(&self, metrics: &MetricValue) -> LeafResult {
        match self {
            Self::Leaf {
                parameter,
                op,
                threshold,
            } => match metrics.get(parameter) {
                Some(v) => LeafResult::from_bool(op.apply(v, *threshold)),
                None => LeafResult::Undetermined,
            },
            Self::Group {
                operator,
                conditions,
            } => {
                let results: Vec<LeafResult> = conditions
                    .iter()
                    .map(|c| c.evaluate_unchecked(metrics))
                    .collect();
                combine(*operator, &results)
            }
        }
    }
}

fn combine(operator: GroupOperator, results: &[LeafResult]) -> LeafResult {
    match operator {
        GroupOperator::And => {
            if results.iter().any(|r| *r == LeafResult::False) {
                LeafResult::False
            } else if results.iter().all(|r| *r == LeafResult::Undetermined) {
                LeafResult::Undetermined
            } else {
                LeafResult::True
            }
        }
        GroupOperator::Or => {
            if results.iter().any(|r| *r == LeafResult::True) {
                LeafResult::True
            } else if results.iter().all(|r| *r == LeafResult::Undetermined) {
                LeafResult::Undetermined
            } else {
                LeafResult::False
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn metrics(pairs: &[(&str, f64)]) -> MetricValue {
        let mut m = HashMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), *v);
        }
        MetricValue::from_map(m)
    }

    #[test]
    fn leaf_true_false_undetermined() {
        let leaf = ConditionTree::Leaf {
            parameter: "temp".into(),
            op: Comparator::Gt,
            threshold: 50.0,
        };
        assert_eq!(
            leaf.evaluate(&metrics(&[("temp", 60.0)])).unwrap(),
            LeafResult::True
        );
        assert_eq!(
            leaf.evaluate(&metrics(&[("temp", 10.0)])).unwrap(),
            LeafResult::False
        );
        assert_eq!(
            leaf.evaluate(&metrics(&[("other", 1.0)])).unwrap(),
            LeafResult::Undetermined
        );
    }

    #[test]
    fn or_true_with_undetermined_sibling_does_not_short_circuit_wrongly() {
        // temp gt 50 OR vibration gt 5
        let tree = ConditionTree::Group {
            operator: GroupOperator::Or,
            conditions: vec![
                ConditionTree::Leaf {
                    parameter: "temp".into(),
                    op: Comparator::Gt,
                    threshold: 50.0,
                },
                ConditionTree::Leaf {
                    parameter: "vibration".into(),
                    op: Comparator::Gt,
                    threshold: 5.0,
                },
            ],
        };
        assert_eq!(
            tree.evaluate(&metrics(&[("temp", 60.0)])).unwrap(),
            LeafResult::True
        );
        assert_eq!(
            tree.evaluate(&metrics(&[("vibration", 3.0)])).unwrap(),
            LeafResult::False
        );
    }

    #[test]
    fn and_all_undetermined_is_undetermined() {
        let tree = ConditionTree::Group {
            operator: GroupOperator::And,
            conditions: vec![
                ConditionTree::Leaf {
                    parameter: "a".into(),
                    op: Comparator::Gt,
                    threshold: 1.0,
                },
                ConditionTree::Leaf {
                    parameter: "b".into(),
                    op: Comparator::Gt,
                    threshold: 1.0,
                },
            ],
        };
        assert_eq!(
            tree.evaluate(&metrics(&[])).unwrap(),
            LeafResult::Undetermined
        );
    }

    #[test]
    fn and_with_one_false_is_false_even_if_others_undetermined() {
        let tree = ConditionTree::Group {
            operator: GroupOperator::And,
            conditions: vec![
                ConditionTree::Leaf {
                    parameter: "a".into(),
                    op: Comparator::Gt,
                    threshold: 1.0,
                },
                ConditionTree::Leaf {
                    parameter: "b".into(),
                    op: Comparator::Gt,
                    threshold: 1.0,
                },
            ],
        };
        // a present and false, b absent.
        assert_eq!(
            tree.evaluate(&metrics(&[("a", 0.0)])).unwrap(),
            LeafResult::False
        );
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut tree = ConditionTree::Leaf {
            parameter: "x".into(),
            op: Comparator::Gt,
            threshold: 0.0,
        };
        for _ in 0..MAX_CONDITION_DEPTH + 1 {
            tree = ConditionTree::Group {
                operator: GroupOperator::And,
                conditions: vec![tree],
            };
        }
        assert_eq!(
            tree.evaluate(&metrics(&[("x", 1.0)])),
            Err(ConditionError::TooDeep)
        );
    }

    #[test]
    fn float_equality_uses_relative_tolerance() {
        let leaf = ConditionTree::Leaf {
            parameter: "v".into(),
            op: Comparator::Eq,
            threshold: 231.4,
        };
        assert_eq!(
            leaf.evaluate(&metrics(&[("v", 231.4 + 1e-10)])).unwrap(),
            LeafResult::True
        );
        assert_eq!(
            leaf.evaluate(&metrics(&[("v", 231.5)])).unwrap(),
            LeafResult::False
        );
    }
}
