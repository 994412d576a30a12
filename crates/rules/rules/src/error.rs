//! Errors the evaluator itself can raise. Distinct from a condition tree
//! evaluating to undetermined, which is a normal, non-error outcome.

use factoryops_core::{ConditionError, RuleId};
use thiserror::Error;

/// A rule could not be evaluated at all.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The rule's condition tree is malformed (too deep or an empty group).
    #[error("rule {rule_id} has a malformed condition tree: {source}")]
    MalformedConditionTree {
        /// The offending rule.
        rule_id: RuleId,
        /// The underlying structural problem.
        #[source]
        source: ConditionError,
    },
}
