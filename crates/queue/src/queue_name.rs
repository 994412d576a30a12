//! The four named queues the core dispatches to.

/// One of the fixed named queues. New queues are not created at runtime —
/// the set and their concurrency caps are part of the architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Rule-evaluation tasks dispatched by the ingestion coordinator.
    RuleEngine,
    /// Owned by an out-of-scope analytics component; this crate only submits.
    Analytics,
    /// Owned by an out-of-scope reporting component; this crate only submits.
    Reporting,
    /// Notification-send tasks dispatched by the alerting worker.
    Notifications,
}

impl QueueName {
    /// All four queues, in a stable order.
    pub const ALL: [QueueName; 4] = [
        QueueName::RuleEngine,
        QueueName::Analytics,
        QueueName::Reporting,
        QueueName::Notifications,
    ];

    /// Stable string form, used as a map key and in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RuleEngine => "rule_engine",
            Self::Analytics => "analytics",
            Self::Reporting => "reporting",
            Self::Notifications => "notifications",
        }
    }

    /// The maximum number of tasks this queue allows in flight at once.
    #[must_use]
    pub fn max_concurrency(self) -> usize {
        match self {
            Self::RuleEngine => 4,
            Self::Analytics => 2,
            Self::Reporting => 2,
            Self::Notifications => 4,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_caps_match_spec() {
        assert_eq!(QueueName::RuleEngine.max_concurrency(), 4);
        assert_eq!(QueueName::Analytics.max_concurrency(), 2);
        assert_eq!(QueueName::Reporting.max_concurrency(), 2);
        assert_eq!(QueueName::Notifications.max_concurrency(), 4);
    }
}
