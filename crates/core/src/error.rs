//! Error types for the planning core.
//!
//! Every fatal condition the core can raise is a `PlanError`. Non-fatal
//! conditions (ordering violations, balance violations, unknown object
//! types, orphan dependency references) never become errors; they are
//! accumulated as plan warnings instead.

use thiserror::Error;

/// Fatal errors raised by the planning core.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The graph contains cycles and the configured policy is `error`.
    ///
    /// Each inner vector is one strongly connected component of size > 1,
    /// listed in visit order.
    #[error("circular dependencies detected in {} component(s): {}", .cycles.len(), format_cycles(.cycles))]
    CircularDependency { cycles: Vec<Vec<String>> },

    /// The assessment input could not be interpreted.
    #[error("failed to parse assessment input: {0}")]
    Parse(String),

    /// The configuration file could not be interpreted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No objects were supplied to plan.
    #[error("no objects to plan")]
    EmptyInput,
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .take(3)
        .map(|c| c.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_message_lists_cycles() {
        let err = PlanError::CircularDependency {
            cycles: vec![vec!["dbo.a".to_string(), "dbo.b".to_string()]],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 component(s)"));
        assert!(msg.contains("dbo.a -> dbo.b"));
    }

    #[test]
    fn test_parse_error_message() {
        let err = PlanError::Parse("expected array".to_string());
        assert!(err.to_string().contains("expected array"));
    }
}
