pub mod planner;
pub mod span;

use chrono::Duration;

use crate::error::AppError;

/// Parses a span literal such as `"24h"` or `"90m"` into a `chrono::Duration`,
/// rejecting anything `humantime` can't read as invalid argument rather than
/// a panic.
pub fn parse_span_literal(literal: &str) -> Result<Duration, AppError> {
    let std_duration = humantime::parse_duration(literal)
        .map_err(|e| AppError::InvalidArgument(format!("invalid duration {literal:?}: {e}")))?;
    Duration::from_std(std_duration)
        .map_err(|_| AppError::InvalidArgument(format!("duration {literal:?} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hour_literal() {
        assert_eq!(parse_span_literal("24h").unwrap(), Duration::hours(24));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_span_literal("banana").is_err());
    }
}
