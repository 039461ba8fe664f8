use serde::{Deserialize, Serialize};
use std::fmt;

/// Invocation order for subscriptions. Lower values run earlier.
///
/// The named tiers leave room for custom values in between
/// (e.g. `Priority::new(250)` runs after `EARLY` and before `NORMAL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i32);

impl Priority {
    pub const FIRST: Priority = Priority(0);
    pub const EARLIER: Priority = Priority(100);
    pub const EARLY: Priority = Priority(200);
    pub const NORMAL: Priority = Priority(300);
    pub const LATE: Priority = Priority(400);
    pub const LATER: Priority = Priority(500);
    pub const LAST: Priority = Priority(600);
    /// Observers that must see the final state and should not modify it.
    pub const MONITOR: Priority = Priority(700);

    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    fn tier_name(self) -> Option<&'static str> {
        Some(match self {
            Self::FIRST => "first",
            Self::EARLIER => "earlier",
            Self::EARLY => "early",
            Self::NORMAL => "normal",
            Self::LATE => "late",
            Self::LATER => "later",
            Self::LAST => "last",
            Self::MONITOR => "monitor",
            _ => return None,
        })
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tier_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_strictly_ordered() {
        let tiers = [
            Priority::FIRST,
            Priority::EARLIER,
            Priority::EARLY,
            Priority::NORMAL,
            Priority::LATE,
            Priority::LATER,
            Priority::LAST,
            Priority::MONITOR,
        ];
        assert!(tiers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn display_uses_tier_names() {
        assert_eq!(Priority::MONITOR.to_string(), "monitor");
        assert_eq!(Priority::new(250).to_string(), "250");
    }

    #[test]
    fn default_is_normal() {
        assert_eq!(Priority::default(), Priority::NORMAL);
    }
}
