//! Enumeration types shared across the engine.

use core::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// What the caller intends to do with the crates it asks the selector for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Intent {
    /// Remove deposits from the silo.
    Withdraw,
    /// Convert deposits into another whitelisted token. Germinating crates
    /// are never eligible.
    Convert,
    /// Move deposits to another account.
    Transfer,
}

impl Intent {
    /// Whether germinating crates are excluded for this intent.
    pub const fn excludes_germinating(self) -> bool {
        matches!(self, Self::Convert)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Withdraw => "withdraw",
            Self::Convert => "convert",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// Coarse phase of the morning state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum MorningPhase {
    /// No sunrise has been observed yet (index `-1`).
    Uninitialized,
    /// Inside the morning window (index `0..intervals`).
    Morning,
    /// The morning window has elapsed; temperature is pinned at its max.
    Elapsed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_convert_excludes_germinating() {
        assert!(Intent::Convert.excludes_germinating());
        assert!(!Intent::Withdraw.excludes_germinating());
        assert!(!Intent::Transfer.excludes_germinating());
    }

    #[test]
    fn intent_display_is_lowercase() {
        assert_eq!(Intent::Transfer.to_string(), "transfer");
    }
}
