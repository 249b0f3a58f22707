//! Core types shared across the store and its services.

use std::fmt;
use std::str::FromStr;

/// Concurrency control strategy used for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Version-checked write, conflicts detected at commit time.
    Optimistic,
    /// Exclusive hold for the whole read-modify-write.
    Pessimistic,
}

impl Strategy {
    /// Both strategies.
    pub const ALL: [Self; 2] = [Self::Optimistic, Self::Pessimistic];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::Pessimistic => "pessimistic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimistic" | "occ" => Ok(Self::Optimistic),
            "pessimistic" | "lock" => Ok(Self::Pessimistic),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}
