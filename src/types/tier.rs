//! Role-based rate-limit tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    #[default]
    Standard,
    Premium,
    Internal,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Internal => "internal",
        }
    }

    /// Built-in multiplier applied to an api type's base limit.
    pub fn default_multiplier(&self) -> f64 {
        match self {
            Self::Free => 0.5,
            Self::Standard => 1.0,
            Self::Premium => 2.0,
            Self::Internal => 5.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
