//! Metered service identifiers and their fixed pricing.

use crate::{Error, ErrorContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    Geocoding,
    ReverseGeocoding,
    Routes,
    DistanceMatrix,
    Places,
    Elevation,
    Timezone,
    MlInference,
}

impl ApiType {
    pub const ALL: [ApiType; 8] = [
        Self::Geocoding,
        Self::ReverseGeocoding,
        Self::Routes,
        Self::DistanceMatrix,
        Self::Places,
        Self::Elevation,
        Self::Timezone,
        Self::MlInference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geocoding => "geocoding",
            Self::ReverseGeocoding => "reverse_geocoding",
            Self::Routes => "routes",
            Self::DistanceMatrix => "distance_matrix",
            Self::Places => "places",
            Self::Elevation => "elevation",
            Self::Timezone => "timezone",
            Self::MlInference => "ml_inference",
        }
    }

    /// List price of a single call, in micro-USD. Integer so savings add up exactly.
    pub fn cost_per_call_micros(&self) -> u64 {
        match self {
            Self::Geocoding | Self::ReverseGeocoding => 5_000,
            Self::Routes => 5_000,
            Self::DistanceMatrix => 10_000,
            Self::Places => 17_000,
            Self::Elevation | Self::Timezone => 5_000,
            Self::MlInference => 2_000,
        }
    }

    pub fn cost_per_call_usd(&self) -> f64 {
        micros_to_usd(self.cost_per_call_micros())
    }

    /// TTL used when neither a forced nor an adaptive TTL applies.
    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            Self::Geocoding | Self::ReverseGeocoding | Self::Elevation => 86_400,
            Self::Timezone => 43_200,
            Self::Places => 21_600,
            Self::Routes | Self::MlInference => 3_600,
            Self::DistanceMatrix => 1_800,
        };
        Duration::from_secs(secs)
    }
}

pub fn micros_to_usd(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| {
                Error::validation_with_context(
                    format!("unknown api type '{}'", s),
                    ErrorContext::new()
                        .with_field_path("api_type")
                        .with_source("api_type_parser"),
                )
            })
    }
}
