//! Sweep parameters and their defaults.

use serde::{Deserialize, Serialize};

use crate::fetcher::DEFAULT_PAGE_SIZE;
use crate::types::{BracketError, BracketResult, ThresholdRange};

/// Lowest threshold of the default sweep.
pub const DEFAULT_FROM: i64 = 500;
/// Highest threshold of the default sweep.
pub const DEFAULT_TO: i64 = 7000;
/// Distance between consecutive thresholds.
pub const DEFAULT_STEP: i64 = 50;
/// Boundary query at or below every practical salary.
pub const DEFAULT_BOUNDARY_LOW: i64 = 0;
/// Boundary query far above every practical salary.
pub const DEFAULT_BOUNDARY_HIGH: i64 = 20000;

/// The two extreme thresholds whose listings seed the exclusion baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundaries {
    pub low: i64,
    pub high: i64,
}

impl Default for Boundaries {
    fn default() -> Self {
        Self {
            low: DEFAULT_BOUNDARY_LOW,
            high: DEFAULT_BOUNDARY_HIGH,
        }
    }
}

/// Everything needed to run one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub from: i64,
    pub to: i64,
    pub step: i64,
    pub boundaries: Boundaries,
    pub page_size: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            from: DEFAULT_FROM,
            to: DEFAULT_TO,
            step: DEFAULT_STEP,
            boundaries: Boundaries::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SweepConfig {
    /// Validate into a threshold range. Fails before any network call.
    pub fn range(&self) -> BracketResult<ThresholdRange> {
        if self.page_size == 0 {
            return Err(BracketError::Config("page size must be positive".to_string()));
        }
        ThresholdRange::new(self.from, self.to, self.step)
    }
}
