//! Core data types for threshold sweeps and bracket estimates.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable opaque identifier of a listing (its canonical URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Inclusive `[min, max]` salary filter sent to the listing endpoint.
///
/// Always ordered: construction clamps `min` down to a single-point window
/// instead of rejecting an inverted pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRange {
    min: i64,
    max: i64,
}

impl FilterRange {
    /// Build a filter, collapsing to `[max, max]` when `min > max`.
    pub fn new(min: i64, max: i64) -> Self {
        if min > max {
            Self { min: max, max }
        } else {
            Self { min, max }
        }
    }

    /// Sliding window of width `step` ending at `threshold`.
    ///
    /// When `threshold - step` is not positive the window is the single point
    /// `[threshold, threshold]` rather than `[0, threshold]`.
    pub fn window(threshold: i64, step: i64) -> Self {
        let lower = threshold.saturating_sub(step);
        if lower > 0 {
            Self::new(lower, threshold)
        } else {
            Self::new(threshold, threshold)
        }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

/// Validated arithmetic threshold sequence `[from, from+step, ..., <= to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholdRange")]
pub struct ThresholdRange {
    from: i64,
    to: i64,
    step: i64,
}

#[derive(Deserialize)]
struct RawThresholdRange {
    from: i64,
    to: i64,
    step: i64,
}

impl TryFrom<RawThresholdRange> for ThresholdRange {
    type Error = BracketError;

    fn try_from(raw: RawThresholdRange) -> BracketResult<Self> {
        Self::new(raw.from, raw.to, raw.step)
    }
}

impl ThresholdRange {
    /// Validate a sweep range; fails with [`BracketError::Config`] when the
    /// sequence would be empty or never advance.
    pub fn new(from: i64, to: i64, step: i64) -> BracketResult<Self> {
        if step <= 0 {
            return Err(BracketError::Config(format!(
                "threshold step must be positive, got {step}"
            )));
        }
        if from > to {
            return Err(BracketError::Config(format!(
                "threshold range is empty: from {from} is above to {to}"
            )));
        }
        Ok(Self { from, to, step })
    }

    pub fn start(&self) -> i64 {
        self.from
    }

    pub fn end(&self) -> i64 {
        self.to
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Thresholds in strictly increasing order.
    pub fn thresholds(&self) -> impl Iterator<Item = i64> {
        let (to, step) = (self.to, self.step);
        std::iter::successors(Some(self.from), move |t| t.checked_add(step))
            .take_while(move |t| *t <= to)
    }

    /// Filter window queried for `threshold` under this range's step.
    pub fn window(&self, threshold: i64) -> FilterRange {
        FilterRange::window(threshold, self.step)
    }
}

/// One page of listing results, as decoded by a [`crate::PageSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<ItemKey>,
    pub has_more: bool,
}

impl Page {
    pub fn new(items: Vec<ItemKey>, has_more: bool) -> Self {
        Self { items, has_more }
    }
}

/// Credentials presented with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub session_cookie: String,
}

impl Credentials {
    pub fn new(session_cookie: impl Into<String>) -> Self {
        Self {
            session_cookie: session_cookie.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("session_cookie", &"<redacted>")
            .finish()
    }
}

/// Authenticated request context: credentials plus anti-forgery token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub credentials: Credentials,
    pub csrf_token: String,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("credentials", &self.credentials)
            .field("csrf_token", &"<redacted>")
            .finish()
    }
}

/// Per-item observations held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: ItemKey,
    /// `None` marks a permanently excluded item.
    pub observed: Option<BTreeSet<i64>>,
}

impl Record {
    pub fn is_excluded(&self) -> bool {
        self.observed.is_none()
    }

    /// `(min, max)` of the observed thresholds, if any.
    pub fn range(&self) -> Option<(i64, i64)> {
        let observed = self.observed.as_ref()?;
        let min = *observed.first()?;
        let max = *observed.last()?;
        Some((min, max))
    }

    pub fn average(&self) -> Option<i64> {
        self.range().map(|(min, max)| rounded_midpoint(min, max))
    }
}

/// Midpoint of two thresholds, halves rounded toward positive infinity.
///
/// Computed in `i128`; the result always lies between `min` and `max`, so it
/// fits back into `i64`.
pub fn rounded_midpoint(min: i64, max: i64) -> i64 {
    (i128::from(min) + i128::from(max) + 1).div_euclid(2) as i64
}

/// Finalized estimate for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub key: ItemKey,
    pub range: (i64, i64),
    pub average: i64,
}

/// Errors raised by the inference engine.
#[derive(thiserror::Error, Debug)]
pub enum BracketError {
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Parse error at offset {offset}: {reason}")]
    Parse { offset: u32, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BracketError {
    pub fn parse(offset: u32, reason: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            reason: reason.into(),
        }
    }
}

/// Convenience result type.
pub type BracketResult<T> = Result<T, BracketError>;
