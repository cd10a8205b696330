//! salary-bracket: infer hidden listing salaries from filtered search results.
//!
//! A listing endpoint only shows items whose salary falls inside the queried
//! window. Sweeping that window across ascending thresholds and recording
//! where each item shows up brackets its undisclosed salary.
//!
//! Data flows one way: [`Session`] → [`PaginatedFetcher`] →
//! [`SweepController`] → [`BracketStore`] → [`Report`].

pub mod config;
pub mod fetcher;
pub mod session;
pub mod source;
pub mod store;
pub mod sweep;
pub mod types;

pub use config::{Boundaries, SweepConfig};
pub use fetcher::{PaginatedFetcher, DEFAULT_PAGE_SIZE};
pub use session::{extract_csrf_token, Session};
pub use source::{PageSource, TokenSource};
pub use store::{BracketStore, RunState, RunStatus, UpsertCounts, UpsertOutcome};
pub use sweep::{SweepController, SweepSummary};
pub use types::*;
