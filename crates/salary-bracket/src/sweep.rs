//! Threshold sweep controller.
//!
//! Drives the [`PaginatedFetcher`] across a boundary pair and then an
//! ascending threshold sequence, feeding every appearance into the
//! [`BracketStore`]. A failure at any threshold aborts the sweep; whatever was
//! committed before it stays in the store, unfinalized, and can be resumed.

use crate::config::Boundaries;
use crate::fetcher::PaginatedFetcher;
use crate::source::{PageSource, TokenSource};
use crate::store::{BracketStore, RunStatus};
use crate::types::{BracketResult, ItemKey, Report, ThresholdRange};

/// Outcome of one sweep invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub run_id: String,
    /// Items seeded as excluded by the boundary queries (0 when resumed).
    pub excluded: usize,
    /// Thresholds fetched during this invocation.
    pub thresholds_swept: usize,
    /// Listing appearances fed into the store during this invocation.
    pub observations: usize,
    /// Whether this invocation continued an interrupted run.
    pub resumed: bool,
}

/// Runs threshold sweeps against a store.
pub struct SweepController<S, T> {
    fetcher: PaginatedFetcher<S, T>,
    boundaries: Boundaries,
}

impl<S: PageSource, T: TokenSource> SweepController<S, T> {
    pub fn new(fetcher: PaginatedFetcher<S, T>) -> Self {
        Self {
            fetcher,
            boundaries: Boundaries::default(),
        }
    }

    pub fn with_boundaries(mut self, boundaries: Boundaries) -> Self {
        self.boundaries = boundaries;
        self
    }

    pub fn fetcher(&self) -> &PaginatedFetcher<S, T> {
        &self.fetcher
    }

    /// Fresh sweep: boundary queries, reset + exclusion seed, then every
    /// threshold of `range` in ascending order.
    pub async fn sweep(
        &self,
        store: &mut BracketStore,
        range: ThresholdRange,
    ) -> BracketResult<SweepSummary> {
        let excluded = self.boundary_keys(range).await?;
        let state = store.start_run(range, &excluded)?;
        let seeded = store.len()?;
        tracing::info!(
            run_id = %state.run_id,
            excluded = seeded,
            from = range.start(),
            to = range.end(),
            step = range.step(),
            "starting sweep"
        );

        let mut summary = SweepSummary {
            run_id: state.run_id,
            excluded: seeded,
            thresholds_swept: 0,
            observations: 0,
            resumed: false,
        };
        self.sweep_thresholds(store, range, range.thresholds(), &mut summary)
            .await?;
        store.mark_complete()?;
        Ok(summary)
    }

    /// Continue an interrupted run over the same `range`, skipping thresholds
    /// already committed. Falls back to a fresh [`Self::sweep`] when the store
    /// holds no run for this range.
    pub async fn resume(
        &self,
        store: &mut BracketStore,
        range: ThresholdRange,
    ) -> BracketResult<SweepSummary> {
        let state = match store.run_state()? {
            Some(state) if state.range == range => state,
            Some(state) => {
                tracing::info!(
                    run_id = %state.run_id,
                    "stored run covers a different range, starting over"
                );
                return self.sweep(store, range).await;
            }
            None => return self.sweep(store, range).await,
        };

        let mut summary = SweepSummary {
            run_id: state.run_id.clone(),
            excluded: 0,
            thresholds_swept: 0,
            observations: 0,
            resumed: true,
        };

        if state.status == RunStatus::Complete {
            tracing::info!(run_id = %state.run_id, "run already complete, nothing to resume");
            return Ok(summary);
        }

        let last = state.last_threshold;
        tracing::info!(
            run_id = %state.run_id,
            started_at = %state.started_at,
            last_threshold = ?last,
            "resuming sweep"
        );
        let remaining = range
            .thresholds()
            .filter(move |t| last.map_or(true, |last| *t > last));
        self.sweep_thresholds(store, range, remaining, &mut summary)
            .await?;
        store.mark_complete()?;
        Ok(summary)
    }

    /// Sweep, finalize and persist the report.
    pub async fn run(
        &self,
        store: &mut BracketStore,
        range: ThresholdRange,
    ) -> BracketResult<Vec<Report>> {
        let summary = self.sweep(store, range).await?;
        finish(store, &summary)
    }

    /// Like [`Self::run`], but continues an interrupted run when possible.
    pub async fn run_resumable(
        &self,
        store: &mut BracketStore,
        range: ThresholdRange,
    ) -> BracketResult<Vec<Report>> {
        let summary = self.resume(store, range).await?;
        finish(store, &summary)
    }

    async fn boundary_keys(&self, range: ThresholdRange) -> BracketResult<Vec<ItemKey>> {
        let mut keys = Vec::new();
        for boundary in [self.boundaries.low, self.boundaries.high] {
            let found = self.fetcher.fetch_all(range.window(boundary)).await?;
            tracing::info!(threshold = boundary, items = found.len(), "boundary swept");
            keys.extend(found);
        }
        Ok(keys)
    }

    async fn sweep_thresholds(
        &self,
        store: &mut BracketStore,
        range: ThresholdRange,
        thresholds: impl Iterator<Item = i64>,
        summary: &mut SweepSummary,
    ) -> BracketResult<()> {
        for threshold in thresholds {
            let keys = match self.fetcher.fetch_all(range.window(threshold)).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(threshold, "sweep aborted: {e}");
                    return Err(e);
                }
            };
            let counts = store.record_threshold(&keys, threshold)?;
            tracing::info!(
                threshold,
                items = keys.len(),
                created = counts.created,
                extended = counts.extended,
                excluded = counts.excluded,
                "threshold swept"
            );
            summary.thresholds_swept += 1;
            summary.observations += keys.len();
        }
        Ok(())
    }
}

fn finish(store: &mut BracketStore, summary: &SweepSummary) -> BracketResult<Vec<Report>> {
    let reports = store.finalize()?;
    store.save_report(&reports)?;
    tracing::info!(
        run_id = %summary.run_id,
        resumed = summary.resumed,
        excluded = summary.excluded,
        thresholds = summary.thresholds_swept,
        observations = summary.observations,
        reported = reports.len(),
        "sweep finalized"
    );
    Ok(reports)
}
