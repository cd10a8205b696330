//! Bracket store: SQLite-backed record of per-item threshold observations.
//!
//! ## Tables
//!
//! - `items`: one row per listing key, in insertion order. `thresholds` holds a
//!   JSON array of observed thresholds, or `NULL` for an excluded item.
//! - `sweep_state`: progress of the current run, used to resume after an
//!   interruption.
//! - `reports`: the last finalized report, ranked.
//!
//! The store assumes a single writer: every mutating operation takes
//! `&mut self`.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{BracketError, BracketResult, ItemKey, Record, Report, ThresholdRange};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    thresholds TEXT
);
CREATE TABLE IF NOT EXISTS sweep_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    run_id TEXT NOT NULL,
    range_from INTEGER NOT NULL,
    range_to INTEGER NOT NULL,
    range_step INTEGER NOT NULL,
    last_threshold INTEGER,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reports (
    position INTEGER PRIMARY KEY,
    key TEXT NOT NULL,
    min_threshold INTEGER NOT NULL,
    max_threshold INTEGER NOT NULL,
    average INTEGER NOT NULL,
    finalized_at TEXT NOT NULL
);
";

const STATUS_IN_PROGRESS: &str = "in_progress";
const STATUS_COMPLETE: &str = "complete";

/// What an [`BracketStore::upsert`] did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First observation; a record was created.
    Created,
    /// A new threshold was added to an existing record.
    Extended,
    /// The threshold was already recorded.
    Unchanged,
    /// The item is excluded; nothing changed.
    Excluded,
}

/// Per-threshold tally of upsert outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub created: usize,
    pub extended: usize,
    pub unchanged: usize,
    pub excluded: usize,
}

impl UpsertCounts {
    fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Extended => self.extended += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::Excluded => self.excluded += 1,
        }
    }
}

/// Status of the persisted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    InProgress,
    Complete,
}

/// Persisted progress of a sweep run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub run_id: String,
    pub range: ThresholdRange,
    /// Highest threshold whose observations have been committed.
    pub last_threshold: Option<i64>,
    pub status: RunStatus,
    pub started_at: String,
}

/// Durable `ItemKey -> Record` store.
pub struct BracketStore {
    db: Connection,
}

impl BracketStore {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: &Path) -> BracketResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        tracing::debug!("opening bracket store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> BracketResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> BracketResult<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }

    /// Remove every record and any run progress. Finalized reports are kept.
    pub fn reset(&mut self) -> BracketResult<()> {
        let tx = self.db.transaction()?;
        reset_in(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert excluded records for `keys`, skipping keys already present.
    /// Returns how many records were inserted.
    pub fn seed_excluded(&mut self, keys: &[ItemKey]) -> BracketResult<usize> {
        let tx = self.db.transaction()?;
        let inserted = seed_excluded_in(&tx, keys)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Record that `key` was listed under `threshold`.
    pub fn upsert(&mut self, key: &ItemKey, threshold: i64) -> BracketResult<UpsertOutcome> {
        let tx = self.db.transaction()?;
        let outcome = upsert_in(&tx, key, threshold)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Reset, seed the exclusion baseline and open a new run, atomically.
    pub fn start_run(
        &mut self,
        range: ThresholdRange,
        excluded: &[ItemKey],
    ) -> BracketResult<RunState> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let tx = self.db.transaction()?;
        reset_in(&tx)?;
        seed_excluded_in(&tx, excluded)?;
        tx.execute(
            "INSERT INTO sweep_state
                (id, run_id, range_from, range_to, range_step, last_threshold, status, started_at, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, NULL, ?5, ?6, ?6)",
            params![
                run_id,
                range.start(),
                range.end(),
                range.step(),
                STATUS_IN_PROGRESS,
                now
            ],
        )?;
        tx.commit()?;

        Ok(RunState {
            run_id,
            range,
            last_threshold: None,
            status: RunStatus::InProgress,
            started_at: now,
        })
    }

    /// Upsert every key observed at `threshold` and advance run progress in a
    /// single transaction.
    pub fn record_threshold(
        &mut self,
        keys: &[ItemKey],
        threshold: i64,
    ) -> BracketResult<UpsertCounts> {
        let tx = self.db.transaction()?;
        let mut counts = UpsertCounts::default();
        for key in keys {
            counts.add(upsert_in(&tx, key, threshold)?);
        }
        tx.execute(
            "UPDATE sweep_state SET last_threshold = ?1, updated_at = ?2 WHERE id = 1",
            params![threshold, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(counts)
    }

    /// Mark the current run as having completed its threshold sequence.
    pub fn mark_complete(&mut self) -> BracketResult<()> {
        self.db.execute(
            "UPDATE sweep_state SET status = ?1, updated_at = ?2 WHERE id = 1",
            params![STATUS_COMPLETE, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Progress of the persisted run, if one was started.
    pub fn run_state(&self) -> BracketResult<Option<RunState>> {
        let row = self
            .db
            .query_row(
                "SELECT run_id, range_from, range_to, range_step, last_threshold, status, started_at
                 FROM sweep_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((run_id, from, to, step, last_threshold, status, started_at)) = row else {
            return Ok(None);
        };

        let status = match status.as_str() {
            STATUS_IN_PROGRESS => RunStatus::InProgress,
            STATUS_COMPLETE => RunStatus::Complete,
            other => {
                return Err(BracketError::Config(format!(
                    "unknown sweep status '{other}' in store"
                )))
            }
        };

        Ok(Some(RunState {
            run_id,
            range: ThresholdRange::new(from, to, step)?,
            last_threshold,
            status,
            started_at,
        }))
    }

    /// Look up one record.
    pub fn record(&self, key: &ItemKey) -> BracketResult<Option<Record>> {
        let thresholds = self
            .db
            .query_row(
                "SELECT thresholds FROM items WHERE key = ?1",
                params![key.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;

        match thresholds {
            None => Ok(None),
            Some(raw) => Ok(Some(Record {
                key: key.clone(),
                observed: decode_thresholds(raw.as_deref())?,
            })),
        }
    }

    /// All records in insertion order.
    pub fn records(&self) -> BracketResult<Vec<Record>> {
        let mut stmt = self
            .db
            .prepare("SELECT key, thresholds FROM items ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, raw) = row?;
            records.push(Record {
                key: ItemKey::new(key),
                observed: decode_thresholds(raw.as_deref())?,
            });
        }
        Ok(records)
    }

    /// Number of records, excluded ones included.
    pub fn len(&self) -> BracketResult<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> BracketResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Derive the report: every record with a range, highest average first.
    ///
    /// The sort is stable, so equal averages keep insertion order.
    pub fn finalize(&self) -> BracketResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .records()?
            .into_iter()
            .filter_map(|record| {
                let range = record.range()?;
                let average = record.average()?;
                Some(Report {
                    key: record.key,
                    range,
                    average,
                })
            })
            .collect();

        reports.sort_by(|a, b| b.average.cmp(&a.average));
        Ok(reports)
    }

    /// Replace the persisted report.
    pub fn save_report(&mut self, reports: &[Report]) -> BracketResult<()> {
        let finalized_at = Utc::now().to_rfc3339();
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM reports", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO reports (position, key, min_threshold, max_threshold, average, finalized_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (rank, report) in reports.iter().enumerate() {
                stmt.execute(params![
                    rank as i64,
                    report.key.as_str(),
                    report.range.0,
                    report.range.1,
                    report.average,
                    finalized_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// The last saved report, in rank order.
    pub fn load_report(&self) -> BracketResult<Vec<Report>> {
        let mut stmt = self.db.prepare(
            "SELECT key, min_threshold, max_threshold, average FROM reports ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Report {
                key: ItemKey::new(row.get::<_, String>(0)?),
                range: (row.get(1)?, row.get(2)?),
                average: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn reset_in(db: &Connection) -> BracketResult<()> {
    db.execute_batch("DELETE FROM items; DELETE FROM sweep_state;")?;
    Ok(())
}

fn seed_excluded_in(db: &Connection, keys: &[ItemKey]) -> BracketResult<usize> {
    let mut stmt = db.prepare("INSERT OR IGNORE INTO items (key, thresholds) VALUES (?1, NULL)")?;
    let mut inserted = 0;
    for key in keys {
        inserted += stmt.execute(params![key.as_str()])?;
    }
    Ok(inserted)
}

fn upsert_in(db: &Connection, key: &ItemKey, threshold: i64) -> BracketResult<UpsertOutcome> {
    let existing = db
        .query_row(
            "SELECT thresholds FROM items WHERE key = ?1",
            params![key.as_str()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;

    match existing {
        None => {
            let observed = BTreeSet::from([threshold]);
            db.execute(
                "INSERT INTO items (key, thresholds) VALUES (?1, ?2)",
                params![key.as_str(), serde_json::to_string(&observed)?],
            )?;
            Ok(UpsertOutcome::Created)
        }
        Some(None) => Ok(UpsertOutcome::Excluded),
        Some(Some(raw)) => {
            let mut observed = decode_thresholds(Some(&raw))?.unwrap_or_default();
            if !observed.insert(threshold) {
                return Ok(UpsertOutcome::Unchanged);
            }
            db.execute(
                "UPDATE items SET thresholds = ?1 WHERE key = ?2",
                params![serde_json::to_string(&observed)?, key.as_str()],
            )?;
            Ok(UpsertOutcome::Extended)
        }
    }
}

fn decode_thresholds(raw: Option<&str>) -> BracketResult<Option<BTreeSet<i64>>> {
    raw.map(|json| serde_json::from_str::<BTreeSet<i64>>(json))
        .transpose()
        .map_err(BracketError::from)
}
