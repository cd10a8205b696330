//! End-to-end sweep scenarios against a scripted listing source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use salary_bracket::{
    AuthContext, Boundaries, BracketError, BracketResult, BracketStore, Credentials, FilterRange,
    ItemKey, Page, PageSource, PaginatedFetcher, RunStatus, Session, SweepController,
    ThresholdRange, TokenSource,
};

// ─────────────────────── helpers ───────────────────────

/// Token page served once per test; counts fetches.
#[derive(Clone, Default)]
struct ScriptedToken {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TokenSource for ScriptedToken {
    async fn fetch_token_page(&self, credentials: &Credentials) -> BracketResult<String> {
        assert_eq!(credentials.session_cookie, "_session=abc");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(r#"<html><head><meta name="csrf-token" content="tok"></head></html>"#.to_string())
    }
}

/// Serves pre-built pages per filter window. Unknown windows return one
/// empty page. `fail_window` makes every request for that window fail with a
/// parse error while `failing` is set.
#[derive(Clone, Default)]
struct ScriptedSource {
    pages: Arc<HashMap<(i64, i64), Vec<Page>>>,
    fail_window: Option<(i64, i64)>,
    failing: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<((i64, i64), u32)>>>,
}

impl ScriptedSource {
    fn new(pages: HashMap<(i64, i64), Vec<Page>>) -> Self {
        Self {
            pages: Arc::new(pages),
            ..Self::default()
        }
    }

    fn failing_at(mut self, window: (i64, i64)) -> Self {
        self.fail_window = Some(window);
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    fn requested_windows(&self) -> Vec<(i64, i64)> {
        let mut windows: Vec<(i64, i64)> = Vec::new();
        for (window, _) in self.requests.lock().unwrap().iter() {
            if windows.last() != Some(window) {
                windows.push(*window);
            }
        }
        windows
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(
        &self,
        auth: &AuthContext,
        filter: FilterRange,
        offset: u32,
    ) -> BracketResult<Page> {
        assert_eq!(auth.csrf_token, "tok");
        let window = (filter.min(), filter.max());
        self.requests.lock().unwrap().push((window, offset));

        if self.fail_window == Some(window) && self.failing.load(Ordering::SeqCst) {
            return Err(BracketError::parse(offset, "jobs container missing"));
        }

        let index = (offset / 25) as usize;
        Ok(self
            .pages
            .get(&window)
            .and_then(|pages| pages.get(index).cloned())
            .unwrap_or_default())
    }
}

fn page(keys: &[&str], has_more: bool) -> Page {
    Page::new(keys.iter().map(|k| ItemKey::from(*k)).collect(), has_more)
}

const LOW: (i64, i64) = (0, 0);
const HIGH: (i64, i64) = (19950, 20000);
const W500: (i64, i64) = (450, 500);
const W550: (i64, i64) = (500, 550);
const W600: (i64, i64) = (550, 600);

/// A at 550 and 600, B at 500, C in both boundaries and at 600.
fn scenario_pages() -> HashMap<(i64, i64), Vec<Page>> {
    HashMap::from([
        (LOW, vec![page(&["C"], false)]),
        (HIGH, vec![page(&["C"], false)]),
        (W500, vec![page(&["B"], false)]),
        (W550, vec![page(&["A"], false)]),
        (W600, vec![page(&["C"], true), page(&["A", "A"], false)]),
    ])
}

fn controller(
    source: ScriptedSource,
    token: ScriptedToken,
) -> SweepController<ScriptedSource, ScriptedToken> {
    let session = Session::new(token, Credentials::new("_session=abc"));
    SweepController::new(PaginatedFetcher::new(source, session))
}

fn range() -> ThresholdRange {
    ThresholdRange::new(500, 600, 50).unwrap()
}

// ─────────────────────── scenarios ───────────────────────

#[tokio::test]
async fn test_brackets_and_order() {
    let token = ScriptedToken::default();
    let sweep = controller(ScriptedSource::new(scenario_pages()), token.clone());
    let mut store = BracketStore::open_in_memory().unwrap();

    let report = sweep.run(&mut store, range()).await.unwrap();

    let keys: Vec<&str> = report.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["A", "B"]);
    assert_eq!(report[0].range, (550, 600));
    assert_eq!(report[0].average, 575);
    assert_eq!(report[1].range, (500, 500));
    assert_eq!(report[1].average, 500);

    assert_eq!(store.load_report().unwrap(), report);
    assert_eq!(token.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_boundary_items_are_excluded() {
    let sweep = controller(ScriptedSource::new(scenario_pages()), ScriptedToken::default());
    let mut store = BracketStore::open_in_memory().unwrap();

    let report = sweep.run(&mut store, range()).await.unwrap();

    assert!(report.iter().all(|r| r.key.as_str() != "C"));
    let c = store.record(&ItemKey::from("C")).unwrap().unwrap();
    assert!(c.is_excluded());
    assert_eq!(c.range(), None);
}

#[tokio::test]
async fn test_query_order() {
    let source = ScriptedSource::new(scenario_pages());
    let sweep = controller(source.clone(), ScriptedToken::default());
    let mut store = BracketStore::open_in_memory().unwrap();

    let summary = sweep.sweep(&mut store, range()).await.unwrap();

    assert_eq!(source.requested_windows(), vec![LOW, HIGH, W500, W550, W600]);
    assert!(!summary.resumed);
    assert_eq!(summary.excluded, 1);
    assert_eq!(summary.thresholds_swept, 3);
    assert_eq!(summary.observations, 5);
    let offsets_600: Vec<u32> = source
        .requests
        .lock()
        .unwrap()
        .iter()
        .filter(|(window, _)| *window == W600)
        .map(|(_, offset)| *offset)
        .collect();
    assert_eq!(offsets_600, vec![0, 25]);
}

#[tokio::test]
async fn test_parse_error_leaves_store_unfinalized() {
    let source = ScriptedSource::new(scenario_pages()).failing_at(W600);
    let sweep = controller(source, ScriptedToken::default());
    let mut store = BracketStore::open_in_memory().unwrap();

    let err = sweep.run(&mut store, range()).await.unwrap_err();
    assert!(matches!(err, BracketError::Parse { .. }));

    assert!(store.load_report().unwrap().is_empty());
    let a = store.record(&ItemKey::from("A")).unwrap().unwrap();
    assert_eq!(a.range(), Some((550, 550)));
    let b = store.record(&ItemKey::from("B")).unwrap().unwrap();
    assert_eq!(b.range(), Some((500, 500)));

    let state = store.run_state().unwrap().unwrap();
    assert_eq!(state.status, RunStatus::InProgress);
    assert_eq!(state.last_threshold, Some(550));
}

#[tokio::test]
async fn test_failed_sweep_keeps_previous_report() {
    let mut store = BracketStore::open_in_memory().unwrap();
    let healthy = controller(ScriptedSource::new(scenario_pages()), ScriptedToken::default());
    let first = healthy.run(&mut store, range()).await.unwrap();

    let broken = controller(
        ScriptedSource::new(scenario_pages()).failing_at(W550),
        ScriptedToken::default(),
    );
    assert!(broken.run(&mut store, range()).await.is_err());

    assert_eq!(store.load_report().unwrap(), first);
}

#[tokio::test]
async fn test_resume_after_failure_matches_uninterrupted_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("brackets.db");

    let source = ScriptedSource::new(scenario_pages()).failing_at(W600);
    {
        let sweep = controller(source.clone(), ScriptedToken::default());
        let mut store = BracketStore::open(&path).unwrap();
        assert!(sweep.run(&mut store, range()).await.is_err());
    }

    source.failing.store(false, Ordering::SeqCst);
    source.requests.lock().unwrap().clear();

    let sweep = controller(source.clone(), ScriptedToken::default());
    let mut store = BracketStore::open(&path).unwrap();
    let summary = sweep.resume(&mut store, range()).await.unwrap();
    assert!(summary.resumed);
    assert_eq!(summary.excluded, 0);
    assert_eq!(summary.thresholds_swept, 1);
    assert_eq!(summary.observations, 3);

    let resumed = store.finalize().unwrap();
    assert_eq!(source.requested_windows(), vec![W600]);
    assert_eq!(store.run_state().unwrap().unwrap().status, RunStatus::Complete);

    let mut fresh_store = BracketStore::open_in_memory().unwrap();
    let fresh = controller(ScriptedSource::new(scenario_pages()), ScriptedToken::default())
        .run(&mut fresh_store, range())
        .await
        .unwrap();
    assert_eq!(resumed, fresh);
}

#[tokio::test]
async fn test_resume_with_different_range_starts_over() {
    let source = ScriptedSource::new(scenario_pages());
    let sweep = controller(source.clone(), ScriptedToken::default());
    let mut store = BracketStore::open_in_memory().unwrap();
    sweep.sweep(&mut store, range()).await.unwrap();
    source.requests.lock().unwrap().clear();

    let narrower = ThresholdRange::new(500, 550, 50).unwrap();
    let summary = sweep.resume(&mut store, narrower).await.unwrap();

    assert!(!summary.resumed);
    assert_eq!(source.requested_windows(), vec![LOW, HIGH, W500, W550]);
    assert_eq!(store.run_state().unwrap().unwrap().range, narrower);
}

#[tokio::test]
async fn test_resume_of_complete_run_fetches_nothing() {
    let source = ScriptedSource::new(scenario_pages());
    let sweep = controller(source.clone(), ScriptedToken::default());
    let mut store = BracketStore::open_in_memory().unwrap();
    let first = sweep.run(&mut store, range()).await.unwrap();
    source.requests.lock().unwrap().clear();

    let again = sweep.run_resumable(&mut store, range()).await.unwrap();

    assert!(source.requests.lock().unwrap().is_empty());
    assert_eq!(again, first);
}

#[tokio::test]
async fn test_new_run_discards_previous_observations() {
    let mut store = BracketStore::open_in_memory().unwrap();
    store.upsert(&ItemKey::from("stale"), 900).unwrap();

    let sweep = controller(ScriptedSource::new(scenario_pages()), ScriptedToken::default());
    let report = sweep.run(&mut store, range()).await.unwrap();

    assert!(report.iter().all(|r| r.key.as_str() != "stale"));
    assert!(store.record(&ItemKey::from("stale")).unwrap().is_none());
}

#[tokio::test]
async fn test_auth_failure_aborts_before_any_page() {
    struct NoToken;

    #[async_trait]
    impl TokenSource for NoToken {
        async fn fetch_token_page(&self, _credentials: &Credentials) -> BracketResult<String> {
            Ok("<html><head></head></html>".to_string())
        }
    }

    let source = ScriptedSource::new(scenario_pages());
    let session = Session::new(NoToken, Credentials::new("_session=abc"));
    let sweep = SweepController::new(PaginatedFetcher::new(source.clone(), session));
    let mut store = BracketStore::open_in_memory().unwrap();

    let err = sweep.run(&mut store, range()).await.unwrap_err();
    assert!(matches!(err, BracketError::Auth(_)));
    assert!(source.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_boundaries_drive_exclusion() {
    const CUSTOM_LOW: (i64, i64) = (50, 100);
    const CUSTOM_HIGH: (i64, i64) = (950, 1000);

    let mut pages = scenario_pages();
    pages.insert(CUSTOM_HIGH, vec![page(&["B"], false)]);
    let source = ScriptedSource::new(pages);
    let sweep = controller(source.clone(), ScriptedToken::default())
        .with_boundaries(Boundaries { low: 100, high: 1000 });
    let mut store = BracketStore::open_in_memory().unwrap();

    let report = sweep.run(&mut store, range()).await.unwrap();

    assert_eq!(
        source.requested_windows(),
        vec![CUSTOM_LOW, CUSTOM_HIGH, W500, W550, W600]
    );
    // C is only seen at the default boundaries, so it is estimated now.
    let keys: Vec<&str> = report.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["C", "A"]);
    assert_eq!(report[0].range, (600, 600));
    assert!(store.record(&ItemKey::from("B")).unwrap().unwrap().is_excluded());
}

#[tokio::test]
async fn test_failed_boundary_fetch_keeps_previous_progress() {
    let mut store = BracketStore::open_in_memory().unwrap();
    let interrupted = controller(
        ScriptedSource::new(scenario_pages()).failing_at(W600),
        ScriptedToken::default(),
    );
    assert!(interrupted.run(&mut store, range()).await.is_err());
    let before = store.run_state().unwrap().unwrap();
    let records_before = store.records().unwrap();

    let source = ScriptedSource::new(scenario_pages()).failing_at(HIGH);
    let broken = controller(source.clone(), ScriptedToken::default());
    let err = broken.run(&mut store, range()).await.unwrap_err();
    assert!(matches!(err, BracketError::Parse { .. }));
    assert_eq!(source.requested_windows(), vec![LOW, HIGH]);

    assert_eq!(store.run_state().unwrap().unwrap(), before);
    assert_eq!(store.records().unwrap(), records_before);
    assert_eq!(before.last_threshold, Some(550));
}
