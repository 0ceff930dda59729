//! Paginated history loading and the backfill policy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use charter_core::{Bar, SeriesKey};

use crate::error::Result;
use crate::source::HistorySource;
use crate::validation::validate_bar;

/// Default number of bars requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default distance (in bars) from the oldest bar that triggers a backfill.
pub const DEFAULT_BACKFILL_THRESHOLD: i64 = 20;

/// Result of a `load_page` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Bars older than the cursor, ascending. Never empty.
    Loaded(Vec<Bar>),
    /// No more history for this key.
    Exhausted,
    /// Another load for the same key was outstanding; nothing was fetched.
    AlreadyInFlight,
}

#[derive(Debug, Default)]
struct LoaderState {
    in_flight: HashSet<SeriesKey>,
    exhausted: HashSet<SeriesKey>,
}

/// Fetches pages of bars and tracks per-key load state.
///
/// At most one load per key is outstanding at any time. An empty page marks
/// the key exhausted until [`HistoryLoader::forget`] is called.
pub struct HistoryLoader {
    source: Arc<dyn HistorySource>,
    page_size: u32,
    backfill_threshold: i64,
    state: Mutex<LoaderState>,
}

/// Clears the in-flight mark for a key when the load ends, however it ends.
struct InFlight<'a> {
    loader: &'a HistoryLoader,
    key: SeriesKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.loader.state().in_flight.remove(&self.key);
    }
}

impl HistoryLoader {
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            backfill_threshold: DEFAULT_BACKFILL_THRESHOLD,
            state: Mutex::new(LoaderState::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, chart_api::MAX_PAGE_SIZE);
        self
    }

    pub fn with_backfill_threshold(mut self, threshold: i64) -> Self {
        self.backfill_threshold = threshold;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn backfill_threshold(&self) -> i64 {
        self.backfill_threshold
    }

    fn state(&self) -> MutexGuard<'_, LoaderState> {
        // The state is two sets; a panic mid-update cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load one page of bars older than `before`, or the latest page.
    ///
    /// The returned bars are validated, strictly older than `before` and
    /// ascending. Older-than loads on an exhausted key return
    /// [`PageOutcome::Exhausted`] without fetching.
    pub async fn load_page(&self, key: &SeriesKey, before: Option<i64>) -> Result<PageOutcome> {
        let _in_flight = {
            let mut state = self.state();
            if before.is_some() && state.exhausted.contains(key) {
                return Ok(PageOutcome::Exhausted);
            }
            if !state.in_flight.insert(key.clone()) {
                log::debug!("load_page({}): already in flight", key);
                return Ok(PageOutcome::AlreadyInFlight);
            }
            InFlight {
                loader: self,
                key: key.clone(),
            }
        };

        let fetched = self.source.fetch_page(key, before, self.page_size).await?;
        let received = fetched.len();

        let mut bars: Vec<Bar> = fetched
            .into_iter()
            .filter(|bar| before.map_or(true, |cursor| bar.start_time < cursor))
            .filter(|bar| {
                let valid = validate_bar(bar);
                if !valid {
                    log::warn!("Dropping invalid bar for {} at {}", key, bar.start_time);
                }
                valid
            })
            .collect();
        bars.sort_by_key(|bar| bar.start_time);

        if bars.is_empty() {
            log::info!(
                "No more history for {} (before={:?}, received {})",
                key,
                before,
                received
            );
            self.state().exhausted.insert(key.clone());
            return Ok(PageOutcome::Exhausted);
        }

        log::debug!(
            "load_page({}): before={:?}, {} bars ({} dropped)",
            key,
            before,
            bars.len(),
            received - bars.len()
        );

        Ok(PageOutcome::Loaded(bars))
    }

    /// Whether a load for `key` is outstanding.
    pub fn is_in_flight(&self, key: &SeriesKey) -> bool {
        self.state().in_flight.contains(key)
    }

    /// Whether an empty page has been seen for `key`.
    pub fn is_exhausted(&self, key: &SeriesKey) -> bool {
        self.state().exhausted.contains(key)
    }

    /// Reset the exhausted flag for `key`, e.g. when it is selected again.
    pub fn forget(&self, key: &SeriesKey) {
        self.state().exhausted.remove(key);
    }

    /// Decide whether scrolling to `leading_index` (bars from the oldest
    /// loaded bar) should load an older page.
    pub fn should_backfill(&self, key: &SeriesKey, leading_index: i64) -> bool {
        if leading_index >= self.backfill_threshold {
            return false;
        }
        let state = self.state();
        !state.in_flight.contains(key) && !state.exhausted.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use charter_core::Timeframe;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Serves queued pages and counts fetches. Optionally blocks each fetch
    /// until released.
    #[derive(Default)]
    struct MockSource {
        pages: Mutex<VecDeque<Result<Vec<Bar>>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        cursors: Mutex<Vec<Option<i64>>>,
    }

    impl MockSource {
        fn with_pages(pages: Vec<Result<Vec<Bar>>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl HistorySource for MockSource {
        async fn fetch_page(
            &self,
            _key: &SeriesKey,
            before: Option<i64>,
            _limit: u32,
        ) -> Result<Vec<Bar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(before);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn key() -> SeriesKey {
        SeriesKey::new("SPY", Timeframe::Min1)
    }

    fn bars(times: &[i64]) -> Vec<Bar> {
        times.iter().map(|&t| Bar::from_price(t, 10.0, 1.0)).collect()
    }

    #[tokio::test]
    async fn test_load_latest_page() {
        let source = Arc::new(MockSource::with_pages(vec![Ok(bars(&[180, 60, 120]))]));
        let loader = HistoryLoader::new(source.clone());

        let outcome = loader.load_page(&key(), None).await.unwrap();

        assert_eq!(outcome, PageOutcome::Loaded(bars(&[60, 120, 180])));
        assert_eq!(source.cursors.lock().unwrap().as_slice(), &[None]);
        assert!(!loader.is_in_flight(&key()));
    }

    #[tokio::test]
    async fn test_drops_bars_at_or_after_cursor() {
        let source = Arc::new(MockSource::with_pages(vec![Ok(bars(&[60, 120, 180]))]));
        let loader = HistoryLoader::new(source);

        let outcome = loader.load_page(&key(), Some(120)).await.unwrap();

        assert_eq!(outcome, PageOutcome::Loaded(bars(&[60])));
    }

    #[tokio::test]
    async fn test_drops_invalid_bars() {
        let mut page = bars(&[60, 120]);
        page[0].high = 1.0;
        let loader = HistoryLoader::new(Arc::new(MockSource::with_pages(vec![Ok(page)])));

        let outcome = loader.load_page(&key(), None).await.unwrap();

        assert_eq!(outcome, PageOutcome::Loaded(bars(&[120])));
    }

    #[tokio::test]
    async fn test_empty_page_marks_exhausted() {
        let source = Arc::new(MockSource::with_pages(vec![Ok(Vec::new())]));
        let loader = HistoryLoader::new(source.clone());

        assert_eq!(loader.load_page(&key(), Some(60)).await.unwrap(), PageOutcome::Exhausted);
        assert!(loader.is_exhausted(&key()));
        assert!(!loader.should_backfill(&key(), 0));

        // Further older-than loads do not hit the source.
        assert_eq!(loader.load_page(&key(), Some(60)).await.unwrap(), PageOutcome::Exhausted);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        loader.forget(&key());
        assert!(!loader.is_exhausted(&key()));
        assert!(loader.should_backfill(&key(), 0));
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(MockSource {
            pages: Mutex::new(vec![Ok(bars(&[60]))].into()),
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let loader = Arc::new(HistoryLoader::new(source.clone()));

        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_page(&key(), Some(120)).await }
        });

        // Wait until the first load is parked inside the source.
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(loader.is_in_flight(&key()));
        assert!(!loader.should_backfill(&key(), 0));

        let second = loader.load_page(&key(), Some(120)).await.unwrap();
        assert_eq!(second, PageOutcome::AlreadyInFlight);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, PageOutcome::Loaded(bars(&[60])));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!loader.is_in_flight(&key()));
    }

    #[tokio::test]
    async fn test_other_keys_load_independently() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(MockSource {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let loader = Arc::new(HistoryLoader::new(source.clone()));

        let blocked = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load_page(&key(), None).await }
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let other = SeriesKey::new("SPY", Timeframe::Min5);
        assert!(loader.should_backfill(&other, 0));

        gate.notify_one();
        blocked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_fetch_clears_in_flight() {
        let failure = Err(Error::FetchFailed {
            key: key(),
            source: chart_api::Error::Timeout,
        });
        let loader = HistoryLoader::new(Arc::new(MockSource::with_pages(vec![failure])));

        let err = loader.load_page(&key(), None).await.unwrap_err();

        assert!(matches!(err, Error::FetchFailed { .. }));
        assert!(!loader.is_in_flight(&key()));
        assert!(!loader.is_exhausted(&key()));
    }

    #[test]
    fn test_backfill_threshold() {
        let loader = HistoryLoader::new(Arc::new(MockSource::default()));

        assert!(loader.should_backfill(&key(), 0));
        assert!(loader.should_backfill(&key(), 19));
        assert!(!loader.should_backfill(&key(), 20));
        assert!(!loader.should_backfill(&key(), 500));
        assert!(loader.should_backfill(&key(), -5));
    }

    #[test]
    fn test_page_size_is_clamped() {
        let source: Arc<dyn HistorySource> = Arc::new(MockSource::default());
        assert_eq!(HistoryLoader::new(source.clone()).page_size(), 1000);
        assert_eq!(HistoryLoader::new(source.clone()).with_page_size(0).page_size(), 1);
        assert_eq!(HistoryLoader::new(source).with_page_size(5000).page_size(), 1000);
    }
}
