use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::future::join_all;
use tokio::{runtime::Handle, task::JoinHandle};

use crate::{
    cache::{CacheStore, MediaFetcher},
    Book, MediaResolver,
};

/// Summary of one preload session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub pages: Vec<String>,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Warms the cache for the pages on either side of the current one.
///
/// At most one session runs at a time. Triggers that arrive while a session
/// is running are dropped; the next page change triggers again.
pub struct Preloader<F> {
    book: Arc<Book>,
    cache: CacheStore<F>,
    resolver: MediaResolver,
    running: Arc<AtomicBool>,
}

impl<F: MediaFetcher> Preloader<F> {
    pub fn new(book: Arc<Book>, cache: CacheStore<F>) -> Self {
        Self {
            book,
            cache,
            resolver: MediaResolver::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts a background session for the neighbours of `current_index`
    /// on the calling thread's tokio runtime.
    ///
    /// Returns `None` when a session is already running, or when called
    /// outside a runtime (nothing is warmed in that case).
    pub fn trigger_adjacent(
        &self,
        current_index: usize,
        page_ids: &[String],
    ) -> Option<JoinHandle<PreloadReport>> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(current_index, %err, "no runtime to preload on");
                return None;
            }
        };
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(current_index, "preload already running, ignoring trigger");
            return None;
        }
        let guard = RunningGuard(self.running.clone());

        let pages = adjacent_pages(current_index, page_ids);
        let mut urls: Vec<String> = Vec::new();
        for id in &pages {
            let Some(page) = self.book.page(id) else {
                tracing::warn!(page = %id, "preload target missing from book");
                continue;
            };
            for url in self.resolver.resolve_page(page, &self.book) {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }

        let cache = self.cache.clone();
        Some(runtime.spawn(async move {
            let _guard = guard;
            let (cached, pending): (Vec<String>, Vec<String>) =
                urls.into_iter().partition(|url| cache.has(url));

            let results = join_all(pending.iter().map(|url| cache.ensure(url))).await;

            let mut report = PreloadReport {
                pages,
                skipped: cached.len(),
                ..Default::default()
            };
            for (url, result) in pending.iter().zip(results) {
                match result {
                    Ok(_) => report.fetched += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(url = %url, %err, "preload failed");
                    }
                }
            }

            tracing::info!(
                pages = ?report.pages,
                fetched = report.fetched,
                skipped = report.skipped,
                failed = report.failed,
                "adjacent pages cached"
            );
            report
        }))
    }
}

/// Ids of the next and previous pages, in that order, within bounds.
pub fn adjacent_pages(current_index: usize, page_ids: &[String]) -> Vec<String> {
    let mut pages = Vec::with_capacity(2);
    if let Some(next) = current_index.checked_add(1).and_then(|i| page_ids.get(i)) {
        pages.push(next.clone());
    }
    if let Some(prev) = current_index.checked_sub(1).and_then(|i| page_ids.get(i)) {
        pages.push(prev.clone());
    }
    pages
}

/// Clears the running flag when the session settles or is dropped.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
