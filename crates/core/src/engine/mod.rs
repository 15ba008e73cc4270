use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::{
    cache::{CacheStore, MediaFetcher},
    config::EngineConfig,
    perf::{PerformanceStats, PerformanceTracker},
    playback::{MediaOutput, PlayOutcome, PlaybackController, PlaybackState},
    preload::{PreloadReport, Preloader},
    tone::{SineToneSynthesizer, ToneSynthesizer},
    Book, Button, MediaResolver, Result, StorybookError,
};

/// Player for one loaded book. Construct it explicitly and hand it to
/// whatever drives the UI; there is no process-wide instance.
pub struct BookPlayer<F> {
    book: Arc<Book>,
    page_ids: Vec<String>,
    resolver: MediaResolver,
    cache: CacheStore<F>,
    controller: PlaybackController<F>,
    preloader: Preloader<F>,
    tracker: Arc<PerformanceTracker>,
    preload_enabled: bool,
    current_page: Mutex<Option<String>>,
}

impl<F: MediaFetcher> BookPlayer<F> {
    pub fn new(book: Book, fetcher: F, output: Arc<dyn MediaOutput>, config: EngineConfig) -> Self {
        let tone = Arc::new(SineToneSynthesizer::new(config.tone.clone(), output.clone()));
        Self::with_tone(book, fetcher, output, tone, config)
    }

    pub fn with_tone(
        book: Book,
        fetcher: F,
        output: Arc<dyn MediaOutput>,
        tone: Arc<dyn ToneSynthesizer>,
        config: EngineConfig,
    ) -> Self {
        let book = Arc::new(book);
        let cache = CacheStore::new(fetcher, &config.cache);
        let tracker = Arc::new(PerformanceTracker::new());
        cache.subscribe(tracker.clone());

        Self {
            page_ids: book.page_ids(),
            resolver: MediaResolver::new(),
            controller: PlaybackController::new(cache.clone(), output, tone),
            preloader: Preloader::new(book.clone(), cache.clone()),
            cache,
            tracker,
            preload_enabled: config.preload.enabled,
            current_page: Mutex::new(None),
            book,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn cache(&self) -> &CacheStore<F> {
        &self.cache
    }

    pub fn page_ids(&self) -> &[String] {
        &self.page_ids
    }

    pub fn has_page(&self, page_id: &str) -> bool {
        self.book.has_page(page_id)
    }

    pub fn current_page(&self) -> Option<String> {
        self.current_page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes `page_id` current and warms its neighbours in the background.
    /// Returns the preload session if one was started. Preloading needs a
    /// tokio runtime on the calling thread; without one the page still
    /// becomes current but nothing is warmed.
    pub fn show_page(&self, page_id: &str) -> Option<JoinHandle<PreloadReport>> {
        let Some(index) = self.book.page_index(page_id) else {
            tracing::error!(page = page_id, "page not found");
            return None;
        };

        *self.current_page.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(page_id.to_string());
        tracing::info!(page = page_id, index, "showing page");

        if !self.preload_enabled {
            return None;
        }
        self.preloader.trigger_adjacent(index, &self.page_ids)
    }

    /// Plays the `index`-th button of the current page.
    pub async fn play_button(&self, index: usize) -> Result<PlayOutcome> {
        let Some(page_id) = self.current_page() else {
            tracing::error!("no page is showing");
            return Err(StorybookError::msg("no page is showing"));
        };
        let button = self
            .book
            .page(&page_id)
            .and_then(|page| page.buttons.get(index))
            .cloned()
            .ok_or_else(|| {
                StorybookError::msg(format!("page `{page_id}` has no button {index}"))
            })?;

        self.play_button_on(&page_id, &button).await
    }

    /// Resolves `button` against `page_id` and plays it. An unresolvable
    /// button is reported and nothing is played.
    pub async fn play_button_on(&self, page_id: &str, button: &Button) -> Result<PlayOutcome> {
        let page = self
            .book
            .page(page_id)
            .ok_or_else(|| StorybookError::msg(format!("page `{page_id}` not found")))?;

        let url = self
            .resolver
            .resolve(button, page, &self.book)
            .inspect_err(|err| tracing::warn!(page = page_id, %err, "cannot resolve button"))?;

        Ok(self.controller.play(&url).await)
    }

    /// Plays an already resolved URL.
    pub async fn play_url(&self, url: &str) -> PlayOutcome {
        self.controller.play(url).await
    }

    /// Stops whatever is playing. Returns whether anything was active.
    pub fn stop(&self) -> bool {
        self.controller.stop()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn notify_ended(&self, id: u64) {
        self.controller.notify_ended(id);
    }

    pub fn preload_in_progress(&self) -> bool {
        self.preloader.is_running()
    }

    /// Retrieval latency so far plus the current cache size.
    pub fn performance_stats(&self) -> PerformanceStats {
        self.tracker.stats(self.cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        resolver::MediaKind,
        testing::{sample_book, OutputEvent, RecordingOutput, ScriptedFetcher},
        Page,
    };

    fn player(
        book: Book,
        fetcher: &ScriptedFetcher,
        output: &Arc<RecordingOutput>,
        config: EngineConfig,
    ) -> BookPlayer<ScriptedFetcher> {
        BookPlayer::new(book, fetcher.clone(), output.clone(), config)
    }

    fn scenario_book() -> Book {
        let mut book = Book {
            audio_base: "media/".to_string(),
            audio_pool: vec!["a.mp3".to_string(), "b.mp3".to_string()],
            pages: Default::default(),
        };
        book.pages.insert(
            "P1".to_string(),
            Page {
                image: "p1.png".to_string(),
                buttons: vec![
                    Button::at_pos(0),
                    Button::with_override("custom.mp3"),
                    Button::with_override("https://cdn.example/y.mp3"),
                    Button::at_pos(5),
                ],
                sequence: vec![0, 1],
            },
        );
        book
    }

    fn started_urls(output: &RecordingOutput) -> Vec<String> {
        output
            .events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::StartedMedia { url, .. } => Some(url),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn plays_scenario_buttons() {
        let output = Arc::new(RecordingOutput::new());
        let player = player(
            scenario_book(),
            &ScriptedFetcher::new(),
            &output,
            EngineConfig::default(),
        );
        player.show_page("P1");

        for index in 0..3 {
            player.play_button(index).await.unwrap();
        }

        assert_eq!(
            started_urls(&output),
            vec!["media/a.mp3", "media/custom.mp3", "https://cdn.example/y.mp3"]
        );
    }

    #[test]
    fn pages_can_be_shown_without_a_runtime() {
        let output = Arc::new(RecordingOutput::new());
        let fetcher = ScriptedFetcher::new();
        let player = player(sample_book(), &fetcher, &output, EngineConfig::default());

        assert!(player.show_page("p1").is_none());
        assert_eq!(player.current_page().as_deref(), Some("p1"));
        assert!(!player.preload_in_progress());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_index_plays_nothing() {
        let output = Arc::new(RecordingOutput::new());
        let player = player(
            scenario_book(),
            &ScriptedFetcher::new(),
            &output,
            EngineConfig::default(),
        );
        player.show_page("P1");

        let err = player.play_button(3).await.unwrap_err();

        assert!(matches!(err, StorybookError::InvalidIndex { .. }));
        assert!(output.events().is_empty());
        assert_eq!(player.playback_state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn buttons_need_a_showing_page() {
        let output = Arc::new(RecordingOutput::new());
        let player = player(
            scenario_book(),
            &ScriptedFetcher::new(),
            &output,
            EngineConfig::default(),
        );

        assert!(player.play_button(0).await.is_err());
        assert!(player.show_page("missing").is_none());
        assert_eq!(player.current_page(), None);
        assert!(output.events().is_empty());
    }

    #[tokio::test]
    async fn showing_a_page_warms_its_neighbours() {
        let output = Arc::new(RecordingOutput::new());
        let fetcher = ScriptedFetcher::new();
        let player = player(sample_book(), &fetcher, &output, EngineConfig::default());

        assert_eq!(player.performance_stats(), PerformanceStats::default());

        let report = player.show_page("p1").unwrap().await.unwrap();
        assert_eq!(report.fetched, 3);

        let stats = player.performance_stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_cached_entries, 3);
        assert!(stats.min_load_time_ms.is_some());

        player.show_page("p2").unwrap().await.unwrap();
        player.play_button(0).await.unwrap();
        // c.mp3 came from the first session; only b.mp3 was new.
        assert_eq!(fetcher.calls(), 4);
        assert_eq!(player.performance_stats().count, 4);
    }

    #[tokio::test]
    async fn preload_never_delays_foreground_play() {
        let output = Arc::new(RecordingOutput::new());
        let fetcher = ScriptedFetcher::gated();
        fetcher.open_for("media/b.mp3");
        let player = player(sample_book(), &fetcher, &output, EngineConfig::default());

        let session = player.show_page("p1").unwrap();
        let outcome = player.play_button(0).await.unwrap();

        assert_eq!(
            outcome,
            PlayOutcome::Started {
                kind: MediaKind::Audio,
                cached: true
            }
        );
        assert!(player.preload_in_progress());

        fetcher.open();
        session.await.unwrap();
        assert!(!player.preload_in_progress());
    }

    #[tokio::test]
    async fn foreground_and_preload_share_a_retrieval() {
        let output = Arc::new(RecordingOutput::new());
        let fetcher = ScriptedFetcher::gated();
        let player = player(sample_book(), &fetcher, &output, EngineConfig::default());

        // Preloads p0's a.mp3 while the foreground plays it.
        let session = player.show_page("p1").unwrap();
        let (outcome, ()) = tokio::join!(
            player.play_url("media/a.mp3"),
            async {
                tokio::task::yield_now().await;
                fetcher.open();
            }
        );
        session.await.unwrap();

        assert!(matches!(outcome, PlayOutcome::Started { cached: true, .. }));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn preload_can_be_disabled() {
        let output = Arc::new(RecordingOutput::new());
        let mut config = EngineConfig::default();
        config.preload.enabled = false;
        let player = player(sample_book(), &ScriptedFetcher::new(), &output, config);

        assert!(player.show_page("p1").is_none());
        assert_eq!(player.current_page().as_deref(), Some("p1"));
    }
}
