//! Test doubles shared by the unit tests.

use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::Semaphore,
};

use crate::{
    cache::MediaFetcher,
    playback::{ActivePlayable, MediaOutput, MediaSource},
    resolver::MediaKind,
    Book, Button, Page, Result, StorybookError,
};

/// Three pages over a three-file pool:
/// `p0 -> a.mp3`, `p1 -> b.mp3` (plus one invalid button),
/// `p2 -> c.mp3` and an absolute video override.
pub(crate) fn sample_book() -> Book {
    let mut book = Book {
        audio_base: "media".to_string(),
        audio_pool: vec!["a.mp3".into(), "b.mp3".into(), "c.mp3".into()],
        pages: Default::default(),
    };
    book.pages.insert(
        "p0".into(),
        Page {
            image: "p0.png".into(),
            buttons: vec![Button::at_pos(0)],
            sequence: vec![0],
        },
    );
    book.pages.insert(
        "p1".into(),
        Page {
            image: "p1.png".into(),
            buttons: vec![Button::at_pos(0), Button::at_pos(3)],
            sequence: vec![1],
        },
    );
    book.pages.insert(
        "p2".into(),
        Page {
            image: "p2.png".into(),
            buttons: vec![
                Button::at_pos(0),
                Button::with_override("https://cdn.example/intro.mp4"),
            ],
            sequence: vec![2],
        },
    );
    book
}

/// Fetcher returning each URL's own bytes, with optional failures and a
/// gate that holds retrievals until [`ScriptedFetcher::open`].
#[derive(Clone, Default)]
pub(crate) struct ScriptedFetcher {
    state: Arc<FetcherState>,
}

#[derive(Default)]
struct FetcherState {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    ungated: Mutex<HashSet<String>>,
    gate: Option<Semaphore>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated() -> Self {
        Self {
            state: Arc::new(FetcherState {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }),
        }
    }

    pub(crate) fn failing(self, url: &str) -> Self {
        self.state.failing.lock().unwrap().insert(url.to_string());
        self
    }

    /// Lets `url` through a closed gate.
    pub(crate) fn open_for(&self, url: &str) {
        self.state.ungated.lock().unwrap().insert(url.to_string());
    }

    pub(crate) fn open(&self) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(1);
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    pub(crate) fn was_fetched(&self, url: &str) -> bool {
        self.state.calls.lock().unwrap().iter().any(|call| call == url)
    }
}

impl MediaFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.state.calls.lock().unwrap().push(url.to_string());

        let bypass = self.state.ungated.lock().unwrap().contains(url);
        if let (Some(gate), false) = (&self.state.gate, bypass) {
            // Permits go straight back so one `open` releases every waiter.
            let _permit = gate.acquire().await;
        }

        if self.state.failing.lock().unwrap().contains(url) {
            return Err(StorybookError::cache_fetch(url, "scripted failure"));
        }
        Ok(url.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputEvent {
    StartedMedia {
        id: u64,
        kind: MediaKind,
        url: String,
        cached: bool,
    },
    StartedPcm {
        id: u64,
        samples: usize,
        sample_rate: u32,
    },
    Stopped {
        id: u64,
    },
}

#[derive(Default)]
struct OutputLog {
    events: Mutex<Vec<OutputEvent>>,
    active: Mutex<HashSet<u64>>,
    finished: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    max_concurrent: AtomicUsize,
}

impl OutputLog {
    fn start(&self, event: impl FnOnce(u64) -> OutputEvent) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(event(id));
        let mut active = self.active.lock().unwrap();
        active.insert(id);
        self.max_concurrent.fetch_max(active.len(), Ordering::SeqCst);
        id
    }
}

/// Output that records every start and stop in order.
#[derive(Default)]
pub(crate) struct RecordingOutput {
    log: Arc<OutputLog>,
    rejected: HashSet<MediaKind>,
    reject_pcm: bool,
}

impl RecordingOutput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rejecting(mut self, kind: MediaKind) -> Self {
        self.rejected.insert(kind);
        self
    }

    pub(crate) fn rejecting_pcm(mut self) -> Self {
        self.reject_pcm = true;
        self
    }

    pub(crate) fn events(&self) -> Vec<OutputEvent> {
        self.log.events.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.log.max_concurrent.load(Ordering::SeqCst)
    }

    /// Simulates the platform reaching the end of playable `id`.
    pub(crate) fn finish(&self, id: u64) {
        self.log.finished.lock().unwrap().insert(id);
        self.log.active.lock().unwrap().remove(&id);
    }
}

impl MediaOutput for RecordingOutput {
    fn start_media(&self, kind: MediaKind, source: &MediaSource) -> Result<Box<dyn ActivePlayable>> {
        if self.rejected.contains(&kind) {
            return Err(StorybookError::media_playback(source.url(), "rejected"));
        }
        let id = self.log.start(|id| OutputEvent::StartedMedia {
            id,
            kind,
            url: source.url().to_string(),
            cached: source.is_cached(),
        });
        Ok(Box::new(RecordingPlayable {
            id,
            log: self.log.clone(),
            stopped: false,
        }))
    }

    fn start_pcm(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<Box<dyn ActivePlayable>> {
        if self.reject_pcm {
            return Err(StorybookError::msg("audio unsupported"));
        }
        let id = self.log.start(|id| OutputEvent::StartedPcm {
            id,
            samples: samples.len(),
            sample_rate,
        });
        Ok(Box::new(RecordingPlayable {
            id,
            log: self.log.clone(),
            stopped: false,
        }))
    }
}

struct RecordingPlayable {
    id: u64,
    log: Arc<OutputLog>,
    stopped: bool,
}

impl ActivePlayable for RecordingPlayable {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.log.active.lock().unwrap().remove(&self.id);
        self.log
            .events
            .lock()
            .unwrap()
            .push(OutputEvent::Stopped { id: self.id });
    }

    fn is_finished(&self) -> bool {
        self.stopped || self.log.finished.lock().unwrap().contains(&self.id)
    }
}

/// Serves canned HTTP/1.1 responses on a loopback port until the test
/// runtime shuts down. Unknown paths answer `404`.
pub(crate) async fn serve_http(routes: Vec<(&'static str, u16, &'static str)>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let (status, body) = routes
                    .iter()
                    .find(|(route, ..)| *route == path)
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, "not found"));
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// A loopback address nothing listens on.
pub(crate) async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
