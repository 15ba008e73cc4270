use serde::{Deserialize, Serialize};

use crate::{Book, Button, Page, Result, StorybookError};

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "ogg"];

/// How a canonical URL should be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Classifies by extension. Anything not known to be video is audio.
    pub fn classify(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Audio
        }
    }
}

/// Returns `true` for values that must not be joined onto `audioBase`.
pub fn is_absolute(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://") || src.starts_with('/')
}

/// Maps hotspot buttons to canonical media URLs. Pure, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaResolver;

impl MediaResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves one button. An `override` wins over `pos`; a relative
    /// override is joined onto the book's base. Bad indices are
    /// [`StorybookError::InvalidIndex`].
    pub fn resolve(&self, button: &Button, page: &Page, book: &Book) -> Result<String> {
        if let Some(src) = button.override_src.as_deref() {
            let url = if is_absolute(src) {
                src.to_string()
            } else {
                format!("{}{src}", book.normalized_base())
            };
            tracing::debug!(url = %url, "resolved override");
            return Ok(url);
        }

        let invalid = |index: Option<i64>| StorybookError::InvalidIndex {
            pos: button.pos,
            index,
            pool_len: book.audio_pool.len(),
        };

        let pos = button.pos.ok_or_else(|| invalid(None))?;
        let index = *page.sequence.get(pos).ok_or_else(|| invalid(None))?;
        let file = usize::try_from(index)
            .ok()
            .and_then(|i| book.audio_pool.get(i))
            .ok_or_else(|| invalid(Some(index)))?;

        let url = format!("{}{file}", book.normalized_base());
        tracing::debug!(url = %url, index, "resolved sequence audio");
        Ok(url)
    }

    /// Resolves every button on `page`, skipping (and logging) invalid ones.
    /// Duplicates are dropped while keeping button order.
    pub fn resolve_page(&self, page: &Page, book: &Book) -> Vec<String> {
        let mut urls: Vec<String> = Vec::with_capacity(page.buttons.len());
        for button in &page.buttons {
            match self.resolve(button, page, book) {
                Ok(url) if !urls.contains(&url) => urls.push(url),
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "skipping unresolvable button"),
            }
        }
        urls
    }
}
