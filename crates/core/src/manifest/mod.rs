use std::{
    fmt,
    path::{Path, PathBuf},
};

use reqwest::Url;

use crate::{
    cache::{FileFetcher, HttpFetcher, SourceFetcher},
    Book, Result, StorybookError,
};

/// Where a book manifest lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLocation {
    Remote(Url),
    Local(PathBuf),
}

impl ManifestLocation {
    /// `http(s)://` is remote, any other scheme is unsupported and
    /// everything else is a filesystem path.
    pub fn parse(location: &str) -> Result<Self> {
        let Some((scheme, _)) = location.split_once("://") else {
            return Ok(Self::Local(PathBuf::from(location)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Url::parse(location)
                .map(Self::Remote)
                .map_err(|err| config_load(location, err)),
            _ => Err(StorybookError::UnsupportedProtocol {
                location: location.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }

    /// Fetcher that resolves the book's media relative to the manifest.
    pub fn media_fetcher(&self) -> SourceFetcher {
        match self {
            Self::Remote(url) => SourceFetcher::Http(HttpFetcher::new(Some(url.clone()))),
            Self::Local(path) => {
                let root = path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                SourceFetcher::File(FileFetcher::new(root))
            }
        }
    }
}

impl fmt::Display for ManifestLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Retrieves and parses book manifests. Failures are not retried.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    client: reqwest::Client,
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self, location: &ManifestLocation) -> Result<Book> {
        let text = match location {
            ManifestLocation::Remote(url) => self.fetch_remote(url).await?,
            ManifestLocation::Local(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|err| config_load(location, err))?,
        };

        let book = Book::from_json(&text).map_err(|err| config_load(location, err))?;
        tracing::info!(
            %location,
            pages = book.pages.len(),
            pool = book.audio_pool.len(),
            "book loaded"
        );
        Ok(book)
    }

    async fn fetch_remote(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| config_load(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(config_load(url, format!("status {status}")));
        }
        response.text().await.map_err(|err| config_load(url, err))
    }
}

fn config_load(location: impl ToString, reason: impl ToString) -> StorybookError {
    StorybookError::ConfigLoad {
        location: location.to_string(),
        reason: reason.to_string(),
    }
}
