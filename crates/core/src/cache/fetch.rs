use std::path::{Component, Path, PathBuf};

use reqwest::Url;

use super::MediaFetcher;
use crate::{resolver::is_absolute, Result, StorybookError};

/// Retrieves media over HTTP(S). Relative URLs are joined onto `base`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Option<Url>,
}

impl HttpFetcher {
    pub fn new(base: Option<Url>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    fn absolute(&self, url: &str) -> Result<Url> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Url::parse(url).map_err(|err| StorybookError::cache_fetch(url, err));
        }
        match &self.base {
            Some(base) => base
                .join(url)
                .map_err(|err| StorybookError::cache_fetch(url, err)),
            None => Err(StorybookError::cache_fetch(
                url,
                "relative url without a base to resolve against",
            )),
        }
    }
}

impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let target = self.absolute(url)?;
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|err| StorybookError::cache_fetch(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorybookError::cache_fetch(url, format!("status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| StorybookError::cache_fetch(url, err))?;
        Ok(bytes.to_vec())
    }
}

/// Reads media from disk relative to `root`. A leading `/` is also
/// resolved against `root`, mirroring a static file server. Paths that
/// climb out of `root` are refused.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, url: &str) -> Result<PathBuf> {
        if is_absolute(url) && !url.starts_with('/') {
            return Err(StorybookError::cache_fetch(
                url,
                "remote url cannot be read from disk",
            ));
        }
        let relative = Path::new(url.trim_start_matches('/'));
        if relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorybookError::cache_fetch(
                url,
                "path escapes the media root",
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl MediaFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.path_for(url)?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| StorybookError::cache_fetch(url, format!("{}: {err}", path.display())))
    }
}

/// Fetcher chosen from where the manifest was loaded.
#[derive(Debug, Clone)]
pub enum SourceFetcher {
    Http(HttpFetcher),
    File(FileFetcher),
}

impl MediaFetcher for SourceFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match self {
            SourceFetcher::Http(fetcher) => fetcher.fetch(url).await,
            SourceFetcher::File(fetcher) => fetcher.fetch(url).await,
        }
    }
}
