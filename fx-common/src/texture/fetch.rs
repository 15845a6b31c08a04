//! Image fetch collaborators
//!
//! The texture packer never touches the filesystem or network itself; it asks
//! an [`ImageFetcher`] for a future of encoded bytes per URL.

use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "http")]
use std::time::Duration;

use hashbrown::HashMap;
use image::{ImageFormat, RgbaImage};

use crate::error::FetchError;

/// Encoded image bytes resolved some time later
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'static>>;

/// Source of encoded image bytes
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> FetchFuture;
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Reads images from disk, relative to an asset root
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

    /// Resolve `file://` and relative URLs against the root
    pub fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ImageFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        if is_http(url) {
            let url = url.to_string();
            return Box::pin(async move { Err(FetchError::UnsupportedUrl(url)) });
        }

        let path = self.resolve(url);
        let url = url.to_string();
        Box::pin(async move {
            tracing::debug!(path = %path.display(), "reading image");
            tokio::fs::read(&path)
                .await
                .map_err(|source| FetchError::Io { url, source })
        })
    }
}

/// Downloads images over HTTP(S)
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    const TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|source| FetchError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let client = self.client.clone();
        let url = url.to_string();
        Box::pin(async move {
            tracing::debug!(%url, "downloading image");
            let response = client
                .get(&url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            let response = match response {
                Ok(response) => response,
                Err(source) => return Err(FetchError::Http { url, source }),
            };
            match response.bytes().await {
                Ok(bytes) => Ok(bytes.to_vec()),
                Err(source) => Err(FetchError::Http { url, source }),
            }
        })
    }
}

/// Routes `http(s)://` URLs to the network and everything else to disk
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    files: FileFetcher,
    #[cfg(feature = "http")]
    http: Option<HttpFetcher>,
}

impl AssetFetcher {
    /// Disk-only fetcher; HTTP URLs are rejected
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            files: FileFetcher::new(root),
            #[cfg(feature = "http")]
            http: None,
        }
    }

    #[cfg(feature = "http")]
    pub fn with_http(mut self, http: HttpFetcher) -> Self {
        self.http = Some(http);
        self
    }
}

impl ImageFetcher for AssetFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        #[cfg(feature = "http")]
        if let Some(http) = &self.http
            && is_http(url)
        {
            return http.fetch(url);
        }
        self.files.fetch(url)
    }
}

/// In-memory image table, mostly for tests and generated assets
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    images: HashMap<String, Arc<Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(url.into(), Arc::new(bytes));
    }

    pub fn with_image(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    /// Number of fetches issued so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ImageFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = match self.images.get(url) {
            Some(bytes) => Ok(bytes.as_ref().clone()),
            None => Err(FetchError::NotFound(url.to_string())),
        };
        Box::pin(async move { result })
    }
}

/// Encode decoded pixels as PNG
pub fn rasterize_png(image: &RgbaImage) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
