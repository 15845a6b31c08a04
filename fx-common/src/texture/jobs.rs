//! Per-call fetch registry
//!
//! Every image source is turned into one job; repeated URLs (or the same
//! in-memory allocation) share a job. Jobs run concurrently on a `JoinSet`
//! and results are stored by job index, so completion order never influences
//! the packed layout.

use std::sync::Arc;

use hashbrown::HashMap;
use image::RgbaImage;
use tokio::task::JoinSet;

use super::ImageSource;
use super::fetch::{ImageFetcher, rasterize_png};
use crate::error::{FetchError, PackError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JobKey {
    Url(String),
    Identity(usize),
}

#[derive(Debug)]
enum Job {
    Fetch(String),
    Ready(Arc<Vec<u8>>),
    Rasterize(Arc<RgbaImage>),
}

#[derive(Debug, Default)]
pub(crate) struct FetchRegistry {
    keys: HashMap<JobKey, usize>,
    jobs: Vec<Job>,
}

impl FetchRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Job index for a source, creating the job on first sight
    pub(crate) fn schedule(&mut self, source: &ImageSource) -> usize {
        let key = match source {
            ImageSource::Url(url) => JobKey::Url(url.clone()),
            ImageSource::Encoded(bytes) => JobKey::Identity(Arc::as_ptr(bytes) as usize),
            ImageSource::Pixels(image) => JobKey::Identity(Arc::as_ptr(image) as usize),
        };
        if let Some(&index) = self.keys.get(&key) {
            return index;
        }

        let index = self.jobs.len();
        self.jobs.push(match source {
            ImageSource::Url(url) => Job::Fetch(url.clone()),
            ImageSource::Encoded(bytes) => Job::Ready(Arc::clone(bytes)),
            ImageSource::Pixels(image) => Job::Rasterize(Arc::clone(image)),
        });
        self.keys.insert(key, index);
        index
    }

    /// Run every job and return the encoded bytes indexed by job.
    ///
    /// The first failure is returned and the remaining tasks are aborted when
    /// the `JoinSet` is dropped.
    pub(crate) async fn run(
        self,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Result<Vec<Arc<Vec<u8>>>, PackError> {
        let mut results: Vec<Option<Arc<Vec<u8>>>> = vec![None; self.jobs.len()];
        let mut tasks: JoinSet<(usize, Result<Vec<u8>, FetchError>)> = JoinSet::new();

        for (index, job) in self.jobs.into_iter().enumerate() {
            match job {
                Job::Ready(bytes) => results[index] = Some(bytes),
                Job::Fetch(url) => {
                    let fetch = fetcher.fetch(&url);
                    tasks.spawn(async move { (index, fetch.await) });
                }
                Job::Rasterize(image) => {
                    tasks.spawn_blocking(move || (index, rasterize_png(&image)));
                }
            }
        }

        tracing::debug!(tasks = tasks.len(), "waiting for image jobs");

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| PackError::FetchTask(e.to_string()))?;
            results[index] = Some(Arc::new(result?));
        }

        results
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| {
                bytes.ok_or_else(|| PackError::FetchTask(format!("job {index} produced no result")))
            })
            .collect()
    }
}
