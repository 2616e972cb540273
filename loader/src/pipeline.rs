//! Batch orchestration: resolve, fetch, relocate and inject.
//!
//! A [`Pipeline`] drives each coordinate through its [`Lifecycle`] on a
//! bounded pool of scoped worker threads. Failures stay with their
//! coordinate; a batch always yields one [`LoadResult`] per input, in input
//! order.

use crate::cache::eviction::{self, EvictionPolicy};
use crate::cache::{CacheError, CacheKey, CacheStore, CachedArtifact, EntryCheck};
use crate::error::{ErrorKind, LoadError};
use crate::fetch::Fetcher;
use crate::fetch::download::{ArtifactDownloader, DEFAULT_REQUEST_TIMEOUT, HttpDownloader};
use crate::fetch::verification::VerificationPolicy;
use crate::inject::{HostInjector, Injection, Injector};
use crate::lifecycle::{Deadline, Lifecycle, LoadState};
use crate::relocate;
use crate::resolver::Resolver;
use crate::summary::BatchSummary;
use camino::Utf8PathBuf;
use loadstone_common::coordinate::{Coordinate, CoordinateDescriptor};
use loadstone_common::digest::Sha256Digest;
use loadstone_common::error::ModelError;
use loadstone_common::repository::Repository;
use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// Worker count used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Settings for a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Cache root directory.
    pub cache_dir: Utf8PathBuf,
    /// Maximum number of coordinates processed at once.
    pub concurrency: usize,
    /// Upper bound on each HTTP request.
    pub request_timeout: Duration,
    /// Budget for one coordinate from start to injection.
    pub coordinate_timeout: Option<Duration>,
    /// Integrity requirements.
    pub verification: VerificationPolicy,
    /// Cache size limit applied after each batch.
    pub eviction: EvictionPolicy,
    /// Repositories used for coordinates that declare none.
    pub fallback_repositories: Vec<Repository>,
}

impl PipelineConfig {
    /// Defaults rooted at `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            coordinate_timeout: None,
            verification: VerificationPolicy::default(),
            eviction: EvictionPolicy::default(),
            fallback_repositories: Vec::new(),
        }
    }

    /// Set the worker count. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the per-coordinate budget.
    #[must_use]
    pub fn with_coordinate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.coordinate_timeout = timeout;
        self
    }

    /// Set the verification policy.
    #[must_use]
    pub fn with_verification(mut self, verification: VerificationPolicy) -> Self {
        self.verification = verification;
        self
    }

    /// Set the eviction policy.
    #[must_use]
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Set the fallback repositories.
    #[must_use]
    pub fn with_fallback_repositories(mut self, repositories: Vec<Repository>) -> Self {
        self.fallback_repositories = repositories;
        self
    }
}

/// A coordinate that reached `Loaded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedArtifact {
    /// The file handed to the host.
    pub path: Utf8PathBuf,
    /// Cache key of that file.
    pub key: CacheKey,
    /// SHA-256 of that file.
    pub sha256: Sha256Digest,
    /// Whether the final artifact was already cached.
    pub from_cache: bool,
    /// Whether relocation rules were applied.
    pub relocated: bool,
    /// Repository URL the raw bytes came from, when downloaded.
    pub source_url: Option<String>,
    /// What the injector did.
    pub injection: Injection,
}

/// The outcome for one coordinate.
#[derive(Debug)]
pub struct LoadResult {
    /// Coordinate label.
    pub label: String,
    /// States visited, oldest first.
    pub trace: Vec<LoadState>,
    /// The artifact, or why there is none.
    pub outcome: Result<LoadedArtifact, LoadError>,
}

impl LoadResult {
    /// Return true when the coordinate loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The loaded artifact, if any.
    #[must_use]
    pub fn artifact(&self) -> Option<&LoadedArtifact> {
        self.outcome.as_ref().ok()
    }

    /// The error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&LoadError> {
        self.outcome.as_ref().err()
    }

    /// The failure kind, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error().map(LoadError::kind)
    }

    /// The last state reached.
    #[must_use]
    pub fn final_state(&self) -> LoadState {
        self.trace.last().copied().unwrap_or(LoadState::Pending)
    }
}

enum Job {
    Ready(Coordinate),
    Invalid { label: String, error: ModelError },
}

/// Loads coordinates into a host.
pub struct Pipeline {
    config: PipelineConfig,
    resolver: Resolver,
    fetcher: Fetcher,
    injector: Injector,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build a pipeline that downloads over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache directory cannot be created.
    pub fn new(config: PipelineConfig, host: Arc<dyn HostInjector>) -> Result<Self, CacheError> {
        let downloader = HttpDownloader::new(config.request_timeout);
        Self::with_downloader(config, Box::new(downloader), host)
    }

    /// Build a pipeline with a custom downloader.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache directory cannot be created.
    pub fn with_downloader(
        config: PipelineConfig,
        downloader: Box<dyn ArtifactDownloader>,
        host: Arc<dyn HostInjector>,
    ) -> Result<Self, CacheError> {
        let cache = Arc::new(CacheStore::open(config.cache_dir.clone())?);
        let fetcher = Fetcher::new(
            downloader,
            cache,
            config.verification,
            config.request_timeout,
        );
        Ok(Self {
            resolver: Resolver::new(config.fallback_repositories.clone()),
            fetcher,
            injector: Injector::new(host),
            config,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The artifact cache.
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        self.fetcher.cache()
    }

    /// The injector, for querying what has been injected.
    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Load one coordinate.
    #[must_use]
    pub fn load(&self, coordinate: &Coordinate) -> LoadResult {
        let started = Instant::now();
        let job = Job::Ready(coordinate.clone());
        let result = self.run_job(&job);
        self.finish_batch(
            std::slice::from_ref(&job),
            std::slice::from_ref(&result),
            started,
        );
        result
    }

    /// Load every coordinate, returning one result per input in input
    /// order. One coordinate failing never stops the others.
    #[must_use]
    pub fn load_all(&self, coordinates: &[Coordinate]) -> Vec<LoadResult> {
        let jobs: Vec<Job> = coordinates.iter().cloned().map(Job::Ready).collect();
        self.run_batch(&jobs)
    }

    /// Build and load coordinates from raw descriptors. Descriptors that do
    /// not form a valid coordinate fail with
    /// [`ErrorKind::MalformedCoordinate`].
    #[must_use]
    pub fn load_descriptors(&self, descriptors: Vec<CoordinateDescriptor>) -> Vec<LoadResult> {
        let jobs: Vec<Job> = descriptors
            .into_iter()
            .map(|descriptor| {
                let label = descriptor.label();
                match Coordinate::try_from(descriptor) {
                    Ok(coordinate) => Job::Ready(coordinate),
                    Err(error) => Job::Invalid { label, error },
                }
            })
            .collect();
        self.run_batch(&jobs)
    }

    fn run_batch(&self, jobs: &[Job]) -> Vec<LoadResult> {
        let started = Instant::now();
        let workers = self.config.concurrency.clamp(1, jobs.len().max(1));
        let next = AtomicUsize::new(0);
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..workers {
                let sender = sender.clone();
                let next = &next;
                scope.spawn(move || {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(index) else {
                            break;
                        };
                        if sender.send((index, self.run_job(job))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        let mut indexed: Vec<(usize, LoadResult)> = receiver.into_iter().collect();
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<LoadResult> = indexed.into_iter().map(|(_, result)| result).collect();
        self.finish_batch(jobs, &results, started);
        results
    }

    fn finish_batch(&self, jobs: &[Job], results: &[LoadResult], started: Instant) {
        let summary = BatchSummary::from_results(results, started.elapsed());
        info!(target: "loadstone::pipeline", "{}", summary.summary_line());

        let mut protected: Vec<Utf8PathBuf> = jobs
            .iter()
            .filter_map(|job| match job {
                Job::Ready(coordinate) => Some(coordinate),
                Job::Invalid { .. } => None,
            })
            .flat_map(|coordinate| [CacheKey::raw(coordinate), CacheKey::for_rules(coordinate)])
            .map(|key| key.relative_dir())
            .collect();
        protected.extend(
            self.injector
                .injected_paths()
                .iter()
                .filter_map(|path| self.cache().entry_of(path)),
        );
        if let Err(err) = eviction::enforce(self.cache(), self.config.eviction, &protected) {
            warn!(target: "loadstone::pipeline", "cache eviction failed: {err}");
        }
    }

    fn run_job(&self, job: &Job) -> LoadResult {
        match job {
            Job::Ready(coordinate) => self.run(coordinate),
            Job::Invalid { label, error } => {
                warn!(target: "loadstone::pipeline", "{label}: {error}");
                let mut lifecycle = Lifecycle::new(label.clone());
                let error = LoadError::Malformed(error.clone());
                record_failure(&mut lifecycle, &error);
                LoadResult {
                    label: label.clone(),
                    trace: lifecycle.into_trace(),
                    outcome: Err(error),
                }
            }
        }
    }

    fn run(&self, coordinate: &Coordinate) -> LoadResult {
        let label = coordinate.to_string();
        let mut lifecycle = Lifecycle::new(label.clone());
        let deadline = Deadline::new(self.config.coordinate_timeout);

        let outcome = self.drive(coordinate, &mut lifecycle, &deadline);
        match &outcome {
            Ok(artifact) => info!(
                target: "loadstone::pipeline",
                "{label}: loaded {} ({}{})",
                artifact.path,
                if artifact.from_cache { "cached" } else { "fresh" },
                if artifact.relocated { ", relocated" } else { "" }
            ),
            Err(err) => {
                warn!(target: "loadstone::pipeline", "{label}: {err}");
                record_failure(&mut lifecycle, err);
            }
        }
        LoadResult {
            label,
            trace: lifecycle.into_trace(),
            outcome,
        }
    }

    fn drive(
        &self,
        coordinate: &Coordinate,
        lifecycle: &mut Lifecycle,
        deadline: &Deadline,
    ) -> Result<LoadedArtifact, LoadError> {
        enter(lifecycle, deadline, LoadState::Resolving)?;
        let candidates = self.resolver.resolve(coordinate)?;

        enter(lifecycle, deadline, LoadState::Fetching)?;
        let fetched = self.fetcher.fetch(coordinate, &candidates, deadline)?;

        let relocated = !coordinate.relocations().is_empty();
        let (artifact, from_cache) = if relocated {
            enter(lifecycle, deadline, LoadState::Relocating)?;
            self.relocated(coordinate, &fetched.artifact)?
        } else {
            (fetched.artifact, fetched.from_cache)
        };

        enter(lifecycle, deadline, LoadState::Injecting)?;
        let injection = self.injector.inject(artifact.path().as_std_path())?;
        lifecycle.advance(LoadState::Loaded)?;

        Ok(LoadedArtifact {
            path: artifact.path().to_owned(),
            key: artifact.key().clone(),
            sha256: artifact.sha256().clone(),
            from_cache,
            relocated,
            source_url: fetched.source_url,
            injection,
        })
    }

    /// The relocated entry derived from `raw`, built and cached on a miss.
    fn relocated(
        &self,
        coordinate: &Coordinate,
        raw: &CachedArtifact,
    ) -> Result<(CachedArtifact, bool), LoadError> {
        let key = CacheKey::for_rules(coordinate);
        let check = EntryCheck::Relocated {
            source: raw.sha256(),
        };
        if let Some(hit) = self.cache().lookup(&key, check)? {
            return Ok((hit, true));
        }
        let bytes = raw.read()?;
        let rewritten = relocate::relocate(&bytes, coordinate.relocations())?;
        let stored = self.cache().store(
            &key,
            &rewritten,
            &coordinate.to_string(),
            Some(raw.sha256()),
        )?;
        Ok((stored, false))
    }
}

fn enter(
    lifecycle: &mut Lifecycle,
    deadline: &Deadline,
    state: LoadState,
) -> Result<(), LoadError> {
    if deadline.is_expired() {
        return Err(LoadError::Timeout {
            state,
            elapsed: deadline.elapsed(),
        });
    }
    lifecycle.advance(state)?;
    Ok(())
}

fn record_failure(lifecycle: &mut Lifecycle, error: &LoadError) {
    if let Err(err) = lifecycle.fail(error.kind()) {
        warn!(target: "loadstone::pipeline", "{}: {err}", lifecycle.label());
    }
}
