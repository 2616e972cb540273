//! Aggregate outcome of a batch of loads.

use crate::error::ErrorKind;
use crate::pipeline::LoadResult;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counts describing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Coordinates in the batch.
    pub total: usize,
    /// Coordinates that reached `Loaded`.
    pub loaded: usize,
    /// Loaded coordinates whose final artifact was already cached.
    pub from_cache: usize,
    /// Loaded coordinates whose raw bytes came from a repository.
    pub downloaded: usize,
    /// Loaded coordinates that went through relocation.
    pub relocated: usize,
    /// Failure counts by kind.
    pub failures: BTreeMap<ErrorKind, usize>,
    /// Wall-clock time of the batch.
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Tally `results`.
    #[must_use]
    pub fn from_results(results: &[LoadResult], elapsed: Duration) -> Self {
        let mut summary = Self {
            total: results.len(),
            elapsed,
            ..Self::default()
        };
        for result in results {
            match &result.outcome {
                Ok(artifact) => {
                    summary.loaded += 1;
                    summary.from_cache += usize::from(artifact.from_cache);
                    summary.downloaded += usize::from(artifact.source_url.is_some());
                    summary.relocated += usize::from(artifact.relocated);
                }
                Err(err) => *summary.failures.entry(err.kind()).or_default() += 1,
            }
        }
        summary
    }

    /// Number of failed coordinates.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }

    /// Returns a human-readable batch summary line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let failures = if self.failures.is_empty() {
            String::new()
        } else {
            let kinds: Vec<String> = self
                .failures
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            format!(" [{}]", kinds.join(", "))
        };
        format!(
            concat!(
                "Load summary: {}/{} loaded ({} from cache, {} downloaded, {} relocated), ",
                "{} failed{}, elapsed {}.{:03}s"
            ),
            self.loaded,
            self.total,
            self.from_cache,
            self.downloaded,
            self.relocated,
            self.failed(),
            failures,
            self.elapsed.as_secs(),
            self.elapsed.subsec_millis(),
        )
    }
}
