//! Per-coordinate load state machine and deadlines.
//!
//! Each coordinate moves through
//! `Pending → Resolving → Fetching → Relocating? → Injecting → Loaded`, or
//! into `Failed(kind)` from any non-terminal state. The [`Lifecycle`] value
//! is owned by the worker driving that coordinate, so no registry of
//! in-flight loads is shared between threads.

use crate::error::ErrorKind;
use log::debug;
use std::fmt;
use std::time::{Duration, Instant};

/// Where a coordinate is in its load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Accepted but not yet started.
    Pending,
    /// Building candidate URLs.
    Resolving,
    /// Consulting the cache or downloading.
    Fetching,
    /// Rewriting namespaces.
    Relocating,
    /// Handing the artifact to the host.
    Injecting,
    /// Finished successfully.
    Loaded,
    /// Finished with an error of the given kind.
    Failed(ErrorKind),
}

impl LoadState {
    /// Return true for `Loaded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded | Self::Failed(_))
    }

    /// Return true when moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed(_)) => !from.is_terminal(),
            (Self::Pending, Self::Resolving)
            | (Self::Resolving, Self::Fetching)
            | (Self::Fetching | Self::Relocating, Self::Injecting)
            | (Self::Fetching, Self::Relocating)
            | (Self::Injecting, Self::Loaded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Resolving => f.write_str("resolving"),
            Self::Fetching => f.write_str("fetching"),
            Self::Relocating => f.write_str("relocating"),
            Self::Injecting => f.write_str("injecting"),
            Self::Loaded => f.write_str("loaded"),
            Self::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// An illegal state transition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal load transition from {from} to {to}")]
pub struct TransitionError {
    /// State the lifecycle was in.
    pub from: LoadState,
    /// State that was requested.
    pub to: LoadState,
}

/// The state and history of one coordinate's load.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    label: String,
    trace: Vec<LoadState>,
}

impl Lifecycle {
    /// Start a lifecycle in `Pending`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            trace: vec![LoadState::Pending],
        }
    }

    /// Coordinate label this lifecycle tracks.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.trace.last().copied().unwrap_or(LoadState::Pending)
    }

    /// Every state visited, oldest first.
    #[must_use]
    pub fn trace(&self) -> &[LoadState] {
        &self.trace
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `next` is not reachable from the
    /// current state; the lifecycle is left unchanged.
    pub fn advance(&mut self, next: LoadState) -> Result<(), TransitionError> {
        let from = self.state();
        if !from.can_advance_to(next) {
            return Err(TransitionError { from, to: next });
        }
        debug!(target: "loadstone::lifecycle", "{}: {from} -> {next}", self.label);
        self.trace.push(next);
        Ok(())
    }

    /// Move to `Failed(kind)`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the lifecycle already finished.
    pub fn fail(&mut self, kind: ErrorKind) -> Result<(), TransitionError> {
        self.advance(LoadState::Failed(kind))
    }

    /// Consume the lifecycle, returning its trace.
    #[must_use]
    pub fn into_trace(self) -> Vec<LoadState> {
        self.trace
    }
}

/// A per-coordinate time budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Start a deadline now. `None` means unbounded.
    #[must_use]
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// A deadline that never expires.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Time since the deadline started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, or `None` when unbounded. Saturates at zero.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.elapsed()))
    }

    /// Return true once the budget is spent.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Clamp a per-request timeout to the time left.
    ///
    /// Returns `None` once the deadline has expired.
    #[must_use]
    pub fn clamp(&self, request_timeout: Duration) -> Option<Duration> {
        match self.remaining() {
            None => Some(request_timeout),
            Some(left) if left.is_zero() => None,
            Some(left) => Some(request_timeout.min(left)),
        }
    }
}
