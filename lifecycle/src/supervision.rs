// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Supervision strategies
//!
//! The lifecycle controller does not decide what happens after a failure. It reports failures
//! through a [`FailureReporter`] and is then driven by whoever owns the decision. The engine in
//! this crate takes that decision from the actor's [`SupervisionStrategy`].
//!

use crate::FailureReport;

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use backoff::backoff::Backoff as InnerBackoff;

/// Receives every failure the lifecycle controller observes.
pub trait FailureReporter: Send + Sync {
    fn report(&self, report: FailureReport);
}

/// Decision taken after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep the current instance and go on with the next message.
    Resume,
    /// Replace the failing instance with a fresh one.
    Restart,
    /// Stop the actor.
    Stop,
    /// Report the failure upward and stop the actor.
    Escalate,
}

/// Trait to define a RetryStrategy. You can use this trait to define your
/// custom retry strategy.
pub trait RetryStrategy: Debug + Send + Sync {
    /// Maximum number of consecutive restarts before permanently stopping an actor
    fn max_retries(&self) -> usize;
    /// Wait duration before restarting
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// A SupervisionStrategy defines what to do when an actor fails, either at
/// startup or while handling a message.
#[derive(Debug)]
pub enum SupervisionStrategy {
    /// Stop the actor.
    Stop,
    /// Ignore message failures. A failed start can not be resumed and stops the actor.
    Resume,
    /// Report to the parent and stop the actor.
    Escalate,
    /// Restart the actor while the retry strategy allows it, then stop it.
    Restart(Box<dyn RetryStrategy>),
}

impl SupervisionStrategy {
    /// Decides what to do with an actor that already went through `restarts` consecutive
    /// restarts. Returns the directive and, for a restart, how long to wait before it.
    pub fn decide(&mut self, restarts: usize) -> (Directive, Option<Duration>) {
        match self {
            SupervisionStrategy::Stop => (Directive::Stop, None),
            SupervisionStrategy::Resume => (Directive::Resume, None),
            SupervisionStrategy::Escalate => (Directive::Escalate, None),
            SupervisionStrategy::Restart(strategy) => {
                if restarts < strategy.max_retries() {
                    (Directive::Restart, strategy.next_backoff())
                } else {
                    (Directive::Stop, None)
                }
            }
        }
    }
}

/// A Retry strategy that immediately restarts an actor
#[derive(Debug, Default)]
pub struct NoIntervalStrategy {
    max_retries: usize,
}

impl NoIntervalStrategy {
    pub fn new(max_retries: usize) -> Self {
        NoIntervalStrategy { max_retries }
    }
}

impl RetryStrategy for NoIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}

/// A retry strategy that waits a fixed period before every restart.
#[derive(Debug, Default)]
pub struct FixedIntervalStrategy {
    /// Maximum number of consecutive restarts.
    max_retries: usize,
    /// Wait duration before restarting.
    duration: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(max_retries: usize, duration: Duration) -> Self {
        FixedIntervalStrategy {
            max_retries,
            duration,
        }
    }
}

impl RetryStrategy for FixedIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// A retry strategy that waits an exponentially growing period before every
/// restart.
#[derive(Debug, Default)]
pub struct ExponentialBackoffStrategy {
    /// Maximum number of consecutive restarts.
    max_retries: usize,
    /// Inner exponential backoff strategy.
    inner: Arc<Mutex<backoff::ExponentialBackoff>>,
}

impl ExponentialBackoffStrategy {
    pub fn new(max_retries: usize) -> Self {
        ExponentialBackoffStrategy {
            max_retries,
            inner: Arc::new(Mutex::new(backoff::ExponentialBackoff::default())),
        }
    }
}

impl RetryStrategy for ExponentialBackoffStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|mut eb| eb.next_backoff())
    }
}
