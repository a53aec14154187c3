// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Recording collaborators shared by the unit tests.

use crate::{
    ActorPath, Error, FailureReport, registry::ChildSignals,
    supervision::FailureReporter,
};

use async_trait::async_trait;

use std::sync::{Arc, Mutex};

/// Ordered log of everything that happened, shared between hooks and collaborators.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

pub(crate) struct RecordingSignals {
    journal: Journal,
    failing_stop: Option<ActorPath>,
}

impl RecordingSignals {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            failing_stop: None,
        }
    }

    pub(crate) fn failing_stop(mut self, child: ActorPath) -> Self {
        self.failing_stop = Some(child);
        self
    }
}

#[async_trait]
impl ChildSignals for RecordingSignals {
    async fn watch(
        &self,
        _watcher: &ActorPath,
        target: &ActorPath,
    ) -> Result<(), Error> {
        self.journal.record(format!("watch({})", target));
        Ok(())
    }

    async fn unwatch(
        &self,
        _watcher: &ActorPath,
        target: &ActorPath,
    ) -> Result<(), Error> {
        self.journal.record(format!("unwatch({})", target));
        Ok(())
    }

    async fn stop(&self, target: &ActorPath) -> Result<(), Error> {
        self.journal.record(format!("stop({})", target));
        if self.failing_stop.as_ref() == Some(target) {
            return Err(Error::Send(format!("{} unreachable", target)));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingReporter(Arc<Mutex<Vec<FailureReport>>>);

impl RecordingReporter {
    pub(crate) fn reports(&self) -> Vec<FailureReport> {
        self.0.lock().unwrap().clone()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, report: FailureReport) {
        self.0.lock().unwrap().push(report);
    }
}
