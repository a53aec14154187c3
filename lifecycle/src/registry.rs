// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Child registry
//!
//! Every actor owns a `ChildRegistry` with the paths of its children, in creation order, and the
//! watch relations it takes part in. The registry is only mutated from the owning actor's own
//! execution (child created, child terminated, watch, unwatch); everyone else reads snapshots.
//!
//! Signals to other actors go through [`ChildSignals`]. They are fire-and-forget: the signal is
//! sent before the call returns, but completion (e.g. the child actually terminating) is observed
//! later through a termination notification.
//!

use crate::{ActorPath, Error};

use async_trait::async_trait;
use tracing::{debug, error};

use std::{collections::BTreeSet, fmt, sync::Arc};

/// Child management collaborator.
#[async_trait]
pub trait ChildSignals: Send + Sync {
    /// Registers `watcher` to be notified when `target` terminates.
    async fn watch(
        &self,
        watcher: &ActorPath,
        target: &ActorPath,
    ) -> Result<(), Error>;

    /// Removes a registration made with `watch`.
    async fn unwatch(
        &self,
        watcher: &ActorPath,
        target: &ActorPath,
    ) -> Result<(), Error>;

    /// Asks `target` to stop. Does not wait for it.
    async fn stop(&self, target: &ActorPath) -> Result<(), Error>;
}

/// Watch relations of one actor: the actors it watches and the actors watching it.
#[derive(Debug, Default, Clone)]
pub struct WatchSet {
    watching: BTreeSet<ActorPath>,
    watchers: BTreeSet<ActorPath>,
}

impl WatchSet {
    pub fn is_watching(&self, target: &ActorPath) -> bool {
        self.watching.contains(target)
    }

    pub fn is_watched_by(&self, watcher: &ActorPath) -> bool {
        self.watchers.contains(watcher)
    }

    /// Actors to notify when the owner terminates.
    pub fn watchers(&self) -> Vec<ActorPath> {
        self.watchers.iter().cloned().collect()
    }
}

pub struct ChildRegistry {
    owner: ActorPath,
    children: Vec<ActorPath>,
    /// Children told to stop that have not terminated yet.
    stopping: BTreeSet<ActorPath>,
    watches: WatchSet,
    signals: Arc<dyn ChildSignals>,
}

impl ChildRegistry {
    pub fn new(owner: ActorPath, signals: Arc<dyn ChildSignals>) -> Self {
        Self {
            owner,
            children: Vec::new(),
            stopping: BTreeSet::new(),
            watches: WatchSet::default(),
            signals,
        }
    }

    /// Snapshot of the children in creation order.
    pub fn children(&self) -> Vec<ActorPath> {
        self.children.clone()
    }

    pub fn contains(&self, child: &ActorPath) -> bool {
        self.children.contains(child)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of children that were told to stop and have not terminated yet.
    pub fn pending_stops(&self) -> usize {
        self.stopping.len()
    }

    pub fn watches(&self) -> &WatchSet {
        &self.watches
    }

    /// Records a newly created child. Returns `false` if it was already registered.
    pub fn add_child(&mut self, child: ActorPath) -> bool {
        if self.children.contains(&child) {
            return false;
        }
        debug!("Actor {} registers child {}.", self.owner, child);
        self.children.push(child);
        true
    }

    /// Forgets a terminated child, along with any watch on it.
    pub fn remove_child(&mut self, child: &ActorPath) -> bool {
        self.watches.watching.remove(child);
        self.stopping.remove(child);
        let before = self.children.len();
        self.children.retain(|c| c != child);
        before != self.children.len()
    }

    pub async fn watch(&mut self, target: &ActorPath) -> Result<(), Error> {
        if self.watches.watching.insert(target.clone()) {
            self.signals.watch(&self.owner, target).await?;
        }
        Ok(())
    }

    pub async fn unwatch(&mut self, target: &ActorPath) -> Result<(), Error> {
        self.watches.watching.remove(target);
        self.signals.unwatch(&self.owner, target).await
    }

    /// Asks `child` to stop. A registered child counts as pending until it terminates.
    pub async fn stop(&mut self, child: &ActorPath) -> Result<(), Error> {
        if self.children.contains(child) {
            self.stopping.insert(child.clone());
        }
        self.signals.stop(child).await
    }

    pub(crate) fn add_watcher(&mut self, watcher: ActorPath) {
        self.watches.watchers.insert(watcher);
    }

    pub(crate) fn remove_watcher(&mut self, watcher: &ActorPath) {
        self.watches.watchers.remove(watcher);
    }

    /// A watched actor terminated. Returns `false` if it was not watched.
    pub(crate) fn watched_terminated(&mut self, target: &ActorPath) -> bool {
        self.watches.watching.remove(target)
    }

    /// Unwatches and then stops every child, one child at a time, in creation order.
    ///
    /// The iteration runs over a snapshot taken up front, so termination notices processed
    /// meanwhile can not change what is visited. Every child is signalled even if some signal
    /// fails; the first error is returned.
    pub async fn stop_children(&mut self) -> Result<(), Error> {
        let snapshot = self.children();
        let mut first_error = None;
        for child in snapshot {
            let result = match self.unwatch(&child).await {
                Ok(()) => self.stop(&child).await,
                Err(error) => Err(error),
            };
            if let Err(err) = result {
                error!(
                    "Actor {} failed to stop child {}: {}",
                    self.owner, child, err
                );
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ChildRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildRegistry")
            .field("owner", &self.owner)
            .field("children", &self.children)
            .field("stopping", &self.stopping)
            .field("watches", &self.watches)
            .finish()
    }
}
