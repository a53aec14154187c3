// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type. The `ActorSystem` type is the responsible for
//! creating actors, routing child signals between them and stopping them all when its
//! cancellation token is cancelled.
//!

use crate::{
    Actor, ActorPath, ActorRef, Error, FailureReport,
    actor::Factory,
    hooks::{AroundHooks, Passthrough},
    registry::ChildSignals,
    runner::{ActorRunner, ControlHandle, ControlSignal},
};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use tracing::{debug, error};

use std::{any::Any, collections::HashMap, sync::Arc};

/// Actor system.
///
pub struct ActorSystem {}

/// Default implementation for `ActorSystem`.
impl ActorSystem {
    /// Create a new actor system.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    pub fn create(token: CancellationToken) -> (SystemRef, SystemRunner) {
        let (event_sender, event_receiver) = mpsc::channel(100);
        let system = SystemRef::new(event_sender, token);
        let runner = SystemRunner::new(event_receiver);
        (system, runner)
    }
}

/// System event.
///
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Stop the actor system.
    StopSystem,
    /// A root actor reported a failure. Nobody above it can take a decision.
    Failure(FailureReport),
}

/// A registered actor: its typed reference, erased, and its control side.
struct ActorEntry {
    actor_ref: Box<dyn Any + Send + Sync + 'static>,
    control: ControlHandle,
}

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    /// The actors running in this actor system.
    actors: Arc<RwLock<HashMap<ActorPath, ActorEntry>>>,

    /// The root actors, stopped in reverse creation order on shutdown.
    roots: Arc<RwLock<Vec<ControlHandle>>>,

    /// Channel to the system runner.
    event_sender: mpsc::Sender<SystemEvent>,

    token: CancellationToken,
}

impl SystemRef {
    /// Create system reference.
    pub fn new(
        event_sender: mpsc::Sender<SystemEvent>,
        token: CancellationToken,
    ) -> Self {
        let roots = Arc::new(RwLock::new(Vec::<ControlHandle>::new()));
        let roots_clone = roots.clone();
        let token_clone = token.clone();
        let stop_sender = event_sender.clone();

        tokio::spawn(async move {
            token_clone.cancelled().await;
            debug!("Stopping actor system...");
            // Roots created while stopping land in the next batch.
            loop {
                let batch = std::mem::take(&mut *roots_clone.write().await);
                if batch.is_empty() {
                    break;
                }
                for root in batch.into_iter().rev() {
                    let (confirm, confirmed) = oneshot::channel();
                    root.stop(Some(confirm));
                    let _ = confirmed.await;
                }
            }

            let _ = stop_sender.send(SystemEvent::StopSystem).await;
        });

        SystemRef {
            actors: Arc::new(RwLock::new(HashMap::new())),
            roots,
            event_sender,
            token,
        }
    }

    pub(crate) fn event_sender(&self) -> mpsc::Sender<SystemEvent> {
        self.event_sender.clone()
    }

    /// Retrieves an actor running in this actor system. If actor does not exist, a None
    /// is returned instead.
    pub async fn get_actor<A>(&self, path: &ActorPath) -> Option<ActorRef<A>>
    where
        A: Actor,
    {
        let actors = self.actors.read().await;
        actors
            .get(path)
            .and_then(|entry| entry.actor_ref.downcast_ref::<ActorRef<A>>().cloned())
    }

    async fn control(&self, path: &ActorPath) -> Option<ControlHandle> {
        let actors = self.actors.read().await;
        actors.get(path).map(|entry| entry.control.clone())
    }

    /// Creates an actor in this actor system with the given path and actor type.
    /// If the actor already exists, an error is returned.
    ///
    /// Returns once the actor is running, or with `Error::Start` if it terminated first.
    pub(crate) async fn create_actor_path<A, H>(
        &self,
        path: ActorPath,
        factory: Factory<A>,
        hooks: H,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor,
        H: AroundHooks<A>,
    {
        let (mut runner, actor_ref) = {
            let mut actors = self.actors.write().await;
            if actors.contains_key(&path) {
                error!("Actor '{}' already exists!", &path);
                return Err(Error::Exists(path));
            }
            let parent = actors
                .get(&path.parent())
                .map(|entry| entry.control.clone());
            let (runner, actor_ref, control) = ActorRunner::create(
                path.clone(),
                factory,
                hooks,
                self.clone(),
                parent,
            );
            actors.insert(
                path.clone(),
                ActorEntry {
                    actor_ref: Box::new(actor_ref.clone()),
                    control,
                },
            );
            (runner, actor_ref)
        };

        let (sender, receiver) = oneshot::channel::<bool>();
        tokio::spawn(async move {
            runner.init(Some(sender)).await;
        });

        if receiver.await.map_err(|e| Error::Start(e.to_string()))? {
            Ok(actor_ref)
        } else {
            Err(Error::Start(format!("Runner can not init {}", path)))
        }
    }

    /// Launches a new top level actor on this actor system at the '/user'
    /// actor path. If another actor with the same name already exists,
    /// an `Err(Error::Exists(ActorPath))` is returned instead.
    ///
    /// `factory` builds the first instance and every replacement after a restart.
    pub async fn create_root_actor<A, F>(
        &self,
        name: &str,
        factory: F,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.create_root_actor_with_hooks(name, factory, Passthrough)
            .await
    }

    /// Like `create_root_actor`, with a custom framework hook layer.
    pub async fn create_root_actor_with_hooks<A, F, H>(
        &self,
        name: &str,
        factory: F,
        hooks: H,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
        H: AroundHooks<A>,
    {
        let path = ActorPath::from("/user") / name;
        let factory: Factory<A> = Arc::new(factory);
        let actor_ref = self.create_actor_path(path.clone(), factory, hooks).await?;
        if let Some(control) = self.control(&path).await {
            let mut roots = self.roots.write().await;
            roots.push(control);
        }
        Ok(actor_ref)
    }

    /// Remove an actor from this actor system.
    /// If the actor does not exist, nothing happens.
    pub(crate) async fn remove_actor(&self, path: &ActorPath) {
        let mut actors = self.actors.write().await;
        actors.remove(path);
    }

    /// Tells the watchers and the parent of a terminated actor.
    pub(crate) async fn notify_terminated(
        &self,
        path: &ActorPath,
        watchers: Vec<ActorPath>,
    ) {
        let actors = self.actors.read().await;
        for watcher in watchers {
            if let Some(entry) = actors.get(&watcher) {
                if let Err(err) = entry
                    .control
                    .send(ControlSignal::Terminated(path.clone()))
                {
                    debug!("Watcher {} of {} is gone: {}", watcher, path, err);
                }
            }
        }
        if let Some(parent) = actors.get(&path.parent()) {
            if let Err(err) = parent
                .control
                .send(ControlSignal::ChildTerminated(path.clone()))
            {
                debug!("Parent of {} is gone: {}", path, err);
            }
        }
    }

    pub fn stop_system(&self) {
        self.token.cancel();
    }

    /// Get the actor's children.
    pub async fn children(&self, path: &ActorPath) -> Vec<ActorPath> {
        let actors = self.actors.read().await;
        let mut children = vec![];
        for actor in actors.keys() {
            if actor.is_child_of(path) {
                children.push(actor.clone());
            }
        }
        children
    }
}

#[async_trait]
impl ChildSignals for SystemRef {
    /// A target that is already gone is reported as terminated right away.
    async fn watch(
        &self,
        watcher: &ActorPath,
        target: &ActorPath,
    ) -> Result<(), Error> {
        let registered = match self.control(target).await {
            Some(control) => {
                control.send(ControlSignal::Watch(watcher.clone())).is_ok()
            }
            None => false,
        };
        if !registered {
            debug!("Actor {} watches terminated {}.", watcher, target);
            if let Some(control) = self.control(watcher).await {
                control.send(ControlSignal::Terminated(target.clone()))?;
            }
        }
        Ok(())
    }

    async fn unwatch(
        &self,
        watcher: &ActorPath,
        target: &ActorPath,
    ) -> Result<(), Error> {
        match self.control(target).await {
            Some(control) => {
                if control
                    .send(ControlSignal::Unwatch(watcher.clone()))
                    .is_err()
                {
                    debug!("Unwatch of terminated {} ignored.", target);
                }
            }
            None => debug!("Unwatch of unknown {} ignored.", target),
        }
        Ok(())
    }

    async fn stop(&self, target: &ActorPath) -> Result<(), Error> {
        match self.control(target).await {
            Some(control) => control.stop(None),
            None => debug!("Stop of unknown {} ignored.", target),
        }
        Ok(())
    }
}

/// System runner.
pub struct SystemRunner {
    /// The event receiver.
    event_receiver: mpsc::Receiver<SystemEvent>,
}

impl SystemRunner {
    /// Create a new system runner.
    pub(crate) fn new(event_receiver: mpsc::Receiver<SystemEvent>) -> Self {
        Self { event_receiver }
    }

    /// Run the actor system until it is stopped. Failures of root actors are logged.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        while let Some(event) = self.event_receiver.recv().await {
            match event {
                SystemEvent::StopSystem => {
                    debug!("Actor system stopped.");
                    break;
                }
                SystemEvent::Failure(report) => {
                    error!("Root actor failure: {}", report);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{ActorContext, Handler, Message, test_support::Journal};

    use tracing_test::traced_test;

    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Noop;

    impl Message for Noop {}

    struct Node {
        name: &'static str,
        linger: Duration,
        journal: Journal,
    }

    #[async_trait]
    impl Actor for Node {
        type Message = Noop;

        async fn post_stop(
            &mut self,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            tokio::time::sleep(self.linger).await;
            self.journal.record(format!("post_stop({})", self.name));
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Node> for Node {
        async fn handle_message(
            &mut self,
            _msg: Noop,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    fn node(
        name: &'static str,
        journal: &Journal,
    ) -> impl Fn() -> Node + Send + Sync + 'static {
        lingering_node(name, journal, Duration::ZERO)
    }

    /// A node whose `post_stop` takes `linger` to finish.
    fn lingering_node(
        name: &'static str,
        journal: &Journal,
        linger: Duration,
    ) -> impl Fn() -> Node + Send + Sync + 'static {
        let journal = journal.clone();
        move || Node {
            name,
            linger,
            journal: journal.clone(),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_actor_system() {
        let token = CancellationToken::new();
        let (system, mut runner) = ActorSystem::create(token.clone());
        let journal = Journal::default();
        let first = system
            .create_root_actor("first", node("first", &journal))
            .await
            .unwrap();
        let second = system
            .create_root_actor("second", node("second", &journal))
            .await
            .unwrap();

        let running = tokio::spawn(async move {
            runner.run().await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(logs_contain("Running actor system..."));
        system.stop_system();
        running.await.unwrap();

        assert!(logs_contain("Stopping actor system..."));
        assert!(logs_contain("Actor system stopped."));
        assert_eq!(
            journal.entries(),
            vec!["post_stop(second)", "post_stop(first)"]
        );
        assert!(first.is_closed());
        assert!(second.is_closed());
    }

    #[tokio::test]
    async fn test_root_created_during_shutdown() {
        let token = CancellationToken::new();
        let (system, mut runner) = ActorSystem::create(token.clone());
        let journal = Journal::default();
        system
            .create_root_actor(
                "slow",
                lingering_node("slow", &journal, Duration::from_millis(200)),
            )
            .await
            .unwrap();
        let running = tokio::spawn(async move {
            runner.run().await;
        });

        system.stop_system();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let late = tokio::time::timeout(
            Duration::from_millis(100),
            system.create_root_actor("late", node("late", &journal)),
        )
        .await;

        assert!(matches!(late, Ok(Ok(_))));
        running.await.unwrap();
        assert_eq!(
            journal.entries(),
            vec!["post_stop(slow)", "post_stop(late)"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_root_actor() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();
        system
            .create_root_actor("node", node("node", &journal))
            .await
            .unwrap();

        let duplicate = system
            .create_root_actor("node", node("node", &journal))
            .await;

        assert_eq!(
            duplicate.err(),
            Some(Error::Exists(ActorPath::from("/user/node")))
        );
    }

    #[tokio::test]
    async fn test_get_actor_checks_type() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();
        system
            .create_root_actor("node", node("node", &journal))
            .await
            .unwrap();

        let path = ActorPath::from("/user/node");
        assert!(system.get_actor::<Node>(&path).await.is_some());
        assert!(system.get_actor::<Node>(&ActorPath::from("/user/none")).await.is_none());
        assert!(system.children(&ActorPath::from("/user")).await.contains(&path));
    }

    #[tokio::test]
    async fn test_signals_to_missing_actors_are_ignored() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let ghost = ActorPath::from("/user/ghost");
        let me = ActorPath::from("/user/me");

        assert!(system.stop(&ghost).await.is_ok());
        assert!(system.unwatch(&me, &ghost).await.is_ok());
        assert!(system.watch(&me, &ghost).await.is_ok());
    }
}
