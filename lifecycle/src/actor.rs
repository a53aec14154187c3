// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait with the user lifecycle hooks, the `Handler`
//! trait for messages, the `ActorContext` passed to every hook and handler, and the `ActorRef`
//! type used to reach a running actor.
//!
//! The hooks here are the *user* layer. The engine never calls them directly: it goes through
//! the framework layer in [`crate::hooks`], whose defaults forward to these.
//!

use crate::{
    ActorPath, Error, FailureReport,
    failure::FailureContext,
    handler::{Envelope, HandleHelper},
    hooks::{AroundHooks, Passthrough},
    registry::{ChildRegistry, ChildSignals},
    runner::ControlHandle,
    supervision::{FailureReporter, SupervisionStrategy},
    system::SystemRef,
};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::sync::Arc;

/// Builds a fresh actor instance. Called once on start and once per restart.
pub type Factory<A> = Arc<dyn Fn() -> A + Send + Sync>;

/// Execution context passed explicitly to every lifecycle hook and message handler.
///
/// It carries what the hooks need from the outside world: the actor's path, its
/// [`ChildRegistry`], the channel to report failures upward and the stop token. The context
/// outlives actor instances; a restarted actor gets the same context, so children and watch
/// relations survive the replacement of the instance.
pub struct ActorContext {
    /// Hierarchical path identifying this actor in the system
    path: ActorPath,
    /// Children and watch relations
    registry: ChildRegistry,
    /// Supervision collaborator receiving every failure
    reporter: Arc<dyn FailureReporter>,
    /// Cancelled once a stop has been requested for this actor
    stop_token: CancellationToken,
    /// Engine this actor runs in, if any
    system: Option<SystemRef>,
}

impl ActorContext {
    pub fn new(
        path: ActorPath,
        signals: Arc<dyn ChildSignals>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        Self {
            registry: ChildRegistry::new(path.clone(), signals),
            path,
            reporter,
            stop_token: CancellationToken::new(),
            system: None,
        }
    }

    pub(crate) fn with_system(
        mut self,
        system: SystemRef,
        stop_token: CancellationToken,
    ) -> Self {
        self.system = Some(system);
        self.stop_token = stop_token;
        self
    }

    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn system(&self) -> Option<&SystemRef> {
        self.system.as_ref()
    }

    pub fn registry(&self) -> &ChildRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ChildRegistry {
        &mut self.registry
    }

    /// Snapshot of the children, in creation order.
    pub fn children(&self) -> Vec<ActorPath> {
        self.registry.children()
    }

    /// Unwatches and stops every child. Does not wait for them to terminate.
    pub async fn stop_children(&mut self) -> Result<(), Error> {
        self.registry.stop_children().await
    }

    pub async fn watch(&mut self, target: &ActorPath) -> Result<(), Error> {
        self.registry.watch(target).await
    }

    pub async fn unwatch(&mut self, target: &ActorPath) -> Result<(), Error> {
        self.registry.unwatch(target).await
    }

    /// Reports a failure to the supervision collaborator.
    pub fn report(&self, report: FailureReport) {
        self.reporter.report(report);
    }

    /// Requests this actor to stop. The request is honoured once the current event is done.
    pub fn stop_self(&self) {
        debug!("Actor {} requested to stop.", self.path);
        self.stop_token.cancel();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_token.is_cancelled()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    /// Creates a child actor under this actor's path and registers it as a child.
    ///
    /// Returns once the child has started, or with `Error::Start` if it terminated before
    /// getting there.
    pub async fn create_child<C, F>(
        &mut self,
        name: &str,
        factory: F,
    ) -> Result<ActorRef<C>, Error>
    where
        C: Actor,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.create_child_with_hooks(name, factory, Passthrough).await
    }

    /// Like `create_child`, with a custom framework hook layer for the child.
    pub async fn create_child_with_hooks<C, F, H>(
        &mut self,
        name: &str,
        factory: F,
        hooks: H,
    ) -> Result<ActorRef<C>, Error>
    where
        C: Actor,
        F: Fn() -> C + Send + Sync + 'static,
        H: AroundHooks<C>,
    {
        let system = self.system.clone().ok_or(Error::NoSystem)?;
        let path = &self.path / name;
        let factory: Factory<C> = Arc::new(factory);
        let actor_ref = system
            .create_actor_path(path.clone(), factory, hooks)
            .await?;
        self.registry.add_child(path);
        Ok(actor_ref)
    }

    pub async fn get_child<C>(&self, name: &str) -> Option<ActorRef<C>>
    where
        C: Actor,
    {
        let path = &self.path / name;
        if !self.registry.contains(&path) {
            return None;
        }
        self.system.as_ref()?.get_actor(&path).await
    }
}

/// Trait implemented by all messages that can be sent to actors.
pub trait Message: Clone + Send + Sync + 'static {}

/// User lifecycle hooks.
///
/// Every hook has a default. Overriding one never changes the others: a custom `pre_start` is
/// still what the default `post_restart` calls, and a custom `post_restart` does not stop
/// `pre_start` from running on the first start.
///
/// # Examples
///
/// ```ignore
/// struct Cache { entries: HashMap<String, String> }
///
/// #[async_trait]
/// impl Actor for Cache {
///     type Message = CacheCommand;
///
///     async fn pre_start(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
///         ctx.create_child("loader", || Loader::default()).await?;
///         Ok(())
///     }
///
///     // Keep the loader across restarts, only drop the cached entries.
///     async fn pre_restart(
///         &mut self,
///         _ctx: &mut ActorContext,
///         _failure: &FailureContext<CacheCommand>,
///     ) -> Result<(), Error> {
///         self.entries.clear();
///         Ok(())
///     }
///
///     async fn post_restart(&mut self, _ctx: &mut ActorContext, _cause: &Error) -> Result<(), Error> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static + Handler<Self> {
    /// The message type that this actor can receive and process.
    type Message: Message;

    /// Strategy the engine applies when this actor fails to start or to handle a message.
    fn supervision_strategy() -> SupervisionStrategy {
        SupervisionStrategy::Stop
    }

    /// Called once before the first message is processed.
    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once after the actor stopped accepting messages and all its children were told to
    /// stop. It never runs on an instance whose `pre_start` failed, but it does run on a
    /// replacement whose `post_restart` failed, so it must not assume initialisation completed.
    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called on the failing instance before it is discarded.
    ///
    /// By default it unwatches and stops every child, then calls `post_stop`. `post_stop` runs
    /// even if stopping some child failed; the first error is returned.
    async fn pre_restart(
        &mut self,
        ctx: &mut ActorContext,
        _failure: &FailureContext<Self::Message>,
    ) -> Result<(), Error> {
        let drained = ctx.stop_children().await;
        let stopped = self.post_stop(ctx).await;
        drained.and(stopped)
    }

    /// Called on the replacement instance after a restart. By default it calls `pre_start`.
    async fn post_restart(
        &mut self,
        ctx: &mut ActorContext,
        _cause: &Error,
    ) -> Result<(), Error> {
        self.pre_start(ctx).await
    }
}

/// Message handling for an actor.
#[async_trait]
pub trait Handler<A: Actor + Handler<A>>: Send + Sync {
    /// Handles one message. An error is a failure of the actor and goes to supervision.
    async fn handle_message(
        &mut self,
        msg: A::Message,
        ctx: &mut ActorContext,
    ) -> Result<(), Error>;

    /// A watched actor terminated.
    async fn on_terminated(
        &mut self,
        _path: ActorPath,
        _ctx: &mut ActorContext,
    ) {
    }

    /// A child reported a failure.
    async fn on_child_failure(
        &mut self,
        report: FailureReport,
        _ctx: &mut ActorContext,
    ) {
        debug!("Handling child failure: {}", report);
    }
}

/// Reference to a running actor.
pub struct ActorRef<A>
where
    A: Actor,
{
    path: ActorPath,
    sender: HandleHelper<A>,
    control: ControlHandle,
}

impl<A> ActorRef<A>
where
    A: Actor,
{
    pub(crate) fn new(
        path: ActorPath,
        sender: HandleHelper<A>,
        control: ControlHandle,
    ) -> Self {
        Self {
            path,
            sender,
            control,
        }
    }

    /// Sends a message without waiting for it to be handled.
    pub async fn tell(&self, message: A::Message) -> Result<(), Error> {
        self.sender
            .send(&self.path, Envelope::new(message, None))
            .await
    }

    /// Sends a message and waits until it has been handled. The handler's error, if any, is
    /// returned here as well as going to supervision.
    pub async fn ask(&self, message: A::Message) -> Result<(), Error> {
        let (rsvp, response) = oneshot::channel();
        self.sender
            .send(&self.path, Envelope::new(message, Some(rsvp)))
            .await?;
        response.await.map_err(|err| {
            error!("Actor {} dropped the response: {}", self.path, err);
            Error::Terminated(self.path.clone())
        })?
    }

    /// Requests the actor to stop and waits until it has terminated. Stopping an actor that
    /// already terminated is a no-op.
    pub async fn ask_stop(&self) -> Result<(), Error> {
        if self.control.is_closed() {
            debug!("Actor {} is already terminated.", self.path);
            return Ok(());
        }
        let (sender, receiver) = oneshot::channel();
        self.control.stop(Some(sender));
        if receiver.await.is_err() {
            debug!("Actor {} terminated before confirming the stop.", self.path);
        }
        Ok(())
    }

    /// Requests the actor to stop without waiting.
    pub async fn tell_stop(&self) {
        self.control.stop(None);
    }

    pub fn path(&self) -> ActorPath {
        self.path.clone()
    }

    /// True once the actor terminated and left the system.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

impl<A> Clone for ActorRef<A>
where
    A: Actor,
{
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            sender: self.sender.clone(),
            control: self.control.clone(),
        }
    }
}
