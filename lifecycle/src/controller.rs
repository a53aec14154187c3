// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Lifecycle controller
//!
//! The `LifecycleController` owns one actor identity: the current instance, the factory that
//! builds replacements, and the framework hook layer. An execution engine raises lifecycle
//! events against it (start, failure leading to restart, stop) and delivers messages through it.
//!
//! ```text
//! Uninitialized -> Running -> Restarting -> Running (new instance)
//!        |            |   \                \-> Failed -> Restarting ...
//!        |            |    \-> Failed
//!        v            v
//!     Stopped <- Stopping
//! ```
//!
//! Restart and stop run as explicit stage pipelines. A stage only starts once the previous one
//! is finished, so the ordering guarantees (children signalled before `post_stop`, the failing
//! instance discarded before the replacement is built, `post_restart` last) do not depend on the
//! hook bodies.
//!
//! Both pipelines can pause on children. Hooks only send stop signals, so a pipeline that has
//! children still terminating returns and is resumed by `child_terminated`. A replacement is
//! never built while a child the old instance stopped is still around, which lets its
//! `pre_start` create children under the same names again.
//!
//! The controller does no locking. The engine must raise one event at a time per actor.
//!

use crate::{
    ActorContext, ActorPath, Error, FailureReport, Handler,
    actor::{Actor, Factory},
    failure::FailureContext,
    hooks::{AroundHooks, Passthrough},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Lifecycle states of one actor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No instance has been started yet.
    Uninitialized,
    /// The current instance accepts messages.
    Running,
    /// A restart pipeline is in progress.
    Restarting,
    /// Start or post-restart reinitialisation failed; waiting for a supervision decision.
    Failed,
    /// Children were told to stop; waiting for them before `post_stop`.
    Stopping,
    /// Terminal.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartStage {
    PreRestart,
    Discard,
    AwaitChildren,
    Construct,
    PostRestart,
    Resume,
}

impl RestartStage {
    fn next(self) -> Option<Self> {
        match self {
            RestartStage::PreRestart => Some(RestartStage::Discard),
            RestartStage::Discard => Some(RestartStage::AwaitChildren),
            RestartStage::AwaitChildren => Some(RestartStage::Construct),
            RestartStage::Construct => Some(RestartStage::PostRestart),
            RestartStage::PostRestart => Some(RestartStage::Resume),
            RestartStage::Resume => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopStage {
    DrainChildren,
    AwaitChildren,
    PostStop,
    Terminate,
}

impl StopStage {
    fn next(self) -> Option<Self> {
        match self {
            StopStage::DrainChildren => Some(StopStage::AwaitChildren),
            StopStage::AwaitChildren => Some(StopStage::PostStop),
            StopStage::PostStop => Some(StopStage::Terminate),
            StopStage::Terminate => None,
        }
    }
}

/// Result of a restart event.
#[derive(Debug, Clone, PartialEq)]
pub enum RestartOutcome {
    /// The replacement is running.
    Restarted,
    /// Children stopped by the old instance are still terminating. The replacement is built
    /// once they are gone, and `child_terminated` returns the final outcome.
    AwaitingChildren(usize),
    /// The replacement was built but `post_restart` failed; the actor is `Failed`.
    Failed(Error),
    /// A stop was requested while restarting; the replacement went straight to stopping.
    Stopping(StopProgress),
    /// The actor was already stopping or stopped. Nothing happened.
    Ignored,
}

/// Progress of a stop event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopProgress {
    /// `post_stop` ran and the actor is terminal.
    Stopped,
    /// Children were signalled; `post_stop` runs when the last one terminates.
    AwaitingChildren(usize),
    /// A restart is waiting for children. The replacement stops as soon as it is built.
    Deferred,
    /// A previous stop is still waiting for children.
    AlreadyStopping,
    /// Nothing left to do.
    AlreadyStopped,
}

/// Result of delivering one message.
#[derive(Debug)]
pub enum Delivery<M> {
    /// The handler succeeded.
    Handled,
    /// The handler failed. The failure goes to supervision, which may raise a restart with it.
    Failed(FailureContext<M>),
}

/// Drives the hooks of one actor identity through start, restart and stop.
///
/// Every hook call goes through the framework layer `H`.
pub struct LifecycleController<A, H = Passthrough>
where
    A: Actor,
    H: AroundHooks<A>,
{
    path: ActorPath,
    factory: Factory<A>,
    instance: Option<A>,
    hooks: H,
    state: LifecycleState,
    incarnation: u64,
    /// Failure of a restart paused until the stopped children terminate.
    pending_restart: Option<FailureContext<A::Message>>,
    /// A stop arrived while the restart was paused.
    stop_deferred: bool,
}

impl<A> LifecycleController<A, Passthrough>
where
    A: Actor,
{
    pub fn new(path: ActorPath, factory: Factory<A>) -> Self {
        Self::with_hooks(path, factory, Passthrough)
    }
}

impl<A, H> LifecycleController<A, H>
where
    A: Actor,
    H: AroundHooks<A>,
{
    pub fn with_hooks(path: ActorPath, factory: Factory<A>, hooks: H) -> Self {
        Self {
            path,
            factory,
            instance: None,
            hooks,
            state: LifecycleState::Uninitialized,
            incarnation: 0,
            pending_restart: None,
            stop_deferred: false,
        }
    }

    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == LifecycleState::Stopped
    }

    /// Number of instances built so far.
    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    pub fn instance(&self) -> Option<&A> {
        self.instance.as_ref()
    }

    fn illegal(&self, event: &str) -> Error {
        Error::IllegalState {
            path: self.path.clone(),
            event: event.to_owned(),
            state: self.state,
        }
    }

    fn construct(&mut self) -> A {
        self.incarnation += 1;
        debug!(
            "Actor {} builds instance #{}.",
            self.path, self.incarnation
        );
        (self.factory)()
    }

    /// Builds the first instance and runs `around_pre_start` on it.
    ///
    /// A failure is reported as `FailureReport::Startup`, leaves the actor `Failed` and is
    /// returned. It is not retried here. The instance that failed to start is dropped without
    /// further hooks.
    pub async fn start(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if self.state != LifecycleState::Uninitialized {
            return Err(self.illegal("start"));
        }
        debug!("Actor {} is created.", self.path);
        let mut actor = self.construct();
        match self.hooks.around_pre_start(&mut actor, ctx).await {
            Ok(()) => {
                debug!("Actor {} has started successfully.", self.path);
                self.instance = Some(actor);
                self.state = LifecycleState::Running;
                Ok(())
            }
            Err(error) => {
                error!("Actor {} failed to start: {}", self.path, error);
                self.state = LifecycleState::Failed;
                ctx.report(FailureReport::Startup {
                    path: self.path.clone(),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Replaces the current instance with a fresh one.
    ///
    /// Runs `around_pre_restart` on the failing instance, discards it, waits for the children it
    /// stopped, builds the replacement and runs `around_post_restart` on it. Without an instance
    /// (the first start failed) the children are drained directly. A failing
    /// `around_pre_restart` is reported as `RestartCleanup` and does not stop the pipeline. A
    /// failing `around_post_restart` is reported as `Reinitialization` and leaves the actor
    /// `Failed`.
    ///
    /// A restart raised after a stop was accepted is ignored.
    pub async fn restart(
        &mut self,
        ctx: &mut ActorContext,
        failure: FailureContext<A::Message>,
    ) -> Result<RestartOutcome, Error> {
        match self.state {
            LifecycleState::Running | LifecycleState::Failed => {}
            LifecycleState::Stopping | LifecycleState::Stopped => {
                warn!(
                    "Actor {} ignores restart after stop: {}",
                    self.path,
                    failure.cause()
                );
                return Ok(RestartOutcome::Ignored);
            }
            LifecycleState::Uninitialized | LifecycleState::Restarting => {
                return Err(self.illegal("restart"));
            }
        }
        debug!(
            "Actor {} is restarting: {}",
            self.path,
            failure.cause()
        );
        self.state = LifecycleState::Restarting;
        Ok(self.run_restart(ctx, failure, RestartStage::PreRestart).await)
    }

    async fn run_restart(
        &mut self,
        ctx: &mut ActorContext,
        failure: FailureContext<A::Message>,
        from: RestartStage,
    ) -> RestartOutcome {
        let mut replacement = None;
        let mut outcome = RestartOutcome::Restarted;
        let mut stage = Some(from);
        while let Some(current) = stage {
            debug!("Actor {} restart stage {:?}.", self.path, current);
            match current {
                RestartStage::PreRestart => {
                    let cleanup = match self.instance.as_mut() {
                        Some(actor) => {
                            self.hooks
                                .around_pre_restart(actor, ctx, &failure)
                                .await
                        }
                        None => ctx.stop_children().await,
                    };
                    if let Err(error) = cleanup {
                        error!(
                            "Actor {} failed to clean up before restart: {}",
                            self.path, error
                        );
                        ctx.report(FailureReport::RestartCleanup {
                            path: self.path.clone(),
                            error,
                        });
                    }
                }
                RestartStage::Discard => {
                    drop(self.instance.take());
                }
                RestartStage::AwaitChildren => {
                    let pending = ctx.registry().pending_stops();
                    if pending > 0 {
                        debug!(
                            "Actor {} waits for {} children before rebuilding.",
                            self.path, pending
                        );
                        self.pending_restart = Some(failure);
                        return RestartOutcome::AwaitingChildren(pending);
                    }
                }
                RestartStage::Construct => {
                    replacement = Some(self.construct());
                }
                RestartStage::PostRestart => {
                    if let Some(actor) = replacement.as_mut() {
                        if let Err(error) = self
                            .hooks
                            .around_post_restart(actor, ctx, &failure)
                            .await
                        {
                            error!(
                                "Actor {} failed to reinitialize: {}",
                                self.path, error
                            );
                            ctx.report(FailureReport::Reinitialization {
                                path: self.path.clone(),
                                error: error.clone(),
                            });
                            outcome = RestartOutcome::Failed(error);
                        }
                    }
                    self.instance = replacement.take();
                }
                RestartStage::Resume => {
                    self.state = match outcome {
                        RestartOutcome::Failed(_) => LifecycleState::Failed,
                        _ => LifecycleState::Running,
                    };
                    if std::mem::take(&mut self.stop_deferred)
                        || ctx.stop_requested()
                    {
                        debug!(
                            "Actor {} was asked to stop while restarting.",
                            self.path
                        );
                        outcome = RestartOutcome::Stopping(self.stop(ctx).await);
                    } else {
                        debug!("Actor {} has restarted.", self.path);
                    }
                }
            }
            stage = current.next();
        }
        outcome
    }

    /// Stops the actor.
    ///
    /// Every child is unwatched and told to stop. `around_post_stop` runs once the registry is
    /// empty, which may be right away or when the last `child_terminated` arrives. Raising a
    /// stop again while stopping or stopped changes nothing. A stop raised while a restart waits
    /// for children is deferred: the restart completes and the replacement stops right away.
    pub async fn stop(&mut self, ctx: &mut ActorContext) -> StopProgress {
        match self.state {
            LifecycleState::Stopping => return StopProgress::AlreadyStopping,
            LifecycleState::Stopped => return StopProgress::AlreadyStopped,
            LifecycleState::Uninitialized => {
                debug!("Actor {} stopped before starting.", self.path);
                self.state = LifecycleState::Stopped;
                return StopProgress::Stopped;
            }
            LifecycleState::Restarting => {
                debug!("Actor {} stops once its restart is done.", self.path);
                self.stop_deferred = true;
                return StopProgress::Deferred;
            }
            LifecycleState::Running | LifecycleState::Failed => {}
        }
        debug!("Actor {} is stopping.", self.path);
        self.state = LifecycleState::Stopping;
        self.run_stop(ctx, StopStage::DrainChildren).await
    }

    async fn run_stop(
        &mut self,
        ctx: &mut ActorContext,
        from: StopStage,
    ) -> StopProgress {
        let mut stage = Some(from);
        while let Some(current) = stage {
            match current {
                StopStage::DrainChildren => {
                    if let Err(error) = ctx.stop_children().await {
                        ctx.report(FailureReport::Stop {
                            path: self.path.clone(),
                            error,
                        });
                    }
                }
                StopStage::AwaitChildren => {
                    let pending = ctx.registry().len();
                    if pending > 0 {
                        debug!(
                            "Actor {} waits for {} children to stop.",
                            self.path, pending
                        );
                        return StopProgress::AwaitingChildren(pending);
                    }
                }
                StopStage::PostStop => {
                    if let Some(actor) = self.instance.as_mut() {
                        if let Err(error) =
                            self.hooks.around_post_stop(actor, ctx).await
                        {
                            error!(
                                "Actor '{}' failed to stop: {}",
                                self.path, error
                            );
                            ctx.report(FailureReport::Stop {
                                path: self.path.clone(),
                                error,
                            });
                        }
                    }
                }
                StopStage::Terminate => {
                    self.instance = None;
                    self.state = LifecycleState::Stopped;
                    debug!("Actor {} is stopped.", self.path);
                }
            }
            stage = current.next();
        }
        StopProgress::Stopped
    }

    /// A child terminated. Resumes a stop or a restart that was waiting for children.
    ///
    /// Returns the outcome of the restart this termination completed, if any. A stop that
    /// completes shows in `state()`.
    pub async fn child_terminated(
        &mut self,
        ctx: &mut ActorContext,
        child: &ActorPath,
    ) -> Option<RestartOutcome> {
        if ctx.registry_mut().remove_child(child) {
            debug!("Actor {} lost child {}.", self.path, child);
        }
        match self.state {
            LifecycleState::Stopping => {
                self.run_stop(ctx, StopStage::AwaitChildren).await;
                None
            }
            LifecycleState::Restarting
                if ctx.registry().pending_stops() == 0 =>
            {
                let failure = self.pending_restart.take()?;
                Some(
                    self.run_restart(ctx, failure, RestartStage::AwaitChildren)
                        .await,
                )
            }
            _ => None,
        }
    }

    /// Hands a message to the current instance.
    ///
    /// Only a running actor accepts messages. A stopped actor answers `Error::Terminated`, any
    /// other state `Error::NotRunning`; either error belongs to the sender.
    pub async fn deliver(
        &mut self,
        ctx: &mut ActorContext,
        message: A::Message,
    ) -> Result<Delivery<A::Message>, Error> {
        match self.state {
            LifecycleState::Running => {}
            LifecycleState::Stopped => {
                return Err(Error::Terminated(self.path.clone()));
            }
            state => return Err(Error::NotRunning(self.path.clone(), state)),
        }
        let Some(actor) = self.instance.as_mut() else {
            return Err(Error::NotRunning(self.path.clone(), self.state));
        };
        match actor.handle_message(message.clone(), ctx).await {
            Ok(()) => Ok(Delivery::Handled),
            Err(error) => {
                error!("Actor {} failed handling a message: {}", self.path, error);
                Ok(Delivery::Failed(FailureContext::new(error, Some(message))))
            }
        }
    }

    /// Tells the running instance that a watched actor terminated.
    pub async fn notify_terminated(
        &mut self,
        ctx: &mut ActorContext,
        target: ActorPath,
    ) {
        if self.state != LifecycleState::Running {
            debug!(
                "Actor {} drops termination of {} while {:?}.",
                self.path, target, self.state
            );
            return;
        }
        if let Some(actor) = self.instance.as_mut() {
            actor.on_terminated(target, ctx).await;
        }
    }

    /// Tells the running instance that a child reported a failure.
    pub async fn notify_child_failure(
        &mut self,
        ctx: &mut ActorContext,
        report: FailureReport,
    ) {
        if self.state != LifecycleState::Running {
            debug!(
                "Actor {} drops child failure while {:?}: {}",
                self.path, self.state, report
            );
            return;
        }
        if let Some(actor) = self.instance.as_mut() {
            actor.on_child_failure(report, ctx).await;
        }
    }
}
