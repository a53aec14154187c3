// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Rush Lifecycle
//!
//! Actor lifecycle hooks and crash recovery for tokio actors.
//!
//! An actor identity outlives its instances. When an instance fails, supervision may decide to
//! throw it away and build a fresh one from the same factory, keeping the identity (path,
//! children, watch relations) in place. This crate implements that protocol:
//!
//! - **User hooks** ([`Actor`]): `pre_start`, `post_stop`, `pre_restart`, `post_restart`, with
//!   defaults that keep working when only some of them are overridden.
//! - **Framework hooks** ([`AroundHooks`]): one interception point per user hook, forwarding by
//!   default, for tracing or metrics that must not depend on user code calling a base method.
//! - **Child registry** ([`ChildRegistry`]): the children of an actor and its watch relations,
//!   with the unwatch-then-stop drain used on restart and stop.
//! - **Lifecycle controller** ([`LifecycleController`]): the state machine driving start,
//!   restart and stop of one identity as explicit stage pipelines.
//! - **Failure context** ([`FailureContext`]): the cause of a failure and the message being
//!   handled when it happened.
//!
//! On top of these, a small engine ([`ActorSystem`], [`SystemRef`], [`ActorRef`]) runs every
//! actor in its own tokio task and applies its [`SupervisionStrategy`].
//!
//! ## Restart sequence
//!
//! For an actor with two children and no overridden hooks, a failure handled with a restart
//! produces:
//!
//! ```text
//! unwatch(child1) stop(child1) unwatch(child2) stop(child2) post_stop <new instance> pre_start
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use rush_lifecycle::*;
//!
//! let (system, mut runner) = ActorSystem::create(CancellationToken::new());
//! tokio::spawn(async move { runner.run().await });
//!
//! let counter = system.create_root_actor("counter", Counter::default).await?;
//! counter.tell(CounterCommand::Increment).await?;
//! counter.ask_stop().await?;
//! ```
//!

mod actor;
mod controller;
mod error;
mod failure;
mod handler;
mod hooks;
mod path;
mod registry;
mod runner;
mod supervision;
mod system;

#[cfg(test)]
mod test_support;

//
// User layer
//

/// User lifecycle hooks of an actor, with their defaults.
pub use actor::Actor;

/// Execution context passed to every hook and message handler.
///
/// It gives access to the actor's path, its [`ChildRegistry`], failure reporting and the stop
/// token. There is no ambient "current actor": whatever a hook needs comes from here.
pub use actor::ActorContext;

/// A reference to a running actor.
pub use actor::ActorRef;

/// Closure building actor instances, called once on start and once per restart.
pub use actor::Factory;

/// Message handling of an actor.
pub use actor::Handler;

/// Trait implemented by all messages that can be sent to actors.
pub use actor::Message;

//
// Lifecycle
//

/// The lifecycle state machine of one actor identity.
pub use controller::LifecycleController;

/// Lifecycle states.
pub use controller::LifecycleState;

/// Result of a restart event.
pub use controller::RestartOutcome;

/// Progress of a stop event.
pub use controller::StopProgress;

/// Result of delivering a message.
pub use controller::Delivery;

/// Framework interception points around the user hooks.
pub use hooks::AroundHooks;

/// Framework layer forwarding every hook unchanged.
pub use hooks::Passthrough;

/// Framework layer running every hook inside a tracing span.
pub use hooks::Traced;

/// Cause of a failure and the message that triggered it.
pub use failure::FailureContext;

/// Children and watch relations of an actor.
pub use registry::ChildRegistry;

/// Child management collaborator used by the registry.
pub use registry::ChildSignals;

/// Watch relations of an actor.
pub use registry::WatchSet;

//
// Errors and paths
//

/// Error type for the actor system.
pub use error::Error;

/// Failure taxonomy reported to supervision.
pub use error::FailureReport;

/// Hierarchical path of an actor.
pub use path::ActorPath;

//
// Supervision
//

pub use supervision::{
    Directive, ExponentialBackoffStrategy, FailureReporter,
    FixedIntervalStrategy, NoIntervalStrategy, RetryStrategy,
    SupervisionStrategy,
};

//
// Engine
//

/// Entry point to create an actor system.
pub use system::ActorSystem;

/// Events handled by the system runner.
pub use system::SystemEvent;

/// Handle to the actor system, cloneable and shared by all actors.
pub use system::SystemRef;

/// Runs the actor system until it is stopped.
pub use system::SystemRunner;

/// Responder used by `ask`.
pub use handler::Responder;
