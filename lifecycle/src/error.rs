// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! `Error` is what hooks, handlers and the engine return. `FailureReport` is what the lifecycle
//! controller hands to the supervision collaborator: it classifies a hook failure by the phase of
//! the lifecycle in which it happened.
//!

use crate::{ActorPath, controller::LifecycleState};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message or a signal to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// An actor with the same path is already registered.
    #[error("Actor {0} exist.")]
    Exists(ActorPath),
    /// An error occurred while starting an actor.
    #[error("An error occurred while starting the actor: {0}.")]
    Start(String),
    /// An error occurred while stopping an actor.
    #[error("An error occurred while stopping the actor: {0}.")]
    Stop(String),
    /// An error occurred while preparing or completing a restart.
    #[error("An error occurred while restarting the actor: {0}.")]
    Restart(String),
    /// The actor has already terminated. Returned to whoever tried to reach it.
    #[error("Actor {0} is terminated.")]
    Terminated(ActorPath),
    /// The actor exists but does not accept messages in its current state.
    #[error("Actor {0} is not running (state: {1:?}).")]
    NotRunning(ActorPath, LifecycleState),
    /// A lifecycle event was raised in a state that does not accept it.
    #[error("Actor {path} can not handle {event} while {state:?}.")]
    IllegalState {
        path: ActorPath,
        event: String,
        state: LifecycleState,
    },
    /// The context is not attached to a running actor system.
    #[error("The actor context is not attached to an actor system.")]
    NoSystem,
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

/// Failure reported upward to the supervision collaborator.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FailureReport {
    /// `pre_start` failed on a fresh instance. Never retried by the controller.
    #[error("Actor {path} failed to start: {error}")]
    Startup { path: ActorPath, error: Error },
    /// `pre_restart` (or its default child draining) failed. The restart went on regardless.
    #[error("Actor {path} failed to clean up before restart: {error}")]
    RestartCleanup { path: ActorPath, error: Error },
    /// `post_restart` failed on the replacement instance.
    #[error("Actor {path} failed to reinitialize after restart: {error}")]
    Reinitialization { path: ActorPath, error: Error },
    /// `post_stop` failed. The actor is stopped anyway.
    #[error("Actor {path} failed to stop cleanly: {error}")]
    Stop { path: ActorPath, error: Error },
    /// The supervision strategy escalated a failure it does not handle itself.
    #[error("Actor {path} escalated a failure: {error}")]
    Escalated { path: ActorPath, error: Error },
}

impl FailureReport {
    pub fn path(&self) -> &ActorPath {
        match self {
            FailureReport::Startup { path, .. }
            | FailureReport::RestartCleanup { path, .. }
            | FailureReport::Reinitialization { path, .. }
            | FailureReport::Stop { path, .. }
            | FailureReport::Escalated { path, .. } => path,
        }
    }

    pub fn error(&self) -> &Error {
        match self {
            FailureReport::Startup { error, .. }
            | FailureReport::RestartCleanup { error, .. }
            | FailureReport::Reinitialization { error, .. }
            | FailureReport::Stop { error, .. }
            | FailureReport::Escalated { error, .. } => error,
        }
    }
}
