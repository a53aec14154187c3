// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Framework hooks
//!
//! The lifecycle controller never calls the user hooks of [`Actor`] directly. It calls an
//! [`AroundHooks`] layer, whose defaults forward to the user hooks. Cross-cutting behaviour is
//! added by wrapping a layer in another one, so an actor author never has to remember to call a
//! base implementation for tracing or metrics to keep working.
//!
//! ```ignore
//! // Trace every hook of the worker, on top of the default forwarding.
//! system
//!     .create_root_actor_with_hooks("worker", Worker::default, Traced::new(Passthrough))
//!     .await?;
//! ```
//!

use crate::{Actor, ActorContext, Error, failure::FailureContext};

use async_trait::async_trait;
use tracing::{Instrument, debug, debug_span, error};

use std::time::Instant;

/// Interception points around the user hooks.
#[async_trait]
pub trait AroundHooks<A: Actor>: Send + Sync + 'static {
    async fn around_pre_start(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
    ) -> Result<(), Error> {
        actor.pre_start(ctx).await
    }

    async fn around_post_stop(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
    ) -> Result<(), Error> {
        actor.post_stop(ctx).await
    }

    async fn around_pre_restart(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
        failure: &FailureContext<A::Message>,
    ) -> Result<(), Error> {
        actor.pre_restart(ctx, failure).await
    }

    async fn around_post_restart(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
        failure: &FailureContext<A::Message>,
    ) -> Result<(), Error> {
        actor.post_restart(ctx, failure.cause()).await
    }
}

/// Forwards every interception point to the user hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl<A: Actor> AroundHooks<A> for Passthrough {}

/// Wraps another layer and runs each hook inside a tracing span, logging its duration and
/// outcome.
#[derive(Debug, Default, Clone)]
pub struct Traced<H> {
    inner: H,
}

impl<H> Traced<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

fn finished(
    ctx: &ActorContext,
    hook: &str,
    started: Instant,
    result: &Result<(), Error>,
) {
    match result {
        Ok(()) => debug!(
            "Hook {} of actor {} finished in {:?}.",
            hook,
            ctx.path(),
            started.elapsed()
        ),
        Err(err) => error!(
            "Hook {} of actor {} failed after {:?}: {}",
            hook,
            ctx.path(),
            started.elapsed(),
            err
        ),
    }
}

#[async_trait]
impl<A, H> AroundHooks<A> for Traced<H>
where
    A: Actor,
    H: AroundHooks<A>,
{
    async fn around_pre_start(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
    ) -> Result<(), Error> {
        let span = debug_span!("pre_start", path = %ctx.path());
        let started = Instant::now();
        let result = self
            .inner
            .around_pre_start(actor, ctx)
            .instrument(span)
            .await;
        finished(ctx, "pre_start", started, &result);
        result
    }

    async fn around_post_stop(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
    ) -> Result<(), Error> {
        let span = debug_span!("post_stop", path = %ctx.path());
        let started = Instant::now();
        let result = self
            .inner
            .around_post_stop(actor, ctx)
            .instrument(span)
            .await;
        finished(ctx, "post_stop", started, &result);
        result
    }

    async fn around_pre_restart(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
        failure: &FailureContext<A::Message>,
    ) -> Result<(), Error> {
        let span = debug_span!(
            "pre_restart",
            path = %ctx.path(),
            cause = %failure.cause()
        );
        let started = Instant::now();
        let result = self
            .inner
            .around_pre_restart(actor, ctx, failure)
            .instrument(span)
            .await;
        finished(ctx, "pre_restart", started, &result);
        result
    }

    async fn around_post_restart(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext,
        failure: &FailureContext<A::Message>,
    ) -> Result<(), Error> {
        let span = debug_span!(
            "post_restart",
            path = %ctx.path(),
            cause = %failure.cause()
        );
        let started = Instant::now();
        let result = self
            .inner
            .around_post_restart(actor, ctx, failure)
            .instrument(span)
            .await;
        finished(ctx, "post_restart", started, &result);
        result
    }
}
