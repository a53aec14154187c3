// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! Each actor runs in its own tokio task, driven by an `ActorRunner`. The runner owns the
//! actor's [`LifecycleController`] and [`ActorContext`] and raises lifecycle events against the
//! controller one at a time:
//!
//! 1. **Control signals**: stop requests, watch bookkeeping, termination of watched actors and
//!    children, failures reported by children.
//! 2. **Stop token**: a stop requested from inside a hook or from another task.
//! 3. **Mailbox**: user messages, only while the actor is running.
//!
//! The select loop is biased in that order, so a queued stop or unwatch is always seen before the
//! next message.
//!
//! Failures coming back from the controller are handed to the actor's
//! [`SupervisionStrategy`], which decides between resuming, restarting, stopping and escalating.
//! Once the controller reaches `Stopped` the runner closes the mailbox, rejects what is still
//! queued, and tells the system so that watchers and the parent learn about the termination.
//!

use crate::{
    ActorPath, Error, FailureReport,
    actor::{Actor, ActorContext, ActorRef, Factory},
    controller::{
        Delivery, LifecycleController, LifecycleState, RestartOutcome,
    },
    failure::FailureContext,
    handler::{Envelope, HandleHelper, MailboxReceiver, mailbox, respond},
    hooks::AroundHooks,
    supervision::{Directive, FailureReporter, SupervisionStrategy},
    system::{SystemEvent, SystemRef},
};

use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::sync::Arc;

/// Signals exchanged between runners, outside the mailbox.
#[derive(Debug)]
pub(crate) enum ControlSignal {
    /// Stop, optionally confirming once terminated.
    Stop(Option<oneshot::Sender<()>>),
    /// The given actor starts watching this one.
    Watch(ActorPath),
    /// The given actor stops watching this one.
    Unwatch(ActorPath),
    /// A watched actor terminated.
    Terminated(ActorPath),
    /// A child terminated.
    ChildTerminated(ActorPath),
    /// A child reported a failure.
    ChildFailure(FailureReport),
}

pub(crate) type ControlSender = mpsc::UnboundedSender<ControlSignal>;

pub(crate) type ControlReceiver = mpsc::UnboundedReceiver<ControlSignal>;

/// Control side of a running actor.
#[derive(Clone)]
pub(crate) struct ControlHandle {
    sender: ControlSender,
    stop_token: CancellationToken,
}

impl ControlHandle {
    /// Requests a stop. The token is cancelled first so that a restart in flight notices it.
    pub(crate) fn stop(&self, confirm: Option<oneshot::Sender<()>>) {
        self.stop_token.cancel();
        if self.sender.send(ControlSignal::Stop(confirm)).is_err() {
            debug!("Stop signal sent to a terminated actor.");
        }
    }

    pub(crate) fn send(&self, signal: ControlSignal) -> Result<(), Error> {
        self.sender.send(signal).map_err(|err| {
            Error::Send(format!("Control signal not delivered: {:?}", err.0))
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Routes the failures of one actor: to the parent's runner, or to the system for root actors.
struct EngineReporter {
    path: ActorPath,
    parent: Option<ControlHandle>,
    events: mpsc::Sender<SystemEvent>,
}

impl FailureReporter for EngineReporter {
    fn report(&self, report: FailureReport) {
        error!("Actor {} reports failure: {}", self.path, report);
        match &self.parent {
            Some(parent) => {
                if let Err(err) = parent.send(ControlSignal::ChildFailure(report))
                {
                    debug!(
                        "Parent of actor {} is gone, failure dropped: {}",
                        self.path, err
                    );
                }
            }
            None => {
                if let Err(err) =
                    self.events.try_send(SystemEvent::Failure(report))
                {
                    error!(
                        "Failure of root actor {} not delivered to the system: {}",
                        self.path, err
                    );
                }
            }
        }
    }
}

pub(crate) struct ActorRunner<A, H>
where
    A: Actor,
    H: AroundHooks<A>,
{
    controller: LifecycleController<A, H>,
    ctx: ActorContext,
    receiver: MailboxReceiver<A>,
    control_receiver: ControlReceiver,
    strategy: SupervisionStrategy,
    restarts: usize,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

impl<A, H> ActorRunner<A, H>
where
    A: Actor,
    H: AroundHooks<A>,
{
    pub(crate) fn create(
        path: ActorPath,
        factory: Factory<A>,
        hooks: H,
        system: SystemRef,
        parent: Option<ControlHandle>,
    ) -> (Self, ActorRef<A>, ControlHandle) {
        debug!("Creating new actor runner.");
        let (sender, receiver) = mailbox();
        let (control_sender, control_receiver) = mpsc::unbounded_channel();
        let stop_token = CancellationToken::new();
        let control = ControlHandle {
            sender: control_sender,
            stop_token: stop_token.clone(),
        };
        let actor_ref = ActorRef::new(
            path.clone(),
            HandleHelper::new(sender),
            control.clone(),
        );

        let reporter = EngineReporter {
            path: path.clone(),
            parent,
            events: system.event_sender(),
        };
        let ctx = ActorContext::new(
            path.clone(),
            Arc::new(system.clone()),
            Arc::new(reporter),
        )
        .with_system(system, stop_token);

        let runner = ActorRunner {
            controller: LifecycleController::with_hooks(path, factory, hooks),
            ctx,
            receiver,
            control_receiver,
            strategy: A::supervision_strategy(),
            restarts: 0,
            stop_waiters: Vec::new(),
        };
        (runner, actor_ref, control)
    }

    fn path(&self) -> &ActorPath {
        self.controller.path()
    }

    /// Runs the actor until it is stopped. `started` learns whether the actor reached
    /// `Running` at least once.
    pub(crate) async fn init(
        &mut self,
        mut started: Option<oneshot::Sender<bool>>,
    ) {
        debug!("Initializing actor {} runner.", self.path());

        if let Err(error) = self.controller.start(&mut self.ctx).await {
            self.supervise(FailureContext::without_message(error)).await;
        }

        let stop_token = self.ctx.stop_token();
        loop {
            let running = match self.controller.state() {
                LifecycleState::Running => {
                    if let Some(sender) = started.take() {
                        debug!("Actor {} is running.", self.path());
                        sender.send(true).unwrap_or_else(|err| {
                            error!("Failed to send signal: {:?}", err);
                        });
                    }
                    true
                }
                LifecycleState::Stopped => break,
                _ => false,
            };

            select! {
                biased;
                signal = self.control_receiver.recv() => {
                    match signal {
                        Some(signal) => self.handle_signal(signal).await,
                        None => self.stop().await,
                    }
                }
                _ = stop_token.cancelled(), if running => {
                    debug!("Actor {} stop token cancelled.", self.path());
                    self.stop().await;
                }
                envelope = self.receiver.recv(), if running => {
                    match envelope {
                        Some(envelope) => self.handle_envelope(envelope).await,
                        None => self.stop().await,
                    }
                }
            }
        }

        self.terminate().await;
        if let Some(sender) = started.take() {
            sender.send(false).unwrap_or_else(|err| {
                error!("Failed to send signal: {:?}", err);
            });
        }
    }

    async fn stop(&mut self) {
        let progress = self.controller.stop(&mut self.ctx).await;
        debug!("Actor {} stop progress: {:?}", self.path(), progress);
    }

    async fn handle_envelope(&mut self, envelope: Envelope<A>) {
        let (message, rsvp) = envelope.into_parts();
        match self.controller.deliver(&mut self.ctx, message).await {
            Ok(Delivery::Handled) => {
                self.restarts = 0;
                respond(rsvp, Ok(()));
            }
            Ok(Delivery::Failed(failure)) => {
                respond(rsvp, Err(failure.cause().clone()));
                self.supervise(failure).await;
            }
            Err(error) => respond(rsvp, Err(error)),
        }
    }

    async fn handle_signal(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::Stop(confirm) => {
                if let Some(confirm) = confirm {
                    self.stop_waiters.push(confirm);
                }
                self.stop().await;
            }
            ControlSignal::Watch(watcher) => {
                self.ctx.registry_mut().add_watcher(watcher);
            }
            ControlSignal::Unwatch(watcher) => {
                self.ctx.registry_mut().remove_watcher(&watcher);
            }
            ControlSignal::Terminated(target) => {
                if self.ctx.registry_mut().watched_terminated(&target) {
                    self.controller
                        .notify_terminated(&mut self.ctx, target)
                        .await;
                } else {
                    debug!(
                        "Actor {} ignores termination of unwatched {}.",
                        self.path(),
                        target
                    );
                }
            }
            ControlSignal::ChildTerminated(child) => {
                match self.controller.child_terminated(&mut self.ctx, &child).await
                {
                    Some(RestartOutcome::Failed(error)) => {
                        self.supervise(FailureContext::without_message(error))
                            .await;
                    }
                    Some(outcome) => {
                        debug!(
                            "Actor {} restart outcome: {:?}",
                            self.path(),
                            outcome
                        );
                    }
                    None => {}
                }
            }
            ControlSignal::ChildFailure(report) => {
                self.controller
                    .notify_child_failure(&mut self.ctx, report)
                    .await;
            }
        }
    }

    /// Applies the supervision strategy to a failure until the actor is running again or
    /// stopping.
    async fn supervise(&mut self, failure: FailureContext<A::Message>) {
        let mut failure = failure;
        loop {
            let (directive, backoff) = self.strategy.decide(self.restarts);
            debug!(
                "Actor {} applies {:?} after failure: {}",
                self.path(),
                directive,
                failure.cause()
            );
            match directive {
                Directive::Resume => {
                    if self.controller.state() != LifecycleState::Running {
                        debug!(
                            "Actor {} can not resume while {:?}.",
                            self.path(),
                            self.controller.state()
                        );
                        self.stop().await;
                    }
                    return;
                }
                Directive::Stop => {
                    self.stop().await;
                    return;
                }
                Directive::Escalate => {
                    let (error, _) = failure.into_parts();
                    self.ctx.report(FailureReport::Escalated {
                        path: self.path().clone(),
                        error,
                    });
                    self.stop().await;
                    return;
                }
                Directive::Restart => {
                    if let Some(duration) = backoff {
                        debug!("Backoff for {:?}", &duration);
                        tokio::time::sleep(duration).await;
                    }
                    self.restarts += 1;
                    debug!("retries: {}", self.restarts);
                    match self.controller.restart(&mut self.ctx, failure).await {
                        Ok(RestartOutcome::Failed(error)) => {
                            failure = FailureContext::without_message(error);
                        }
                        Ok(outcome) => {
                            debug!(
                                "Actor {} restart outcome: {:?}",
                                self.path(),
                                outcome
                            );
                            return;
                        }
                        Err(error) => {
                            error!(
                                "Actor {} can not be restarted: {}",
                                self.path(),
                                error
                            );
                            self.stop().await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Releases everything the actor held once it is stopped.
    ///
    /// The actor leaves the system before its control channel closes, so a closed channel
    /// always means the path is free again.
    async fn terminate(&mut self) {
        self.receiver.close();
        while let Ok(envelope) = self.receiver.try_recv() {
            envelope.reject(Error::Terminated(self.path().clone()));
        }

        if let Some(system) = self.ctx.system() {
            system.remove_actor(self.path()).await;
        }

        self.control_receiver.close();
        while let Ok(signal) = self.control_receiver.try_recv() {
            match signal {
                ControlSignal::Stop(Some(confirm)) => {
                    self.stop_waiters.push(confirm)
                }
                ControlSignal::Watch(watcher) => {
                    self.ctx.registry_mut().add_watcher(watcher)
                }
                ControlSignal::Unwatch(watcher) => {
                    self.ctx.registry_mut().remove_watcher(&watcher)
                }
                _ => {}
            }
        }
        debug!("Actor {} is terminated.", self.path());

        let watchers = self.ctx.registry().watches().watchers();
        if let Some(system) = self.ctx.system() {
            system.notify_terminated(self.path(), watchers).await;
        }

        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{
        Handler, Message,
        supervision::{FixedIntervalStrategy, NoIntervalStrategy},
        system::ActorSystem,
        test_support::Journal,
    };

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[derive(Debug, Clone)]
    enum Job {
        Count,
        Fail,
    }

    impl Message for Job {}

    struct Worker {
        id: usize,
        count: usize,
        fail_start: bool,
        journal: Journal,
    }

    #[async_trait]
    impl Actor for Worker {
        type Message = Job;

        fn supervision_strategy() -> SupervisionStrategy {
            SupervisionStrategy::Restart(Box::new(FixedIntervalStrategy::new(
                3,
                Duration::from_millis(10),
            )))
        }

        async fn pre_start(
            &mut self,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            self.journal.record(format!("pre_start#{}", self.id));
            if self.fail_start {
                return Err(Error::Start("PreStart failed".to_owned()));
            }
            Ok(())
        }

        async fn post_stop(
            &mut self,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            self.journal.record(format!("post_stop#{}", self.id));
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Worker> for Worker {
        async fn handle_message(
            &mut self,
            msg: Job,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            match msg {
                Job::Count => {
                    self.count += 1;
                    self.journal
                        .record(format!("count#{}={}", self.id, self.count));
                    Ok(())
                }
                Job::Fail => Err(Error::Functional("job failed".to_owned())),
            }
        }
    }

    /// Instances fail to start while `failing` is above zero.
    fn worker_factory(
        journal: Journal,
        failing: usize,
    ) -> impl Fn() -> Worker + Send + Sync + 'static {
        let built = Arc::new(AtomicUsize::new(0));
        move || {
            let id = built.fetch_add(1, Ordering::SeqCst) + 1;
            Worker {
                id,
                count: 0,
                fail_start: id <= failing,
                journal: journal.clone(),
            }
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_root_actor_recovers_from_failed_start() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();

        let worker = system
            .create_root_actor("worker", worker_factory(journal.clone(), 1))
            .await
            .unwrap();
        worker.ask(Job::Count).await.unwrap();

        assert_eq!(
            journal.entries(),
            vec!["pre_start#1", "pre_start#2", "count#2=1"]
        );
        assert!(logs_contain("Initializing actor /user/worker runner"));
        assert!(logs_contain("Actor /user/worker failed to start"));
        assert!(logs_contain("Backoff for"));
        assert!(logs_contain("Actor /user/worker is running"));

        worker.ask_stop().await.unwrap();
        assert!(logs_contain("Actor /user/worker is terminated"));
        assert!(system.get_actor::<Worker>(&worker.path()).await.is_none());
        assert_eq!(journal.count("post_stop#1"), 0);
        assert_eq!(journal.count("post_stop#2"), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_retries_exhausted_on_start() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();

        let result = system
            .create_root_actor("worker", worker_factory(journal.clone(), 10))
            .await;

        assert!(matches!(result, Err(Error::Start(_))));
        // First start plus three restarts. Only the last replacement, whose
        // reinitialisation failed, gets post_stop.
        assert_eq!(
            journal.entries(),
            vec![
                "pre_start#1",
                "pre_start#2",
                "pre_start#3",
                "pre_start#4",
                "post_stop#4",
            ]
        );
        assert!(logs_contain("applies Stop after failure"));
    }

    #[tokio::test]
    async fn test_message_failure_restarts_instance() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();
        let worker = system
            .create_root_actor("worker", worker_factory(journal.clone(), 0))
            .await
            .unwrap();

        worker.ask(Job::Count).await.unwrap();
        let failed = worker.ask(Job::Fail).await;
        assert_eq!(failed, Err(Error::Functional("job failed".to_owned())));
        worker.ask(Job::Count).await.unwrap();

        assert_eq!(
            journal.entries(),
            vec![
                "pre_start#1",
                "count#1=1",
                "post_stop#1",
                "pre_start#2",
                "count#2=1",
            ]
        );
    }

    struct Tolerant {
        count: usize,
        journal: Journal,
    }

    #[async_trait]
    impl Actor for Tolerant {
        type Message = Job;

        fn supervision_strategy() -> SupervisionStrategy {
            SupervisionStrategy::Resume
        }
    }

    #[async_trait]
    impl Handler<Tolerant> for Tolerant {
        async fn handle_message(
            &mut self,
            msg: Job,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            match msg {
                Job::Count => {
                    self.count += 1;
                    self.journal.record(format!("count={}", self.count));
                    Ok(())
                }
                Job::Fail => Err(Error::Functional("ignored".to_owned())),
            }
        }
    }

    #[tokio::test]
    async fn test_resume_keeps_instance() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();
        let inner = journal.clone();
        let actor = system
            .create_root_actor("tolerant", move || Tolerant {
                count: 0,
                journal: inner.clone(),
            })
            .await
            .unwrap();

        actor.ask(Job::Count).await.unwrap();
        assert!(actor.ask(Job::Fail).await.is_err());
        actor.ask(Job::Count).await.unwrap();

        assert_eq!(journal.entries(), vec!["count=1", "count=2"]);
    }

    struct Escalating;

    #[async_trait]
    impl Actor for Escalating {
        type Message = Job;

        fn supervision_strategy() -> SupervisionStrategy {
            SupervisionStrategy::Escalate
        }
    }

    #[async_trait]
    impl Handler<Escalating> for Escalating {
        async fn handle_message(
            &mut self,
            _msg: Job,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            Err(Error::Functional("too hard".to_owned()))
        }
    }

    #[tokio::test]
    async fn test_escalate_reports_to_system_and_stops() {
        let (event_sender, mut events) = mpsc::channel(10);
        let system = SystemRef::new(event_sender, CancellationToken::new());
        let actor = system
            .create_root_actor("escalating", || Escalating)
            .await
            .unwrap();

        assert!(actor.ask(Job::Fail).await.is_err());

        let event = events.recv().await.unwrap();
        let SystemEvent::Failure(report) = event else {
            panic!("expected a failure event");
        };
        assert_eq!(
            report,
            FailureReport::Escalated {
                path: ActorPath::from("/user/escalating"),
                error: Error::Functional("too hard".to_owned()),
            }
        );
        actor.ask_stop().await.unwrap();
        assert!(actor.is_closed());
    }

    #[tokio::test]
    async fn test_queued_messages_rejected_after_stop() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();
        let worker = system
            .create_root_actor("worker", worker_factory(journal.clone(), 0))
            .await
            .unwrap();

        worker.tell_stop().await;
        let rejected = worker.ask(Job::Count).await;

        assert_eq!(rejected, Err(Error::Terminated(worker.path())));
        assert_eq!(journal.count("count#1=1"), 0);
    }

    /// Creates the child `clerk` from `pre_start`, like most supervisors do.
    struct Boss {
        id: usize,
        fail_start: bool,
        journal: Journal,
    }

    #[async_trait]
    impl Actor for Boss {
        type Message = Job;

        fn supervision_strategy() -> SupervisionStrategy {
            SupervisionStrategy::Restart(Box::new(NoIntervalStrategy::new(3)))
        }

        async fn pre_start(
            &mut self,
            ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            let journal = self.journal.clone();
            ctx.create_child("clerk", move || Clerk {
                journal: journal.clone(),
            })
            .await?;
            self.journal.record(format!("pre_start#{}", self.id));
            if self.fail_start {
                return Err(Error::Start("half started".to_owned()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Boss> for Boss {
        async fn handle_message(
            &mut self,
            msg: Job,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            match msg {
                Job::Count => Ok(()),
                Job::Fail => Err(Error::Functional("boss failed".to_owned())),
            }
        }
    }

    /// Takes a while to stop.
    struct Clerk {
        journal: Journal,
    }

    #[async_trait]
    impl Actor for Clerk {
        type Message = Job;

        async fn post_stop(
            &mut self,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.journal.record("post_stop(clerk)");
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Clerk> for Clerk {
        async fn handle_message(
            &mut self,
            _msg: Job,
            _ctx: &mut ActorContext,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    fn boss_factory(
        journal: Journal,
        failing: usize,
    ) -> impl Fn() -> Boss + Send + Sync + 'static {
        let built = Arc::new(AtomicUsize::new(0));
        move || {
            let id = built.fetch_add(1, Ordering::SeqCst) + 1;
            Boss {
                id,
                fail_start: id <= failing,
                journal: journal.clone(),
            }
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_restart_recreates_child_under_same_name() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();
        let boss = system
            .create_root_actor("boss", boss_factory(journal.clone(), 0))
            .await
            .unwrap();

        assert!(boss.ask(Job::Fail).await.is_err());
        assert_eq!(boss.ask(Job::Count).await, Ok(()));

        assert_eq!(
            journal.entries(),
            vec!["pre_start#1", "post_stop(clerk)", "pre_start#2"]
        );
        assert!(logs_contain("waits for 1 children before rebuilding"));
        let clerk = ActorPath::from("/user/boss/clerk");
        assert!(system.get_actor::<Clerk>(&clerk).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_start_drains_children_before_restart() {
        let (system, _runner) = ActorSystem::create(CancellationToken::new());
        let journal = Journal::default();

        let boss = system
            .create_root_actor("boss", boss_factory(journal.clone(), 1))
            .await
            .unwrap();

        assert_eq!(boss.ask(Job::Count).await, Ok(()));
        assert_eq!(
            journal.entries(),
            vec!["pre_start#1", "post_stop(clerk)", "pre_start#2"]
        );
        let clerk = ActorPath::from("/user/boss/clerk");
        assert!(system.get_actor::<Clerk>(&clerk).await.is_some());
    }
}
