//! Core library for the Rush lifecycle framework.
//! Provides actor lifecycle hooks, crash recovery and the engine running them.
//! Actors keep their identity, children and watch relations across restarts while their
//! instances are replaced.

pub use lifecycle::{
    Actor, ActorContext, ActorPath, ActorRef, ActorSystem, AroundHooks,
    ChildRegistry, ChildSignals, Delivery, Directive, Error as ActorError,
    ExponentialBackoffStrategy, Factory, FailureContext, FailureReport,
    FailureReporter, FixedIntervalStrategy, Handler, LifecycleController,
    LifecycleState, Message, NoIntervalStrategy, Passthrough, Responder,
    RestartOutcome, RetryStrategy, StopProgress, SupervisionStrategy,
    SystemEvent, SystemRef, SystemRunner, Traced, WatchSet,
};
