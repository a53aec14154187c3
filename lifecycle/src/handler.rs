// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Messages reach an actor through an unbounded mailbox of envelopes. An envelope optionally
//! carries a responder so that `ask` can learn how the message was handled, or that it was
//! never handled because the actor terminated first.
//!

use crate::{ActorPath, Error, actor::Actor};

use tokio::sync::{mpsc, oneshot};

use tracing::{debug, error};

/// Responder for a message sent with `ask`.
pub type Responder = oneshot::Sender<Result<(), Error>>;

pub(crate) struct Envelope<A: Actor> {
    message: A::Message,
    rsvp: Option<Responder>,
}

impl<A: Actor> Envelope<A> {
    pub(crate) fn new(message: A::Message, rsvp: Option<Responder>) -> Self {
        Self { message, rsvp }
    }

    pub(crate) fn into_parts(self) -> (A::Message, Option<Responder>) {
        (self.message, self.rsvp)
    }

    /// Answers the sender of a message that will never be handled.
    pub(crate) fn reject(self, error: Error) {
        respond(self.rsvp, Err(error));
    }
}

pub(crate) fn respond(rsvp: Option<Responder>, result: Result<(), Error>) {
    if let Some(rsvp) = rsvp {
        debug!("Sending back response.");
        rsvp.send(result).unwrap_or_else(|_failed| {
            debug!("Sender is no longer waiting for the response.");
        })
    }
}

pub(crate) type MailboxReceiver<A> = mpsc::UnboundedReceiver<Envelope<A>>;

pub(crate) type MailboxSender<A> = mpsc::UnboundedSender<Envelope<A>>;

pub(crate) type Mailbox<A> = (MailboxSender<A>, MailboxReceiver<A>);

pub(crate) fn mailbox<A: Actor>() -> Mailbox<A> {
    mpsc::unbounded_channel()
}

pub(crate) struct HandleHelper<A: Actor> {
    sender: MailboxSender<A>,
}

impl<A> HandleHelper<A>
where
    A: Actor,
{
    pub(crate) fn new(sender: MailboxSender<A>) -> Self {
        debug!("Creating new handle reference.");
        Self { sender }
    }

    /// Enqueues an envelope. Fails with `Error::Terminated` once the actor is gone; the
    /// envelope's responder, if any, is answered with the same error.
    pub(crate) async fn send(
        &self,
        path: &ActorPath,
        envelope: Envelope<A>,
    ) -> Result<(), Error> {
        if let Err(failed) = self.sender.send(envelope) {
            error!("Failed to deliver message to terminated actor {}.", path);
            failed.0.reject(Error::Terminated(path.clone()));
            Err(Error::Terminated(path.clone()))
        } else {
            debug!("Message sent successfully.");
            Ok(())
        }
    }
}

impl<A: Actor> Clone for HandleHelper<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
