// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Failure context
//!
//! Record of a failure that led to a restart: the error and, when the failure happened while
//! processing a message, that message. It lives for exactly one restart cycle. The controller
//! takes it by value and only lends it to the restart hooks, so it can not be replayed.
//!

use crate::Error;

#[derive(Debug)]
pub struct FailureContext<M> {
    cause: Error,
    message: Option<M>,
}

impl<M> FailureContext<M> {
    pub fn new(cause: Error, message: Option<M>) -> Self {
        Self { cause, message }
    }

    /// Failure that did not come from a message, e.g. a failed start.
    pub fn without_message(cause: Error) -> Self {
        Self {
            cause,
            message: None,
        }
    }

    pub fn cause(&self) -> &Error {
        &self.cause
    }

    /// The message being processed when the actor failed, if any.
    pub fn message(&self) -> Option<&M> {
        self.message.as_ref()
    }

    pub fn into_parts(self) -> (Error, Option<M>) {
        (self.cause, self.message)
    }
}
