//! Correlation of replies with the requests that caused them.
//!
//! Each outstanding request is keyed by its request ID and tagged with the
//! connection generation it was sent on. A reply is delivered to its
//! handler at most once: the entry is removed before the handler runs.
//! Handlers run with the registry locked, so they must only hand the reply
//! off (oneshot send, atomic store) and never call back into the registry.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, trace};

use vex_shared::protocol::Inbound;
use vex_shared::types::RequestId;

use crate::error::ClientError;

/// Why a request was dropped without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandoned {
    ConnectionLost,
    LoggedOut,
}

impl From<Abandoned> for ClientError {
    fn from(reason: Abandoned) -> Self {
        match reason {
            Abandoned::ConnectionLost => ClientError::ConnectionLost,
            Abandoned::LoggedOut => ClientError::LoggedOut,
        }
    }
}

/// What a handler receives: the correlated reply, success or error alike,
/// or the reason it will never arrive.
pub type Reply = Result<Inbound, Abandoned>;

pub type Handler = Box<dyn FnOnce(Reply) + Send>;

struct Pending {
    generation: u64,
    created_at: Instant,
    handler: Handler,
}

/// Outcome of routing an inbound frame through the registry.
#[derive(Debug)]
pub enum Dispatch {
    Delivered,
    /// No pending request matched; the frame is a push.
    Unsolicited(Inbound),
}

#[derive(Default)]
pub struct Registry {
    pending: HashMap<RequestId, Pending>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: RequestId,
        generation: u64,
        handler: Handler,
    ) -> Result<(), ClientError> {
        if self.pending.contains_key(&id) {
            return Err(ClientError::DuplicateRequestId(id));
        }
        trace!(request_id = %id, generation, "Registered pending request");
        self.pending.insert(
            id,
            Pending {
                generation,
                created_at: Instant::now(),
                handler,
            },
        );
        Ok(())
    }

    /// Hand `inbound` to the handler waiting on its request ID.
    pub fn dispatch(&mut self, inbound: Inbound) -> Dispatch {
        let entry = inbound
            .request_id
            .as_ref()
            .and_then(|id| self.pending.remove(id));

        match entry {
            Some(pending) => {
                trace!(
                    kind = %inbound.kind,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    "Delivering reply"
                );
                (pending.handler)(Ok(inbound));
                Dispatch::Delivered
            }
            None => Dispatch::Unsolicited(inbound),
        }
    }

    /// Forget a request without running its handler. Used when the caller
    /// has already given up (send failure, timeout).
    pub fn cancel(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Fail every pending request with `reason`.
    pub fn abandon_all(&mut self, reason: Abandoned) -> usize {
        let drained: Vec<_> = self.pending.drain().collect();
        let count = drained.len();
        for (id, pending) in drained {
            trace!(request_id = %id, age_ms = pending.created_at.elapsed().as_millis() as u64, "Abandoning request");
            (pending.handler)(Err(reason));
        }
        if count > 0 {
            debug!(count, ?reason, "Abandoned pending requests");
        }
        count
    }

    /// Fail requests sent on a generation older than `current`.
    pub fn abandon_stale(&mut self, current: u64, reason: Abandoned) -> usize {
        let stale: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.generation < current)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(pending) = self.pending.remove(id) {
                (pending.handler)(Err(reason));
            }
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), current, "Abandoned stale requests");
        }
        stale.len()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
