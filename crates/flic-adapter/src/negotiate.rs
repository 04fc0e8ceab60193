//! Connection negotiation state machine
//!
//! Opening a connection channel can end three ways: the creation ack
//! reports the channel already live (or rejects it for capacity), a
//! later status change reports it live, or the daemon removes the
//! channel. A 30-second budget starts at the plain ack; when it expires
//! the channel is abandoned and the daemon's removal echo carries the
//! timeout outcome. Whichever outcome lands first wins; everything after
//! a resolution is ignored.

use std::time::Duration;

use tokio::time::Instant;

use flic_core::events::{
    ConnectionChannelRemoved, ConnectionStatusChanged, CreateConnectionChannelResponse,
};
use flic_core::prelude::*;
use flic_core::types::{BdAddr, ConnectionStatus, CreateConnectionChannelError, RemovedReason};

/// Time allowed between the creation ack and the channel going live
pub const NEGOTIATION_BUDGET: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Channel creation sent, no ack yet
    AwaitingAck,
    /// Ack received, waiting for the channel to go live
    AwaitingReady { deadline: Instant },
    /// Budget expired, channel removal requested; the removal echo
    /// resolves the negotiation
    Abandoning,
    /// Terminal; further events are ignored
    Resolved,
}

/// What the adapter should do after feeding an event to a negotiation
#[derive(Debug)]
pub enum NegotiationStep {
    /// Still pending, nothing to do
    Continue,
    /// The channel is live; promote to a connected button
    Success,
    /// The negotiation failed with this error; drop the slot
    Failure(Error),
    /// Budget expired; request channel removal and wait for the echo
    Abandon,
}

/// One in-flight connection attempt for a single address
#[derive(Debug)]
pub struct Negotiation {
    pub bd_addr: BdAddr,
    pub conn_id: u32,
    /// Name to register the device under once the channel is live
    pub name: String,
    state: State,
}

impl Negotiation {
    pub fn new(bd_addr: BdAddr, conn_id: u32, name: String) -> Self {
        Self {
            bd_addr,
            conn_id,
            name,
            state: State::AwaitingAck,
        }
    }

    /// Deadline to feed into the event loop timer, if one is armed
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::AwaitingReady { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state == State::Resolved
    }

    /// Feed the creation ack
    pub fn on_create_response(&mut self, resp: &CreateConnectionChannelResponse) -> NegotiationStep {
        if self.state != State::AwaitingAck {
            return NegotiationStep::Continue;
        }

        if resp.error != CreateConnectionChannelError::NoError {
            self.state = State::Resolved;
            return NegotiationStep::Failure(Error::TooManyPendingConnections);
        }

        if resp.connection_status == ConnectionStatus::Ready {
            self.state = State::Resolved;
            return NegotiationStep::Success;
        }

        debug!("Channel {} acked for {}, waiting for ready", self.conn_id, self.bd_addr);
        self.state = State::AwaitingReady {
            deadline: Instant::now() + NEGOTIATION_BUDGET,
        };
        NegotiationStep::Continue
    }

    /// Feed a connection status change
    pub fn on_status_changed(&mut self, changed: &ConnectionStatusChanged) -> NegotiationStep {
        match self.state {
            State::AwaitingAck | State::AwaitingReady { .. }
                if changed.connection_status == ConnectionStatus::Ready =>
            {
                self.state = State::Resolved;
                NegotiationStep::Success
            }
            _ => NegotiationStep::Continue,
        }
    }

    /// Feed a channel removal
    pub fn on_removed(&mut self, removed: &ConnectionChannelRemoved) -> NegotiationStep {
        if self.state == State::Resolved {
            return NegotiationStep::Continue;
        }

        self.state = State::Resolved;
        if removed.removed_reason == RemovedReason::RemovedByThisClient {
            // Our own abandonment coming back around
            NegotiationStep::Failure(Error::NegotiationTimedOut)
        } else {
            NegotiationStep::Failure(Error::ChannelRemoved {
                reason: removed.removed_reason,
            })
        }
    }

    /// Check the budget; past the deadline the channel is abandoned
    pub fn on_deadline(&mut self, now: Instant) -> NegotiationStep {
        match self.state {
            State::AwaitingReady { deadline } if now >= deadline => {
                warn!("Connection attempt for {} exceeded its budget", self.bd_addr);
                self.state = State::Abandoning;
                NegotiationStep::Abandon
            }
            _ => NegotiationStep::Continue,
        }
    }
}
