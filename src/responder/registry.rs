//! The fixed set of responders.
//!
//! Responders sit in a slot arena in the order they were added. A
//! responder's [`ResponderId`] is its slot index and "next" is simply the
//! following slot. New connections are offered in slot order until one
//! responder takes them.

use crate::net::{Context, Socket};
use crate::responder::diagnostics::DiagnosticSink;
use crate::responder::lock::ResponderId;
use crate::responder::state::Protocol;
use crate::responder::{NetworkResponder, Responder};

pub struct ResponderRegistry {
    slots: Vec<Responder>,
    capacity: usize,
}

impl ResponderRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a responder built for the next free slot.
    pub fn push_with(
        &mut self,
        build: impl FnOnce(ResponderId) -> Responder,
    ) -> anyhow::Result<ResponderId> {
        if self.slots.len() >= self.capacity {
            anyhow::bail!("Responder registry full ({} slots)", self.capacity);
        }
        let id = ResponderId(self.slots.len());
        let responder = build(id);
        debug_assert_eq!(responder.id(), id);
        self.slots.push(responder);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn first(&self) -> Option<ResponderId> {
        (!self.slots.is_empty()).then_some(ResponderId(0))
    }

    pub fn next(&self, id: ResponderId) -> Option<ResponderId> {
        let next = id.0 + 1;
        (next < self.slots.len()).then_some(ResponderId(next))
    }

    pub fn get(&self, id: ResponderId) -> Option<&Responder> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: ResponderId) -> Option<&mut Responder> {
        self.slots.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Responder> {
        self.slots.iter()
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|r| r.is_free()).count()
    }

    /// Offers `socket` to each responder in order. Returns the one that
    /// took it, or the socket if none would.
    pub fn accept(
        &mut self,
        mut socket: Box<dyn Socket>,
        protocol: Protocol,
        ctx: &mut Context<'_>,
    ) -> Result<ResponderId, Box<dyn Socket>> {
        for responder in &mut self.slots {
            match responder.accept(socket, protocol, ctx) {
                Ok(()) => return Ok(responder.id()),
                Err(returned) => socket = returned,
            }
        }
        tracing::warn!(protocol = %protocol, "No free responder for connection");
        Err(socket)
    }

    /// Spins every active responder once. Returns whether any made progress.
    pub fn spin(&mut self, ctx: &mut Context<'_>) -> bool {
        let mut progress = false;
        for responder in &mut self.slots {
            if !responder.is_free() {
                progress |= responder.spin(ctx);
            }
        }
        progress
    }

    pub fn terminate(&mut self, protocol: Protocol, ctx: &mut Context<'_>) {
        for responder in &mut self.slots {
            responder.terminate(protocol, ctx);
        }
    }

    pub fn diagnostics(&self, sink: &mut dyn DiagnosticSink) {
        for responder in &self.slots {
            responder.diagnostics(sink);
        }
    }
}
