//! Typed script-event definitions, registration, and per-peer pending-event
//! batching.
//!
//! Scripts declare an event's argument shape once with [`EventRegistry::register`]
//! and every later `send_event` is validated against it. This crate only
//! knows about argument tuples and batching; encoding them onto the wire
//! and invoking `event_handlers[id]` in Lua both live in `bw-scripting`.

use std::collections::HashMap;

use thiserror::Error;

/// One argument slot's declared shape. Mirrors the three shapes the
/// script host's `register_event` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    U8,
    Str16,
    U8x3,
}

/// A single argument value, tagged with the `ArgType` it was declared as.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    U8(u8),
    Str16(String),
    U8x3([u8; 3]),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::U8(_) => ArgType::U8,
            ArgValue::Str16(_) => ArgType::Str16,
            ArgValue::U8x3(_) => ArgType::U8x3,
        }
    }
}

pub type EventId = u16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event id {0} is not registered")]
    UnknownEvent(EventId),
    #[error("event id {0} already registered")]
    AlreadyRegistered(EventId),
    #[error("event id {0} expects {expected} argument(s), got {got}", expected = .1, got = .2)]
    ArityMismatch(EventId, usize, usize),
    #[error("event id {event} argument {index} has type {declared:?}, value was {actual:?}")]
    TypeMismatch {
        event: EventId,
        index: usize,
        declared: ArgType,
        actual: ArgType,
    },
}

/// An event's declared argument shape, recorded once via `register_event`.
#[derive(Debug, Clone)]
pub struct EventDecl {
    pub id: EventId,
    pub arg_types: Vec<ArgType>,
}

/// Maps event IDs to their declared shape. Owned per-world, since each
/// world's scripts may declare a different set of events (mirrors the
/// reference's per-environment `event_handlers` table).
#[derive(Default)]
pub struct EventRegistry {
    decls: HashMap<EventId, EventDecl>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: EventId, arg_types: Vec<ArgType>) -> Result<(), EventError> {
        if self.decls.contains_key(&id) {
            return Err(EventError::AlreadyRegistered(id));
        }
        self.decls.insert(id, EventDecl { id, arg_types });
        Ok(())
    }

    pub fn get(&self, id: EventId) -> Option<&EventDecl> {
        self.decls.get(&id)
    }

    /// Validates `args` against the declared shape for `id`, returning the
    /// validated tuple unchanged on success.
    pub fn validate(&self, id: EventId, args: &[ArgValue]) -> Result<(), EventError> {
        let decl = self.decls.get(&id).ok_or(EventError::UnknownEvent(id))?;
        if decl.arg_types.len() != args.len() {
            return Err(EventError::ArityMismatch(id, decl.arg_types.len(), args.len()));
        }
        for (index, (declared, value)) in decl.arg_types.iter().zip(args).enumerate() {
            let actual = value.arg_type();
            if actual != *declared {
                return Err(EventError::TypeMismatch {
                    event: id,
                    index,
                    declared: *declared,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// A single outgoing event occurrence: which event, whose args, and the
/// acting player's peer id if the send attached one (per §4.8, "the
/// sender may also attach an actor").
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub id: EventId,
    pub args: Vec<ArgValue>,
    pub actor: Option<u32>,
}

/// Per-world outbox: events queued by scripts this tick, batched per
/// recipient peer and drained once per tick by the server's broadcast
/// step, mirroring `WorldMeta`'s pending script-event map.
#[derive(Default)]
pub struct EventOutbox {
    pending: HashMap<u32, Vec<PendingEvent>>,
    /// Events queued with no explicit recipient (`env.send_event`'s
    /// literal form, §4.8): fanned out to every peer in the sender's
    /// world when the server drains the outbox for that world's tick.
    broadcast: Vec<PendingEvent>,
}

impl EventOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_event(
        &mut self,
        registry: &EventRegistry,
        recipient: u32,
        id: EventId,
        args: Vec<ArgValue>,
        actor: Option<u32>,
    ) -> Result<(), EventError> {
        registry.validate(id, &args)?;
        self.pending.entry(recipient).or_default().push(PendingEvent { id, args, actor });
        Ok(())
    }

    /// Broadcasts the same validated event to every peer in `recipients`.
    pub fn broadcast_event(
        &mut self,
        registry: &EventRegistry,
        recipients: impl IntoIterator<Item = u32>,
        id: EventId,
        args: Vec<ArgValue>,
        actor: Option<u32>,
    ) -> Result<(), EventError> {
        registry.validate(id, &args)?;
        for peer in recipients {
            self.pending
                .entry(peer)
                .or_default()
                .push(PendingEvent { id, args: args.clone(), actor });
        }
        Ok(())
    }

    /// Queues an event with no explicit recipient, to be fanned out to
    /// every peer in the sender's world at drain time. This is the shape
    /// `env.send_event(event_id, args…)` takes: the script names no
    /// recipient, only an event and its arguments.
    pub fn queue_broadcast(
        &mut self,
        registry: &EventRegistry,
        id: EventId,
        args: Vec<ArgValue>,
        actor: Option<u32>,
    ) -> Result<(), EventError> {
        registry.validate(id, &args)?;
        self.broadcast.push(PendingEvent { id, args, actor });
        Ok(())
    }

    /// Drains and returns every pending event queued for `peer`, in send
    /// order.
    pub fn drain_for(&mut self, peer: u32) -> Vec<PendingEvent> {
        self.pending.remove(&peer).unwrap_or_default()
    }

    /// Drains every recipient-less broadcast event queued this tick. The
    /// caller fans these out to every peer currently in the sender's
    /// world.
    pub fn drain_broadcasts(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.broadcast)
    }

    /// Drains the entire outbox, keyed by recipient. Used by the server's
    /// tick loop to batch-deliver every world's pending events at once.
    pub fn drain_all(&mut self) -> HashMap<u32, Vec<PendingEvent>> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(|v| v.is_empty()) && self.broadcast.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_validate_matching_args_succeeds() {
        let mut reg = EventRegistry::new();
        reg.register(1, vec![ArgType::U8, ArgType::Str16]).unwrap();
        let args = vec![ArgValue::U8(3), ArgValue::Str16("hi".into())];
        assert!(reg.validate(1, &args).is_ok());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = EventRegistry::new();
        reg.register(1, vec![ArgType::U8]).unwrap();
        assert_eq!(reg.register(1, vec![ArgType::U8]), Err(EventError::AlreadyRegistered(1)));
    }

    #[test]
    fn unknown_event_id_is_rejected_on_validate() {
        let reg = EventRegistry::new();
        assert_eq!(reg.validate(42, &[]), Err(EventError::UnknownEvent(42)));
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut reg = EventRegistry::new();
        reg.register(1, vec![ArgType::U8, ArgType::U8]).unwrap();
        let err = reg.validate(1, &[ArgValue::U8(1)]).unwrap_err();
        assert_eq!(err, EventError::ArityMismatch(1, 2, 1));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut reg = EventRegistry::new();
        reg.register(1, vec![ArgType::U8]).unwrap();
        let err = reg.validate(1, &[ArgValue::Str16("x".into())]).unwrap_err();
        assert!(matches!(err, EventError::TypeMismatch { event: 1, index: 0, .. }));
    }

    #[test]
    fn send_event_batches_per_recipient_in_order() {
        let mut reg = EventRegistry::new();
        reg.register(1, vec![ArgType::U8]).unwrap();
        let mut outbox = EventOutbox::new();
        outbox.send_event(&reg, 7, 1, vec![ArgValue::U8(1)], Some(99)).unwrap();
        outbox.send_event(&reg, 7, 1, vec![ArgValue::U8(2)], Some(99)).unwrap();
        let drained = outbox.drain_for(7);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].args, vec![ArgValue::U8(1)]);
        assert_eq!(drained[1].args, vec![ArgValue::U8(2)]);
        assert!(outbox.drain_for(7).is_empty());
    }

    #[test]
    fn broadcast_event_reaches_every_recipient() {
        let mut reg = EventRegistry::new();
        reg.register(5, vec![]).unwrap();
        let mut outbox = EventOutbox::new();
        outbox.broadcast_event(&reg, [1, 2, 3], 5, vec![], None).unwrap();
        for peer in [1, 2, 3] {
            assert_eq!(outbox.drain_for(peer).len(), 1);
        }
    }

    #[test]
    fn queue_broadcast_is_kept_separate_from_targeted_sends() {
        let mut reg = EventRegistry::new();
        reg.register(1, vec![ArgType::U8]).unwrap();
        let mut outbox = EventOutbox::new();
        outbox.queue_broadcast(&reg, 1, vec![ArgValue::U8(5)], Some(3)).unwrap();
        outbox.send_event(&reg, 9, 1, vec![ArgValue::U8(1)], Some(3)).unwrap();

        let broadcasts = outbox.drain_broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].args, vec![ArgValue::U8(5)]);
        assert_eq!(outbox.drain_for(9).len(), 1);
        assert!(outbox.drain_broadcasts().is_empty());
    }

    #[test]
    fn send_with_unregistered_event_does_not_queue_anything() {
        let reg = EventRegistry::new();
        let mut outbox = EventOutbox::new();
        assert!(outbox.send_event(&reg, 1, 999, vec![], None).is_err());
        assert!(outbox.is_empty());
    }
}
