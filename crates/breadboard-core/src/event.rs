//! Synchronous publish/subscribe bus.
//!
//! [`EventBus::publish`] delivers an event immediately to every subscriber
//! registered for its kind, in registration order. Nothing is buffered or
//! replayed: a subscriber added after a publish never sees that event.
//!
//! A panicking subscriber is caught and logged; remaining subscribers still
//! receive the event and the publisher never observes the panic.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`]. Publishing a
//! suppressed kind is a no-op.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::fixed::{Fixed64, Ticks};
use crate::id::{ComponentId, NetId, PinId, SubscriptionId};
use crate::signal::Level;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// One participant in a short circuit: the pin and the level it asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortDriver {
    pub component: ComponentId,
    pub pin: PinId,
    pub level: Level,
}

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    /// A board output pin changed level (or stopped driving, `level: None`).
    OutputPinSet {
        component: ComponentId,
        pin: PinId,
        level: Option<Level>,
        tick: Ticks,
    },
    /// A servo's rendered angle moved.
    ServoAngleSet {
        component: ComponentId,
        angle: Fixed64,
        tick: Ticks,
    },
    /// Strong drivers on one net disagree.
    ShortCircuit {
        net: NetId,
        drivers: Vec<ShortDriver>,
        tick: Ticks,
    },
    /// Something degraded but the tick went on.
    Warning {
        component: Option<ComponentId>,
        message: String,
        tick: Ticks,
    },
    /// A sensor produced a new reading.
    SensorValueUpdate {
        component: ComponentId,
        value: Fixed64,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for subscription and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    OutputPinSet,
    ServoAngleSet,
    ShortCircuit,
    Warning,
    SensorValueUpdate,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 5;

impl SimEvent {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SimEvent::OutputPinSet { .. } => EventKind::OutputPinSet,
            SimEvent::ServoAngleSet { .. } => EventKind::ServoAngleSet,
            SimEvent::ShortCircuit { .. } => EventKind::ShortCircuit,
            SimEvent::Warning { .. } => EventKind::Warning,
            SimEvent::SensorValueUpdate { .. } => EventKind::SensorValueUpdate,
        }
    }

    pub fn tick(&self) -> Ticks {
        match self {
            SimEvent::OutputPinSet { tick, .. }
            | SimEvent::ServoAngleSet { tick, .. }
            | SimEvent::ShortCircuit { tick, .. }
            | SimEvent::Warning { tick, .. }
            | SimEvent::SensorValueUpdate { tick, .. } => *tick,
        }
    }

    /// A warning not tied to any component.
    pub fn warning(message: impl Into<String>, tick: Ticks) -> Self {
        SimEvent::Warning {
            component: None,
            message: message.into(),
            tick,
        }
    }
}

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::OutputPinSet,
        EventKind::ServoAngleSet,
        EventKind::ShortCircuit,
        EventKind::Warning,
        EventKind::SensorValueUpdate,
    ];

    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A subscriber receives events read-only.
pub type Handler = Box<dyn FnMut(&SimEvent)>;

struct Subscriber {
    kind: EventKind,
    handler: Handler,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("kind", &self.kind)
            .field("handler", &"<fn>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// The central event bus: subscribers per kind plus suppression flags.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: SlotMap<SubscriptionId, Subscriber>,
    /// Delivery order per kind.
    order: [Vec<SubscriptionId>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    /// Lifetime publish count per kind, including suppressed kinds.
    published: [u64; EVENT_KIND_COUNT],
    /// Subscriber panics caught so far.
    panics: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`. Keep the id to unsubscribe later.
    pub fn subscribe(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = self.subscribers.insert(Subscriber { kind, handler });
        self.order[kind.index()].push(id);
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.subscribers.remove(id) else {
            return false;
        };
        self.order[sub.kind.index()].retain(|s| *s != id);
        true
    }

    /// Deliver `event` to every current subscriber of its kind.
    pub fn publish(&mut self, event: &SimEvent) {
        let idx = event.kind().index();
        self.published[idx] += 1;
        if self.suppressed[idx] {
            return;
        }
        for id in &self.order[idx] {
            let Some(sub) = self.subscribers.get_mut(*id) else {
                continue;
            };
            let handler = &mut sub.handler;
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                self.panics += 1;
                log::error!("event subscriber panicked while handling {:?}", event.kind());
            }
        }
    }

    /// Publish each event in order.
    pub fn publish_all<'a>(&mut self, events: impl IntoIterator<Item = &'a SimEvent>) {
        for e in events {
            self.publish(e);
        }
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.order[kind.index()].len()
    }

    pub fn total_published(&self, kind: EventKind) -> u64 {
        self.published[kind.index()]
    }

    pub fn caught_panics(&self) -> u64 {
        self.panics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn warning(tick: Ticks) -> SimEvent {
        SimEvent::warning("test", tick)
    }

    fn servo(tick: Ticks) -> SimEvent {
        SimEvent::ServoAngleSet {
            component: ComponentId::from("servo-1"),
            angle: Fixed64::from_num(45),
            tick,
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ['A', 'B', 'C'] {
            let o = order.clone();
            bus.subscribe(EventKind::Warning, Box::new(move |_| o.borrow_mut().push(tag)));
        }
        bus.publish(&warning(1));
        assert_eq!(*order.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn only_matching_kind_receives() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = count.clone();
        bus.subscribe(EventKind::ServoAngleSet, Box::new(move |_| *c.borrow_mut() += 1));
        bus.publish(&warning(1));
        bus.publish(&servo(1));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = count.clone();
        let id = bus.subscribe(EventKind::Warning, Box::new(move |_| *c.borrow_mut() += 1));
        bus.publish(&warning(1));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&warning(2));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.subscriber_count(EventKind::Warning), 0);
    }

    #[test]
    fn no_replay_for_late_subscribers() {
        let mut bus = EventBus::new();
        bus.publish(&warning(1));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe(EventKind::Warning, Box::new(move |e| s.borrow_mut().push(e.tick())));
        bus.publish(&warning(2));
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0u32));
        bus.subscribe(EventKind::Warning, Box::new(|_| panic!("boom")));
        let c = count.clone();
        bus.subscribe(EventKind::Warning, Box::new(move |_| *c.borrow_mut() += 1));

        bus.publish(&warning(1));
        bus.publish(&warning(2));

        assert_eq!(*count.borrow(), 2);
        assert_eq!(bus.caught_panics(), 2);
    }

    #[test]
    fn suppressed_kind_is_not_delivered() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = count.clone();
        bus.subscribe(EventKind::Warning, Box::new(move |_| *c.borrow_mut() += 1));
        bus.suppress(EventKind::Warning);
        bus.publish(&warning(1));
        assert_eq!(*count.borrow(), 0);
        assert_eq!(bus.total_published(EventKind::Warning), 1);
        bus.unsuppress(EventKind::Warning);
        bus.publish(&warning(2));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn event_kind_discriminant() {
        let events = vec![
            SimEvent::OutputPinSet {
                component: ComponentId::from("board-1"),
                pin: PinId::from("GPIO2"),
                level: Some(Level::High),
                tick: 0,
            },
            servo(0),
            SimEvent::ShortCircuit {
                net: NetId(0),
                drivers: vec![],
                tick: 0,
            },
            warning(0),
            SimEvent::SensorValueUpdate {
                component: ComponentId::from("temp-1"),
                value: Fixed64::from_num(22),
                tick: 0,
            },
        ];
        let kinds: Vec<EventKind> = events.iter().map(SimEvent::kind).collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(warning(3)).unwrap();
        assert_eq!(json["kind"], "warning");
        assert_eq!(json["tick"], 3);
        let back: SimEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, warning(3));
    }
}
