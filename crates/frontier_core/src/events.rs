//! Territory events and the synchronous event bus.
//!
//! Borders react to world changes (resources spawning, buildings being
//! placed, other borders letting go of resources) by subscribing to
//! [`EventTopic`]s. Events are queued and delivered FIFO within the call
//! that raised them; nothing is deferred to a later tick.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::territory::BorderId;

/// Something that happened to the territory world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerritoryEvent {
    /// A border became active.
    BorderActivated {
        /// Border id.
        border: BorderId,
        /// Building owning the border.
        owner: EntityId,
    },
    /// A border was disabled for good.
    BorderDisabled {
        /// Border id.
        border: BorderId,
    },
    /// A resource entered the world.
    ResourceSpawned {
        /// Resource id.
        resource: EntityId,
    },
    /// A border started tracking a resource.
    ResourceAdded {
        /// Border id.
        border: BorderId,
        /// Resource id.
        resource: EntityId,
    },
    /// A border stopped tracking a resource.
    ResourceRemovedFromBorder {
        /// Border id.
        border: BorderId,
        /// Resource id.
        resource: EntityId,
    },
    /// A resource was destroyed.
    ResourceDestroyed {
        /// Resource id.
        resource: EntityId,
    },
    /// A building finished placement.
    BuildingPlaced {
        /// Building id.
        building: EntityId,
    },
    /// A border started tracking a building.
    BuildingAdded {
        /// Border id.
        border: BorderId,
        /// Building id.
        building: EntityId,
    },
    /// A border stopped tracking a building.
    BuildingRemoved {
        /// Border id.
        border: BorderId,
        /// Building id.
        building: EntityId,
    },
    /// A building was destroyed.
    BuildingDestroyed {
        /// Building id.
        building: EntityId,
    },
}

/// Subscription topic; one per [`TerritoryEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// [`TerritoryEvent::BorderActivated`]
    BorderActivated,
    /// [`TerritoryEvent::BorderDisabled`]
    BorderDisabled,
    /// [`TerritoryEvent::ResourceSpawned`]
    ResourceSpawned,
    /// [`TerritoryEvent::ResourceAdded`]
    ResourceAdded,
    /// [`TerritoryEvent::ResourceRemovedFromBorder`]
    ResourceRemovedFromBorder,
    /// [`TerritoryEvent::ResourceDestroyed`]
    ResourceDestroyed,
    /// [`TerritoryEvent::BuildingPlaced`]
    BuildingPlaced,
    /// [`TerritoryEvent::BuildingAdded`]
    BuildingAdded,
    /// [`TerritoryEvent::BuildingRemoved`]
    BuildingRemoved,
    /// [`TerritoryEvent::BuildingDestroyed`]
    BuildingDestroyed,
}

impl TerritoryEvent {
    /// Topic this event is published on.
    #[must_use]
    pub const fn topic(self) -> EventTopic {
        match self {
            Self::BorderActivated { .. } => EventTopic::BorderActivated,
            Self::BorderDisabled { .. } => EventTopic::BorderDisabled,
            Self::ResourceSpawned { .. } => EventTopic::ResourceSpawned,
            Self::ResourceAdded { .. } => EventTopic::ResourceAdded,
            Self::ResourceRemovedFromBorder { .. } => EventTopic::ResourceRemovedFromBorder,
            Self::ResourceDestroyed { .. } => EventTopic::ResourceDestroyed,
            Self::BuildingPlaced { .. } => EventTopic::BuildingPlaced,
            Self::BuildingAdded { .. } => EventTopic::BuildingAdded,
            Self::BuildingRemoved { .. } => EventTopic::BuildingRemoved,
            Self::BuildingDestroyed { .. } => EventTopic::BuildingDestroyed,
        }
    }
}

/// Events kept in the drainable log before the oldest are dropped.
pub const EVENT_LOG_CAPACITY: usize = 1024;

/// Typed publish/subscribe bus with a pending queue and a drainable log.
///
/// Subscribers are borders; the owning world dispatches each queued event
/// to the subscribers of its topic in ascending border order.
///
/// Only the subscriptions are world state. The pending queue is empty
/// between world calls and the log is an output channel, so neither is
/// serialized or compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBus {
    subscriptions: BTreeMap<EventTopic, BTreeSet<BorderId>>,
    #[serde(skip)]
    pending: VecDeque<TerritoryEvent>,
    #[serde(skip)]
    log: VecDeque<TerritoryEvent>,
}

impl PartialEq for EventBus {
    fn eq(&self, other: &Self) -> bool {
        self.subscriptions == other.subscriptions
    }
}

impl Eq for EventBus {}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `subscriber` to `topic`. Returns `false` if it already was.
    pub fn subscribe(&mut self, topic: EventTopic, subscriber: BorderId) -> bool {
        self.subscriptions.entry(topic).or_default().insert(subscriber)
    }

    /// Drop a single subscription.
    pub fn unsubscribe(&mut self, topic: EventTopic, subscriber: BorderId) -> bool {
        self.subscriptions
            .get_mut(&topic)
            .is_some_and(|set| set.remove(&subscriber))
    }

    /// Drop every subscription of `subscriber`.
    pub fn unsubscribe_all(&mut self, subscriber: BorderId) {
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(&subscriber);
        }
    }

    /// Whether `subscriber` listens to `topic`.
    #[must_use]
    pub fn is_subscribed(&self, topic: EventTopic, subscriber: BorderId) -> bool {
        self.subscriptions
            .get(&topic)
            .is_some_and(|set| set.contains(&subscriber))
    }

    /// Subscribers of `topic`, ascending.
    #[must_use]
    pub fn subscribers(&self, topic: EventTopic) -> Vec<BorderId> {
        self.subscriptions
            .get(&topic)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Queue an event and record it in the log.
    ///
    /// A full log drops its oldest event.
    pub fn publish(&mut self, event: TerritoryEvent) {
        tracing::trace!(?event, "Territory event");
        self.pending.push_back(event);
        if self.log.len() == EVENT_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(event);
    }

    /// Next undelivered event.
    pub fn next_pending(&mut self) -> Option<TerritoryEvent> {
        self.pending.pop_front()
    }

    /// Number of undelivered events.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take every logged event published since the last drain.
    pub fn drain_log(&mut self) -> Vec<TerritoryEvent> {
        self.log.drain(..).collect()
    }
}
