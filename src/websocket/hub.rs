//! Room Hub
//!
//! Maps each conversation to the set of connections currently joined to it
//! and fans published events out to them.
//!
//! # Backpressure
//!
//! Publishing never waits. Every joined endpoint gets a non-blocking enqueue
//! onto its bounded outbound queue; an endpoint whose queue is full is evicted
//! from its room on the spot and its close signal is fired, so the client sees
//! a disconnect and can resynchronise through the history endpoint. Events are
//! never dropped silently on a connection that stays open.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::endpoint::{DeliveryError, Endpoint, EndpointHandle, EndpointId};
use super::messages::Event;
use crate::types::{ConversationId, UserId};

/// Members of one room, keyed by endpoint id
type Room = HashMap<EndpointId, Arc<EndpointHandle>>;

/// Configuration for the room hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue
    pub queue_capacity: usize,
    /// Soft limit on concurrently joined connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            max_connections: 10_000,
        }
    }
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Endpoints that accepted the event
    pub delivered: usize,
    /// Endpoints evicted because they could not accept it
    pub evicted: usize,
}

/// Point-in-time counters for health reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Registry of per-conversation rooms
pub struct RoomHub {
    rooms: RwLock<HashMap<ConversationId, Room>>,
    config: HubConfig,
}

impl RoomHub {
    /// Create an empty hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Allocate an endpoint sized by this hub's queue capacity. Not joined yet.
    pub fn create_endpoint(&self, subject: UserId, conversation_id: ConversationId) -> Endpoint {
        Endpoint::new(subject, conversation_id, self.config.queue_capacity)
    }

    /// Add an endpoint to the room of its conversation, creating the room if needed
    pub fn join(&self, handle: &Arc<EndpointHandle>) {
        let mut rooms = self.write();
        let room = rooms.entry(handle.conversation_id()).or_default();
        room.insert(handle.id(), Arc::clone(handle));

        tracing::debug!(
            connection_id = %handle.id(),
            conversation_id = %handle.conversation_id(),
            members = room.len(),
            "Joined room"
        );
    }

    /// Remove an endpoint from its room. Returns `false` if it was not a member.
    pub fn leave(&self, handle: &EndpointHandle) -> bool {
        self.leave_by_id(handle.conversation_id(), handle.id())
    }

    /// Remove an endpoint by id. Empty rooms are dropped immediately.
    pub fn leave_by_id(&self, conversation_id: ConversationId, id: EndpointId) -> bool {
        let removed = remove_member(&mut self.write(), conversation_id, id);

        if removed {
            tracing::debug!(
                connection_id = %id,
                conversation_id = %conversation_id,
                "Left room"
            );
        }

        removed
    }

    /// Fan an event out to every endpoint joined to its conversation.
    ///
    /// A conversation with no joined endpoints is a no-op. The caller is never
    /// blocked on socket I/O and has nothing to handle on failure.
    pub fn publish(&self, event: Event) -> PublishReport {
        let conversation_id = event.conversation_id;
        let event = Arc::new(event);
        let mut report = PublishReport::default();
        let mut rejected: Vec<(Arc<EndpointHandle>, DeliveryError)> = Vec::new();

        {
            let rooms = self.read();
            let Some(room) = rooms.get(&conversation_id) else {
                tracing::trace!(conversation_id = %conversation_id, "Publish to empty room");
                return report;
            };

            for handle in room.values() {
                match handle.try_deliver(&event) {
                    Ok(()) => report.delivered += 1,
                    Err(reason) => rejected.push((Arc::clone(handle), reason)),
                }
            }
        }

        if !rejected.is_empty() {
            let mut rooms = self.write();
            for (handle, reason) in &rejected {
                remove_member(&mut rooms, conversation_id, handle.id());
                handle.close();
                report.evicted += 1;

                tracing::warn!(
                    connection_id = %handle.id(),
                    conversation_id = %conversation_id,
                    subject = %handle.subject(),
                    reason = ?reason,
                    "Evicted connection that could not keep up"
                );
            }
        }

        tracing::trace!(
            conversation_id = %conversation_id,
            kind = event.kind.as_str(),
            delivered = report.delivered,
            evicted = report.evicted,
            "Published event"
        );

        report
    }

    /// Whether the soft connection limit has been reached
    pub fn at_capacity(&self) -> bool {
        self.connection_count() >= self.config.max_connections
    }

    /// Number of rooms with at least one member
    pub fn room_count(&self) -> usize {
        self.read().len()
    }

    /// Number of joined endpoints across all rooms
    pub fn connection_count(&self) -> usize {
        self.read().values().map(HashMap::len).sum()
    }

    /// Ids of endpoints joined to a conversation
    pub fn members(&self, conversation_id: ConversationId) -> Vec<EndpointId> {
        self.read()
            .get(&conversation_id)
            .map(|room| room.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, conversation_id: ConversationId) -> bool {
        self.read().contains_key(&conversation_id)
    }

    pub fn stats(&self) -> HubStats {
        let rooms = self.read();
        HubStats {
            rooms: rooms.len(),
            connections: rooms.values().map(HashMap::len).sum(),
        }
    }

    /// Fire the close signal of every joined endpoint (process shutdown)
    pub fn close_all(&self) {
        let rooms = self.read();
        for handle in rooms.values().flat_map(HashMap::values) {
            handle.close();
        }
    }

    // Critical sections never panic while holding the lock, so a poisoned
    // lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConversationId, Room>> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConversationId, Room>> {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

fn remove_member(
    rooms: &mut HashMap<ConversationId, Room>,
    conversation_id: ConversationId,
    id: EndpointId,
) -> bool {
    let Some(room) = rooms.get_mut(&conversation_id) else {
        return false;
    };

    let removed = room.remove(&id).is_some();
    if room.is_empty() {
        rooms.remove(&conversation_id);
    }
    removed
}
