// Copyright 2024 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The seam between the registry and the Matrix client it listens to.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
};

use ruma::{
    events::{AnySyncStateEvent, AnySyncTimelineEvent},
    serde::Raw,
    OwnedRoomId,
};
use tracing::{debug, error};

use crate::RoomEvent;

/// The kind of room events a handler is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandlerKind {
    /// Events of the state section of a room's sync response.
    RoomState,
    /// Events of the timeline section of a room's sync response.
    RoomTimeline,
}

/// Handle to remove a registered room event handler again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventHandlerHandle {
    kind: HandlerKind,
    handler_id: u64,
}

impl EventHandlerHandle {
    /// Create a handle for the handler with the given id.
    ///
    /// Meant for implementors of [`RoomEventSource`].
    pub fn new(kind: HandlerKind, handler_id: u64) -> Self {
        Self { kind, handler_id }
    }

    /// The kind of events the handler was registered for.
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// The id of the handler, unique per event source.
    pub fn handler_id(&self) -> u64 {
        self.handler_id
    }
}

/// A callback receiving room events.
pub type RoomEventHandler = Arc<dyn Fn(&RoomEvent) + Send + Sync>;

/// A source of room events, usually backed by the sync loop of a Matrix
/// client.
pub trait RoomEventSource: Send + Sync {
    /// Call `handler` for every room state event.
    fn add_room_state_handler(&self, handler: RoomEventHandler) -> EventHandlerHandle;

    /// Call `handler` for every room timeline event.
    fn add_room_timeline_handler(&self, handler: RoomEventHandler) -> EventHandlerHandle;

    /// Stop calling the handler behind `handle`.
    ///
    /// Removing a handler that's already gone does nothing.
    fn remove_event_handler(&self, handle: EventHandlerHandle);
}

/// An in-process [`RoomEventSource`]: whoever owns it pushes room events in,
/// and they're delivered synchronously to the registered handlers.
#[derive(Default)]
pub struct LocalEventSource {
    handlers: StdMutex<BTreeMap<HandlerKind, BTreeMap<u64, RoomEventHandler>>>,
    next_handler_id: AtomicU64,
}

impl fmt::Debug for LocalEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEventSource")
            .field("room_state_handlers", &self.num_handlers(HandlerKind::RoomState))
            .field("room_timeline_handlers", &self.num_handlers(HandlerKind::RoomTimeline))
            .finish_non_exhaustive()
    }
}

impl LocalEventSource {
    /// Create an event source without any handler.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_handler(&self, kind: HandlerKind, handler: RoomEventHandler) -> EventHandlerHandle {
        let handler_id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().unwrap().entry(kind).or_default().insert(handler_id, handler);
        EventHandlerHandle::new(kind, handler_id)
    }

    fn emit(&self, kind: HandlerKind, event: &RoomEvent) {
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .unwrap()
            .get(&kind)
            .map(|handlers| handlers.values().cloned().collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(event);
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn num_handlers(&self, kind: HandlerKind) -> usize {
        self.handlers.lock().unwrap().get(&kind).map_or(0, BTreeMap::len)
    }

    /// Deliver a state event to the room state handlers.
    pub fn emit_room_state(&self, event: &RoomEvent) {
        self.emit(HandlerKind::RoomState, event);
    }

    /// Deliver an event to the room timeline handlers.
    pub fn emit_room_timeline(&self, event: &RoomEvent) {
        self.emit(HandlerKind::RoomTimeline, event);
    }

    /// Deliver the state events of one room's sync response.
    ///
    /// Events that can't be understood are logged and skipped.
    pub fn handle_sync_state(
        &self,
        room_id: &OwnedRoomId,
        events: impl IntoIterator<Item = Raw<AnySyncStateEvent>>,
    ) {
        for raw in events {
            match RoomEvent::from_sync_state(room_id.clone(), raw) {
                Ok(event) => self.emit_room_state(&event),
                Err(e) => error!(%room_id, "Failed to read room state event: {e}"),
            }
        }
    }

    /// Deliver the timeline events of one room's sync response.
    ///
    /// Events that can't be understood are logged and skipped.
    pub fn handle_sync_timeline(
        &self,
        room_id: &OwnedRoomId,
        events: impl IntoIterator<Item = Raw<AnySyncTimelineEvent>>,
    ) {
        for raw in events {
            match RoomEvent::new(room_id.clone(), raw) {
                Ok(event) => self.emit_room_timeline(&event),
                Err(e) => error!(%room_id, "Failed to read room timeline event: {e}"),
            }
        }
    }
}

impl RoomEventSource for LocalEventSource {
    fn add_room_state_handler(&self, handler: RoomEventHandler) -> EventHandlerHandle {
        self.add_handler(HandlerKind::RoomState, handler)
    }

    fn add_room_timeline_handler(&self, handler: RoomEventHandler) -> EventHandlerHandle {
        self.add_handler(HandlerKind::RoomTimeline, handler)
    }

    fn remove_event_handler(&self, handle: EventHandlerHandle) {
        let mut handlers = self.handlers.lock().unwrap();
        let removed = handlers
            .get_mut(&handle.kind)
            .and_then(|handlers| handlers.remove(&handle.handler_id))
            .is_some();

        if !removed {
            debug!(?handle, "Tried to remove an unknown event handler");
        }
    }
}
