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

use ruma::{
    events::{AnySyncStateEvent, AnySyncTimelineEvent, TimelineEventType},
    serde::Raw,
    OwnedRoomId, RoomId,
};
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// A room event, as received from sync, together with the room it belongs to.
///
/// Only the `type` and `state_key` of the event are looked at, everything
/// else is kept raw and handed over to the widgets as-is.
#[derive(Clone, Debug)]
pub struct RoomEvent {
    room_id: OwnedRoomId,
    event_type: TimelineEventType,
    state_key: Option<String>,
    raw: Raw<AnySyncTimelineEvent>,
}

#[derive(Deserialize)]
struct EventTypeAndStateKey {
    #[serde(rename = "type")]
    event_type: TimelineEventType,
    state_key: Option<String>,
}

impl RoomEvent {
    /// Wrap a raw sync event received in the given room.
    ///
    /// Fails if the event doesn't even have a `type`.
    pub fn new(room_id: OwnedRoomId, raw: Raw<AnySyncTimelineEvent>) -> serde_json::Result<Self> {
        let EventTypeAndStateKey { event_type, state_key } = raw.deserialize_as()?;
        Ok(Self { room_id, event_type, state_key, raw })
    }

    /// Wrap a raw state event coming from the state section of a sync.
    pub fn from_sync_state(
        room_id: OwnedRoomId,
        raw: Raw<AnySyncStateEvent>,
    ) -> serde_json::Result<Self> {
        Self::new(room_id, Raw::from_json(raw.into_json()))
    }

    /// Build a room event out of a JSON value.
    pub fn from_json(room_id: OwnedRoomId, json: JsonValue) -> serde_json::Result<Self> {
        Self::new(room_id, Raw::from_json(serde_json::value::to_raw_value(&json)?))
    }

    /// The room this event was received in.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The `type` of the event.
    pub fn event_type(&self) -> &TimelineEventType {
        &self.event_type
    }

    /// The `state_key` of the event, if it is a state event.
    pub fn state_key(&self) -> Option<&str> {
        self.state_key.as_deref()
    }

    /// Whether this is a state event.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// The raw event.
    pub fn raw(&self) -> &Raw<AnySyncTimelineEvent> {
        &self.raw
    }

    /// The JSON that is pushed to a widget: the raw event with its `room_id`
    /// attached, since sync events don't carry one and widgets need it.
    pub(crate) fn to_widget_json(&self) -> serde_json::Result<JsonValue> {
        let mut event: JsonMap<String, JsonValue> = self.raw.deserialize_as()?;
        event.insert("room_id".to_owned(), JsonValue::String(self.room_id.to_string()));
        Ok(JsonValue::Object(event))
    }
}
