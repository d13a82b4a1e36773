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

use ruma::events::TimelineEventType;
use serde::{Deserialize, Serialize};

/// The legacy state event type used by Element to define room widgets.
pub(crate) const LEGACY_WIDGET_EVENT_TYPE: &str = "im.vector.modular.widgets";

/// The standard state event type defining room widgets.
pub(crate) const WIDGET_EVENT_TYPE: &str = "m.widget";

/// Settings of an [`ActiveWidgetRegistry`](crate::ActiveWidgetRegistry).
///
/// Missing fields take their default value when deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// How many [`WidgetRegistryUpdate`](crate::WidgetRegistryUpdate)s a slow
    /// subscriber may lag behind before it starts missing updates.
    pub update_channel_capacity: usize,

    /// State event types that define a widget; the state key being the widget
    /// id.
    ///
    /// When such a state event arrives for the persistent widget, the widget
    /// is torn down.
    pub widget_state_event_types: Vec<TimelineEventType>,
}

impl Default for RegistrySettings {
    /// Both the legacy `im.vector.modular.widgets` and the standard `m.widget`
    /// types tear the persistent widget down. Restrict
    /// [`RegistrySettings::widget_state_event_types`] to only react to one.
    fn default() -> Self {
        Self {
            update_channel_capacity: 32,
            widget_state_event_types: vec![
                LEGACY_WIDGET_EVENT_TYPE.into(),
                WIDGET_EVENT_TYPE.into(),
            ],
        }
    }
}

impl RegistrySettings {
    /// Whether events of the given type define a widget.
    pub(crate) fn is_widget_state_event_type(&self, event_type: &TimelineEventType) -> bool {
        self.widget_state_event_types.contains(event_type)
    }
}
