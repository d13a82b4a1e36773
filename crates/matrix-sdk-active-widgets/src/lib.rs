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

#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations, missing_docs)]

mod capabilities;
mod dispatcher;
mod event;
mod event_source;
mod messaging;
mod registry;
mod settings;

pub use self::{
    capabilities::{WidgetCapabilities, THEME_UPDATE_CAPABILITY},
    dispatcher::{Action, Dispatcher, DispatcherToken, Theme},
    event::RoomEvent,
    event_source::{
        EventHandlerHandle, HandlerKind, LocalEventSource, RoomEventHandler, RoomEventSource,
    },
    messaging::{MessagingError, WidgetChannel, WidgetChannelHandle, WidgetMessaging},
    registry::{ActiveWidgetRegistry, WidgetRegistryUpdate},
    settings::RegistrySettings,
};
