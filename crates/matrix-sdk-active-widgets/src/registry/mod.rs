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

//! Bookkeeping of the widgets that are currently active.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, mem,
    sync::{Arc, Mutex as StdMutex, Weak},
};

use eyeball::{SharedObservable, Subscriber};
use ruma::OwnedRoomId;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    Action, Dispatcher, DispatcherToken, EventHandlerHandle, RegistrySettings, RoomEvent,
    RoomEventSource, Theme, WidgetCapabilities, WidgetMessaging,
};


/// A change that happened in an [`ActiveWidgetRegistry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetRegistryUpdate {
    /// The persistence of a widget was set or cleared.
    ///
    /// Sent for every call to [`ActiveWidgetRegistry::set_persistence`], even
    /// if nothing actually changed.
    Persistence {
        /// The widget whose persistence was set or cleared.
        widget_id: String,
        /// The persistent widget after the change.
        persistent_widget_id: Option<String>,
    },
    /// The capabilities of a widget were replaced or removed.
    Capabilities {
        /// The widget whose capabilities changed.
        widget_id: String,
    },
    /// A messaging channel was bound to, or unbound from, a widget.
    Messaging {
        /// The widget whose messaging channel changed.
        widget_id: String,
    },
    /// The room scope of a widget was set or removed.
    RoomScope {
        /// The widget whose room scope changed.
        widget_id: String,
    },
    /// The registry was stopped and forgot about every widget.
    Cleared,
}

/// Keeps track of the widgets that are embedded right now: what they are
/// allowed to see, which room they live in, and how to reach them.
///
/// Once [started](Self::start), room state events from the client are
/// forwarded to every widget that has the event type as capability and is
/// either scoped to the event's room or not scoped to a room at all. Theme
/// changes coming through the [`Dispatcher`] are forwarded to the widgets with
/// the [`THEME_UPDATE_CAPABILITY`](crate::THEME_UPDATE_CAPABILITY).
///
/// At most one widget can be persistent, i.e. stay on screen when the user
/// navigates away from its room. When the state event defining that widget
/// changes, the widget is torn down.
///
/// Cloning the registry is cheap and gives a handle to the same widgets.
#[derive(Clone)]
pub struct ActiveWidgetRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    settings: RegistrySettings,
    widgets: StdMutex<Widgets>,
    /// Mirrors `Widgets::persistent_widget_id`, only written while the
    /// `widgets` lock is held.
    persistent_widget_observable: SharedObservable<Option<String>>,
    lifecycle: StdMutex<Lifecycle>,
    update_sender: broadcast::Sender<WidgetRegistryUpdate>,
}

#[derive(Default)]
struct Widgets {
    persistent_widget_id: Option<String>,
    capabilities: BTreeMap<String, WidgetCapabilities>,
    messaging: BTreeMap<String, Arc<dyn WidgetMessaging>>,
    room_scopes: BTreeMap<String, OwnedRoomId>,
}

enum Lifecycle {
    Stopped,
    Running(Subscriptions),
}

/// Everything that was registered by [`ActiveWidgetRegistry::start`].
struct Subscriptions {
    client: Weak<dyn RoomEventSource>,
    event_handlers: Vec<EventHandlerHandle>,
    dispatcher: Dispatcher,
    dispatcher_token: DispatcherToken,
}

impl fmt::Debug for ActiveWidgetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widgets = self.inner.widgets.lock().unwrap();
        f.debug_struct("ActiveWidgetRegistry")
            .field("persistent_widget_id", &widgets.persistent_widget_id)
            .field("capabilities", &widgets.capabilities)
            .field("messaging", &widgets.messaging.keys().collect::<Vec<_>>())
            .field("room_scopes", &widgets.room_scopes)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Default for ActiveWidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveWidgetRegistry {
    /// Create a stopped registry with the default settings.
    pub fn new() -> Self {
        Self::with_settings(RegistrySettings::default())
    }

    /// Create a stopped registry with the given settings.
    pub fn with_settings(settings: RegistrySettings) -> Self {
        let (update_sender, _) = broadcast::channel(settings.update_channel_capacity.max(1));

        Self {
            inner: Arc::new(RegistryInner {
                settings,
                widgets: StdMutex::new(Widgets::default()),
                persistent_widget_observable: SharedObservable::new(None),
                lifecycle: StdMutex::new(Lifecycle::Stopped),
                update_sender,
            }),
        }
    }

    /// The settings this registry was created with.
    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    /// Subscribe to the changes happening in this registry.
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetRegistryUpdate> {
        self.inner.update_sender.subscribe()
    }

    /// Observe the id of the persistent widget.
    pub fn subscribe_persistent_widget(&self) -> Subscriber<Option<String>> {
        self.inner.persistent_widget_observable.subscribe()
    }

    fn notify(&self, update: WidgetRegistryUpdate) {
        // Nobody listening is fine.
        let _ = self.inner.update_sender.send(update);
    }

    /// Whether [`Self::start`] was called without a matching [`Self::stop`].
    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lifecycle.lock().unwrap(), Lifecycle::Running(_))
    }

    /// Start listening to room state and timeline events of `client`, and to
    /// the actions dispatched through `dispatcher`.
    ///
    /// Does nothing if the registry is already running.
    ///
    /// The registry only keeps a weak reference to the client: if the client
    /// is gone by the time [`Self::stop`] is called, there's nothing to detach
    /// from.
    #[instrument(skip_all)]
    pub fn start(&self, client: Arc<dyn RoomEventSource>, dispatcher: &Dispatcher) {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();

        if let Lifecycle::Running(_) = *lifecycle {
            debug!("The widget registry is already running");
            return;
        }

        // Handlers only hold weak references, the client must not keep the
        // registry alive.
        let weak_inner = Arc::downgrade(&self.inner);

        let state_handler = client.add_room_state_handler(Arc::new({
            let weak_inner = weak_inner.clone();
            move |event: &RoomEvent| {
                if let Some(inner) = weak_inner.upgrade() {
                    ActiveWidgetRegistry { inner }.on_room_state_event(event);
                }
            }
        }));

        let timeline_handler = client.add_room_timeline_handler(Arc::new(|event: &RoomEvent| {
            trace!(event_type = %event.event_type(), "Ignoring room timeline event");
        }));

        let dispatcher_token = dispatcher.register(move |action| {
            if let Some(inner) = weak_inner.upgrade() {
                ActiveWidgetRegistry { inner }.on_action(action);
            }
        });

        *lifecycle = Lifecycle::Running(Subscriptions {
            client: Arc::downgrade(&client),
            event_handlers: vec![state_handler, timeline_handler],
            dispatcher: dispatcher.clone(),
            dispatcher_token,
        });

        info!("Started the widget registry");
    }

    /// Stop listening to the client and the dispatcher, and forget the
    /// capabilities, messaging channels and room scopes of every widget.
    ///
    /// The persistent widget is kept, so it can be restored once the registry
    /// is started again. Messaging channels are dropped without being
    /// stopped.
    #[instrument(skip_all)]
    pub fn stop(&self) {
        let lifecycle =
            mem::replace(&mut *self.inner.lifecycle.lock().unwrap(), Lifecycle::Stopped);

        if let Lifecycle::Running(subscriptions) = lifecycle {
            match subscriptions.client.upgrade() {
                Some(client) => {
                    for handle in subscriptions.event_handlers {
                        client.remove_event_handler(handle);
                    }
                }
                None => debug!("The client is gone, no event handlers to remove"),
            }

            subscriptions.dispatcher.unregister(subscriptions.dispatcher_token);
            info!("Stopped the widget registry");
        }

        {
            let mut widgets = self.inner.widgets.lock().unwrap();
            widgets.capabilities.clear();
            widgets.messaging.clear();
            widgets.room_scopes.clear();
        }

        self.notify(WidgetRegistryUpdate::Cleared);
    }

    /// Every widget id this registry knows something about.
    pub fn widget_ids(&self) -> BTreeSet<String> {
        let widgets = self.inner.widgets.lock().unwrap();
        widgets
            .capabilities
            .keys()
            .chain(widgets.messaging.keys())
            .chain(widgets.room_scopes.keys())
            .chain(widgets.persistent_widget_id.as_ref())
            .cloned()
            .collect()
    }

    /// Make a widget persistent, or stop it from being persistent.
    ///
    /// Making a widget persistent replaces the current persistent widget.
    /// Clearing the persistence of a widget which isn't persistent does
    /// nothing. Subscribers are notified in either case.
    pub fn set_persistence(&self, widget_id: &str, persistent: bool) {
        let persistent_widget_id = {
            let mut widgets = self.inner.widgets.lock().unwrap();

            let new_value = if persistent {
                Some(widget_id.to_owned())
            } else if widgets.persistent_widget_id.as_deref() == Some(widget_id) {
                None
            } else {
                widgets.persistent_widget_id.clone()
            };

            if new_value != widgets.persistent_widget_id {
                debug!(widget_id, persistent, "Persistent widget changed");
                widgets.persistent_widget_id = new_value.clone();
                self.inner.persistent_widget_observable.set(new_value.clone());
            }

            new_value
        };

        self.notify(WidgetRegistryUpdate::Persistence {
            widget_id: widget_id.to_owned(),
            persistent_widget_id,
        });
    }

    /// Whether the given widget is the persistent one.
    pub fn is_persistent(&self, widget_id: &str) -> bool {
        self.inner.widgets.lock().unwrap().persistent_widget_id.as_deref() == Some(widget_id)
    }

    /// The id of the persistent widget, if any.
    pub fn persistent_widget_id(&self) -> Option<String> {
        self.inner.widgets.lock().unwrap().persistent_widget_id.clone()
    }

    /// Replace the capabilities of a widget.
    pub fn set_capabilities<I>(&self, widget_id: &str, capabilities: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let capabilities: WidgetCapabilities = capabilities.into_iter().collect();
        trace!(widget_id, ?capabilities, "Setting widget capabilities");

        self.inner.widgets.lock().unwrap().capabilities.insert(widget_id.to_owned(), capabilities);
        self.notify(WidgetRegistryUpdate::Capabilities { widget_id: widget_id.to_owned() });
    }

    /// The capabilities of a widget, if any were set.
    pub fn capabilities(&self, widget_id: &str) -> Option<WidgetCapabilities> {
        self.inner.widgets.lock().unwrap().capabilities.get(widget_id).cloned()
    }

    /// Whether the widget was granted the given capability.
    ///
    /// Unknown widgets have no capabilities.
    pub fn has_capability(&self, widget_id: &str, capability: &str) -> bool {
        self.inner
            .widgets
            .lock()
            .unwrap()
            .capabilities
            .get(widget_id)
            .is_some_and(|capabilities| capabilities.contains(capability))
    }

    /// Forget the capabilities of a widget.
    ///
    /// Subscribers are notified even if the widget had no capabilities.
    pub fn remove_capabilities(&self, widget_id: &str) {
        self.inner.widgets.lock().unwrap().capabilities.remove(widget_id);
        self.notify(WidgetRegistryUpdate::Capabilities { widget_id: widget_id.to_owned() });
    }

    /// Bind the messaging channel of a widget.
    ///
    /// A different channel that was previously bound to the same widget is
    /// stopped.
    pub fn set_messaging(&self, widget_id: &str, messaging: Arc<dyn WidgetMessaging>) {
        let previous = self
            .inner
            .widgets
            .lock()
            .unwrap()
            .messaging
            .insert(widget_id.to_owned(), messaging.clone());

        if let Some(previous) = previous.filter(|previous| !Arc::ptr_eq(previous, &messaging)) {
            debug!(widget_id, "Replacing the messaging channel of a widget");

            if let Err(e) = previous.stop() {
                warn!(widget_id, "Failed to stop the replaced widget messaging: {e}");
            }
        }

        self.notify(WidgetRegistryUpdate::Messaging { widget_id: widget_id.to_owned() });
    }

    /// The messaging channel bound to a widget.
    pub fn messaging(&self, widget_id: &str) -> Option<Arc<dyn WidgetMessaging>> {
        self.inner.widgets.lock().unwrap().messaging.get(widget_id).cloned()
    }

    /// Stop and unbind the messaging channel of a widget.
    ///
    /// Failing to stop the channel is logged, the channel is unbound anyway.
    /// Does nothing, and notifies nobody, if no channel was bound.
    pub fn remove_messaging(&self, widget_id: &str) {
        let Some(messaging) = self.inner.widgets.lock().unwrap().messaging.remove(widget_id) else {
            return;
        };

        if let Err(e) = messaging.stop() {
            error!(widget_id, "Failed to stop widget messaging: {e}");
        }

        self.notify(WidgetRegistryUpdate::Messaging { widget_id: widget_id.to_owned() });
    }

    /// Scope a widget to a room.
    pub fn set_room_scope(&self, widget_id: &str, room_id: OwnedRoomId) {
        self.inner.widgets.lock().unwrap().room_scopes.insert(widget_id.to_owned(), room_id);
        self.notify(WidgetRegistryUpdate::RoomScope { widget_id: widget_id.to_owned() });
    }

    /// The room a widget is scoped to. `None` means it's a user widget.
    pub fn room_scope(&self, widget_id: &str) -> Option<OwnedRoomId> {
        self.inner.widgets.lock().unwrap().room_scopes.get(widget_id).cloned()
    }

    /// Remove the room scope of a widget.
    ///
    /// Subscribers are notified even if the widget had no room scope.
    pub fn remove_room_scope(&self, widget_id: &str) {
        self.inner.widgets.lock().unwrap().room_scopes.remove(widget_id);
        self.notify(WidgetRegistryUpdate::RoomScope { widget_id: widget_id.to_owned() });
    }

    /// Tear down the persistent widget: clear its persistence, stop its
    /// messaging channel, and forget its capabilities and room scope.
    ///
    /// Does nothing if no widget is persistent.
    #[instrument(skip(self))]
    pub fn destroy_persistent_widget(&self) {
        let Some(widget_id) = self.persistent_widget_id() else {
            debug!("No persistent widget to destroy");
            return;
        };

        info!(widget_id, "Destroying the persistent widget");

        self.set_persistence(&widget_id, false);
        self.remove_messaging(&widget_id);
        self.remove_capabilities(&widget_id);
        self.remove_room_scope(&widget_id);
    }

    /// Forward a room event to every widget that is allowed to see it.
    ///
    /// A widget sees an event if it has the event type as capability, and if
    /// it is scoped to the event's room or not scoped at all. Failing to
    /// reach one widget doesn't prevent the others from getting the event.
    #[instrument(skip_all, fields(event_type = %event.event_type(), room_id = %event.room_id()))]
    pub fn dispatch_event_to_widgets(&self, event: &RoomEvent) {
        let event_type = event.event_type().to_string();

        let recipients = self.recipients(|widget_id, capabilities, room_scopes| {
            capabilities.contains(&event_type)
                && room_scopes.get(widget_id).is_none_or(|room_id| **room_id == *event.room_id())
        });

        for (widget_id, messaging) in recipients {
            let Some(messaging) = messaging else {
                debug!(widget_id, "Widget has no messaging channel, not forwarding the event");
                continue;
            };

            if let Err(e) = messaging.send_event(event) {
                warn!(widget_id, "Failed to forward the event to the widget: {e}");
            }
        }
    }

    /// Tell every widget with the theme capability that the theme changed.
    #[instrument(skip(self))]
    pub fn dispatch_theme_to_widgets(&self, theme: &Theme) {
        let recipients = self.recipients(|_, capabilities, _| capabilities.wants_theme_updates());

        for (widget_id, messaging) in recipients {
            let Some(messaging) = messaging else {
                debug!(widget_id, "Widget has no messaging channel, not sending the theme");
                continue;
            };

            if let Err(e) = messaging.send_theme(theme) {
                warn!(widget_id, "Failed to send the theme to the widget: {e}");
            }
        }
    }

    /// Snapshot the widgets matching `filter` together with their messaging
    /// channel, so that nothing is locked while talking to them.
    fn recipients(
        &self,
        filter: impl Fn(&str, &WidgetCapabilities, &BTreeMap<String, OwnedRoomId>) -> bool,
    ) -> Vec<(String, Option<Arc<dyn WidgetMessaging>>)> {
        let widgets = self.inner.widgets.lock().unwrap();

        widgets
            .capabilities
            .iter()
            .filter(|(widget_id, capabilities)| {
                filter(widget_id, capabilities, &widgets.room_scopes)
            })
            .map(|(widget_id, _)| (widget_id.clone(), widgets.messaging.get(widget_id).cloned()))
            .collect()
    }

    fn on_room_state_event(&self, event: &RoomEvent) {
        self.dispatch_event_to_widgets(event);

        let Some(state_key) = event.state_key() else {
            return;
        };

        if self.inner.settings.is_widget_state_event_type(event.event_type())
            && self.is_persistent(state_key)
        {
            debug!(widget_id = state_key, "The state event of the persistent widget changed");
            self.destroy_persistent_widget();
        }
    }

    fn on_action(&self, action: &Action) {
        // Only theme changes are of interest to widgets.
        if let Action::SetTheme { theme } = action {
            self.dispatch_theme_to_widgets(theme);
        }
    }
}
