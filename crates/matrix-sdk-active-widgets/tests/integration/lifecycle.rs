use std::sync::Arc;

use matrix_sdk_active_widgets::{
    Action, ActiveWidgetRegistry, Dispatcher, HandlerKind, LocalEventSource, Theme,
    WidgetChannel, WidgetMessaging, WidgetRegistryUpdate,
};
use ruma::room_id;

use crate::{message_event, received, widget_state_event, TestSetup};

#[test]
fn starting_twice_subscribes_once() {
    let setup = TestSetup::started();
    setup.registry.start(setup.client.clone(), &setup.dispatcher);

    assert!(setup.registry.is_running());
    assert_eq!(setup.client.num_handlers(HandlerKind::RoomState), 1);
    assert_eq!(setup.client.num_handlers(HandlerKind::RoomTimeline), 1);

    let mut handle = setup.add_widget("w1", &["theme_update", "m.room.message"]);
    setup.dispatcher.dispatch(Action::SetTheme { theme: Theme::new("dark") });
    setup.client.emit_room_state(&message_event(room_id!("!a:example.org"), "hi"));

    assert_eq!(received(&mut handle).len(), 2);
}

#[test]
fn stopping_detaches_from_client_and_dispatcher() {
    let setup = TestSetup::started();
    setup.registry.stop();

    assert!(!setup.registry.is_running());
    assert_eq!(setup.client.num_handlers(HandlerKind::RoomState), 0);
    assert_eq!(setup.client.num_handlers(HandlerKind::RoomTimeline), 0);

    // Widgets registered after stopping don't get anything from the client
    // or the dispatcher anymore.
    let mut handle = setup.add_widget("w1", &["theme_update", "m.room.message"]);
    setup.client.emit_room_state(&message_event(room_id!("!a:example.org"), "hi"));
    setup.dispatcher.dispatch(Action::SetTheme { theme: Theme::new("dark") });

    assert!(received(&mut handle).is_empty());
}

#[test]
fn registry_can_be_restarted() {
    let setup = TestSetup::started();
    setup.registry.stop();
    setup.registry.start(setup.client.clone(), &setup.dispatcher);

    let mut handle = setup.add_widget("w1", &["m.room.message"]);
    setup.client.emit_room_state(&message_event(room_id!("!a:example.org"), "hi"));

    assert_eq!(received(&mut handle).len(), 1);
}

#[test]
fn stopping_after_the_client_is_gone() {
    let registry = ActiveWidgetRegistry::new();
    let dispatcher = Dispatcher::new();
    let client = Arc::new(LocalEventSource::new());

    registry.start(client.clone(), &dispatcher);
    drop(client);

    registry.set_capabilities("w1", ["theme_update"]);
    registry.stop();

    assert!(!registry.is_running());
    assert!(!registry.has_capability("w1", "theme_update"));

    // The dispatcher callback is gone as well.
    let (channel, mut handle) = WidgetChannel::new("w2");
    registry.set_capabilities("w2", ["theme_update"]);
    registry.set_messaging("w2", Arc::new(channel));
    dispatcher.dispatch(Action::SetTheme { theme: Theme::new("dark") });
    assert!(received(&mut handle).is_empty());
}

#[test]
fn dropped_registry_does_not_break_the_client() {
    let setup = TestSetup::started();
    let TestSetup { registry, client, dispatcher } = setup;
    drop(registry);

    client.emit_room_state(&message_event(room_id!("!a:example.org"), "hi"));
    dispatcher.dispatch(Action::SetTheme { theme: Theme::new("dark") });
}

#[test]
fn stop_keeps_the_persistent_widget() {
    let setup = TestSetup::started();
    let _handle = setup.add_widget("w1", &["m.room.message"]);
    setup.registry.set_persistence("w1", true);

    setup.registry.stop();

    assert_eq!(setup.registry.persistent_widget_id().as_deref(), Some("w1"));
    assert!(setup.registry.capabilities("w1").is_none());
    assert!(setup.registry.messaging("w1").is_none());
}

#[test]
fn widget_state_change_tears_down_the_persistent_widget() {
    let setup = TestSetup::started();
    let room_id = room_id!("!a:example.org");
    let mut handle = setup.add_widget("jitsi", &["im.vector.modular.widgets"]);
    setup.registry.set_room_scope("jitsi", room_id.to_owned());
    setup.registry.set_persistence("jitsi", true);

    let mut updates = setup.registry.subscribe();
    setup.client.emit_room_state(&widget_state_event(
        room_id,
        "im.vector.modular.widgets",
        "jitsi",
    ));

    // The event is forwarded before the widget is torn down.
    assert_eq!(received(&mut handle).len(), 1);
    // The channel was stopped.
    assert_eq!(handle.try_recv(), None);

    assert_eq!(setup.registry.persistent_widget_id(), None);
    assert!(setup.registry.capabilities("jitsi").is_none());
    assert!(setup.registry.room_scope("jitsi").is_none());
    assert!(setup.registry.messaging("jitsi").is_none());

    let updates: Vec<_> = std::iter::from_fn(|| updates.try_recv().ok()).collect();
    assert_eq!(
        updates,
        [
            WidgetRegistryUpdate::Persistence {
                widget_id: "jitsi".to_owned(),
                persistent_widget_id: None,
            },
            WidgetRegistryUpdate::Messaging { widget_id: "jitsi".to_owned() },
            WidgetRegistryUpdate::Capabilities { widget_id: "jitsi".to_owned() },
            WidgetRegistryUpdate::RoomScope { widget_id: "jitsi".to_owned() },
        ]
    );
}

#[test]
fn standard_widget_event_type_also_tears_down() {
    let setup = TestSetup::started();
    let _handle = setup.add_widget("jitsi", &[]);
    setup.registry.set_persistence("jitsi", true);

    setup.client.emit_room_state(&widget_state_event(
        room_id!("!a:example.org"),
        "m.widget",
        "jitsi",
    ));

    assert_eq!(setup.registry.persistent_widget_id(), None);
}

#[test]
fn other_state_events_leave_the_persistent_widget_alone() {
    let setup = TestSetup::started();
    let room_id = room_id!("!a:example.org");
    let _jitsi = setup.add_widget("jitsi", &[]);
    let _etherpad = setup.add_widget("etherpad", &[]);
    setup.registry.set_persistence("jitsi", true);

    // Another widget's definition changed.
    setup.client.emit_room_state(&widget_state_event(
        room_id,
        "im.vector.modular.widgets",
        "etherpad",
    ));
    // Not a widget definition, even if the state key matches.
    setup.client.emit_room_state(&widget_state_event(room_id, "m.room.member", "jitsi"));

    assert_eq!(setup.registry.persistent_widget_id().as_deref(), Some("jitsi"));
    assert!(setup.registry.messaging("jitsi").is_some());
    assert!(setup.registry.messaging("etherpad").is_some());
}

#[test]
fn rebinding_a_channel_closes_the_old_one() {
    let setup = TestSetup::started();
    let (first, mut first_handle) = WidgetChannel::new("w1");
    let first = Arc::new(first);
    setup.registry.set_messaging("w1", first.clone());

    let _second_handle = setup.add_widget("w1", &["m.room.message"]);

    assert!(first.is_closed());
    assert!(first.send_theme(&Theme::new("dark")).is_err());
    assert_eq!(first_handle.try_recv(), None);
}
