use std::sync::Arc;

use matrix_sdk_active_widgets::{
    ActiveWidgetRegistry, Dispatcher, LocalEventSource, RoomEvent, WidgetChannel,
    WidgetChannelHandle,
};
use ruma::RoomId;
use serde_json::{json, Value as JsonValue};

mod lifecycle;

#[ctor::ctor]
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,matrix_sdk_active_widgets=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .init();
}

/// A running registry, wired to a local client and dispatcher.
struct TestSetup {
    registry: ActiveWidgetRegistry,
    client: Arc<LocalEventSource>,
    dispatcher: Dispatcher,
}

impl TestSetup {
    fn started() -> Self {
        let registry = ActiveWidgetRegistry::new();
        let client = Arc::new(LocalEventSource::new());
        let dispatcher = Dispatcher::new();

        registry.start(client.clone(), &dispatcher);

        Self { registry, client, dispatcher }
    }

    /// Register a widget with the given capabilities and a real channel.
    fn add_widget(&self, widget_id: &str, capabilities: &[&str]) -> WidgetChannelHandle {
        let (channel, handle) = WidgetChannel::new(widget_id);
        self.registry.set_capabilities(widget_id, capabilities.iter().copied());
        self.registry.set_messaging(widget_id, Arc::new(channel));
        handle
    }
}

/// Drain every message a widget received, as JSON values.
fn received(handle: &mut WidgetChannelHandle) -> Vec<JsonValue> {
    std::iter::from_fn(|| handle.try_recv())
        .map(|msg| serde_json::from_str(&msg).unwrap())
        .collect()
}

fn message_event(room_id: &RoomId, body: &str) -> RoomEvent {
    RoomEvent::from_json(
        room_id.to_owned(),
        json!({
            "type": "m.room.message",
            "event_id": "$message",
            "sender": "@alice:example.org",
            "origin_server_ts": 1,
            "content": { "msgtype": "m.text", "body": body },
        }),
    )
    .unwrap()
}

fn widget_state_event(room_id: &RoomId, event_type: &str, widget_id: &str) -> RoomEvent {
    RoomEvent::from_json(
        room_id.to_owned(),
        json!({
            "type": event_type,
            "state_key": widget_id,
            "event_id": "$widget",
            "sender": "@alice:example.org",
            "origin_server_ts": 1,
            "content": {},
        }),
    )
    .unwrap()
}
