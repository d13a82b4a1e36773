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

//! Pushing messages into a widget's webview or iframe.

use std::{fmt, sync::Mutex as StdMutex};

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{RoomEvent, Theme};

/// Errors a [`WidgetMessaging`] implementation can report.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The channel was stopped, or the widget side went away.
    #[error("the messaging channel of the widget is closed")]
    Closed,

    /// The message could not be serialized.
    #[error("failed to serialize the message for the widget: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other failure of the underlying transport.
    #[error("{0}")]
    Transport(String),
}

/// The outbound half of the communication with an embedded widget.
///
/// Every push is fire-and-forget: implementations must not wait for the
/// widget to acknowledge anything.
pub trait WidgetMessaging: fmt::Debug + Send + Sync {
    /// Push a room event to the widget.
    ///
    /// Whether it is a state event is part of the [`RoomEvent`].
    fn send_event(&self, event: &RoomEvent) -> Result<(), MessagingError>;

    /// Tell the widget the UI theme changed.
    fn send_theme(&self, theme: &Theme) -> Result<(), MessagingError>;

    /// Shut the channel down. Nothing can be sent afterwards.
    fn stop(&self) -> Result<(), MessagingError>;
}

/// A [`WidgetMessaging`] implementation that serializes every push into a
/// `toWidget` JSON message and hands it over to a [`WidgetChannelHandle`].
///
/// The handle is owned by whatever forwards messages into the webview or
/// iframe, it doesn't have to care what the messages are about.
#[derive(Debug)]
pub struct WidgetChannel {
    widget_id: String,
    to_widget_tx: StdMutex<Option<UnboundedSender<String>>>,
}

/// The receiving end of a [`WidgetChannel`].
#[derive(Debug)]
pub struct WidgetChannelHandle {
    to_widget_rx: UnboundedReceiver<String>,
}

impl WidgetChannelHandle {
    /// Receive the next raw message that must be passed on to the widget.
    ///
    /// Returns `None` once the channel was stopped and all pending messages
    /// were received.
    pub async fn recv(&mut self) -> Option<String> {
        self.to_widget_rx.recv().await
    }

    /// Like [`WidgetChannelHandle::recv`], without waiting. Returns `None` if
    /// no message is pending.
    pub fn try_recv(&mut self) -> Option<String> {
        self.to_widget_rx.try_recv().ok()
    }
}

impl WidgetChannel {
    /// Create a channel for the widget with the given id, and the handle that
    /// receives its messages.
    pub fn new(widget_id: impl Into<String>) -> (Self, WidgetChannelHandle) {
        let (to_widget_tx, to_widget_rx) = unbounded_channel();

        let channel =
            Self { widget_id: widget_id.into(), to_widget_tx: StdMutex::new(Some(to_widget_tx)) };
        let handle = WidgetChannelHandle { to_widget_rx };

        (channel, handle)
    }

    /// The id of the widget this channel talks to.
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    /// Whether the channel was stopped or its handle dropped.
    pub fn is_closed(&self) -> bool {
        self.to_widget_tx.lock().unwrap().as_ref().is_none_or(UnboundedSender::is_closed)
    }

    #[instrument(skip(self, data), fields(widget_id = self.widget_id.as_str()))]
    fn send_to_widget(&self, action: &'static str, data: JsonValue) -> Result<(), MessagingError> {
        #[derive(Serialize)]
        #[serde(tag = "api", rename = "toWidget", rename_all = "camelCase")]
        struct ToWidgetRequestSerHelper<'a> {
            widget_id: &'a str,
            request_id: Uuid,
            action: &'static str,
            data: JsonValue,
        }

        let message = serde_json::to_string(&ToWidgetRequestSerHelper {
            widget_id: &self.widget_id,
            request_id: Uuid::new_v4(),
            action,
            data,
        })?;

        let to_widget_tx = self.to_widget_tx.lock().unwrap();
        let to_widget_tx = to_widget_tx.as_ref().ok_or(MessagingError::Closed)?;
        to_widget_tx.send(message).map_err(|_| MessagingError::Closed)
    }
}

impl WidgetMessaging for WidgetChannel {
    fn send_event(&self, event: &RoomEvent) -> Result<(), MessagingError> {
        let event_json = event.to_widget_json()?;

        if event.is_state() {
            self.send_to_widget("update_state", serde_json::json!({ "state": [event_json] }))
        } else {
            self.send_to_widget("send_event", event_json)
        }
    }

    fn send_theme(&self, theme: &Theme) -> Result<(), MessagingError> {
        self.send_to_widget("theme_change", serde_json::json!({ "name": theme }))
    }

    fn stop(&self) -> Result<(), MessagingError> {
        match self.to_widget_tx.lock().unwrap().take() {
            Some(_) => {
                debug!(widget_id = self.widget_id.as_str(), "Stopped widget messaging");
                Ok(())
            }
            None => Err(MessagingError::Closed),
        }
    }
}
