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

//! Application wide action dispatcher.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
};

use ruma::OwnedRoomId;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

/// Name of a UI theme, e.g. `light` or `dark`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Theme(String);

impl Theme {
    /// Create a new theme with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name of the theme.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An action travelling through the [`Dispatcher`].
///
/// Serialized with an `action` tag, e.g.
/// `{ "action": "set_theme", "theme": "dark" }`. Actions with an unknown tag
/// deserialize into [`Action::Unknown`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// The user switched the UI theme.
    SetTheme {
        /// The new theme.
        theme: Theme,
    },
    /// The user navigated to a room.
    ViewRoom {
        /// The room that is now displayed.
        room_id: OwnedRoomId,
    },
    /// The session was logged out.
    LoggedOut,
    /// Any other action.
    #[serde(other)]
    Unknown,
}

/// Identifies a callback registered on a [`Dispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DispatcherToken(u64);

type ActionCallback = dyn Fn(&Action) + Send + Sync;

/// Delivers every dispatched [`Action`] to all registered callbacks.
///
/// Cloning a `Dispatcher` gives another handle to the same set of callbacks.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    callbacks: StdMutex<BTreeMap<DispatcherToken, Arc<ActionCallback>>>,
    next_token: AtomicU64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("callbacks", &self.inner.callbacks.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher without any callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback that will be called for every dispatched action.
    pub fn register(&self, callback: impl Fn(&Action) + Send + Sync + 'static) -> DispatcherToken {
        let token = DispatcherToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        self.inner.callbacks.lock().unwrap().insert(token, Arc::new(callback));
        token
    }

    /// Remove a previously registered callback.
    ///
    /// Returns `false` if the token was unknown.
    pub fn unregister(&self, token: DispatcherToken) -> bool {
        self.inner.callbacks.lock().unwrap().remove(&token).is_some()
    }

    /// Deliver an action to every registered callback, in registration
    /// order.
    ///
    /// Callbacks may register or unregister callbacks themselves; those
    /// changes apply from the next dispatch on.
    #[instrument(skip(self))]
    pub fn dispatch(&self, action: Action) {
        let callbacks: Vec<_> = self.inner.callbacks.lock().unwrap().values().cloned().collect();
        trace!(num_callbacks = callbacks.len(), "Dispatching action");

        for callback in callbacks {
            callback(&action);
        }
    }
}
