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

//! The set of capabilities a widget has been granted.

use std::collections::{btree_set, BTreeSet};

use serde::{Deserialize, Serialize};

/// Reserved capability token that opts a widget into theme change
/// notifications.
pub const THEME_UPDATE_CAPABILITY: &str = "theme_update";

/// Capabilities granted to a widget once the capability negotiation with it
/// finished.
///
/// Every token is either the type of an event the widget may receive (e.g.
/// `m.room.message`) or a reserved token such as
/// [`THEME_UPDATE_CAPABILITY`]. On the wire this is a plain JSON list of
/// strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetCapabilities(BTreeSet<String>);

impl WidgetCapabilities {
    /// Create an empty set of capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the given token was granted.
    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    /// Whether the widget asked to be told about theme changes.
    pub fn wants_theme_updates(&self) -> bool {
        self.contains(THEME_UPDATE_CAPABILITY)
    }

    /// Number of granted tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was granted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the granted tokens, in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for WidgetCapabilities {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for WidgetCapabilities {
    type Item = String;
    type IntoIter = btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
