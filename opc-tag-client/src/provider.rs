//! Boundary with the data-access provider.
//!
//! The provider is an opaque capability: it owns the wire protocol, the
//! server connection and the server-side group/item objects. The core only
//! talks to it through [`ProviderConnection`].

use crate::error::TagResult;
use chrono::{DateTime, Utc};
use std::fmt;

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

/// Opaque provider handle for a server-side group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupHandle(pub u32);

/// Opaque provider handle for a server-side item.
///
/// # Examples
///
/// ```
/// use opc_tag_client::ItemHandle;
/// let handle = ItemHandle(456u32);
/// assert_eq!(handle.0, 456u32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemHandle(pub u32);

/// Raw provider status code.
///
/// Only [`ServerState::CONNECTED`] is interpreted by the core; every other
/// value is passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerState(pub i32);

impl ServerState {
    pub const CONNECTED: Self = Self(1);
    pub const FAILED: Self = Self(2);
    pub const NO_CONFIG: Self = Self(3);
    pub const SUSPENDED: Self = Self(4);
    pub const TEST: Self = Self(5);
    pub const DISCONNECTED: Self = Self(6);

    pub const fn is_connected(self) -> bool {
        self.0 == Self::CONNECTED.0
    }

    /// Human-readable label for the well-known states.
    pub const fn label(self) -> &'static str {
        match self.0 {
            1 => "Connected",
            2 => "Failed",
            3 => "No configuration",
            4 => "Suspended",
            5 => "Test",
            6 => "Disconnected",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.0)
    }
}

/// Provider-defined scalar value, read from or written to an item.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcValue {
    /// No value (`VT_EMPTY`).
    #[default]
    Empty,
    /// String value; the provider may coerce it to the item type.
    String(String),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
}

/// Array in the provider's native one-based convention.
///
/// Position 0 does not exist; valid positions are `1..=len()`. The core
/// only ever builds or unpacks these inside the batch read path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OneBasedArray<T> {
    items: Vec<T>,
}

impl<T> OneBasedArray<T> {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends an element at position `len() + 1`.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Element at one-based `position`; `None` for 0 or past the end.
    pub fn get(&self, position: usize) -> Option<&T> {
        position.checked_sub(1).and_then(|idx| self.items.get(idx))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates `(position, element)` pairs starting at position 1.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items.iter().enumerate().map(|(idx, item)| (idx + 1, item))
    }
}

impl<T> FromIterator<T> for OneBasedArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Output of one synchronous batch read, in provider-native order.
///
/// Position `i` of every array describes the handle at position `i` of the
/// request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReadReply {
    pub values: OneBasedArray<OpcValue>,
    pub errors: OneBasedArray<i32>,
    pub qualities: OneBasedArray<u16>,
    pub timestamps: OneBasedArray<DateTime<Utc>>,
}

/// Output of a single-item synchronous read.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReading {
    pub value: OpcValue,
    pub quality: u16,
    pub timestamp: DateTime<Utc>,
}

/// Synchronous capability exposed by the data-access provider.
///
/// Every call blocks until the provider answers. Implementations are owned
/// by exactly one [`TagClient`](crate::TagClient) and are never shared.
#[cfg_attr(any(test, feature = "test-support"), automock)]
pub trait ProviderConnection: Send {
    /// Connect to the server identified by `connection_id`.
    ///
    /// # Errors
    /// Returns `Err` if the server cannot be reached or refuses the client.
    fn connect(&mut self, connection_id: &str) -> TagResult<()>;

    /// Disconnect from the server.
    fn disconnect(&mut self) -> TagResult<()>;

    /// Raw server status code (1 = connected, 6 = disconnected).
    fn state(&self) -> ServerState;

    /// Create a server-side group. Groups start active.
    fn create_group(&mut self, name: &str) -> TagResult<GroupHandle>;

    /// Enable or disable data exchange for a group.
    fn set_group_active(&mut self, group: GroupHandle, active: bool) -> TagResult<()>;

    /// Release every group created on this connection.
    fn remove_all_groups(&mut self) -> TagResult<()>;

    /// Register `tag_name` in `group`. `client_tag` is unique within the
    /// group and one-based.
    fn register_item(
        &mut self,
        group: GroupHandle,
        tag_name: &str,
        client_tag: u32,
    ) -> TagResult<ItemHandle>;

    /// Read every item in `handles` in one round trip.
    ///
    /// # Errors
    /// Returns `Err` only if the round trip itself fails; per-item failures
    /// are reported in [`BatchReadReply::errors`].
    fn batch_read(
        &mut self,
        group: GroupHandle,
        handles: &OneBasedArray<ItemHandle>,
    ) -> TagResult<BatchReadReply>;

    /// Read a single item.
    fn read_item(&mut self, group: GroupHandle, item: ItemHandle) -> TagResult<ItemReading>;

    /// Write a single item.
    fn write_item(
        &mut self,
        group: GroupHandle,
        item: ItemHandle,
        value: &OpcValue,
    ) -> TagResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_based_positions() {
        let arr: OneBasedArray<&str> = ["a", "b"].into_iter().collect();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get(0), None);
        assert_eq!(arr.get(1), Some(&"a"));
        assert_eq!(arr.get(2), Some(&"b"));
        assert_eq!(arr.get(3), None);
        let positions: Vec<usize> = arr.iter().map(|(pos, _)| pos).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn server_state_passthrough() {
        assert!(ServerState::CONNECTED.is_connected());
        assert!(!ServerState::DISCONNECTED.is_connected());
        assert_eq!(ServerState(42).to_string(), "Unknown (42)");
        assert_eq!(ServerState::SUSPENDED.to_string(), "Suspended (4)");
    }
}
