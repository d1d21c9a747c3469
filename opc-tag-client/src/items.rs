//! Per-group tag registrations.

use crate::error::TagResult;
use crate::provider::{GroupHandle, ItemHandle, ProviderConnection};

/// The client-side registration of one tag within one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Tag name in `[SOURCE]POINT` form, opaque to the client.
    pub name: String,
    pub handle: ItemHandle,
    /// Zero-based ordinal position within the group.
    pub position: usize,
}

/// Ordered, append-only list of the items registered in a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemIndex {
    items: Vec<Item>,
}

impl ItemIndex {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Registers `tag_name` with the provider and appends it at the next
    /// position.
    ///
    /// The index is left untouched when the provider refuses the item.
    pub fn register<P>(
        &mut self,
        provider: &mut P,
        group: GroupHandle,
        tag_name: &str,
    ) -> TagResult<usize>
    where
        P: ProviderConnection + ?Sized,
    {
        let client_tag = u32::try_from(self.items.len() + 1)?;
        let handle = provider.register_item(group, tag_name, client_tag)?;
        Ok(self.push(tag_name, handle))
    }

    fn push(&mut self, name: &str, handle: ItemHandle) -> usize {
        let position = self.items.len();
        self.items.push(Item {
            name: name.to_string(),
            handle,
            position,
        });
        position
    }

    /// Tag names in ordinal order.
    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name.clone()).collect()
    }

    /// First position holding `tag_name`.
    pub fn position_of(&self, tag_name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == tag_name)
    }

    pub fn get(&self, position: usize) -> Option<&Item> {
        self.items.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
