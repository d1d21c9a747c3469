//! Ordered, append-only collection of the groups created on a connection.

use crate::error::{TagError, TagResult};
use crate::items::ItemIndex;
use crate::provider::GroupHandle;
use std::collections::HashMap;

/// Dense group identifier: 0, 1, 2, … in creation order.
pub type GroupId = usize;

/// A group known to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub handle: GroupHandle,
    /// Set once the provider has confirmed activation.
    pub active: bool,
    pub items: ItemIndex,
}

/// Arena of groups indexed by [`GroupId`], with a secondary name map.
///
/// Ids are positions in the arena and never change while the registry
/// lives; groups are only removed all at once via [`GroupRegistry::clear`].
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: Vec<Group>,
    /// Name → id of the most recently created group with that name.
    by_name: HashMap<String, GroupId>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a group the provider has just created and returns its id.
    ///
    /// The group starts inactive.
    pub fn insert(&mut self, name: &str, handle: GroupHandle) -> GroupId {
        let id = self.groups.len();
        self.groups.push(Group {
            id,
            name: name.to_string(),
            handle,
            active: false,
            items: ItemIndex::new(),
        });
        self.by_name.insert(name.to_string(), id);
        tracing::debug!(group = %name, id, "Group registered");
        id
    }

    /// Id of the last group created with `name`.
    pub fn id_of(&self, name: &str) -> Option<GroupId> {
        self.by_name.get(name).copied()
    }

    /// Ids of every group named `name`, in creation order.
    pub fn ids_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = GroupId> + 'a {
        self.groups
            .iter()
            .filter(move |group| group.name == name)
            .map(|group| group.id)
    }

    pub fn name_of(&self, id: GroupId) -> TagResult<&str> {
        self.get(id).map(|group| group.name.as_str())
    }

    pub fn get(&self, id: GroupId) -> TagResult<&Group> {
        self.groups.get(id).ok_or_else(|| out_of_range(id, self.len()))
    }

    pub fn get_mut(&mut self, id: GroupId) -> TagResult<&mut Group> {
        let len = self.len();
        self.groups.get_mut(id).ok_or_else(|| out_of_range(id, len))
    }

    /// Id of the most recently created group.
    pub fn latest(&self) -> Option<GroupId> {
        self.groups.len().checked_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.groups.iter().map(|group| group.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.by_name.clear();
    }
}

fn out_of_range(id: GroupId, len: usize) -> TagError {
    TagError::InvalidGroup(format!("group id {id} out of range ({len} groups)"))
}
