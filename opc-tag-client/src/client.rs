//! The public facade over a provider connection.

use crate::batch::{BatchReadEngine, ReadResult, WriteResult};
use crate::config::{ClientConfig, GroupAddressing};
use crate::error::{TagError, TagResult};
use crate::helpers::value_to_text;
use crate::provider::{ItemReading, OpcValue, ProviderConnection, ServerState};
use crate::registry::{GroupId, GroupRegistry};
use std::fmt;

/// Addresses a group either by its dense id or by name.
///
/// Name lookups resolve to the most recently created group with that name,
/// except [`TagClient::add_tag`] which targets every group with the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupRef {
    Id(GroupId),
    Name(String),
}

impl From<GroupId> for GroupRef {
    fn from(id: GroupId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for GroupRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for GroupRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// Where a tag registration landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLocation {
    pub group: GroupId,
    /// Zero-based ordinal position within the group.
    pub position: usize,
}

/// Group-oriented tag client over one provider connection.
///
/// Owns the provider exclusively. Not synchronized: confine an instance to
/// one thread, or use [`TagWorker`](crate::TagWorker).
///
/// # Examples
///
/// ```
/// use opc_tag_client::{ClientConfig, OpcValue, SimulatedProvider, TagClient};
///
/// # fn main() -> opc_tag_client::TagResult<()> {
/// let provider = SimulatedProvider::new()
///     .with_point("[PLC]Speed", OpcValue::Int(1200))
///     .with_point("[PLC]Running", OpcValue::Bool(true));
/// let mut client = TagClient::new(provider, ClientConfig::default());
///
/// client.connect()?;
/// client.add_group("Line1")?;
/// client.add_tag("Line1", "[PLC]Speed")?;
/// client.add_tag("Line1", "[PLC]Running")?;
///
/// let result = client.read_all("Line1")?;
/// assert_eq!(result.names(), ["[PLC]Speed", "[PLC]Running"]);
/// assert_eq!(result.values(), ["1200", "true"]);
/// # Ok(())
/// # }
/// ```
pub struct TagClient<P: ProviderConnection> {
    provider: P,
    config: ClientConfig,
    groups: GroupRegistry,
}

impl<P: ProviderConnection> TagClient<P> {
    pub fn new(provider: P, config: ClientConfig) -> Self {
        Self {
            provider,
            config,
            groups: GroupRegistry::new(),
        }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to the configured server. A no-op when already connected.
    pub fn connect(&mut self) -> TagResult<()> {
        let span = tracing::info_span!("tag.connect", server = %self.config.connection_id);
        let _enter = span.enter();

        if self.is_connected() {
            tracing::debug!("connect: already connected");
            return Ok(());
        }

        self.provider.connect(&self.config.connection_id)?;

        let state = self.provider.state();
        if !state.is_connected() {
            tracing::error!(state = %state, "connect: provider did not reach connected state");
            return Err(TagError::Connection(format!(
                "'{}' reported state {state} after connect",
                self.config.connection_id
            )));
        }
        tracing::info!("Connected");
        Ok(())
    }

    /// Releases every group and item, then disconnects.
    ///
    /// Local registries are cleared even if the provider reports a failure.
    pub fn disconnect(&mut self) -> TagResult<()> {
        let span = tracing::info_span!("tag.disconnect", groups = self.groups.len());
        let _enter = span.enter();

        let removed = if self.is_connected() {
            self.provider.remove_all_groups()
        } else {
            Ok(())
        };
        if let Err(e) = &removed {
            tracing::warn!(error = %e, "disconnect: failed to remove provider groups");
        }
        self.groups.clear();

        self.provider.disconnect()?;
        tracing::info!("Disconnected");
        removed
    }

    pub fn is_connected(&self) -> bool {
        self.provider.state().is_connected()
    }

    /// Raw provider status code, passed through unchanged.
    pub fn server_state(&self) -> ServerState {
        self.provider.state()
    }

    /// Creates an active group and returns its id.
    ///
    /// If activation fails the group stays registered as inactive, so
    /// [`TagClient::disconnect`] still removes it from the provider, and the
    /// activation error is returned.
    pub fn add_group(&mut self, name: &str) -> TagResult<GroupId> {
        let span = tracing::info_span!("tag.add_group", group = %name);
        let _enter = span.enter();

        self.ensure_connected()?;
        let handle = self.provider.create_group(name)?;
        let id = self.groups.insert(name, handle);
        if let Err(e) = self.provider.set_group_active(handle, true) {
            tracing::warn!(id, error = %e, "add_group: activation failed, group left inactive");
            return Err(e);
        }
        self.groups.get_mut(id)?.active = true;
        tracing::info!(id, "add_group completed");
        Ok(id)
    }

    /// Id of the last group created with `name`.
    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.groups.id_of(name)
    }

    pub fn group_name(&self, id: GroupId) -> TagResult<String> {
        self.groups.name_of(id).map(str::to_string)
    }

    /// Names of every group, in creation order.
    pub fn group_names(&self) -> Vec<String> {
        self.groups.names()
    }

    /// Registers `tag_name` in a group.
    ///
    /// By id, one group is targeted. By name, the tag is registered in every
    /// group carrying that name; registration stops at the first provider
    /// failure, keeping the registrations already made.
    pub fn add_tag(
        &mut self,
        group: impl Into<GroupRef>,
        tag_name: &str,
    ) -> TagResult<Vec<ItemLocation>> {
        let group = group.into();
        let span = tracing::info_span!("tag.add_tag", group = %group, tag = %tag_name);
        let _enter = span.enter();

        self.ensure_connected()?;
        let targets: Vec<GroupId> = match &group {
            GroupRef::Id(id) => vec![self.check_id(*id)?],
            GroupRef::Name(name) => {
                let ids: Vec<GroupId> = self.groups.ids_named(name).collect();
                if ids.is_empty() {
                    return Err(TagError::InvalidGroup(format!("no group named '{name}'")));
                }
                ids
            }
        };

        let mut locations = Vec::with_capacity(targets.len());
        for id in targets {
            let entry = self.groups.get_mut(id)?;
            let position = entry
                .items
                .register(&mut self.provider, entry.handle, tag_name)?;
            locations.push(ItemLocation { group: id, position });
        }
        tracing::info!(registrations = locations.len(), "add_tag completed");
        Ok(locations)
    }

    /// Tag names of a group, in ordinal order.
    pub fn tag_names(&self, group: impl Into<GroupRef>) -> TagResult<Vec<String>> {
        let id = self.resolve(&group.into())?;
        Ok(self.groups.get(id)?.items.names())
    }

    /// Reads every tag in a group in one provider round trip.
    pub fn read_all(&mut self, group: impl Into<GroupRef>) -> TagResult<ReadResult> {
        self.ensure_connected()?;
        let id = self.resolve(&group.into())?;
        let id = self.check_id(id)?;
        let entry = self.groups.get(id)?;
        BatchReadEngine::read_group(&mut self.provider, entry)
    }

    /// Reads one tag and returns its value as lossless text.
    pub fn read_tag(&mut self, tag_name: &str) -> TagResult<String> {
        self.read_tag_reading(tag_name)
            .map(|reading| value_to_text(&reading.value))
    }

    /// Reads one tag with its quality and timestamp.
    pub fn read_tag_reading(&mut self, tag_name: &str) -> TagResult<ItemReading> {
        self.ensure_connected()?;
        BatchReadEngine::read_single(&mut self.provider, &self.groups, tag_name)
    }

    /// Writes `value` to every item named `tag_name`, one result per item.
    pub fn write_tag(&mut self, tag_name: &str, value: &OpcValue) -> TagResult<Vec<WriteResult>> {
        self.ensure_connected()?;
        BatchReadEngine::write_single(&mut self.provider, &self.groups, tag_name, value)
    }

    fn ensure_connected(&self) -> TagResult<()> {
        let state = self.provider.state();
        if state.is_connected() {
            Ok(())
        } else {
            tracing::debug!(state = %state, "Rejecting operation while not connected");
            Err(TagError::NotConnected { state })
        }
    }

    fn resolve(&self, group: &GroupRef) -> TagResult<GroupId> {
        match group {
            GroupRef::Id(id) => self.groups.get(*id).map(|entry| entry.id),
            GroupRef::Name(name) => self
                .groups
                .id_of(name)
                .ok_or_else(|| TagError::InvalidGroup(format!("no group named '{name}'"))),
        }
    }

    /// Applies the configured [`GroupAddressing`] to a group id.
    fn check_id(&self, id: GroupId) -> TagResult<GroupId> {
        self.groups.get(id)?;
        match self.config.group_addressing {
            GroupAddressing::Any => Ok(id),
            GroupAddressing::LatestOnly if self.groups.latest() == Some(id) => Ok(id),
            GroupAddressing::LatestOnly => Err(TagError::InvalidGroup(format!(
                "group id {id} is not the most recently created group"
            ))),
        }
    }
}

impl<P: ProviderConnection> fmt::Debug for TagClient<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagClient")
            .field("config", &self.config)
            .field("groups", &self.groups.names())
            .finish_non_exhaustive()
    }
}
