/// Connection identifier used when none is configured.
pub const DEFAULT_CONNECTION_ID: &str = "RSLinx OPC Server";

/// How numeric group ids are accepted by `add_tag` and `read_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupAddressing {
    /// Any currently valid group id.
    #[default]
    Any,
    /// Only the most recently created group. `add_tag` by group name is
    /// never restricted.
    LatestOnly,
}

/// Settings for a [`TagClient`](crate::TagClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Identifier handed to the provider on connect.
    pub connection_id: String,
    pub group_addressing: GroupAddressing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            group_addressing: GroupAddressing::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_group_addressing(mut self, addressing: GroupAddressing) -> Self {
        self.group_addressing = addressing;
        self
    }
}
