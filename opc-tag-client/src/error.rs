use crate::provider::ServerState;
use thiserror::Error;

/// Result type alias for tag client operations.
pub type TagResult<T> = Result<T, TagError>;

/// Centralized error enum for the tag client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TagError {
    /// A provider operation was attempted while the connection is not up.
    #[error("Not connected to provider (server state {state})")]
    NotConnected { state: ServerState },

    /// Group id out of range, unknown group name, or (with legacy
    /// addressing) a group other than the most recently created one.
    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    /// No group holds an item with the requested tag name.
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// The provider rejected an operation with a non-zero status code.
    #[error("Provider error: {}", display_code(.code))]
    Provider { code: i32 },

    /// Connecting to or disconnecting from the provider failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The provider returned a reply that does not match the request.
    #[error("Malformed provider reply: {0}")]
    Conversion(String),

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TagError {
    /// Creates a `Provider` error from a raw status code.
    pub const fn provider(code: i32) -> Self {
        Self::Provider { code }
    }

    /// Returns the raw provider status code, if this is a provider error.
    pub const fn provider_code(&self) -> Option<i32> {
        match self {
            Self::Provider { code } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::num::TryFromIntError> for TagError {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::Conversion(format!("Integer conversion error: {err}"))
    }
}

/// Status code reported for a successful per-item operation.
pub const S_OK: i32 = 0;

/// Item handle not valid for the group.
#[allow(clippy::cast_possible_wrap)]
pub const OPC_E_INVALIDHANDLE: i32 = 0xC004_0001_u32 as i32;

/// Argument rejected by the provider.
#[allow(clippy::cast_possible_wrap)]
pub const E_INVALIDARG: i32 = 0x8007_0057_u32 as i32;

/// Item ID not known to the provider.
#[allow(clippy::cast_possible_wrap)]
pub const OPC_E_UNKNOWNITEMID: i32 = 0xC004_0007_u32 as i32;

/// Item ID syntax rejected by the provider.
#[allow(clippy::cast_possible_wrap)]
pub const OPC_E_INVALIDITEMID: i32 = 0xC004_0008_u32 as i32;

/// Item is read-only.
#[allow(clippy::cast_possible_wrap)]
pub const OPC_E_BADRIGHTS: i32 = 0xC004_0004_u32 as i32;

/// Provider cannot convert the written value to the item type.
#[allow(clippy::cast_possible_wrap)]
pub const OPC_E_BADTYPE: i32 = 0xC004_0006_u32 as i32;

/// Helper to format a provider status code with a friendly hint.
///
/// # Examples
///
/// ```
/// use opc_tag_client::format_error_code;
///
/// assert_eq!(format_error_code(0), "0x00000000");
/// assert!(format_error_code(0xC004_0007_u32 as i32).contains("OPC_E_UNKNOWNITEMID"));
/// ```
#[allow(clippy::cast_sign_loss)]
pub fn format_error_code(code: i32) -> String {
    let hex = format!("0x{:08X}", code as u32);
    match friendly_code_hint(code) {
        Some(hint) => format!("{hex}: {hint}"),
        None => hex,
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn display_code(code: &i32) -> String {
    format_error_code(*code)
}

/// Maps known OPC/COM status codes to actionable user hints.
#[allow(clippy::cast_sign_loss)]
pub const fn friendly_code_hint(code: i32) -> Option<&'static str> {
    match code as u32 {
        0x8004_0112 => Some("Server license does not permit OPC client connections"),
        0x8008_0005 => Some("Server process failed to start: check if it is installed and running"),
        0x8007_0005 => {
            Some("Access denied: DCOM launch/activation permissions not configured for this user")
        }
        0x8007_06BA => {
            Some("RPC server unavailable: the target host may be offline or blocking RPC")
        }
        0x8007_06F4 => Some("COM marshalling error: try restarting the OPC server"),
        0x8004_0154 => Some("Server is not registered on this machine"),
        0x8007_0057 => Some("Invalid argument (E_INVALIDARG)"),
        0xC004_0001 => Some("Item handle is not valid for this group (OPC_E_INVALIDHANDLE)"),
        0xC004_0004 => Some("Server rejected write: the item may be read-only (OPC_E_BADRIGHTS)"),
        0xC004_0006 => {
            Some("Data type mismatch: server cannot convert the written value (OPC_E_BADTYPE)")
        }
        0xC004_0007 => Some("Item ID not found in server address space (OPC_E_UNKNOWNITEMID)"),
        0xC004_0008 => Some("Item ID syntax is invalid for this server (OPC_E_INVALIDITEMID)"),
        _ => None,
    }
}

/// Maps a [`TagError`] to a friendly hint if it carries a provider code.
pub fn friendly_error_hint(error: &TagError) -> Option<&'static str> {
    match error {
        TagError::Provider { code } => friendly_code_hint(*code),
        TagError::NotConnected { .. } => Some("Connect to the provider first"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display_includes_hint() {
        let err = TagError::provider(OPC_E_BADRIGHTS);
        let msg = err.to_string();
        assert!(msg.contains("0xC0040004"), "{msg}");
        assert!(msg.contains("read-only"), "{msg}");
        assert_eq!(err.provider_code(), Some(OPC_E_BADRIGHTS));
    }

    #[test]
    fn unknown_code_has_no_hint() {
        assert_eq!(friendly_code_hint(0x1234), None);
        assert_eq!(format_error_code(0x1234), "0x00001234");
    }

    #[test]
    fn not_connected_reports_raw_state() {
        let err = TagError::NotConnected {
            state: ServerState::DISCONNECTED,
        };
        assert!(err.to_string().contains("Disconnected"));
        assert_eq!(friendly_error_hint(&err), Some("Connect to the provider first"));
        assert_eq!(err.provider_code(), None);
    }
}
