//! Hub and gateway error types.

use thiserror::Error;

/// Errors surfaced by the hub and the server around it.
///
/// None of these terminate a hub: a decode error is scoped to one frame, an
/// unavailable hub to one session, a bind error to startup.
#[derive(Debug, Error)]
pub enum HubError {
    /// An inbound frame was not a JSON array of strings.
    #[error("failed to decode inbound frame: {0}")]
    Decode(#[from] serde_json::Error),
    /// The hub's mailbox is closed (its actor has stopped).
    #[error("hub '{name}' is not accepting events")]
    HubUnavailable {
        /// Logical hub name.
        name: String,
    },
    /// Binding or inspecting the listener failed.
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

impl HubError {
    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::HubUnavailable { .. } => "hub_unavailable",
            Self::Bind(_) => "bind",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err: HubError = serde_json::from_str::<Vec<String>>("clean")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("failed to decode inbound frame"));
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn unavailable_display() {
        let err = HubError::HubUnavailable {
            name: "global".into(),
        };
        assert_eq!(err.to_string(), "hub 'global' is not accepting events");
        assert_eq!(err.kind(), "hub_unavailable");
    }

    #[test]
    fn bind_from_io() {
        let err: HubError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use").into();
        assert!(matches!(err, HubError::Bind(_)));
        assert!(err.to_string().contains("in use"));
    }
}
