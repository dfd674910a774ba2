//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Dispatcher input closed before the event could be forwarded
    #[error("dispatcher for endpoint '{endpoint}' is gone, {kind} event dropped")]
    ChannelClosed {
        endpoint: String,
        kind: &'static str,
    },

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<DispatcherError> for contracts::ContractError {
    fn from(err: DispatcherError) -> Self {
        match err {
            DispatcherError::Contract(inner) => inner,
            DispatcherError::Io(inner) => Self::Io(inner),
            DispatcherError::ChannelClosed { ref endpoint, .. } => {
                Self::endpoint_write(endpoint.clone(), err.to_string())
            }
            DispatcherError::SinkCreation { ref name, .. } => {
                Self::sink_write(name.clone(), err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, ErrorCategory};

    #[test]
    fn test_channel_closed_maps_to_endpoint_error() {
        let err = DispatcherError::ChannelClosed {
            endpoint: "dispatch".into(),
            kind: "frame_generated",
        };
        let contract: ContractError = err.into();
        assert_eq!(contract.category(), ErrorCategory::Endpoint);
        assert!(contract.to_string().contains("frame_generated"));
    }
}
