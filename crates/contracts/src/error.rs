//! Layered error definitions
//!
//! Categorized by source: config / timing / obligation / environment / endpoint

use thiserror::Error;

/// Coarse classification of a [`ContractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration or an unknown/stale handle, detected at the call site
    Configuration,
    /// A report made outside its capture window, or a double report
    Timing,
    /// An async obligation that can no longer be fulfilled
    Obligation,
    /// Global simulation settings changed at an illegal moment
    Environment,
    /// The consuming endpoint refused or failed
    Endpoint,
    /// IO and everything else
    Io,
}

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Handle issued by another run, or whose target was unregistered
    #[error("invalid handle '{id}': {message}")]
    InvalidHandle { id: String, message: String },

    /// Definition was never registered in this run
    #[error("unknown definition '{definition_id}'")]
    UnknownDefinition { definition_id: String },

    /// Controller has been shut down for good
    #[error("simulation controller is disposed")]
    Disposed,

    // ===== Timing / Contract Errors =====
    /// Report made for a sensor that is not capturing this tick
    #[error("sensor '{sensor_id}' is not expected to capture this tick: {message}")]
    CaptureNotExpected { sensor_id: String, message: String },

    /// Target capture was already handed to the endpoint
    #[error("capture {capture_id} is already finalized")]
    CaptureClosed { capture_id: u64 },

    /// Synchronous report into a slot that already holds a value
    #[error("{slot} of capture {capture_id} was already reported")]
    SlotAlreadyFilled { capture_id: u64, slot: String },

    /// Second `report` on the same future
    #[error("future for {slot} of capture {capture_id} was already reported")]
    AlreadyReported { capture_id: u64, slot: String },

    // ===== Obligation Errors =====
    /// Future outlived the simulation run that issued it
    #[error("future for {slot} of capture {capture_id} was invalidated by a simulation reset")]
    FutureInvalidated { capture_id: u64, slot: String },

    // ===== Environment Errors =====
    /// Global time scale changed while a sequence was in flight
    #[error("time scale may not change mid-sequence (latched {latched}, requested {requested})")]
    TimeScaleChanged { latched: f64, requested: f64 },

    // ===== Endpoint Errors =====
    /// Endpoint refused to accept a run
    #[error("endpoint '{endpoint}' is not valid: {message}")]
    EndpointInvalid { endpoint: String, message: String },

    /// Endpoint failed to consume an event
    #[error("endpoint '{endpoint}' write error: {message}")]
    EndpointWrite { endpoint: String, message: String },

    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid handle error
    pub fn invalid_handle(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidHandle {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create unknown definition error
    pub fn unknown_definition(definition_id: impl Into<String>) -> Self {
        Self::UnknownDefinition {
            definition_id: definition_id.into(),
        }
    }

    /// Create capture-not-expected error
    pub fn capture_not_expected(sensor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CaptureNotExpected {
            sensor_id: sensor_id.into(),
            message: message.into(),
        }
    }

    /// Create endpoint write error
    pub fn endpoint_write(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EndpointWrite {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigParse { .. }
            | Self::ConfigValidation { .. }
            | Self::InvalidHandle { .. }
            | Self::UnknownDefinition { .. }
            | Self::Disposed => ErrorCategory::Configuration,
            Self::CaptureNotExpected { .. }
            | Self::CaptureClosed { .. }
            | Self::SlotAlreadyFilled { .. }
            | Self::AlreadyReported { .. } => ErrorCategory::Timing,
            Self::FutureInvalidated { .. } => ErrorCategory::Obligation,
            Self::TimeScaleChanged { .. } => ErrorCategory::Environment,
            Self::EndpointInvalid { .. } | Self::EndpointWrite { .. } | Self::SinkWrite { .. } => {
                ErrorCategory::Endpoint
            }
            Self::Io(_) | Self::Other(_) => ErrorCategory::Io,
        }
    }
}
