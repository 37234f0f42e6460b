//! Error types for traffic generation and reception.
//!
//! All errors implement the `std::error::Error` trait and carry enough context
//! to tell the operator what went wrong before, during, or after a run.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: Missing or inconsistent options; raised before any I/O
//! - **Schema Errors**: Unsupported field types or malformed schema files
//! - **Transmission Errors**: The send primitive failed; the run is aborted
//! - **Timestamp / Decode Errors**: A received payload could not be interpreted;
//!   the receiver logs it and keeps listening
//! - **Sampling Errors**: The Poisson sampler exhausted its retry budget
//!
//! ## Propagation
//!
//! ```rust
//! use burstgen::TrafficError;
//!
//! let error = TrafficError::configuration("MQTT topic is required for MQTT protocol");
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//!
//! let error = TrafficError::invalid_timestamp("not-a-number");
//! assert!(!error.is_fatal());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for traffic operations.
pub type Result<T, E = TrafficError> = std::result::Result<T, E>;

/// Main error type for traffic operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrafficError {
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Unsupported field type '{type_name}' for field '{field}'")]
    UnsupportedFieldType { field: String, type_name: String },

    #[error("Schema error in {context}: {details}")]
    Schema { context: String, details: String },

    #[error("Failed to decode {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Transmission failed: {reason}")]
    Transmission {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid timestamp received: '{raw}'")]
    InvalidTimestamp { raw: String },

    #[error("Poisson sampling gave up after {attempts} attempts (lambda = {lambda})")]
    Sampling { lambda: f64, attempts: u32 },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture failed: {reason}")]
    Capture {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },
}

impl TrafficError {
    /// Returns whether this error must terminate the current run.
    ///
    /// Per-message problems on the receive path are isolated and never end
    /// the listening loop; everything else aborts.
    pub fn is_fatal(&self) -> bool {
        match self {
            TrafficError::InvalidTimestamp { .. } => false,
            TrafficError::Decode { .. } => false,
            TrafficError::Configuration { .. } => true,
            TrafficError::UnsupportedFieldType { .. } => true,
            TrafficError::Schema { .. } => true,
            TrafficError::Transmission { .. } => true,
            TrafficError::Sampling { .. } => true,
            TrafficError::Timeout { .. } => true,
            TrafficError::File { .. } => true,
            TrafficError::Capture { .. } => true,
            TrafficError::UnsupportedPlatform { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TrafficError::Configuration { .. } => vec![
                "Check the options required by the selected protocol",
                "MQTT needs --topic, HTTP needs at least one --header, Custom needs --custom",
                "Run with --help to list all options",
            ],
            TrafficError::UnsupportedFieldType { .. } => vec![
                "Use one of IntField, StrField, ByteField, ShortField, LongField, IPField, MACField, EnumField",
                "Check the spelling of the \"tipo\" key",
            ],
            TrafficError::Schema { .. } => vec![
                "Validate the schema file as JSON",
                "Check that defaults fit the declared field type",
                "Make sure field names are unique",
            ],
            TrafficError::Decode { .. } => vec![
                "Load the identical schema file on generator and receiver",
                "Check that field order matches between both runs",
            ],
            TrafficError::Transmission { .. } => vec![
                "Run with privileges allowing raw sockets (root or CAP_NET_RAW)",
                "Verify the network interface exists and is up",
                "Check that the target or broker is reachable",
            ],
            TrafficError::InvalidTimestamp { .. } => vec![
                "Check that the sender embeds its timestamp as the last line or field",
                "Filter out unrelated traffic on the same port",
            ],
            TrafficError::Sampling { .. } => vec![
                "Check the mean rate is a finite, non-negative number",
                "Verify the random source produces values in [0, 1)",
            ],
            TrafficError::Timeout { .. } => vec![
                "Increase the send timeout",
                "Verify the target or broker is responding",
            ],
            TrafficError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            TrafficError::Capture { .. } => vec![
                "Run with privileges allowing packet capture",
                "Verify the interface name and capture filter",
                "Check the MQTT broker address and topic",
            ],
            TrafficError::UnsupportedPlatform { .. } => vec![
                "Use the loopback self-test on this platform",
                "Run the generator and receiver on Linux",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn configuration(reason: impl Into<String>) -> Self {
        TrafficError::Configuration { reason: reason.into() }
    }

    /// Helper constructor for unsupported schema field types.
    pub fn unsupported_field_type(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        TrafficError::UnsupportedFieldType { field: field.into(), type_name: type_name.into() }
    }

    /// Helper constructor for schema content errors.
    pub fn schema(context: impl Into<String>, details: impl Into<String>) -> Self {
        TrafficError::Schema { context: context.into(), details: details.into() }
    }

    /// Helper constructor for payload decode errors.
    pub fn decode(context: impl Into<String>, details: impl Into<String>) -> Self {
        TrafficError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for transmission errors.
    pub fn transmission(reason: impl Into<String>) -> Self {
        TrafficError::Transmission { reason: reason.into(), source: None }
    }

    /// Helper constructor for transmission errors with source.
    pub fn transmission_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TrafficError::Transmission { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for unparseable timestamps.
    pub fn invalid_timestamp(raw: impl Into<String>) -> Self {
        TrafficError::InvalidTimestamp { raw: raw.into() }
    }

    /// Helper constructor for capture errors with source.
    pub fn capture_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TrafficError::Capture { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for capture errors.
    pub fn capture(reason: impl Into<String>) -> Self {
        TrafficError::Capture { reason: reason.into(), source: None }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TrafficError::File { path, source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        TrafficError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for TrafficError {
    fn from(err: std::io::Error) -> Self {
        TrafficError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
