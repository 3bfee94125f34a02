//! Transport configuration options.
//!
//! [`TransportOptions`] describes how a connection factory is set up: its
//! connection cap, the protocol kind it advertises and an optional injected
//! fault. Options round-trip through camelCase JSON so test harnesses can load
//! them from fixtures.
//!
//! # Example
//!
//! ```ignore
//! use message_endpoint::{LifecycleLocation, TransportOptions, FaultSpec};
//!
//! let options = TransportOptions::new()
//!     .with_max_connections(2)
//!     .with_fault(FaultSpec::once(LifecycleLocation::Send).recoverable());
//!
//! let json = options.to_json()?;
//! // {"maxConnections":2,"protocol":"messageStream","fault":{"location":"SEND","total":1,"recoverable":true}}
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fault::{CountedFailure, LifecycleLocation};
use crate::protocol::ProtocolType;

// ============================================================================
// FaultSpec
// ============================================================================

/// Serializable description of a [`CountedFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultSpec {
    /// Location that fails.
    pub location: LifecycleLocation,

    /// Number of failures; absent means the fault is permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    /// Recoverable flag of produced errors.
    #[serde(default)]
    pub recoverable: bool,
}

impl FaultSpec {
    /// Fails the first operation at `location`.
    #[inline]
    #[must_use]
    pub const fn once(location: LifecycleLocation) -> Self {
        Self {
            location,
            total: Some(1),
            recoverable: false,
        }
    }

    /// Fails every operation at `location`.
    #[inline]
    #[must_use]
    pub const fn always(location: LifecycleLocation) -> Self {
        Self {
            location,
            total: None,
            recoverable: false,
        }
    }

    /// Marks produced errors recoverable.
    #[inline]
    #[must_use]
    pub const fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    /// Builds the counted policy this entry describes.
    #[must_use]
    pub fn policy(&self) -> CountedFailure {
        let policy = match self.total {
            Some(total) => CountedFailure::times(self.location, total),
            None => CountedFailure::always(self.location),
        };
        policy.recoverable(self.recoverable)
    }
}

// ============================================================================
// TransportOptions
// ============================================================================

/// Connection factory configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    /// Maximum number of connections the factory may create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Protocol kind advertised by endpoints.
    #[serde(default)]
    pub protocol: ProtocolType,

    /// Fault injected into every Initiator the factory creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultSpec>,
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with defaults: no cap, message stream, no fault.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_connections: None,
            protocol: ProtocolType::MessageStream,
            fault: None,
        }
    }

    /// Parses options from JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed
    /// - [`Error::Config`] if `maxConnections` is zero
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Serializes options to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Caps the number of connections.
    #[inline]
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the protocol kind.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolType) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the injected fault.
    #[inline]
    #[must_use]
    pub fn with_fault(mut self, fault: FaultSpec) -> Self {
        self.fault = Some(fault);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TransportOptions {
    /// Checks option consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_connections` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == Some(0) {
            return Err(Error::config(
                "maxConnections must be at least 1 (omit it for no limit)",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
