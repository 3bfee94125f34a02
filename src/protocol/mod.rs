//! Transport value types.
//!
//! This module defines the data carried across the transport boundary and the
//! status values published to subscribers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Opaque [`Message`] payload and [`ProtocolType`] |
//! | `status` | Connection states, activity levels and change events |

// ============================================================================
// Submodules
// ============================================================================

/// Message payload type.
pub mod message;

/// Connection state and status types.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Message, ProtocolType};
pub use status::{ActivityLevel, ConnectionState, ConnectionStatus, StateChange};
