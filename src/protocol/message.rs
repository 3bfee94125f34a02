//! Message payload type.
//!
//! A [`Message`] is an immutable byte payload. The transport never inspects
//! it: there is no framing beyond the raw bytes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Bytes shown by the `Debug` preview.
const DEBUG_PREVIEW_LEN: usize = 16;

// ============================================================================
// Message
// ============================================================================

/// Immutable byte payload exchanged between paired connections.
///
/// Equality is by content.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Message {
    /// Payload bytes.
    data: Vec<u8>,
}

impl Message {
    /// Creates a message holding a copy of `data`.
    #[inline]
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Returns the payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the message, returning its bytes.
    #[inline]
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Self::from_data(data)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::from_data(text.as_bytes())
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = &self.data[..self.data.len().min(DEBUG_PREVIEW_LEN)];
        f.debug_struct("Message")
            .field("len", &self.data.len())
            .field("preview", &String::from_utf8_lossy(preview))
            .finish()
    }
}

// ============================================================================
// ProtocolType
// ============================================================================

/// Data transportation protocol of an endpoint.
///
/// Carried as metadata only; the transport applies no framing either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolType {
    /// Each callback carries exactly one message.
    #[default]
    MessageStream,
    /// Callbacks carry a framed byte stream.
    ByteStream,
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageStream => f.write_str("message-stream"),
            Self::ByteStream => f.write_str("byte-stream"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
