//! Unique message identifiers

use std::fmt;

use uuid::Uuid;

/// A 128-bit random identifier for a message.
///
/// Generated identifiers are collision-negligible. The all-zero value is
/// never produced by [`MessageId::new`] and is reserved as the invalid ID.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh random ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero invalid ID
    #[inline]
    pub const fn null() -> Self {
        Self(Uuid::nil())
    }

    /// Check if this ID is the invalid all-zero value
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }

    /// Get the raw 128-bit value
    #[inline]
    pub const fn to_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Create from a raw 128-bit value
    #[inline]
    pub const fn from_u128(bits: u128) -> Self {
        Self(Uuid::from_u128(bits))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "MessageId(null)")
        } else {
            write!(f, "MessageId({})", self.0)
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
