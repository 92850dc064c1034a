//! # Generational Handles
//!
//! Live objects (effect instances, particle groups) are referenced by
//! lightweight identifiers consisting of:
//! - An index into a slot array
//! - A generation counter for safe slot reuse
//!
//! Looking up a handle whose generation no longer matches the slot is a
//! benign "not found", never a dangling access.

/// Opaque identifier for a pooled object.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the owning slot array
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawHandle(u64);

impl RawHandle {
    /// Creates a new handle from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The index into the slot array (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid handle.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this handle is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::NULL
    }
}
