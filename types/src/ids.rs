use std::fmt;

/// Index of a fabric (administrative trust domain) on this device.
///
/// `0` is reserved as "no fabric"; valid indices are `1..=254`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct FabricIndex(u8);

impl FabricIndex {
    /// The reserved "no fabric" index.
    pub const UNDEFINED: Self = Self(0);
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(254);

    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= Self::MIN.0 && self.0 <= Self::MAX.0
    }
}

impl From<u8> for FabricIndex {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for FabricIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Process-unique identity of a timer owner.
///
/// Timers are keyed by owner so an expiry dispatched after its owner was
/// replaced can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
