//! Target address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed target address
///
/// Program counters, range bounds and dereferenced locations are all target
/// addresses. Keeping them apart from plain `u64` words prevents mixing an
/// address with a size, a register number or a section offset.
///
/// ## Example
///
/// ```rust
/// use dwarfnav_core::types::Address;
///
/// let pc = Address::from(0x1000);
/// let next = pc + 0x10;
/// assert_eq!(next.value(), 0x1010);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// The all-ones address, used by location and range lists as a
    /// base-address-selection marker.
    pub const MAX: Self = Address(u64::MAX);

    /// Create a new address from a `u64` value
    ///
    /// ```rust
    /// use dwarfnav_core::types::Address;
    ///
    /// const TEXT_START: Address = Address::new(0x401000);
    /// assert_eq!(TEXT_START.value(), 0x401000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an unsigned offset, returning `None` on overflow
    ///
    /// ```rust
    /// use dwarfnav_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Apply a signed displacement with two's-complement wrap-around
    ///
    /// Register-relative and CFA-relative locations are computed this way,
    /// matching how the target's own address arithmetic behaves.
    ///
    /// ```rust
    /// use dwarfnav_core::types::Address;
    ///
    /// let cfa = Address::from(0x1000);
    /// assert_eq!(cfa.offset_by(-8), Address::from(0xff8));
    /// ```
    pub const fn offset_by(self, displacement: i64) -> Self
    {
        Address(self.0.wrapping_add_signed(displacement))
    }

    /// Truncate to the low `size` bytes, for 4-byte targets
    pub const fn truncate(self, size: u8) -> Self
    {
        if size >= 8 {
            self
        } else {
            Address(self.0 & ((1u64 << (size as u32 * 8)) - 1))
        }
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<Address> for Address
{
    type Output = u64;

    fn sub(self, rhs: Address) -> Self::Output
    {
        self.0.wrapping_sub(rhs.0)
    }
}
