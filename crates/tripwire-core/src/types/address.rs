//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed memory address
///
/// This wrapper around `u64` provides type safety when working with addresses
/// inside the protected region. It prevents accidentally mixing addresses with
/// other `u64` values (block sizes, offsets, error counts).
///
/// ## Why use a newtype?
///
/// - **Type safety**: the classification code juggles addresses, block sizes,
///   and signed offsets; confusing them would misreport violations
/// - **Self-documenting**: trap-source implementations and allocator
///   collaborators agree on one address representation
///
/// ## Example
///
/// ```rust
/// use tripwire_core::types::Address;
///
/// let base = Address::from(0x1000);
/// let past_end = base + 64;
/// assert_eq!(past_end.value(), 0x1040);
/// assert_eq!(past_end.offset_from(base), 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// Create a new address from a `u64` value
    ///
    /// Equivalent to `Address::from(value)` but usable in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    ///
    /// Use this when handing the address to a trap-source backend that wants
    /// a plain integer.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Signed byte distance from `other` to `self`
    ///
    /// Positive when `self` is above `other`, negative when below. This is
    /// the arithmetic the policy uses to relate a faulting address to a
    /// block's legal data region.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use tripwire_core::types::Address;
    ///
    /// let base = Address::from(0x1000);
    /// assert_eq!((base + 8).offset_from(base), 8);
    /// assert_eq!((base - 4).offset_from(base), -4);
    /// ```
    #[must_use]
    pub const fn offset_from(self, other: Self) -> i64
    {
        self.0.wrapping_sub(other.0) as i64
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// Returns `Some(new_address)` if the addition doesn't overflow, or `None` if it does.
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
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
        write!(f, "0x{:x}", self.0)
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

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
