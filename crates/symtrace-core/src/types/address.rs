//! Process-virtual address type.

use std::fmt;
use std::mem;

/// Strongly typed process-virtual address
///
/// This wrapper around `u64` is the unit every resolver in the crate works
/// with: captured return addresses, file-relative offsets handed to the image
/// resolver, and module base addresses all travel as `Address`.
///
/// ## Why use a newtype?
///
/// - **Type safety**: Prevents accidentally passing a line number or a frame
///   index where an address is expected
/// - **Uniform rendering**: Every address prints the same way in logs and in
///   synthesized frame labels
///
/// ## Example
///
/// ```rust
/// use symtrace_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// assert_eq!(addr.value(), 0x1000);
/// assert_eq!(addr.to_string(), "0x0000000000001000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// Capture services stop walking when they meet it, so it never names a
    /// real frame.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// This is equivalent to `Address::from(value)` but can be used in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Build an address from a code or data pointer.
    pub fn from_ptr<T>(ptr: *const T) -> Self
    {
        Address(ptr as usize as u64)
    }

    /// Subtract an offset from this address, checking for underflow
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symtrace_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_sub(0x100), Some(Address::from(0xf00)));
    /// assert_eq!(addr.checked_sub(u64::MAX), None);
    /// ```
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Fixed-width label used when an address has no symbol name.
    ///
    /// The label is `0x` followed by the address in upper-case hexadecimal,
    /// zero-padded to twice the size of a native pointer. On a 64-bit host
    /// that is 16 digits:
    ///
    /// ```rust
    /// use symtrace_core::types::Address;
    ///
    /// # #[cfg(target_pointer_width = "64")]
    /// assert_eq!(Address::new(0x7f3a_12bc).hex_label(), "0x000000007F3A12BC");
    /// ```
    pub fn hex_label(self) -> String
    {
        let width = mem::size_of::<usize>() * 2;
        format!("0x{:0width$X}", self.0)
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

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
