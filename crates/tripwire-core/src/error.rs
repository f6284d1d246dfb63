//! # Error Types
//!
//! Error handling for the checker.
//!
//! Two distinct failure families live here, and they are deliberately not one
//! enum:
//!
//! 1. [`TripwireError`]: setup and API misuse reported to the caller before
//!    any protection is active. Recoverable in the ordinary sense.
//! 2. [`Violation`]: a classified heap-safety violation. Always fatal; the
//!    checker renders the diagnostic, stops, and expects the host to invoke
//!    its reboot primitive. No violation is retried or downgraded.
//!
//! A third family, internal state violations (trap/watch invariants broken),
//! never appears as a value at all: the engine panics immediately, because
//! the normal diagnostic path itself depends on the invariant that just
//! broke.

use thiserror::Error;

use crate::allocator::BlockId;
use crate::types::{AccessKind, Address};

/// Setup and API errors for checker construction and administration
///
/// These are the failures a host can observe *before* a violation: refusing
/// to construct an engine without handlers, refusing a second concurrent
/// checker, and so on.
#[derive(Error, Debug)]
pub enum TripwireError
{
    /// Neither a pre-access nor a post-access handler was supplied
    ///
    /// An engine with no handlers would intercept every access and do
    /// nothing with it. Construction refuses instead.
    #[error("registration must supply at least one of pre/post handlers")]
    NoHandlers,

    /// The protection-region identifier is outside the platform's valid range
    ///
    /// Region ids index the platform's protection domains; only
    /// `0..RegionId::MAX_REGIONS` are addressable.
    #[error("region id {0} out of range (valid: 0..{max})", max = crate::source::RegionId::MAX_REGIONS)]
    InvalidRegion(u8),

    /// A checker is already active in this process
    ///
    /// Only one checker may own the fault path at a time. The slot is
    /// released when the active checker is dropped.
    #[error("another checker is already active in this process")]
    CheckerActive,

    /// The underlying allocator could not satisfy a raw allocation
    #[error("allocator could not satisfy a request for {0} bytes")]
    AllocationFailed(usize),

    /// The checker already reported a fatal violation and will not resume
    ///
    /// Administrative operations (allocate/free wrappers) refuse to run once
    /// a violation has been reported, since the surrounding system is
    /// expected to be rebooting.
    #[error("checker halted after a heap-safety violation")]
    CheckerHalted,
}

/// Convenience type alias for `Result<T, TripwireError>`
///
/// ```rust
/// use tripwire_core::error::TripwireResult;
/// fn setup() -> TripwireResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type TripwireResult<T> = std::result::Result<T, TripwireError>;

/// A classified heap-safety violation
///
/// Produced by the policy when an intercepted access fails classification
/// against the checking allocator's bookkeeping. Every variant renders the
/// full diagnostic: the faulting address, the owning block (where one
/// exists), the signed offset magnitude from the block's legal region, the
/// block size, and the access kind known at report time (the pre-phase only
/// knows [`AccessKind::Unknown`], rendered as the neutral "access").
///
/// Violations are terminal. The checker that returns one has already logged
/// the diagnostic and will refuse further fault handling; the host owns the
/// reboot.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation
{
    /// The faulting address is not inside (or near) any tracked allocation
    #[error("illegal {kind} to {address}: not inside any tracked block")]
    UnmappedAccess
    {
        /// The faulting address.
        address: Address,
        /// Access kind known at report time.
        kind: AccessKind,
    },

    /// Access inside the legal region of a freed block (offset zero)
    #[error("use after free: {kind} to {address} inside freed block #{block} (block size={size})")]
    UseAfterFreeAtStart
    {
        /// The faulting address.
        address: Address,
        /// Access kind known at report time.
        kind: AccessKind,
        /// Identifier of the freed block.
        block: BlockId,
        /// Size of the block's legal region in bytes.
        size: usize,
    },

    /// Access below the legal region of a freed block
    #[error("illegal {kind} to {address}: {distance} bytes before the legal region of freed block #{block} (block size={size})")]
    UseAfterFreeBefore
    {
        /// The faulting address.
        address: Address,
        /// Access kind known at report time.
        kind: AccessKind,
        /// Identifier of the freed block.
        block: BlockId,
        /// How far below the legal region the access landed, in bytes.
        distance: u64,
        /// Size of the block's legal region in bytes.
        size: usize,
    },

    /// Access past the legal region of a freed block
    #[error("illegal {kind} to {address}: {distance} bytes after the legal region of freed block #{block} (block size={size})")]
    UseAfterFreeAfter
    {
        /// The faulting address.
        address: Address,
        /// Access kind known at report time.
        kind: AccessKind,
        /// Identifier of the freed block.
        block: BlockId,
        /// How far past the legal region the access landed, in bytes.
        distance: u64,
        /// Size of the block's legal region in bytes.
        size: usize,
    },

    /// Access below the legal region of a live block
    #[error("out-of-bounds {kind} to {address}: {distance} bytes before the legal region of block #{block} (block size={size})")]
    OutOfBoundsBefore
    {
        /// The faulting address.
        address: Address,
        /// Access kind known at report time.
        kind: AccessKind,
        /// Identifier of the owning block.
        block: BlockId,
        /// How far below the legal region the access landed, in bytes.
        distance: u64,
        /// Size of the block's legal region in bytes.
        size: usize,
    },

    /// Access past the legal region of a live block
    #[error("out-of-bounds {kind} to {address}: {distance} bytes after the legal region of block #{block} (block size={size})")]
    OutOfBoundsAfter
    {
        /// The faulting address.
        address: Address,
        /// Access kind known at report time.
        kind: AccessKind,
        /// Identifier of the owning block.
        block: BlockId,
        /// How far past the legal region the access landed, in bytes.
        distance: u64,
        /// Size of the block's legal region in bytes.
        size: usize,
    },
}
