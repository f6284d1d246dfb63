//! # Checking Allocator Collaborator
//!
//! Read-only view of the external checking allocator's block bookkeeping.
//!
//! The allocator owns every block header (address range, allocation state,
//! identifier). The policy only ever asks two questions of it: "which block,
//! if any, contains this address" and "what is the signed byte offset of this
//! address from the block's legal data region". The checker additionally
//! calls the raw allocate/free entry points from inside the
//! administrative-access exemption (trap paused), because the allocator's own
//! bookkeeping writes land inside the protected region and must not be
//! mistaken for user violations.
//!
//! This crate never mutates block metadata.

use std::fmt;

/// Opaque handle to one block tracked by the allocator.
///
/// Valid only for the allocator that produced it, and only until the next
/// mutation of that allocator's block list. The policy acquires one, queries
/// it, and drops it inside a single fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef(u32);

impl BlockRef
{
    /// Create a handle from a raw allocator-side value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self
    {
        Self(value)
    }

    /// Get the raw representation (for the allocator's own lookups).
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

/// Stable identifier of a block, as reported in diagnostics.
///
/// Unlike [`BlockRef`], a `BlockId` survives allocator mutations: it names
/// the allocation in error messages ("block #3") and stays meaningful after
/// the block is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId
{
    /// Create an identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for BlockId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Allocation state of a block, as tracked by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState
{
    /// Live allocation; in-bounds accesses are legal.
    Allocated,
    /// Freed; any access is a use-after-free.
    Freed,
}

/// The checking-allocator capability consumed by the policy and the checker.
///
/// ## Offset convention
///
/// [`legal_offset`](Self::legal_offset) relates an address to the block's
/// legal data region `[base, base + size)`:
///
/// - `0`: the address is inside the legal region
/// - negative: that many bytes *below* `base`
/// - positive: that many bytes *past* the region, counting the first byte
///   past the end as `+1`
///
/// Freed blocks keep their pre-free bounds, so offsets into freed blocks are
/// computed against the region the allocation used to own.
pub trait CheckingAllocator
{
    /// Find the block, if any, containing (or attributably near) `address`.
    ///
    /// "Near" is the allocator's call: a checking allocator typically
    /// attributes addresses inside its redzones to the adjacent block so
    /// that small overruns are reported against the block they escaped,
    /// rather than as unmapped.
    fn find_block(&self, address: crate::types::Address) -> Option<BlockRef>;

    /// Allocation state of a block.
    fn block_state(&self, block: BlockRef) -> BlockState;

    /// Signed byte offset of `address` from the block's legal data region.
    fn legal_offset(&self, block: BlockRef, address: crate::types::Address) -> i64;

    /// Size of the block's legal data region in bytes.
    fn block_size(&self, block: BlockRef) -> usize;

    /// Diagnostic identifier of the block.
    fn block_id(&self, block: BlockRef) -> BlockId;

    /// Raw allocation entry point.
    ///
    /// Only ever called with the region trap paused (the
    /// administrative-access exemption); returns `None` when the allocator
    /// cannot satisfy the request.
    fn raw_allocate(&mut self, size: usize) -> Option<crate::types::Address>;

    /// Raw free entry point. Same trap-paused requirement as
    /// [`raw_allocate`](Self::raw_allocate).
    fn raw_free(&mut self, address: crate::types::Address);
}
