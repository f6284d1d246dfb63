//! # Heap Safety Policy
//!
//! Classifies one intercepted access against the checking allocator's
//! bookkeeping.
//!
//! This is a pre-access policy: it runs before the instruction takes effect,
//! so an approved access is the only one the engine ever lets complete. The
//! classification itself is pure (allocator queries only, no mutation),
//! which is what makes the whole policy table unit-testable without a trap
//! source at all.
//!
//! Limits (by scope, not accident): an access that lands in-bounds of *some*
//! block is approved without provenance checking, and stack/static memory is
//! not tracked.

use crate::allocator::{BlockState, CheckingAllocator};
use crate::error::Violation;
use crate::types::FaultDescriptor;

/// Classify one access. `Ok(())` approves it; `Err` is the fatal verdict.
///
/// The decision table, in allocator terms (`offset` is
/// [`legal_offset`](CheckingAllocator::legal_offset)):
///
/// | containing block | state     | offset | verdict                 |
/// |------------------|-----------|--------|-------------------------|
/// | none             | any       | n/a    | `UnmappedAccess`        |
/// | some             | Freed     | 0      | `UseAfterFreeAtStart`   |
/// | some             | Freed     | < 0    | `UseAfterFreeBefore`    |
/// | some             | Freed     | > 0    | `UseAfterFreeAfter`     |
/// | some             | Allocated | < 0    | `OutOfBoundsBefore`     |
/// | some             | Allocated | > 0    | `OutOfBoundsAfter`      |
/// | some             | Allocated | 0      | approved                |
///
/// The access kind in the verdict is whatever the descriptor carries at
/// report time; in the pre-phase that is `Unknown` (rendered "access"), never
/// a guess.
pub fn classify<A: CheckingAllocator>(heap: &A, fault: &FaultDescriptor) -> Result<(), Violation>
{
    let Some(block) = heap.find_block(fault.address) else {
        return Err(Violation::UnmappedAccess {
            address: fault.address,
            kind: fault.kind,
        });
    };

    let offset = heap.legal_offset(block, fault.address);
    let size = heap.block_size(block);
    let id = heap.block_id(block);

    match heap.block_state(block) {
        BlockState::Freed => {
            if offset == 0 {
                Err(Violation::UseAfterFreeAtStart {
                    address: fault.address,
                    kind: fault.kind,
                    block: id,
                    size,
                })
            } else if offset < 0 {
                Err(Violation::UseAfterFreeBefore {
                    address: fault.address,
                    kind: fault.kind,
                    block: id,
                    distance: offset.unsigned_abs(),
                    size,
                })
            } else {
                Err(Violation::UseAfterFreeAfter {
                    address: fault.address,
                    kind: fault.kind,
                    block: id,
                    distance: offset.unsigned_abs(),
                    size,
                })
            }
        }
        BlockState::Allocated => {
            if offset < 0 {
                Err(Violation::OutOfBoundsBefore {
                    address: fault.address,
                    kind: fault.kind,
                    block: id,
                    distance: offset.unsigned_abs(),
                    size,
                })
            } else if offset > 0 {
                Err(Violation::OutOfBoundsAfter {
                    address: fault.address,
                    kind: fault.kind,
                    block: id,
                    distance: offset.unsigned_abs(),
                    size,
                })
            } else {
                // In bounds of a live block: approved. No provenance check.
                Ok(())
            }
        }
    }
}
