//! # Trap Source
//!
//! The injected trap-source capability and its fault notifications.
//!
//! The engine never talks to hardware directly. A backend hands it an object
//! implementing [`TrapSource`] with exactly four operations: toggle the
//! coarse region trap, and arm/clear the single-address precise watch. The
//! two possible fault notifications travel the other way as [`FaultEvent`]
//! values, delivered by the host's exception entry point into
//! [`TraceEngine::dispatch`](crate::engine::TraceEngine::dispatch).
//!
//! ## Why use a trait?
//!
//! - Real backends wrap a protection-domain register and a debug watchpoint
//!   register; those only exist on the target
//! - A software harness ([`sim::SimTrapSource`](crate::sim::SimTrapSource))
//!   implements the same four operations in memory, so the whole state
//!   machine and policy are unit-testable without hardware
//!
//! ## Contract
//!
//! Implementations should be dumb: record the requested arming, fault when
//! the condition occurs, and nothing else. All sequencing rules (never two
//! region traps in flight, watch cleared before re-arming the region trap)
//! are owned and asserted by the engine.

use crate::types::{AccessKind, Address};

/// Identifier of the protection region the coarse trap covers.
///
/// Indexes one of the platform's protection domains. Constructed from a raw
/// index and validated at engine construction; values at or above
/// [`RegionId::MAX_REGIONS`] are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u8);

impl RegionId
{
    /// Number of addressable protection domains on supported platforms.
    pub const MAX_REGIONS: u8 = 16;

    /// Create an identifier from a raw domain index.
    ///
    /// No validation happens here; the engine validates at construction so
    /// the failure surfaces as
    /// [`TripwireError::InvalidRegion`](crate::error::TripwireError::InvalidRegion)
    /// with context.
    #[must_use]
    pub const fn from_raw(value: u8) -> Self
    {
        Self(value)
    }

    /// Get the raw domain index (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u8
    {
        self.0
    }

    /// Whether this identifier is inside the platform's valid range.
    #[must_use]
    pub const fn is_valid(self) -> bool
    {
        self.0 < Self::MAX_REGIONS
    }
}

/// The two fault notifications a trap source can deliver.
///
/// The host's exception entry point translates whatever its fault frame looks
/// like into one of these and forwards it to the engine. The variants carry
/// exactly what each fault source can honestly report: the region trap fires
/// *before* the access and cannot know load vs store; the watch fires after
/// the access completed and can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultEvent
{
    /// The coarse region trap intercepted an access before it took effect.
    RegionTrap
    {
        /// The faulting data address.
        address: Address,
        /// Program counter of the faulting instruction.
        pc: Address,
    },
    /// The precise watch observed the single approved access complete.
    Watch
    {
        /// The watched (and now accessed) address.
        address: Address,
        /// Program counter of the instruction that completed.
        pc: Address,
        /// The true access kind, observed after completion.
        kind: AccessKind,
    },
}

/// The four-operation trap capability consumed by the engine.
///
/// ## Lifecycle
///
/// 1. Engine construction calls [`region_trap_enable`](Self::region_trap_enable)
/// 2. On a region fault: [`region_trap_disable`](Self::region_trap_disable),
///    then [`watch_arm`](Self::watch_arm) on the faulting address
/// 3. On the watch fault: [`watch_clear`](Self::watch_clear), then
///    [`region_trap_enable`](Self::region_trap_enable) again
///
/// ## Thread Safety
///
/// The engine drives a trap source from a single logical thread (the fault
/// path is non-reentrant by construction), so implementations need no
/// internal locking.
pub trait TrapSource
{
    /// Arm the coarse trap over the protected region.
    ///
    /// After this call every load/store into the region must be intercepted
    /// before it takes effect and reported as [`FaultEvent::RegionTrap`].
    fn region_trap_enable(&mut self);

    /// Disarm the coarse trap, letting accesses to the region proceed.
    fn region_trap_disable(&mut self);

    /// Arm the precise watch on a single address.
    ///
    /// The watch must report [`FaultEvent::Watch`] once an access to exactly
    /// this address has completed, including the observed access kind.
    fn watch_arm(&mut self, address: Address);

    /// Clear the precise watch.
    fn watch_clear(&mut self);
}
