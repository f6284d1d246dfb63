//! Fault descriptors handed to pre/post handlers.

use std::fmt;

use crate::types::Address;

/// What kind of memory access faulted.
///
/// The coarse region trap fires *before* the instruction executes and cannot
/// tell a load from a store, so the pre-phase descriptor always carries
/// [`AccessKind::Unknown`]. The watch fires after the access completes and
/// observes the true kind, so the post-phase descriptor is precise. Handlers
/// must not guess: diagnostics render `Unknown` as the neutral word "access".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind
{
    /// A read of the faulting address.
    Load,
    /// A write to the faulting address.
    Store,
    /// Not yet determined (pre-phase: the region trap fired before the
    /// instruction ran).
    Unknown,
}

impl fmt::Display for AccessKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            AccessKind::Load => write!(f, "load"),
            AccessKind::Store => write!(f, "store"),
            AccessKind::Unknown => write!(f, "access"),
        }
    }
}

/// Snapshot of one intercepted memory access.
///
/// Built fresh on every trap and handed by value to the registered handlers;
/// never persisted. The same shape serves both phases: the pre-phase
/// descriptor has `kind == Unknown`, the post-phase descriptor carries the
/// kind the watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultDescriptor
{
    /// The faulting data address.
    pub address: Address,
    /// Load, store, or unknown (pre-phase).
    pub kind: AccessKind,
    /// Program counter of the faulting instruction.
    pub pc: Address,
}

impl FaultDescriptor
{
    /// Build a descriptor for one intercepted access.
    #[must_use]
    pub const fn new(address: Address, kind: AccessKind, pc: Address) -> Self
    {
        Self { address, kind, pc }
    }
}

impl fmt::Display for FaultDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} at {} (pc={})", self.kind, self.address, self.pc)
    }
}
