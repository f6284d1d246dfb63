//! # tripwire-core
//!
//! Trap-based heap memory-safety checking without instruction
//! instrumentation.
//!
//! This crate builds a precise, single-access verdict out of two coarse
//! fault sources:
//!
//! - A **region trap** that intercepts any access into a protected address
//!   range *before* it takes effect (but cannot tell a load from a store,
//!   and cannot let the access through while armed)
//! - A **watch** that observes exactly one address and fires once the access
//!   there has *completed* (and knows the true access kind)
//!
//! The [`engine`] alternates between the two so that exactly one approved
//! access completes per round trip; the [`policy`] classifies each
//! intercepted access against the [`allocator`] collaborator's bookkeeping
//! (out-of-bounds, use-after-free, unmapped); the [`checker`] ties both
//! together behind the host-facing API.
//!
//! ## Collaborators, not dependencies
//!
//! The checking allocator and the raw trap primitives are consumed through
//! traits ([`allocator::CheckingAllocator`], [`source::TrapSource`]). The
//! [`sim`] module implements both in software, which is how the entire state
//! machine and policy are unit-tested without hardware.
//!
//! ## Failure model
//!
//! Heap-safety violations are terminal: the checker renders the diagnostic
//! and refuses to continue; the host owns the reboot. Internal state
//! violations (the checker's own invariants broken) panic immediately.

pub mod allocator;
pub mod checker;
pub mod engine;
pub mod error;
pub mod policy;
pub mod sim;
pub mod source;
pub mod types;

pub use checker::HeapChecker;
// Re-export commonly used types
pub use error::{TripwireError, TripwireResult, Violation};
pub use source::{FaultEvent, RegionId, TrapSource};
pub use types::{AccessKind, Address, FaultDescriptor};
