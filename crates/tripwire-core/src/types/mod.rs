//! # Types
//!
//! Backend-agnostic types used throughout the checker.
//!
//! These types abstract away the trap-source and allocator details, allowing
//! the engine and the policy to work with concepts like "faulting address"
//! and "access kind" without knowing which hardware (or software harness)
//! produced them.

pub mod address;
pub mod fault;

// Re-export all public types
pub use address::Address;
pub use fault::{AccessKind, FaultDescriptor};
