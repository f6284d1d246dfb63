//! # Fault Interception Engine
//!
//! Generic two-phase trap controller.
//!
//! The engine knows nothing about heaps. It owns one [`TrapState`] machine
//! and a single [`HandlerRegistration`], and turns the coarse region trap
//! plus the precise single-address watch into a logical "exactly one access
//! may complete after approval" primitive:
//!
//! 1. `RegionTrapArmed`: any access into the protected region is intercepted
//!    before it takes effect. On a region fault the engine disables the
//!    region trap, arms the watch on the faulting address, and asks the
//!    pre-handler for a verdict.
//! 2. `WatchArmed(addr)`: the region trap is off, so the original instruction
//!    actually executes; only `addr` is instrumented. The watch fires once
//!    the access has completed (and, unlike the region trap, can tell a load
//!    from a store). The engine clears the watch, runs the post-handler, and
//!    re-arms the region trap.
//!
//! The region trap alone cannot implement this: it fires before the access
//! and would fire again forever if left on, which is the entire reason a
//! second, narrower fault source exists.
//!
//! ## Failure semantics
//!
//! A fault that is inconsistent with the current state (wrong fault source
//! for the phase, watch address mismatch, fault while disengaged) means the
//! state machine itself is corrupted. Continuing could silently disable
//! protection, so the engine panics immediately rather than attempting the
//! normal diagnostic path.

use std::io::Write;

use crate::error::{TripwireError, TripwireResult, Violation};
use crate::source::{FaultEvent, RegionId, TrapSource};
use crate::types::{AccessKind, FaultDescriptor};

/// Verdict of a pre-access handler.
///
/// `Ok(())` approves the access; the engine proceeds to its watch phase and
/// lets the single instruction complete. `Err` is a fatal heap-safety
/// violation; the engine propagates it without transitioning and the host
/// must not resume the target.
pub type AccessDecision = Result<(), Violation>;

/// Pre-access callback: consulted before the intercepted access takes effect.
///
/// Context travels by closure capture (the C-era opaque `void *data` has no
/// place here).
pub type PreHandler = Box<dyn FnMut(&FaultDescriptor) -> AccessDecision>;

/// Post-access callback: observes the completed access with its precise kind.
pub type PostHandler = Box<dyn FnMut(&FaultDescriptor)>;

/// One-shot handler registration for an engine.
///
/// Built once at initialization and moved into the engine; re-registration is
/// not supported (one active checker at a time). At least one of pre/post
/// must be supplied or engine construction refuses.
///
/// ## Example
///
/// ```rust
/// use tripwire_core::engine::HandlerRegistration;
/// use tripwire_core::source::RegionId;
///
/// let registration = HandlerRegistration::new(RegionId::from_raw(1))
///     .with_pre(|fault| {
///         tracing::trace!(%fault, "approving");
///         Ok(())
///     });
/// ```
pub struct HandlerRegistration
{
    pre: Option<PreHandler>,
    post: Option<PostHandler>,
    region: RegionId,
}

impl std::fmt::Debug for HandlerRegistration
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("HandlerRegistration")
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .field("region", &self.region)
            .finish()
    }
}

impl HandlerRegistration
{
    /// Start an empty registration for the given protection region.
    #[must_use]
    pub fn new(region: RegionId) -> Self
    {
        Self {
            pre: None,
            post: None,
            region,
        }
    }

    /// Attach the pre-access handler.
    #[must_use]
    pub fn with_pre(mut self, pre: impl FnMut(&FaultDescriptor) -> AccessDecision + 'static) -> Self
    {
        self.pre = Some(Box::new(pre));
        self
    }

    /// Attach the post-access handler.
    #[must_use]
    pub fn with_post(mut self, post: impl FnMut(&FaultDescriptor) + 'static) -> Self
    {
        self.post = Some(Box::new(post));
        self
    }

    /// Whether at least one handler is present.
    #[must_use]
    pub fn has_handler(&self) -> bool
    {
        self.pre.is_some() || self.post.is_some()
    }

    /// The protection region this registration covers.
    #[must_use]
    pub fn region(&self) -> RegionId
    {
        self.region
    }
}

/// Phase of the two-phase trap cycle.
///
/// Exactly one instance exists per engine; mutated only inside the fault
/// path. The cycle has no terminal state: a healthy engine alternates
/// between the two variants forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState
{
    /// The coarse region trap is armed; every access into the region is
    /// intercepted before completing.
    RegionTrapArmed,
    /// The region trap is off and the watch is armed on the one address
    /// whose access was approved.
    WatchArmed(crate::types::Address),
}

/// The two-phase trap controller.
///
/// Generic over the injected [`TrapSource`] so real backends and the
/// software harness in [`sim`](crate::sim) drive the identical state
/// machine.
///
/// ## Thread Safety
///
/// Not thread-safe, deliberately: the fault path is single-threaded and
/// non-reentrant by construction (while handling one fault the mechanism for
/// the next access is the opposite one). Hosts porting this to nested or
/// prioritized fault sources must preserve the single-writer property.
pub struct TraceEngine<S: TrapSource>
{
    source: S,
    registration: HandlerRegistration,
    state: TrapState,
    /// Whether the region trap is currently on. Distinct from `state`: the
    /// administrative-access exemption pauses the trap while logically
    /// remaining in `RegionTrapArmed`.
    engaged: bool,
    quiet: bool,
}

impl<S: TrapSource> std::fmt::Debug for TraceEngine<S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("TraceEngine")
            .field("registration", &self.registration)
            .field("state", &self.state)
            .field("engaged", &self.engaged)
            .field("quiet", &self.quiet)
            .finish()
    }
}

/// Abort on a corrupted trap state machine.
///
/// Bypasses the normal diagnostic path on purpose: that path depends on the
/// invariant that just broke.
fn state_violation(detail: &str) -> !
{
    panic!("internal trap-state violation: {detail}");
}

impl<S: TrapSource> TraceEngine<S>
{
    /// Construct the engine and arm the region trap.
    ///
    /// ## Errors
    ///
    /// - [`TripwireError::NoHandlers`]: neither pre nor post was registered
    /// - [`TripwireError::InvalidRegion`]: region id out of the platform range
    pub fn new(source: S, registration: HandlerRegistration) -> TripwireResult<Self>
    {
        if !registration.has_handler() {
            return Err(TripwireError::NoHandlers);
        }
        if !registration.region.is_valid() {
            return Err(TripwireError::InvalidRegion(registration.region.raw()));
        }

        let mut engine = Self {
            source,
            registration,
            state: TrapState::RegionTrapArmed,
            engaged: false,
            quiet: true,
        };
        engine.enable();
        Ok(engine)
    }

    /// Arm the region trap.
    ///
    /// ## Panics
    ///
    /// Panics if the trap is already on. Calling `enable` out of sequence is
    /// a checker bug, and silently no-opping would hide it during
    /// development.
    pub fn enable(&mut self)
    {
        if !self.registration.has_handler() {
            state_violation("enable with no registered handlers");
        }
        if self.engaged {
            state_violation("enable while region trap already on");
        }
        self.source.region_trap_enable();
        self.engaged = true;
    }

    /// Disarm the region trap.
    ///
    /// ## Panics
    ///
    /// Panics if the trap is already off, for the same reason as
    /// [`enable`](Self::enable).
    pub fn disable(&mut self)
    {
        if !self.engaged {
            state_violation("disable while region trap already off");
        }
        self.source.region_trap_disable();
        self.engaged = false;
    }

    /// Whether the region trap is currently on.
    #[must_use]
    pub fn is_engaged(&self) -> bool
    {
        self.engaged
    }

    /// Current phase of the trap cycle.
    #[must_use]
    pub fn state(&self) -> TrapState
    {
        self.state
    }

    /// Suppress (or restore) the per-access trace lines.
    pub fn set_quiet(&mut self, quiet: bool)
    {
        self.quiet = quiet;
    }

    /// Dispatch one fault notification from the host's exception entry.
    ///
    /// This is the engine's entire public fault surface: an enum-driven
    /// dispatcher. `Ok(())` means the round trip may continue (resume the
    /// interrupted instruction). `Err` carries a fatal heap-safety verdict
    /// from the pre-handler; the host must not resume.
    ///
    /// Buffered output is flushed before returning in either case, so trace
    /// lines are not lost or interleaved under repeated faults.
    ///
    /// ## Panics
    ///
    /// Panics on any fault inconsistent with the current [`TrapState`].
    pub fn dispatch(&mut self, event: FaultEvent) -> Result<(), Violation>
    {
        let outcome = self.dispatch_inner(event);

        // Drain buffered output before the host resumes the interrupted
        // instruction; the next fault may arrive before stdio gets another
        // chance.
        let _ = std::io::stdout().flush();

        outcome
    }

    fn dispatch_inner(&mut self, event: FaultEvent) -> Result<(), Violation>
    {
        match event {
            FaultEvent::RegionTrap { address, pc } => {
                if self.state != TrapState::RegionTrapArmed {
                    state_violation("region-trap fault while watch phase active");
                }
                if !self.engaged {
                    state_violation("region-trap fault while region trap off");
                }

                let fault = FaultDescriptor::new(address, AccessKind::Unknown, pc);

                // The trap must come off before the instruction can run; the
                // watch takes over observation of this one address.
                self.disable();
                self.source.watch_arm(address);

                if let Some(pre) = self.registration.pre.as_mut() {
                    if !self.quiet {
                        tracing::trace!(%fault, phase = "pre", "intercepted");
                    }
                    pre(&fault)?;
                }

                self.state = TrapState::WatchArmed(address);
                Ok(())
            }
            FaultEvent::Watch { address, pc, kind } => {
                let TrapState::WatchArmed(expected) = self.state else {
                    state_violation("watch fault while region-trap phase active");
                };
                if address != expected {
                    state_violation("watch fault address does not match armed address");
                }

                self.source.watch_clear();
                let fault = FaultDescriptor::new(address, kind, pc);

                if let Some(post) = self.registration.post.as_mut() {
                    if !self.quiet {
                        tracing::trace!(%fault, phase = "post", "completed");
                    }
                    post(&fault);
                }

                self.enable();
                self.state = TrapState::RegionTrapArmed;
                Ok(())
            }
        }
    }
}

/// RAII pause of the region trap for administrative access.
///
/// Allocator bookkeeping writes land inside the protected region; wrapping
/// the raw allocate/free call in a `TrapPause` keeps them from being
/// reported as user violations. The trap is re-armed on every exit path,
/// including unwinds, so the engaged state is symmetric around the call.
///
/// ## Example
///
/// ```rust,ignore
/// let _pause = TrapPause::new(&mut engine);
/// allocator.raw_free(address);
/// // trap re-armed when `_pause` drops
/// ```
pub struct TrapPause<'a, S: TrapSource>
{
    engine: &'a mut TraceEngine<S>,
}

impl<'a, S: TrapSource> TrapPause<'a, S>
{
    /// Disarm the region trap until the guard drops.
    ///
    /// ## Panics
    ///
    /// Panics if the trap is not currently on (see
    /// [`TraceEngine::disable`]).
    pub fn new(engine: &'a mut TraceEngine<S>) -> Self
    {
        engine.disable();
        Self { engine }
    }
}

impl<S: TrapSource> Drop for TrapPause<'_, S>
{
    fn drop(&mut self)
    {
        self.engine.enable();
    }
}
