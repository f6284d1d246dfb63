//! # Heap Checker
//!
//! The exposed checker API: wires the heap safety policy into a fault
//! interception engine and adds the administrative plumbing around it
//! (verbosity, error counting, the allocate/free exemption, the one-active-
//! checker rule).
//!
//! ## Lifecycle
//!
//! 1. [`HeapChecker::init`] acquires the process-wide active slot, registers
//!    the policy as the engine's pre-handler, and arms the region trap.
//! 2. The host's exception entry forwards every fault notification to
//!    [`HeapChecker::handle_fault`].
//! 3. On `Err(Violation)` the diagnostic has already been rendered and the
//!    checker is halted; the host must invoke its reboot primitive and must
//!    not resume the target. There is no recovery path.
//!
//! The checker is expected to live for the rest of the process. Dropping it
//! releases the active slot, which is what makes the one-at-a-time rule a
//! construction-time invariant rather than a convention.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::allocator::CheckingAllocator;
use crate::engine::{HandlerRegistration, TraceEngine, TrapPause, TrapState};
use crate::error::{TripwireError, TripwireResult, Violation};
use crate::policy;
use crate::source::{FaultEvent, RegionId, TrapSource};
use crate::types::Address;

/// Process-wide slot: at most one checker owns the fault path at a time.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// RAII claim on the process-wide checker slot.
struct ActiveSlot;

impl ActiveSlot
{
    fn acquire() -> TripwireResult<Self>
    {
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(Self)
        } else {
            Err(TripwireError::CheckerActive)
        }
    }
}

impl Drop for ActiveSlot
{
    fn drop(&mut self)
    {
        ACTIVE.store(false, Ordering::Release);
    }
}

/// Lock the shared allocator; a poisoned lock means a panic escaped the
/// fault path, which is an internal state violation.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T>
{
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("internal trap-state violation: allocator lock poisoned"),
    }
}

/// The heap memory-safety checker.
///
/// Generic over the injected trap source and the checking allocator, so the
/// same checker runs against real fault hardware or the software harness in
/// [`sim`](crate::sim).
///
/// ## Example
///
/// ```rust
/// use tripwire_core::checker::HeapChecker;
/// use tripwire_core::sim::{sim_source, SimHeap};
/// use tripwire_core::source::RegionId;
///
/// let (source, _probe) = sim_source();
/// let mut checker = HeapChecker::init(source, SimHeap::new(0x1000_0000), RegionId::from_raw(1))?;
/// let block = checker.allocate_unobserved(64)?;
/// # drop(block);
/// # Ok::<(), tripwire_core::error::TripwireError>(())
/// ```
pub struct HeapChecker<S: TrapSource, A: CheckingAllocator>
{
    engine: TraceEngine<S>,
    heap: Arc<Mutex<A>>,
    errors: Arc<AtomicUsize>,
    quiet: Arc<AtomicBool>,
    halted: bool,
    _slot: ActiveSlot,
}

impl<S: TrapSource, A: CheckingAllocator> std::fmt::Debug for HeapChecker<S, A>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("HeapChecker")
            .field("engine", &self.engine.state())
            .field("engaged", &self.engine.is_engaged())
            .field("errors", &self.errors.load(Ordering::Relaxed))
            .field("halted", &self.halted)
            .finish()
    }
}

impl<S, A> HeapChecker<S, A>
where
    S: TrapSource,
    A: CheckingAllocator + 'static,
{
    /// Initialize the checker: claim the active slot, register the policy,
    /// arm the region trap.
    ///
    /// ## Errors
    ///
    /// - [`TripwireError::CheckerActive`]: another checker holds the slot
    /// - [`TripwireError::InvalidRegion`]: region id out of range
    pub fn init(source: S, heap: A, region: RegionId) -> TripwireResult<Self>
    {
        let slot = ActiveSlot::acquire()?;

        let heap = Arc::new(Mutex::new(heap));
        let errors = Arc::new(AtomicUsize::new(0));
        let quiet = Arc::new(AtomicBool::new(true));

        let pre = {
            let heap = Arc::clone(&heap);
            let errors = Arc::clone(&errors);
            let quiet = Arc::clone(&quiet);
            move |fault: &crate::types::FaultDescriptor| {
                if !quiet.load(Ordering::Relaxed) {
                    tracing::trace!(%fault, "checking intercepted access");
                }
                match policy::classify(&*lock(&heap), fault) {
                    Ok(()) => Ok(()),
                    Err(violation) => {
                        errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(%violation, pc = %fault.pc, "heap-safety violation");
                        Err(violation)
                    }
                }
            }
        };

        let registration = HandlerRegistration::new(region).with_pre(pre);
        let engine = TraceEngine::new(source, registration)?;

        Ok(Self {
            engine,
            heap,
            errors,
            quiet,
            halted: false,
            _slot: slot,
        })
    }

    /// Forward one fault notification from the host's exception entry.
    ///
    /// `Err(Violation)` is terminal: the diagnostic has been rendered, the
    /// error count incremented, and this checker will never handle another
    /// fault. The host must invoke its reboot primitive and must not resume
    /// the interrupted instruction.
    ///
    /// ## Panics
    ///
    /// Panics if called again after a fatal verdict, or on any fault
    /// inconsistent with the trap state (see
    /// [`TraceEngine::dispatch`]).
    pub fn handle_fault(&mut self, event: FaultEvent) -> Result<(), Violation>
    {
        if self.halted {
            panic!("internal trap-state violation: fault after fatal verdict");
        }
        match self.engine.dispatch(event) {
            Ok(()) => Ok(()),
            Err(violation) => {
                self.halted = true;
                Err(violation)
            }
        }
    }

    /// Suppress (`true`) or restore (`false`) per-access trace lines.
    ///
    /// Affects logging only; classification and termination behavior are
    /// untouched.
    pub fn quiet(&mut self, on: bool)
    {
        self.quiet.store(on, Ordering::Relaxed);
        self.engine.set_quiet(on);
    }

    /// Allocate from the checking allocator with the region trap paused.
    ///
    /// The allocator's own bookkeeping writes land inside the protected
    /// region; the pause keeps them from being reported as user violations.
    /// The trap is re-armed on every exit path, including an allocator
    /// panic.
    ///
    /// ## Errors
    ///
    /// - [`TripwireError::CheckerHalted`]: a violation was already reported
    /// - [`TripwireError::AllocationFailed`]: the allocator refused
    pub fn allocate_unobserved(&mut self, size: usize) -> TripwireResult<Address>
    {
        if self.halted {
            return Err(TripwireError::CheckerHalted);
        }
        let _pause = TrapPause::new(&mut self.engine);
        lock(&self.heap)
            .raw_allocate(size)
            .ok_or(TripwireError::AllocationFailed(size))
    }

    /// Free through the checking allocator with the region trap paused.
    ///
    /// Same exemption and symmetry guarantees as
    /// [`allocate_unobserved`](Self::allocate_unobserved).
    pub fn free_unobserved(&mut self, address: Address) -> TripwireResult<()>
    {
        if self.halted {
            return Err(TripwireError::CheckerHalted);
        }
        let _pause = TrapPause::new(&mut self.engine);
        lock(&self.heap).raw_free(address);
        Ok(())
    }

    /// Number of heap-safety violations this checker has recorded.
    #[must_use]
    pub fn error_count(&self) -> usize
    {
        self.errors.load(Ordering::Relaxed)
    }

    /// Current phase of the underlying trap cycle (for hosts and tests).
    #[must_use]
    pub fn trap_state(&self) -> TrapState
    {
        self.engine.state()
    }

    /// Whether the region trap is currently on.
    #[must_use]
    pub fn is_engaged(&self) -> bool
    {
        self.engine.is_engaged()
    }

    /// Whether a fatal verdict has been reported.
    #[must_use]
    pub fn is_halted(&self) -> bool
    {
        self.halted
    }
}
