//! # Simulated Backend
//!
//! Software implementations of both collaborator traits, plus a session
//! driver that replays full fault round trips. Everything the engine and the
//! policy do can be exercised here without a protection domain or a debug
//! register in sight; real backends only swap the two trait objects.
//!
//! The trap source is split into a driving half and a probing half (like a
//! channel): the [`SimTrapSource`] moves into the engine, while the matching
//! [`SimProbe`] stays with the test and reports what the engine asked the
//! "hardware" to do.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::allocator::{BlockId, BlockRef, BlockState, CheckingAllocator};
use crate::checker::HeapChecker;
use crate::error::{TripwireResult, Violation};
use crate::source::{FaultEvent, RegionId, TrapSource};
use crate::types::{AccessKind, Address};

/// Shared arming state behind a source/probe pair.
#[derive(Debug, Default)]
struct SimTrapState
{
    region_trap_on: bool,
    watch: Option<Address>,
    region_enables: u64,
    region_disables: u64,
    watch_arms: u64,
}

fn lock(state: &Mutex<SimTrapState>) -> MutexGuard<'_, SimTrapState>
{
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Create a connected trap source / probe pair.
#[must_use]
pub fn sim_source() -> (SimTrapSource, SimProbe)
{
    let state = Arc::new(Mutex::new(SimTrapState::default()));
    (SimTrapSource { state: Arc::clone(&state) }, SimProbe { state })
}

/// Driving half: implements [`TrapSource`] by recording arming requests.
///
/// Deliberately dumb, per the trait contract: no sequencing checks live
/// here. The engine owns those and the tests assert them through the probe.
#[derive(Debug)]
pub struct SimTrapSource
{
    state: Arc<Mutex<SimTrapState>>,
}

impl TrapSource for SimTrapSource
{
    fn region_trap_enable(&mut self)
    {
        let mut state = lock(&self.state);
        state.region_trap_on = true;
        state.region_enables += 1;
    }

    fn region_trap_disable(&mut self)
    {
        let mut state = lock(&self.state);
        state.region_trap_on = false;
        state.region_disables += 1;
    }

    fn watch_arm(&mut self, address: Address)
    {
        let mut state = lock(&self.state);
        state.watch = Some(address);
        state.watch_arms += 1;
    }

    fn watch_clear(&mut self)
    {
        lock(&self.state).watch = None;
    }
}

/// Probing half: read-only view of what the engine armed.
#[derive(Debug, Clone)]
pub struct SimProbe
{
    state: Arc<Mutex<SimTrapState>>,
}

impl SimProbe
{
    /// Whether the region trap is currently armed.
    #[must_use]
    pub fn region_trap_on(&self) -> bool
    {
        lock(&self.state).region_trap_on
    }

    /// The currently watched address, if any.
    #[must_use]
    pub fn watch(&self) -> Option<Address>
    {
        lock(&self.state).watch
    }

    /// How many times the region trap has been armed.
    #[must_use]
    pub fn region_enables(&self) -> u64
    {
        lock(&self.state).region_enables
    }

    /// How many times the region trap has been disarmed.
    #[must_use]
    pub fn region_disables(&self) -> u64
    {
        lock(&self.state).region_disables
    }

    /// How many times a watch has been armed.
    #[must_use]
    pub fn watch_arms(&self) -> u64
    {
        lock(&self.state).watch_arms
    }
}

/// One tracked allocation in the simulated heap.
#[derive(Debug, Clone, Copy)]
struct SimBlock
{
    id: BlockId,
    base: Address,
    size: usize,
    state: BlockState,
}

/// A block-list checking allocator for tests and demos.
///
/// Bump allocation with a redzone margin around each block. Freed blocks
/// keep their pre-free bounds, so use-after-free offsets are computed
/// against the region the allocation used to own. Block ids count up from 1
/// in allocation order, which keeps diagnostics in tests predictable.
#[derive(Debug)]
pub struct SimHeap
{
    blocks: Vec<SimBlock>,
    cursor: Address,
    next_id: u32,
}

impl SimHeap
{
    /// Attribution margin around each block, in bytes. Accesses inside the
    /// margin are reported against the adjacent block; beyond it they are
    /// unmapped.
    pub const REDZONE: u64 = 128;

    /// Create a simulated heap whose first block lands at `base`.
    #[must_use]
    pub fn new(base: u64) -> Self
    {
        Self {
            blocks: Vec::new(),
            cursor: Address::new(base),
            next_id: 1,
        }
    }

    fn block(&self, block: BlockRef) -> &SimBlock
    {
        // A stale or foreign BlockRef is a harness bug, not a recoverable
        // condition.
        &self.blocks[block.raw() as usize]
    }
}

impl CheckingAllocator for SimHeap
{
    fn find_block(&self, address: Address) -> Option<BlockRef>
    {
        self.blocks.iter().position(|block| {
            let lo = block.base.value().saturating_sub(Self::REDZONE);
            let hi = block.base.value() + block.size as u64 + Self::REDZONE;
            (lo..hi).contains(&address.value())
        })
        .map(|index| BlockRef::from_raw(index as u32))
    }

    fn block_state(&self, block: BlockRef) -> BlockState
    {
        self.block(block).state
    }

    fn legal_offset(&self, block: BlockRef, address: Address) -> i64
    {
        let block = self.block(block);
        let end = block.base + block.size as u64;
        if address < block.base {
            address.offset_from(block.base)
        } else if address >= end {
            // One byte past the end reports +1.
            address.offset_from(end) + 1
        } else {
            0
        }
    }

    fn block_size(&self, block: BlockRef) -> usize
    {
        self.block(block).size
    }

    fn block_id(&self, block: BlockRef) -> BlockId
    {
        self.block(block).id
    }

    fn raw_allocate(&mut self, size: usize) -> Option<Address>
    {
        if size == 0 {
            return None;
        }
        let base = self.cursor;
        // Keep redzones of neighbouring blocks disjoint; refuse blocks whose
        // redzone would wrap past the top of the address space.
        let next = base.checked_add(size as u64 + 2 * Self::REDZONE)?;
        let id = BlockId::from_raw(self.next_id);
        self.next_id += 1;
        self.blocks.push(SimBlock {
            id,
            base,
            size,
            state: BlockState::Allocated,
        });
        self.cursor = next;
        Some(base)
    }

    fn raw_free(&mut self, address: Address)
    {
        match self.blocks.iter_mut().find(|block| block.base == address) {
            Some(block) => block.state = BlockState::Freed,
            None => tracing::warn!(%address, "free of unknown block ignored"),
        }
    }
}

/// Replays full access round trips through a checker, the way a host's
/// exception entry would: region fault first, then (if approved) the watch
/// fault for the completed access.
pub struct SimSession<A: CheckingAllocator + 'static>
{
    checker: HeapChecker<SimTrapSource, A>,
    probe: SimProbe,
    next_pc: u64,
}

impl<A: CheckingAllocator + 'static> SimSession<A>
{
    /// Start a session: builds the source/probe pair and initializes the
    /// checker over `heap`.
    pub fn start(heap: A, region: RegionId) -> TripwireResult<Self>
    {
        let (source, probe) = sim_source();
        let checker = HeapChecker::init(source, heap, region)?;
        Ok(Self {
            checker,
            probe,
            next_pc: 0x8000,
        })
    }

    /// Perform one simulated access to `address`.
    ///
    /// If the region trap is off (administrative pause), the access proceeds
    /// untrapped, exactly as on hardware. Otherwise the region fault is
    /// delivered, and, when the policy approves, the watch fault follows
    /// with the true access `kind`.
    pub fn access(&mut self, address: Address, kind: AccessKind) -> Result<(), Violation>
    {
        if !self.probe.region_trap_on() {
            return Ok(());
        }
        let pc = Address::new(self.next_pc);
        self.next_pc += 4;
        self.checker.handle_fault(FaultEvent::RegionTrap { address, pc })?;
        self.checker.handle_fault(FaultEvent::Watch { address, pc, kind })
    }

    /// The checker under test.
    pub fn checker(&mut self) -> &mut HeapChecker<SimTrapSource, A>
    {
        &mut self.checker
    }

    /// The probe for the simulated trap hardware.
    #[must_use]
    pub fn probe(&self) -> &SimProbe
    {
        &self.probe
    }
}

impl<A: CheckingAllocator + 'static> std::fmt::Debug for SimSession<A>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("SimSession")
            .field("checker", &self.checker)
            .field("next_pc", &self.next_pc)
            .finish()
    }
}
