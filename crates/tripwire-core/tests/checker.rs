//! Tests for the checker facade: active slot, administrative exemption,
//! terminal violation semantics, and the end-to-end scenario.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serial_test::serial;
use tripwire_core::allocator::{BlockId, BlockRef, BlockState, CheckingAllocator};
use tripwire_core::checker::HeapChecker;
use tripwire_core::engine::TrapState;
use tripwire_core::error::{TripwireError, Violation};
use tripwire_core::sim::{sim_source, SimHeap, SimSession};
use tripwire_core::source::{FaultEvent, RegionId};
use tripwire_core::types::{AccessKind, Address};

fn session() -> SimSession<SimHeap>
{
    SimSession::start(SimHeap::new(0x10_0000), RegionId::from_raw(1)).expect("session start")
}

#[test]
#[serial]
fn test_single_active_checker()
{
    let (source, _probe) = sim_source();
    let checker = HeapChecker::init(source, SimHeap::new(0x1000), RegionId::from_raw(1)).expect("first init");

    let (second_source, _second_probe) = sim_source();
    match HeapChecker::init(second_source, SimHeap::new(0x2000), RegionId::from_raw(2)) {
        Err(TripwireError::CheckerActive) => {}
        other => panic!("expected CheckerActive, got {other:?}"),
    }

    // Dropping the active checker releases the slot.
    drop(checker);
    let (third_source, _third_probe) = sim_source();
    HeapChecker::init(third_source, SimHeap::new(0x3000), RegionId::from_raw(1)).expect("slot released");
}

#[test]
#[serial]
fn test_approved_access_round_trip()
{
    let mut session = session();
    let base = session.checker().allocate_unobserved(64).expect("allocate");

    session
        .access(base + 10, AccessKind::Store)
        .expect("in-bounds access approved");

    assert_eq!(session.checker().trap_state(), TrapState::RegionTrapArmed);
    assert!(session.probe().region_trap_on());
    assert_eq!(session.checker().error_count(), 0);
    // One watch arming per approved access.
    assert_eq!(session.probe().watch_arms(), 1);
}

#[test]
#[serial]
fn test_scenario_out_of_bounds_one_past_end()
{
    let mut session = session();
    let base = session.checker().allocate_unobserved(64).expect("allocate");

    session.access(base + 10, AccessKind::Load).expect("approved");

    match session.access(base + 64, AccessKind::Store) {
        Err(Violation::OutOfBoundsAfter { distance, size, block, .. }) => {
            assert_eq!(distance, 1);
            assert_eq!(size, 64);
            assert_eq!(block, BlockId::from_raw(1));
        }
        other => panic!("expected OutOfBoundsAfter, got {other:?}"),
    }
    assert_eq!(session.checker().error_count(), 1);
    assert!(session.checker().is_halted());
}

#[test]
#[serial]
fn test_scenario_use_after_free()
{
    let mut session = session();
    let base = session.checker().allocate_unobserved(64).expect("allocate");
    session.checker().free_unobserved(base).expect("free");

    match session.access(base, AccessKind::Store) {
        Err(Violation::UseAfterFreeAtStart { size, .. }) => assert_eq!(size, 64),
        other => panic!("expected UseAfterFreeAtStart, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_scenario_past_freed_block()
{
    let mut session = session();
    let base = session.checker().allocate_unobserved(64).expect("allocate");
    session.checker().free_unobserved(base).expect("free");

    match session.access(base + 70, AccessKind::Store) {
        Err(Violation::UseAfterFreeAfter { distance, size, .. }) => {
            assert_eq!(distance, 7);
            assert_eq!(size, 64);
        }
        other => panic!("expected UseAfterFreeAfter, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_scenario_unmapped()
{
    let mut session = session();
    session.checker().allocate_unobserved(64).expect("allocate");

    match session.access(Address::from(0xdead_0000), AccessKind::Load) {
        Err(Violation::UnmappedAccess { .. }) => {}
        other => panic!("expected UnmappedAccess, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_unobserved_ops_preserve_trap_state()
{
    let mut session = session();
    assert!(session.probe().region_trap_on());
    let enables_before = session.probe().region_enables();

    let base = session.checker().allocate_unobserved(32).expect("allocate");
    assert!(session.probe().region_trap_on());
    assert_eq!(session.checker().trap_state(), TrapState::RegionTrapArmed);

    session.checker().free_unobserved(base).expect("free");
    assert!(session.probe().region_trap_on());

    // Each wrapper disarmed and re-armed exactly once.
    assert_eq!(session.probe().region_enables(), enables_before + 2);
    assert_eq!(session.probe().region_disables(), 2);
}

/// Allocator that panics mid-allocation, to prove the pause guard re-arms
/// the trap on unwind.
struct FaultyHeap;

impl CheckingAllocator for FaultyHeap
{
    fn find_block(&self, _address: Address) -> Option<BlockRef>
    {
        None
    }

    fn block_state(&self, _block: BlockRef) -> BlockState
    {
        BlockState::Allocated
    }

    fn legal_offset(&self, _block: BlockRef, _address: Address) -> i64
    {
        0
    }

    fn block_size(&self, _block: BlockRef) -> usize
    {
        0
    }

    fn block_id(&self, _block: BlockRef) -> BlockId
    {
        BlockId::from_raw(0)
    }

    fn raw_allocate(&mut self, _size: usize) -> Option<Address>
    {
        panic!("allocator fault");
    }

    fn raw_free(&mut self, _address: Address) {}
}

#[test]
#[serial]
fn test_trap_rearmed_when_allocator_panics()
{
    let (source, probe) = sim_source();
    let mut checker = HeapChecker::init(source, FaultyHeap, RegionId::from_raw(1)).expect("init");

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _ = checker.allocate_unobserved(8);
    }));
    assert!(result.is_err());

    // The pause guard re-armed the trap during unwind.
    assert!(probe.region_trap_on());
    assert!(checker.is_engaged());
}

#[test]
#[serial]
fn test_halted_checker_refuses_administration()
{
    let mut session = session();
    let base = session.checker().allocate_unobserved(16).expect("allocate");

    assert!(session.access(base + 16, AccessKind::Store).is_err());

    match session.checker().allocate_unobserved(8) {
        Err(TripwireError::CheckerHalted) => {}
        other => panic!("expected CheckerHalted, got {other:?}"),
    }
    match session.checker().free_unobserved(base) {
        Err(TripwireError::CheckerHalted) => {}
        other => panic!("expected CheckerHalted, got {other:?}"),
    }
}

#[test]
#[serial]
#[should_panic(expected = "fault after fatal verdict")]
fn test_no_resumption_after_violation()
{
    let (source, _probe) = sim_source();
    let mut checker = HeapChecker::init(source, SimHeap::new(0x1000), RegionId::from_raw(1)).expect("init");

    let event = FaultEvent::RegionTrap {
        address: Address::from(0xdead_0000),
        pc: Address::from(0x8000),
    };
    assert!(checker.handle_fault(event).is_err());
    // The surrounding system is rebooting; another fault is a checker bug.
    let _ = checker.handle_fault(event);
}

#[test]
#[serial]
fn test_quiet_does_not_affect_classification()
{
    let mut session = session();
    session.checker().quiet(false);
    let base = session.checker().allocate_unobserved(64).expect("allocate");

    session.access(base, AccessKind::Load).expect("approved");
    assert!(session.access(base - 4, AccessKind::Store).is_err());
    assert_eq!(session.checker().error_count(), 1);
}

#[test]
#[serial]
fn test_error_count_starts_at_zero()
{
    let mut session = session();
    assert_eq!(session.checker().error_count(), 0);
    assert_eq!(session.probe().region_enables(), 1);
}
