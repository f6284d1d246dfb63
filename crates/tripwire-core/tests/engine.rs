//! Tests for the two-phase fault interception engine

use std::cell::RefCell;
use std::rc::Rc;

use tripwire_core::engine::{HandlerRegistration, TraceEngine, TrapPause, TrapState};
use tripwire_core::error::{TripwireError, Violation};
use tripwire_core::sim::{sim_source, SimProbe, SimTrapSource};
use tripwire_core::source::{FaultEvent, RegionId};
use tripwire_core::types::{AccessKind, Address, FaultDescriptor};

fn engine_with_recorders() -> (
    TraceEngine<SimTrapSource>,
    SimProbe,
    Rc<RefCell<Vec<FaultDescriptor>>>,
    Rc<RefCell<Vec<FaultDescriptor>>>,
)
{
    let (source, probe) = sim_source();
    let pre_log = Rc::new(RefCell::new(Vec::new()));
    let post_log = Rc::new(RefCell::new(Vec::new()));

    let registration = HandlerRegistration::new(RegionId::from_raw(1))
        .with_pre({
            let pre_log = Rc::clone(&pre_log);
            move |fault: &FaultDescriptor| {
                pre_log.borrow_mut().push(*fault);
                Ok(())
            }
        })
        .with_post({
            let post_log = Rc::clone(&post_log);
            move |fault: &FaultDescriptor| {
                post_log.borrow_mut().push(*fault);
            }
        });

    let engine = TraceEngine::new(source, registration).expect("engine construction");
    (engine, probe, pre_log, post_log)
}

#[test]
fn test_construction_requires_a_handler()
{
    let (source, _probe) = sim_source();
    let registration = HandlerRegistration::new(RegionId::from_raw(1));
    match TraceEngine::new(source, registration) {
        Err(TripwireError::NoHandlers) => {}
        other => panic!("expected NoHandlers, got {other:?}"),
    }
}

#[test]
fn test_construction_rejects_out_of_range_region()
{
    let (source, _probe) = sim_source();
    let registration =
        HandlerRegistration::new(RegionId::from_raw(16)).with_pre(|_fault: &FaultDescriptor| Ok(()));
    match TraceEngine::new(source, registration) {
        Err(TripwireError::InvalidRegion(16)) => {}
        other => panic!("expected InvalidRegion(16), got {other:?}"),
    }
}

#[test]
fn test_construction_arms_region_trap()
{
    let (engine, probe, _pre, _post) = engine_with_recorders();
    assert!(probe.region_trap_on());
    assert_eq!(probe.region_enables(), 1);
    assert_eq!(engine.state(), TrapState::RegionTrapArmed);
    assert!(engine.is_engaged());
}

#[test]
fn test_round_trip_allows_exactly_one_access()
{
    let (mut engine, probe, pre_log, post_log) = engine_with_recorders();
    let address = Address::from(0x2000);
    let pc = Address::from(0x8000);

    engine
        .dispatch(FaultEvent::RegionTrap { address, pc })
        .expect("pre approves");

    // Region trap off, watch armed on the one faulting address: the original
    // instruction can now run, and only it is instrumented.
    assert!(!probe.region_trap_on());
    assert_eq!(probe.watch(), Some(address));
    assert_eq!(probe.watch_arms(), 1);
    assert_eq!(engine.state(), TrapState::WatchArmed(address));

    // Pre-phase cannot know load vs store.
    assert_eq!(pre_log.borrow().len(), 1);
    assert_eq!(pre_log.borrow()[0].kind, AccessKind::Unknown);
    assert_eq!(pre_log.borrow()[0].address, address);
    assert!(post_log.borrow().is_empty());

    engine
        .dispatch(FaultEvent::Watch {
            address,
            pc,
            kind: AccessKind::Store,
        })
        .expect("watch completes");

    // Back to the armed phase: watch cleared, region trap re-enabled once.
    assert!(probe.region_trap_on());
    assert_eq!(probe.watch(), None);
    assert_eq!(probe.region_enables(), 2);
    assert_eq!(engine.state(), TrapState::RegionTrapArmed);

    // Post-phase sees the true kind.
    assert_eq!(post_log.borrow().len(), 1);
    assert_eq!(post_log.borrow()[0].kind, AccessKind::Store);
}

#[test]
fn test_pre_veto_propagates_without_transition()
{
    let (source, probe) = sim_source();
    let registration = HandlerRegistration::new(RegionId::from_raw(1)).with_pre(|fault: &FaultDescriptor| {
        Err(Violation::UnmappedAccess {
            address: fault.address,
            kind: fault.kind,
        })
    });
    let mut engine = TraceEngine::new(source, registration).expect("engine construction");

    let address = Address::from(0x3000);
    let result = engine.dispatch(FaultEvent::RegionTrap {
        address,
        pc: Address::from(0x8000),
    });

    match result {
        Err(Violation::UnmappedAccess { address: at, .. }) => assert_eq!(at, address),
        other => panic!("expected UnmappedAccess, got {other:?}"),
    }
    // No transition to the watch phase: the verdict is terminal and the host
    // must not resume.
    assert_eq!(engine.state(), TrapState::RegionTrapArmed);
    assert!(!probe.region_trap_on());
}

#[test]
fn test_post_only_registration_is_accepted()
{
    let (source, _probe) = sim_source();
    let post_log = Rc::new(RefCell::new(Vec::new()));
    let registration = HandlerRegistration::new(RegionId::from_raw(2)).with_post({
        let post_log = Rc::clone(&post_log);
        move |fault: &FaultDescriptor| post_log.borrow_mut().push(*fault)
    });
    let mut engine = TraceEngine::new(source, registration).expect("engine construction");

    let address = Address::from(0x4000);
    let pc = Address::from(0x8004);
    engine
        .dispatch(FaultEvent::RegionTrap { address, pc })
        .expect("no pre handler, access approved by default");
    engine
        .dispatch(FaultEvent::Watch {
            address,
            pc,
            kind: AccessKind::Load,
        })
        .expect("watch completes");

    assert_eq!(post_log.borrow().len(), 1);
    assert_eq!(post_log.borrow()[0].kind, AccessKind::Load);
}

#[test]
#[should_panic(expected = "already on")]
fn test_double_enable_panics()
{
    let (mut engine, _probe, _pre, _post) = engine_with_recorders();
    // Armed at construction; a second enable without an intervening disable
    // is a checker bug.
    engine.enable();
}

#[test]
#[should_panic(expected = "already off")]
fn test_double_disable_panics()
{
    let (mut engine, _probe, _pre, _post) = engine_with_recorders();
    engine.disable();
    engine.disable();
}

#[test]
#[should_panic(expected = "watch fault while region-trap phase active")]
fn test_watch_fault_in_region_phase_panics()
{
    let (mut engine, _probe, _pre, _post) = engine_with_recorders();
    let _ = engine.dispatch(FaultEvent::Watch {
        address: Address::from(0x2000),
        pc: Address::from(0x8000),
        kind: AccessKind::Load,
    });
}

#[test]
#[should_panic(expected = "region-trap fault while watch phase active")]
fn test_region_fault_in_watch_phase_panics()
{
    let (mut engine, _probe, _pre, _post) = engine_with_recorders();
    let address = Address::from(0x2000);
    let pc = Address::from(0x8000);
    engine
        .dispatch(FaultEvent::RegionTrap { address, pc })
        .expect("pre approves");
    let _ = engine.dispatch(FaultEvent::RegionTrap { address, pc });
}

#[test]
#[should_panic(expected = "does not match armed address")]
fn test_watch_address_mismatch_panics()
{
    let (mut engine, _probe, _pre, _post) = engine_with_recorders();
    let pc = Address::from(0x8000);
    engine
        .dispatch(FaultEvent::RegionTrap {
            address: Address::from(0x2000),
            pc,
        })
        .expect("pre approves");
    let _ = engine.dispatch(FaultEvent::Watch {
        address: Address::from(0x2004),
        pc,
        kind: AccessKind::Store,
    });
}

#[test]
fn test_trap_pause_restores_on_drop()
{
    let (mut engine, probe, _pre, _post) = engine_with_recorders();
    assert!(probe.region_trap_on());
    {
        let _pause = TrapPause::new(&mut engine);
        assert!(!probe.region_trap_on());
    }
    assert!(probe.region_trap_on());
    assert!(engine.is_engaged());
}
