mod common;

use common::{add_unit, node_id, ops_with, recording_services, remote_id, world, HOME, REMOTE};
use remote_core::world::{StructureKind, StructureView};
use remote_core::{Activity, UnitOutcome};
use remote_schema::{AssignmentFlags, ObjectId, Position, Role, TerritoryId, UnitId};

#[test]
fn new_extractor_heads_for_its_seat() -> anyhow::Result<()> {
    let (services, calls) = recording_services();
    let mut ops = ops_with(services, &[REMOTE])?;
    let mut world = world(10);
    let unit = add_unit(&mut world, "x1", Role::Extractor, REMOTE, Some(node_id(REMOTE, 0)), 1_400);

    let mut session = ops.begin_tick(&world)?;
    session.plan_tick();
    let outcomes = session.run_units();
    assert_eq!(outcomes[&unit], UnitOutcome::Moving);
    // Seat candidate of the first node.
    assert_eq!(calls.borrow().as_slice(), ["move x1 W2N1@61,11 0"]);
    Ok(())
}

#[test]
fn seated_extractor_prefers_the_storage_tile() -> anyhow::Result<()> {
    let (services, calls) = recording_services();
    let mut ops = ops_with(services, &[REMOTE])?;
    let mut world = world(10);
    let storage = Position::new(REMOTE, 59, 11);
    if let Some(view) = world.territories.get_mut(&remote_id()) {
        view.structures.push(StructureView {
            id: ObjectId::from("box"),
            kind: StructureKind::Storage,
            position: storage.clone(),
            stored: 0,
            capacity: 2_000,
            hostile: false,
        });
    }
    let unit = add_unit(&mut world, "x1", Role::Extractor, REMOTE, Some(node_id(REMOTE, 0)), 1_400);
    if let Some(view) = world.units.get_mut(&unit) {
        view.position = storage;
    }

    let mut session = ops.begin_tick(&world)?;
    session.plan_tick();
    assert_eq!(
        session.run_unit(&unit),
        UnitOutcome::Working(Activity::Harvesting)
    );
    let record = session.state().assignments.get(&unit).expect("record");
    assert!(record.flags.contains(AssignmentFlags::SEATED));
    assert_eq!(calls.borrow().last().map(String::as_str), Some("harvest x1 W2N1-n0"));
    Ok(())
}

#[test]
fn claim_holder_without_controller_returns_home() -> anyhow::Result<()> {
    let (services, calls) = recording_services();
    let mut ops = ops_with(services, &[REMOTE])?;
    let mut world = world(10);
    let unit = add_unit(&mut world, "c1", Role::ClaimHolder, "W9N9", None, 600);
    if let Some(view) = world.units.get_mut(&unit) {
        view.position = Position::new("W9N9", 300, 300);
    }

    let mut session = ops.begin_tick(&world)?;
    session.plan_tick();
    assert_eq!(session.run_unit(&unit), UnitOutcome::Returning);
    assert_eq!(session.run_unit(&unit), UnitOutcome::Returning);

    let record = session.state().assignments.get(&unit).expect("record");
    assert!(record.flags.contains(AssignmentFlags::ORPHANED));
    assert_eq!(record.territory, TerritoryId::from("W9N9"));
    let anchor = format!("move c1 {HOME}@25,25 1");
    assert!(calls.borrow().iter().all(|call| call == &anchor));
    Ok(())
}

#[test]
fn spawning_units_idle() -> anyhow::Result<()> {
    let (services, calls) = recording_services();
    let mut ops = ops_with(services, &[REMOTE])?;
    let mut world = world(10);
    let unit = add_unit(&mut world, "t1", Role::Transporter, REMOTE, None, 1_500);
    if let Some(view) = world.units.get_mut(&unit) {
        view.ticks_to_live = None;
    }

    let mut session = ops.begin_tick(&world)?;
    session.plan_tick();
    assert_eq!(session.run_unit(&unit), UnitOutcome::Idle);
    assert_eq!(session.run_unit(&UnitId::from("ghost")), UnitOutcome::Skipped);
    assert!(calls.borrow().is_empty());
    Ok(())
}
