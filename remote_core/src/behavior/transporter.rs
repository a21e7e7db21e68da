use remote_schema::{AssignmentFlags, ObjectId, Position, WorkerAssignment};

use super::{Activity, Hands, Lookup, UnitOutcome, Unresolved};
use crate::services::ActionCode;
use crate::world::{HomeView, SinkKind, SinkView, UnitView};

pub(super) fn run(
    unit: &UnitView,
    record: &mut WorkerAssignment,
    lookup: &Lookup<'_>,
    hands: &mut Hands<'_>,
) -> Result<UnitOutcome, Unresolved> {
    let entry = lookup
        .ledger
        .entry(&record.territory)
        .ok_or(Unresolved::MissingTerritory)?;
    let home = lookup
        .world
        .home(&record.home)
        .ok_or(Unresolved::MissingHome)?;

    if unit.is_empty() {
        record.flags.remove(AssignmentFlags::DELIVERING);
    } else if unit.is_full() {
        record.flags.insert(AssignmentFlags::DELIVERING);
    }

    if record.flags.contains(AssignmentFlags::DELIVERING) {
        return Ok(deliver(unit, home, hands));
    }

    let Some((storage, position)) = best_storage(lookup, record)? else {
        // Nothing to collect; bring home whatever is carried.
        if !unit.is_empty() {
            record.flags.insert(AssignmentFlags::DELIVERING);
            return Ok(deliver(unit, home, hands));
        }
        let first = entry.nodes.values().next().ok_or(Unresolved::NoNodes)?;
        return Ok(hands
            .approach(unit, &first.position, 2)
            .unwrap_or(UnitOutcome::Idle));
    };

    match hands.actions.withdraw(&unit.id, &storage) {
        ActionCode::Ok => Ok(UnitOutcome::Working(Activity::Collecting)),
        ActionCode::NotInRange => Ok(hands.step(unit, &position, 1)),
        ActionCode::NotEnoughResources if !unit.is_empty() => {
            record.flags.insert(AssignmentFlags::DELIVERING);
            Ok(UnitOutcome::Idle)
        }
        _ => Ok(UnitOutcome::Idle),
    }
}

/// Storage in the territory holding the most cargo. Without vision the first
/// known storage is used.
fn best_storage(
    lookup: &Lookup<'_>,
    record: &WorkerAssignment,
) -> Result<Option<(ObjectId, Position)>, Unresolved> {
    let entry = lookup
        .ledger
        .entry(&record.territory)
        .ok_or(Unresolved::MissingTerritory)?;
    let known = entry.nodes.values().filter_map(|node| {
        Some((node.storage.clone()?, node.storage_position.clone()?))
    });

    let Some(view) = lookup.world.territory(&record.territory) else {
        return Ok(known.into_iter().next());
    };
    let best = known
        .filter_map(|(id, position)| {
            view.structure(&id)
                .filter(|structure| structure.stored > 0)
                .map(|structure| (structure.stored, id, position))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
        .map(|(_, id, position)| (id, position));
    Ok(best)
}

fn sink_rank(kind: SinkKind) -> u8 {
    match kind {
        SinkKind::Reservoir => 0,
        SinkKind::Producer | SinkKind::Extension => 1,
    }
}

/// Reservoirs first, then production structures with room; nearest within a rank.
fn best_sink<'a>(unit: &UnitView, home: &'a HomeView) -> Option<&'a SinkView> {
    home.sinks
        .iter()
        .filter(|sink| sink.free_capacity > 0)
        .min_by(|a, b| {
            (sink_rank(a.kind), unit.position.range_to(&a.position), &a.id).cmp(&(
                sink_rank(b.kind),
                unit.position.range_to(&b.position),
                &b.id,
            ))
        })
}

fn deliver(unit: &UnitView, home: &HomeView, hands: &mut Hands<'_>) -> UnitOutcome {
    let Some(sink) = best_sink(unit, home) else {
        // Every sink is saturated; never stall the pipeline.
        return match hands.actions.drop_cargo(&unit.id) {
            ActionCode::Ok => UnitOutcome::Working(Activity::Dropping),
            _ => UnitOutcome::Idle,
        };
    };
    match hands.actions.transfer(&unit.id, &sink.id) {
        ActionCode::Ok => UnitOutcome::Working(Activity::Delivering),
        ActionCode::NotInRange => hands.step(unit, &sink.position, 1),
        _ => UnitOutcome::Idle,
    }
}
