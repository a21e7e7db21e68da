use remote_schema::{AssignmentFlags, WorkerAssignment};

use super::{Activity, Hands, Lookup, UnitOutcome, Unresolved};
use crate::services::ActionCode;
use crate::world::UnitView;

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
    let live = lookup
        .world
        .territory(&record.territory)
        .and_then(|view| view.controller.as_ref());

    let (controller, position, foreign) = match (live, entry.controller.as_ref()) {
        (Some(view), _) => (
            &view.id,
            &view.position,
            view.reservation
                .as_ref()
                .is_some_and(|reservation| reservation.owner != lookup.config.owner),
        ),
        (None, Some(memo)) => (
            &memo.id,
            &memo.position,
            entry.reservation.as_ref().is_some_and(|memo| !memo.mine),
        ),
        (None, None) => return Err(Unresolved::MissingController),
    };

    if let Some(outcome) = hands.approach(unit, position, 1) {
        return Ok(outcome);
    }

    let (code, activity) = if foreign {
        record.flags.insert(AssignmentFlags::CONTESTING);
        (hands.actions.contest(&unit.id, controller), Activity::Contesting)
    } else {
        record.flags.remove(AssignmentFlags::CONTESTING);
        (hands.actions.reserve(&unit.id, controller), Activity::Reserving)
    };
    match code {
        ActionCode::Ok => Ok(UnitOutcome::Working(activity)),
        ActionCode::NotInRange => Ok(hands.step(unit, position, 1)),
        _ => Ok(UnitOutcome::Idle),
    }
}
