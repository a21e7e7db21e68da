use remote_schema::{AssignmentFlags, WorkerAssignment};

use super::{Activity, Hands, Lookup, UnitOutcome, Unresolved};
use crate::services::ActionCode;
use crate::world::UnitView;

const BUILD_RANGE: u32 = 3;

pub(super) fn run(
    unit: &UnitView,
    record: &mut WorkerAssignment,
    lookup: &Lookup<'_>,
    hands: &mut Hands<'_>,
) -> Result<UnitOutcome, Unresolved> {
    let node_id = record.node.as_ref().ok_or(Unresolved::MissingNode)?;
    let entry = lookup
        .ledger
        .entry(&record.territory)
        .ok_or(Unresolved::MissingTerritory)?;
    let node = entry.nodes.get(node_id).ok_or(Unresolved::MissingNode)?;

    if node.storage.is_none() && unit.can_build() && !unit.is_empty() {
        if let Some(site) = node.construction_site.as_ref() {
            match hands.actions.build(&unit.id, site) {
                ActionCode::Ok => return Ok(UnitOutcome::Working(Activity::Building)),
                ActionCode::NotInRange => {
                    if let Some(outcome) = hands.approach(unit, &node.position, BUILD_RANGE) {
                        return Ok(outcome);
                    }
                }
                _ => {}
            }
        }
    }

    let (seat, range) = match node.seat_position.as_ref() {
        Some(seat) => (seat, 0),
        None => (&node.position, 1),
    };
    if let Some(outcome) = hands.approach(unit, seat, range) {
        record.flags.remove(AssignmentFlags::SEATED);
        return Ok(outcome);
    }
    record.flags.insert(AssignmentFlags::SEATED);

    if node.storage.is_none() && node.construction_site.is_none() && unit.can_build() {
        let code = hands.actions.place_storage_site(seat);
        if code != ActionCode::Ok {
            tracing::debug!(
                target: "remote_ops::behavior",
                unit = %unit.id,
                node = %node_id,
                code = ?code,
                "extractor.site_rejected"
            );
        }
    }

    if unit.is_full() {
        if let Some(storage) = node.storage.as_ref() {
            if hands.actions.transfer(&unit.id, storage) == ActionCode::Ok {
                return Ok(UnitOutcome::Working(Activity::Depositing));
            }
        } else if lookup.config.extractor.allow_drop_when_full
            && hands.actions.drop_cargo(&unit.id) == ActionCode::Ok
        {
            return Ok(UnitOutcome::Working(Activity::Dropping));
        }
    }

    match hands.actions.harvest(&unit.id, node_id) {
        ActionCode::Ok => Ok(UnitOutcome::Working(Activity::Harvesting)),
        ActionCode::NotInRange => Ok(hands.step(unit, &node.position, 1)),
        _ => Ok(UnitOutcome::Idle),
    }
}
