//! Per-tick behavior of units working remote territories.
//!
//! Dispatch is a closed match over [`Role`]. A role that cannot resolve its
//! assignment returns an [`Unresolved`] reason; the unit is then flagged
//! orphaned and walked back to its home anchor, with one log line per
//! (unit, reason) per tick.

mod claimer;
mod extractor;
mod transporter;

use remote_schema::{AssignmentBook, AssignmentFlags, Position, RemoteLedger, Role, UnitId};

use crate::config::RemoteConfig;
use crate::context::TickContext;
use crate::services::{MoveStatus, MovementService, Services, UnitActions};
use crate::world::{UnitView, WorldSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    Harvesting,
    Building,
    Depositing,
    Dropping,
    Collecting,
    Delivering,
    Reserving,
    Contesting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Unit is unknown to the scheduler or not in the snapshot.
    Skipped,
    /// Nothing to do this tick.
    Idle,
    Moving,
    Working(Activity),
    /// Assignment could not be resolved; heading back to the home anchor.
    Returning,
}

/// Why a role could not act on its assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Unresolved {
    MissingTerritory,
    MissingNode,
    MissingHome,
    MissingController,
    NoNodes,
}

impl Unresolved {
    fn label(self) -> &'static str {
        match self {
            Unresolved::MissingTerritory => "missing_territory",
            Unresolved::MissingNode => "missing_node",
            Unresolved::MissingHome => "missing_home",
            Unresolved::MissingController => "missing_controller",
            Unresolved::NoNodes => "no_nodes",
        }
    }
}

/// Read-only lookups shared by every role.
pub(crate) struct Lookup<'a> {
    pub world: &'a WorldSnapshot,
    pub ledger: &'a RemoteLedger,
    pub config: &'a RemoteConfig,
}

/// Collaborators a role drives.
pub(crate) struct Hands<'a> {
    pub movement: &'a mut dyn MovementService,
    pub actions: &'a mut dyn UnitActions,
}

impl Hands<'_> {
    /// Steps toward `target` unless already within `range`; `None` when in range.
    pub fn approach(&mut self, unit: &UnitView, target: &Position, range: u32) -> Option<UnitOutcome> {
        if unit.position.in_range(target, range) {
            return None;
        }
        Some(self.step(unit, target, range))
    }

    pub fn step(&mut self, unit: &UnitView, target: &Position, range: u32) -> UnitOutcome {
        match self.movement.move_toward(&unit.id, target, range) {
            MoveStatus::Arrived => UnitOutcome::Idle,
            MoveStatus::Moving | MoveStatus::Tired | MoveStatus::NoPath => UnitOutcome::Moving,
        }
    }
}

pub fn run_unit(
    ctx: &mut TickContext<'_>,
    ledger: &RemoteLedger,
    book: &mut AssignmentBook,
    services: &mut Services,
    unit: &UnitId,
) -> UnitOutcome {
    let world = ctx.world;
    let config = ctx.config.clone();
    let Some(view) = world.unit(unit) else {
        return UnitOutcome::Skipped;
    };
    let Some(record) = book.get_mut(unit) else {
        return UnitOutcome::Skipped;
    };
    if view.is_spawning() {
        return UnitOutcome::Idle;
    }
    let (Some(movement), Some(actions)) =
        (services.movement.as_deref_mut(), services.actions.as_deref_mut())
    else {
        return UnitOutcome::Idle;
    };

    let lookup = Lookup {
        world,
        ledger,
        config: &config,
    };
    let mut hands = Hands { movement, actions };
    let result = match record.role {
        Role::Extractor => extractor::run(view, record, &lookup, &mut hands),
        Role::Transporter => transporter::run(view, record, &lookup, &mut hands),
        Role::ClaimHolder => claimer::run(view, record, &lookup, &mut hands),
    };

    match result {
        Ok(outcome) => {
            record.flags.remove(AssignmentFlags::ORPHANED);
            outcome
        }
        Err(reason) => {
            if ctx.first_log(format!("unit/{unit}/{}", reason.label())) {
                tracing::warn!(
                    target: "remote_ops::behavior",
                    unit = %unit,
                    role = record.role.label(),
                    territory = %record.territory,
                    reason = reason.label(),
                    "unit.assignment_unresolved"
                );
            }
            record.flags.insert(AssignmentFlags::ORPHANED);
            match world.home(&record.home) {
                Some(home) => match hands.approach(view, &home.anchor, 1) {
                    Some(_) => UnitOutcome::Returning,
                    None => UnitOutcome::Idle,
                },
                None => UnitOutcome::Idle,
            }
        }
    }
}
