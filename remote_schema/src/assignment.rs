use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{HomeId, NodeId, Role, TerritoryId, UnitId, SCHEMA_VERSION};

/// Operator-supplied planning input: which territories each home exploits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningInputs {
    pub version: u32,
    pub assignments: BTreeMap<HomeId, Vec<TerritoryId>>,
    /// Territories never exploited, whatever else mentions them.
    pub excluded: BTreeSet<TerritoryId>,
}

impl Default for PlanningInputs {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            assignments: BTreeMap::new(),
            excluded: BTreeSet::new(),
        }
    }
}

impl PlanningInputs {
    pub fn assign(&mut self, home: HomeId, territory: TerritoryId) {
        let territories = self.assignments.entry(home).or_default();
        if !territories.contains(&territory) {
            territories.push(territory);
        }
    }
}

bitflags::bitflags! {
    /// Lifecycle flags carried on a worker's assignment record.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AssignmentFlags: u8 {
        /// Transporter is carrying cargo home.
        const DELIVERING = 0b0001;
        /// Extractor reached its seat.
        const SEATED = 0b0010;
        /// Claim-holder is attacking a foreign reservation.
        const CONTESTING = 0b0100;
        /// Assignment could not be resolved last time the unit ran.
        const ORPHANED = 0b1000;
    }
}

/// Tag attached to a unit at production time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTag {
    pub role: Role,
    pub home: HomeId,
    pub territory: TerritoryId,
    #[serde(default)]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub request_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub unit: UnitId,
    pub role: Role,
    pub home: HomeId,
    pub territory: TerritoryId,
    #[serde(default)]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub flags: AssignmentFlags,
    #[serde(default)]
    pub created_tick: u64,
}

impl WorkerAssignment {
    pub fn from_tag(unit: UnitId, tag: &UnitTag, tick: u64) -> Self {
        Self {
            unit,
            role: tag.role,
            home: tag.home.clone(),
            territory: tag.territory.clone(),
            node: tag.node.clone(),
            flags: AssignmentFlags::empty(),
            created_tick: tick,
        }
    }
}

/// Assignment records keyed by unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentBook {
    pub version: u32,
    pub units: BTreeMap<UnitId, WorkerAssignment>,
}

impl Default for AssignmentBook {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            units: BTreeMap::new(),
        }
    }
}

impl AssignmentBook {
    pub fn get(&self, unit: &UnitId) -> Option<&WorkerAssignment> {
        self.units.get(unit)
    }

    pub fn get_mut(&mut self, unit: &UnitId) -> Option<&mut WorkerAssignment> {
        self.units.get_mut(unit)
    }

    /// Records a unit from its production tag unless it is already known.
    pub fn adopt(&mut self, unit: &UnitId, tag: &UnitTag, tick: u64) -> bool {
        if self.units.contains_key(unit) {
            return false;
        }
        self.units
            .insert(unit.clone(), WorkerAssignment::from_tag(unit.clone(), tag, tick));
        true
    }

    /// Drops records of units that are no longer alive; returns how many.
    pub fn retain_live(&mut self, live: &BTreeSet<UnitId>) -> usize {
        let before = self.units.len();
        self.units.retain(|unit, _| live.contains(unit));
        before - self.units.len()
    }

    pub fn with_role<'a>(
        &'a self,
        territory: &'a TerritoryId,
        role: Role,
    ) -> impl Iterator<Item = &'a WorkerAssignment> + 'a {
        self.units
            .values()
            .filter(move |record| record.role == role && &record.territory == territory)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
