//! Read-only world snapshot handed to the scheduler once per tick.
//!
//! Territories appear in [`WorldSnapshot::territories`] only while we have live
//! vision of them; everything else must come from the ledger.

use std::collections::BTreeMap;

use remote_schema::{
    HomeId, NodeId, ObjectId, Position, ProducerId, TerritoryClass, TerritoryId, UnitId, UnitTag,
};
use serde::{Deserialize, Serialize};

use crate::loadout::{Loadout, Part};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub homes: BTreeMap<HomeId, HomeView>,
    pub territories: BTreeMap<TerritoryId, TerritoryView>,
    pub units: BTreeMap<UnitId, UnitView>,
}

impl WorldSnapshot {
    pub fn home(&self, id: &HomeId) -> Option<&HomeView> {
        self.homes.get(id)
    }

    pub fn territory(&self, id: &TerritoryId) -> Option<&TerritoryView> {
        self.territories.get(id)
    }

    pub fn unit(&self, id: &UnitId) -> Option<&UnitView> {
        self.units.get(id)
    }

    /// Finds the home that owns `producer`.
    pub fn producer(&self, producer: &ProducerId) -> Option<(&HomeView, &ProducerView)> {
        self.homes.values().find_map(|home| {
            home.producers
                .iter()
                .find(|view| &view.id == producer)
                .map(|view| (home, view))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeView {
    pub id: HomeId,
    /// Rally point units fall back to when their assignment is unusable.
    pub anchor: Position,
    pub energy_available: u32,
    pub energy_capacity: u32,
    pub producers: Vec<ProducerView>,
    pub sinks: Vec<SinkView>,
    /// Territories adjacent to the home, candidates for auto-discovery.
    pub neighbors: Vec<TerritoryId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerView {
    pub id: ProducerId,
    pub position: Position,
    pub busy: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkKind {
    /// Large reservoir structure; filled first.
    #[default]
    Reservoir,
    /// Production facility itself.
    Producer,
    /// Energy buffer feeding the production facility.
    Extension,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkView {
    pub id: ObjectId,
    pub kind: SinkKind,
    pub position: Position,
    pub free_capacity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryView {
    pub id: TerritoryId,
    pub class: TerritoryClass,
    pub controller: Option<ControllerView>,
    pub nodes: Vec<NodeView>,
    pub structures: Vec<StructureView>,
    pub construction_sites: Vec<SiteView>,
    pub hostiles: Vec<HostileView>,
}

impl TerritoryView {
    pub fn node(&self, id: &NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn structure(&self, id: &ObjectId) -> Option<&StructureView> {
        self.structures.iter().find(|structure| &structure.id == id)
    }

    /// Storage structure adjacent to `position`, if any.
    pub fn storage_near(&self, position: &Position) -> Option<&StructureView> {
        self.structures
            .iter()
            .filter(|structure| structure.kind == StructureKind::Storage && !structure.hostile)
            .find(|structure| structure.position.in_range(position, 1))
    }

    pub fn site_near(&self, position: &Position) -> Option<&SiteView> {
        self.construction_sites
            .iter()
            .filter(|site| site.kind == StructureKind::Storage)
            .find(|site| site.position.in_range(position, 1))
    }

    pub fn armed_hostiles(&self) -> usize {
        self.hostiles.iter().filter(|hostile| hostile.armed).count()
    }

    pub fn has_defended_structure(&self) -> bool {
        self.structures
            .iter()
            .any(|structure| structure.hostile && structure.kind == StructureKind::DefendedCore)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerView {
    pub id: ObjectId,
    pub position: Position,
    pub owner: Option<String>,
    pub reservation: Option<ReservationView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationView {
    pub owner: String,
    pub ticks_to_end: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeView {
    pub id: NodeId,
    pub position: Position,
    pub capacity: u32,
    pub regen_period: u32,
    /// Walkable tiles adjacent to the node, best first.
    pub seat_candidates: Vec<Position>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    /// Container next to a node that extractors fill and transporters empty.
    #[default]
    Storage,
    /// Self-defending hostile structure.
    DefendedCore,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureView {
    pub id: ObjectId,
    pub kind: StructureKind,
    pub position: Position,
    pub stored: u32,
    pub capacity: u32,
    pub hostile: bool,
}

impl StructureView {
    pub fn free_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.stored)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteView {
    pub id: ObjectId,
    pub kind: StructureKind,
    pub position: Position,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostileView {
    pub id: ObjectId,
    pub position: Position,
    pub armed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitView {
    pub id: UnitId,
    pub home: HomeId,
    pub position: Position,
    /// `None` while the unit is still being produced.
    pub ticks_to_live: Option<u32>,
    pub carry_used: u32,
    pub carry_capacity: u32,
    pub loadout: Loadout,
    pub tag: Option<UnitTag>,
    pub born_tick: u64,
}

impl UnitView {
    pub fn is_spawning(&self) -> bool {
        self.ticks_to_live.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.carry_used == 0
    }

    pub fn is_full(&self) -> bool {
        self.carry_capacity > 0 && self.carry_used >= self.carry_capacity
    }

    pub fn can_build(&self) -> bool {
        self.loadout.count(Part::Work) > 0 && self.loadout.count(Part::Carry) > 0
    }

    /// Remaining lifetime; a unit still in production counts as fresh.
    pub fn remaining_life(&self) -> u32 {
        self.ticks_to_live.unwrap_or(u32::MAX)
    }
}
