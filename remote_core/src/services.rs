//! External collaborators.
//!
//! Everything the scheduler does not own (the production facility, movement,
//! path costs, unit action primitives and loadout pricing) is reached through
//! these traits. Optional collaborators are resolved once when [`Services`] is
//! built and never probed again.

use remote_schema::{NodeId, ObjectId, Position, ProducerId, UnitId, UnitTag};

use crate::loadout::{Loadout, Part};

/// Result code shared by every unit action primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionCode {
    Ok,
    NotInRange,
    NotEnoughResources,
    Full,
    InvalidTarget,
    Busy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProduceResult {
    Ok,
    InsufficientResources,
    Busy,
    Error(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStatus {
    Moving,
    Arrived,
    Tired,
    NoPath,
}

pub trait CostModel {
    fn cost_of(&self, loadout: &Loadout) -> u32;
}

/// Default part prices.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardCostModel;

impl StandardCostModel {
    pub fn part_cost(part: Part) -> u32 {
        match part {
            Part::Move => 50,
            Part::Work => 100,
            Part::Carry => 50,
            Part::Claim => 600,
        }
    }
}

impl CostModel for StandardCostModel {
    fn cost_of(&self, loadout: &Loadout) -> u32 {
        loadout.parts().iter().copied().map(Self::part_cost).sum()
    }
}

pub trait ProductionFacility {
    fn attempt_produce(
        &mut self,
        producer: &ProducerId,
        loadout: &Loadout,
        tag: &UnitTag,
    ) -> ProduceResult;
}

pub trait MovementService {
    fn move_toward(&mut self, unit: &UnitId, target: &Position, range: u32) -> MoveStatus;
}

/// Path length lookup; absent implementations fall back to the linear heuristic.
pub trait RouteEstimator {
    fn route_length(&self, from: &Position, to: &Position) -> Option<u32>;
}

pub trait UnitActions {
    fn harvest(&mut self, unit: &UnitId, node: &NodeId) -> ActionCode;
    fn withdraw(&mut self, unit: &UnitId, structure: &ObjectId) -> ActionCode;
    fn transfer(&mut self, unit: &UnitId, target: &ObjectId) -> ActionCode;
    fn drop_cargo(&mut self, unit: &UnitId) -> ActionCode;
    fn build(&mut self, unit: &UnitId, site: &ObjectId) -> ActionCode;
    /// Places a storage construction site at `position`.
    fn place_storage_site(&mut self, position: &Position) -> ActionCode;
    fn reserve(&mut self, unit: &UnitId, controller: &ObjectId) -> ActionCode;
    /// Attacks a reservation held by someone else.
    fn contest(&mut self, unit: &UnitId, controller: &ObjectId) -> ActionCode;
}

pub struct Services {
    pub costs: Box<dyn CostModel>,
    pub facility: Option<Box<dyn ProductionFacility>>,
    pub movement: Option<Box<dyn MovementService>>,
    pub routes: Option<Box<dyn RouteEstimator>>,
    pub actions: Option<Box<dyn UnitActions>>,
}

impl Default for Services {
    fn default() -> Self {
        Self::new(Box::new(StandardCostModel))
    }
}

impl Services {
    pub fn new(costs: Box<dyn CostModel>) -> Self {
        Self {
            costs,
            facility: None,
            movement: None,
            routes: None,
            actions: None,
        }
    }

    pub fn with_facility(mut self, facility: Box<dyn ProductionFacility>) -> Self {
        self.facility = Some(facility);
        self
    }

    pub fn with_movement(mut self, movement: Box<dyn MovementService>) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn with_routes(mut self, routes: Box<dyn RouteEstimator>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn with_actions(mut self, actions: Box<dyn UnitActions>) -> Self {
        self.actions = Some(actions);
        self
    }
}
