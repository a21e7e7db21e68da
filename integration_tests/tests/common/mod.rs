#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use remote_core::loadout::Loadout;
use remote_core::services::{
    ActionCode, MoveStatus, MovementService, ProduceResult, ProductionFacility, UnitActions,
};
use remote_core::world::{
    ControllerView, HomeView, HostileView, NodeView, ProducerView, TerritoryView, UnitView,
};
use remote_core::{MemoryStore, RemoteConfig, RemoteOps, Services, WorldSnapshot};
use remote_schema::{
    HomeId, NodeId, ObjectId, PlanningInputs, Position, ProducerId, Role, TerritoryId, UnitId,
    UnitTag,
};

pub const HOME: &str = "W1N1";
pub const REMOTE: &str = "W2N1";
pub const PRODUCER: &str = "W1N1-p";

pub fn home_id() -> HomeId {
    HomeId::from(HOME)
}

pub fn remote_id() -> TerritoryId {
    TerritoryId::from(REMOTE)
}

pub fn producer_id() -> ProducerId {
    ProducerId::from(PRODUCER)
}

/// Home with 550 capacity: enough for extractors and transporters, too
/// little for a claim holder.
pub fn home_view(energy_available: u32) -> HomeView {
    HomeView {
        id: home_id(),
        anchor: Position::new(HOME, 25, 25),
        energy_available,
        energy_capacity: 550,
        producers: vec![ProducerView {
            id: producer_id(),
            position: Position::new(HOME, 25, 26),
            busy: false,
        }],
        ..HomeView::default()
    }
}

/// Visible, unclaimed territory with two nodes `<name>-n0` and `<name>-n1`.
pub fn remote_view(name: &str, x: i32) -> TerritoryView {
    TerritoryView {
        id: TerritoryId::from(name),
        controller: Some(ControllerView {
            id: ObjectId::new(format!("{name}-ctrl")),
            position: Position::new(name, x + 25, 25),
            owner: None,
            reservation: None,
        }),
        nodes: (0..2)
            .map(|index| NodeView {
                id: node_id(name, index),
                position: Position::new(name, x + 10 + index * 20, 10),
                capacity: 3_000,
                regen_period: 300,
                seat_candidates: vec![Position::new(name, x + 11 + index * 20, 11)],
            })
            .collect(),
        ..TerritoryView::default()
    }
}

pub fn node_id(territory: &str, index: i32) -> NodeId {
    NodeId::new(format!("{territory}-n{index}"))
}

pub fn world(tick: u64) -> WorldSnapshot {
    let mut world = WorldSnapshot {
        tick,
        ..WorldSnapshot::default()
    };
    world.homes.insert(home_id(), home_view(550));
    world.territories.insert(remote_id(), remote_view(REMOTE, 50));
    world
}

pub fn add_hostile(world: &mut WorldSnapshot, territory: &str) {
    if let Some(view) = world.territories.get_mut(&TerritoryId::from(territory)) {
        view.hostiles.push(HostileView {
            id: ObjectId::from("raider"),
            position: Position::new(territory, 60, 20),
            armed: true,
        });
    }
}

pub fn add_unit(
    world: &mut WorldSnapshot,
    id: &str,
    role: Role,
    territory: &str,
    node: Option<NodeId>,
    ticks_to_live: u32,
) -> UnitId {
    let unit = UnitId::from(id);
    world.units.insert(
        unit.clone(),
        UnitView {
            id: unit.clone(),
            home: home_id(),
            position: Position::new(HOME, 25, 27),
            ticks_to_live: Some(ticks_to_live),
            carry_capacity: 50,
            tag: Some(UnitTag {
                role,
                home: home_id(),
                territory: TerritoryId::from(territory),
                node,
                request_id: 0,
            }),
            ..UnitView::default()
        },
    );
    unit
}

pub fn inputs(territories: &[&str]) -> PlanningInputs {
    let mut inputs = PlanningInputs::default();
    for territory in territories {
        inputs.assign(home_id(), TerritoryId::from(*territory));
    }
    inputs
}

pub fn ops_with(services: Services, territories: &[&str]) -> anyhow::Result<RemoteOps<MemoryStore>> {
    let mut ops = RemoteOps::new(RemoteConfig::builtin(), MemoryStore::new(), services);
    ops.set_inputs(&inputs(territories))?;
    Ok(ops)
}

pub fn ops(territories: &[&str]) -> anyhow::Result<RemoteOps<MemoryStore>> {
    ops_with(Services::default(), territories)
}

#[derive(Clone, Debug)]
pub struct Produced {
    pub producer: ProducerId,
    pub loadout: Loadout,
    pub tag: UnitTag,
}

/// Facility that records every attempt and answers with a fixed result.
pub struct RecordingFacility {
    pub produced: Rc<RefCell<Vec<Produced>>>,
    pub result: ProduceResult,
}

impl RecordingFacility {
    pub fn new() -> (Self, Rc<RefCell<Vec<Produced>>>) {
        let produced = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                produced: produced.clone(),
                result: ProduceResult::Ok,
            },
            produced,
        )
    }
}

impl ProductionFacility for RecordingFacility {
    fn attempt_produce(
        &mut self,
        producer: &ProducerId,
        loadout: &Loadout,
        tag: &UnitTag,
    ) -> ProduceResult {
        if self.result == ProduceResult::Ok {
            self.produced.borrow_mut().push(Produced {
                producer: producer.clone(),
                loadout: loadout.clone(),
                tag: tag.clone(),
            });
        }
        self.result.clone()
    }
}

pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Movement and action primitives that log calls and always succeed.
pub struct RecordingHands {
    pub calls: CallLog,
}

impl MovementService for RecordingHands {
    fn move_toward(&mut self, unit: &UnitId, target: &Position, range: u32) -> MoveStatus {
        self.calls
            .borrow_mut()
            .push(format!("move {unit} {target} {range}"));
        MoveStatus::Moving
    }
}

impl UnitActions for RecordingHands {
    fn harvest(&mut self, unit: &UnitId, node: &NodeId) -> ActionCode {
        self.log(format!("harvest {unit} {node}"))
    }

    fn withdraw(&mut self, unit: &UnitId, structure: &ObjectId) -> ActionCode {
        self.log(format!("withdraw {unit} {structure}"))
    }

    fn transfer(&mut self, unit: &UnitId, target: &ObjectId) -> ActionCode {
        self.log(format!("transfer {unit} {target}"))
    }

    fn drop_cargo(&mut self, unit: &UnitId) -> ActionCode {
        self.log(format!("drop {unit}"))
    }

    fn build(&mut self, unit: &UnitId, site: &ObjectId) -> ActionCode {
        self.log(format!("build {unit} {site}"))
    }

    fn place_storage_site(&mut self, position: &Position) -> ActionCode {
        self.log(format!("place {position}"))
    }

    fn reserve(&mut self, unit: &UnitId, controller: &ObjectId) -> ActionCode {
        self.log(format!("reserve {unit} {controller}"))
    }

    fn contest(&mut self, unit: &UnitId, controller: &ObjectId) -> ActionCode {
        self.log(format!("contest {unit} {controller}"))
    }
}

impl RecordingHands {
    fn log(&mut self, call: String) -> ActionCode {
        self.calls.borrow_mut().push(call);
        ActionCode::Ok
    }
}

pub fn recording_services() -> (Services, CallLog) {
    let calls = CallLog::default();
    let services = Services::default()
        .with_movement(Box::new(RecordingHands {
            calls: calls.clone(),
        }))
        .with_actions(Box::new(RecordingHands {
            calls: calls.clone(),
        }));
    (services, calls)
}
