use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use serde::Deserialize;
use tracing::info;

use remote_core::loadout::{Loadout, Part};
use remote_core::services::{
    ActionCode, CostModel, MoveStatus, MovementService, ProduceResult, ProductionFacility,
    StandardCostModel, UnitActions,
};
use remote_core::world::{ReservationView, SiteView, StructureKind, StructureView, UnitView};
use remote_core::{
    load_remote_config_from_env, FileStore, KeyValueStore, MemoryStore, ProductionDecision,
    RemoteError, RemoteOps, RemoteReport, Result, Services, WorldSnapshot,
};
use remote_schema::{
    NodeId, ObjectId, PlanningInputs, Position, ProducerId, UnitId, UnitTag,
};

const HARVEST_PER_WORK: u32 = 2;
const CARRY_PER_PART: u32 = 50;
const STORAGE_CAPACITY: u32 = 2_000;
const UNIT_LIFETIME: u32 = 1_500;
const HOME_REGEN_PER_TICK: u32 = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs the remote scheduler against a scripted world", long_about = None)]
struct Args {
    /// Path to the scenario JSON (`{"world": ..., "inputs": ...}`)
    #[arg(long)]
    scenario: PathBuf,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 100)]
    ticks: u64,

    /// Persist scheduler state to this file instead of memory
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scenario {
    world: WorldSnapshot,
    inputs: PlanningInputs,
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path).map_err(|source| RemoteError::ScenarioRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// World state shared between the simulated collaborators.
struct Sim {
    world: WorldSnapshot,
    owner: String,
    next_unit: u64,
    next_object: u64,
    pending: Vec<UnitView>,
}

type Shared = Rc<RefCell<Sim>>;

impl Sim {
    fn unit_mut(&mut self, unit: &UnitId) -> Option<&mut UnitView> {
        self.world.units.get_mut(unit)
    }

    fn next_object(&mut self, prefix: &str) -> ObjectId {
        self.next_object += 1;
        ObjectId::new(format!("{prefix}-{}", self.next_object))
    }

    /// Advances the clock: ages units, retires the dead and regenerates home energy.
    fn advance(&mut self) {
        self.world.tick += 1;
        self.world.units.retain(|_, unit| match unit.ticks_to_live {
            Some(0) | Some(1) => false,
            _ => true,
        });
        for unit in self.world.units.values_mut() {
            unit.ticks_to_live = unit.ticks_to_live.map(|ttl| ttl - 1).or(Some(UNIT_LIFETIME));
        }
        for unit in self.pending.drain(..) {
            self.world.units.insert(unit.id.clone(), unit);
        }
        for home in self.world.homes.values_mut() {
            home.energy_available =
                (home.energy_available + HOME_REGEN_PER_TICK).min(home.energy_capacity);
            for producer in &mut home.producers {
                producer.busy = false;
            }
        }
    }
}

struct SimFacility(Shared);

impl ProductionFacility for SimFacility {
    fn attempt_produce(
        &mut self,
        producer: &ProducerId,
        loadout: &Loadout,
        tag: &UnitTag,
    ) -> ProduceResult {
        let mut sim = self.0.borrow_mut();
        let cost = StandardCostModel.cost_of(loadout);
        let tick = sim.world.tick;
        let Some(home) = sim
            .world
            .homes
            .values_mut()
            .find(|home| home.producers.iter().any(|view| &view.id == producer))
        else {
            return ProduceResult::Error(format!("unknown producer {producer}"));
        };
        let Some(view) = home.producers.iter_mut().find(|view| &view.id == producer) else {
            return ProduceResult::Error(format!("unknown producer {producer}"));
        };
        if view.busy {
            return ProduceResult::Busy;
        }
        if home.energy_available < cost {
            return ProduceResult::InsufficientResources;
        }
        view.busy = true;
        let position = view.position.clone();
        home.energy_available -= cost;
        let home_id = home.id.clone();

        sim.next_unit += 1;
        let id = UnitId::new(format!("{}-{}", tag.role.label(), sim.next_unit));
        sim.pending.push(UnitView {
            id,
            home: home_id,
            position,
            ticks_to_live: None,
            carry_used: 0,
            carry_capacity: loadout.count(Part::Carry) * CARRY_PER_PART,
            loadout: loadout.clone(),
            tag: Some(tag.clone()),
            born_tick: tick,
        });
        ProduceResult::Ok
    }
}

struct SimMovement(Shared);

impl MovementService for SimMovement {
    fn move_toward(&mut self, unit: &UnitId, target: &Position, range: u32) -> MoveStatus {
        let mut sim = self.0.borrow_mut();
        let Some(view) = sim.unit_mut(unit) else {
            return MoveStatus::NoPath;
        };
        if view.position.in_range(target, range) {
            return MoveStatus::Arrived;
        }
        view.position.x += (target.x - view.position.x).signum();
        view.position.y += (target.y - view.position.y).signum();
        if view.position.in_range(target, range) {
            view.position.territory = target.territory.clone();
        }
        MoveStatus::Moving
    }
}

struct SimActions(Shared);

impl UnitActions for SimActions {
    fn harvest(&mut self, unit: &UnitId, node: &NodeId) -> ActionCode {
        let mut sim = self.0.borrow_mut();
        let Some(view) = sim.world.units.get(unit).cloned() else {
            return ActionCode::InvalidTarget;
        };
        let Some(territory) = sim
            .world
            .territories
            .values_mut()
            .find(|territory| territory.node(node).is_some())
        else {
            return ActionCode::InvalidTarget;
        };
        let Some(position) = territory.node(node).map(|found| found.position.clone()) else {
            return ActionCode::InvalidTarget;
        };
        if !view.position.in_range(&position, 1) {
            return ActionCode::NotInRange;
        }
        let gain = view.loadout.count(Part::Work) * HARVEST_PER_WORK;
        if view.carry_capacity == 0 {
            // No carry parts: the yield lands in adjacent storage or is lost.
            let storage = territory
                .structures
                .iter_mut()
                .filter(|structure| structure.kind == StructureKind::Storage && !structure.hostile)
                .find(|structure| structure.position.in_range(&view.position, 1));
            if let Some(storage) = storage {
                storage.stored = (storage.stored + gain).min(storage.capacity);
            }
            return ActionCode::Ok;
        }
        if let Some(view) = sim.unit_mut(unit) {
            view.carry_used = (view.carry_used + gain).min(view.carry_capacity);
        }
        ActionCode::Ok
    }

    fn withdraw(&mut self, unit: &UnitId, structure: &ObjectId) -> ActionCode {
        let mut sim = self.0.borrow_mut();
        let Some(view) = sim.world.units.get(unit).cloned() else {
            return ActionCode::InvalidTarget;
        };
        let Some(target) = sim
            .world
            .territories
            .values_mut()
            .flat_map(|territory| territory.structures.iter_mut())
            .find(|candidate| &candidate.id == structure)
        else {
            return ActionCode::InvalidTarget;
        };
        if !view.position.in_range(&target.position, 1) {
            return ActionCode::NotInRange;
        }
        let amount = target
            .stored
            .min(view.carry_capacity.saturating_sub(view.carry_used));
        if amount == 0 {
            return ActionCode::NotEnoughResources;
        }
        target.stored -= amount;
        if let Some(view) = sim.unit_mut(unit) {
            view.carry_used += amount;
        }
        ActionCode::Ok
    }

    fn transfer(&mut self, unit: &UnitId, target: &ObjectId) -> ActionCode {
        let mut sim = self.0.borrow_mut();
        let Some(view) = sim.world.units.get(unit).cloned() else {
            return ActionCode::InvalidTarget;
        };
        if view.carry_used == 0 {
            return ActionCode::NotEnoughResources;
        }

        let home = sim.world.homes.get_mut(&view.home);
        if let Some(home) = home {
            if let Some(sink) = home.sinks.iter_mut().find(|sink| &sink.id == target) {
                if !view.position.in_range(&sink.position, 1) {
                    return ActionCode::NotInRange;
                }
                let amount = view.carry_used.min(sink.free_capacity);
                if amount == 0 {
                    return ActionCode::Full;
                }
                sink.free_capacity -= amount;
                home.energy_available = (home.energy_available + amount).min(home.energy_capacity);
                if let Some(view) = sim.unit_mut(unit) {
                    view.carry_used -= amount;
                }
                return ActionCode::Ok;
            }
        }

        let Some(storage) = sim
            .world
            .territories
            .values_mut()
            .flat_map(|territory| territory.structures.iter_mut())
            .find(|candidate| &candidate.id == target)
        else {
            return ActionCode::InvalidTarget;
        };
        if !view.position.in_range(&storage.position, 1) {
            return ActionCode::NotInRange;
        }
        let amount = view.carry_used.min(storage.free_capacity());
        if amount == 0 {
            return ActionCode::Full;
        }
        storage.stored += amount;
        if let Some(view) = sim.unit_mut(unit) {
            view.carry_used -= amount;
        }
        ActionCode::Ok
    }

    fn drop_cargo(&mut self, unit: &UnitId) -> ActionCode {
        match self.0.borrow_mut().unit_mut(unit) {
            Some(view) => {
                view.carry_used = 0;
                ActionCode::Ok
            }
            None => ActionCode::InvalidTarget,
        }
    }

    fn build(&mut self, unit: &UnitId, site: &ObjectId) -> ActionCode {
        let mut sim = self.0.borrow_mut();
        let Some(view) = sim.world.units.get(unit).cloned() else {
            return ActionCode::InvalidTarget;
        };
        let Some(territory) = sim
            .world
            .territories
            .values_mut()
            .find(|territory| territory.construction_sites.iter().any(|s| &s.id == site))
        else {
            return ActionCode::InvalidTarget;
        };
        let Some(index) = territory
            .construction_sites
            .iter()
            .position(|candidate| &candidate.id == site)
        else {
            return ActionCode::InvalidTarget;
        };
        if !view.position.in_range(&territory.construction_sites[index].position, 3) {
            return ActionCode::NotInRange;
        }
        let finished = territory.construction_sites.remove(index);
        territory.structures.push(StructureView {
            id: finished.id,
            kind: StructureKind::Storage,
            position: finished.position,
            stored: 0,
            capacity: STORAGE_CAPACITY,
            hostile: false,
        });
        if let Some(view) = sim.unit_mut(unit) {
            view.carry_used = 0;
        }
        ActionCode::Ok
    }

    fn place_storage_site(&mut self, position: &Position) -> ActionCode {
        let mut sim = self.0.borrow_mut();
        let id = sim.next_object("site");
        let Some(territory) = sim.world.territories.get_mut(&position.territory) else {
            return ActionCode::InvalidTarget;
        };
        if territory.site_near(position).is_some() || territory.storage_near(position).is_some() {
            return ActionCode::InvalidTarget;
        }
        territory.construction_sites.push(SiteView {
            id,
            kind: StructureKind::Storage,
            position: position.clone(),
        });
        ActionCode::Ok
    }

    fn reserve(&mut self, unit: &UnitId, controller: &ObjectId) -> ActionCode {
        self.claim(unit, controller, false)
    }

    fn contest(&mut self, unit: &UnitId, controller: &ObjectId) -> ActionCode {
        self.claim(unit, controller, true)
    }
}

impl SimActions {
    fn claim(&mut self, unit: &UnitId, controller: &ObjectId, contest: bool) -> ActionCode {
        let mut sim = self.0.borrow_mut();
        let owner = sim.owner.clone();
        let Some(view) = sim.world.units.get(unit).cloned() else {
            return ActionCode::InvalidTarget;
        };
        let Some(target) = sim
            .world
            .territories
            .values_mut()
            .filter_map(|territory| territory.controller.as_mut())
            .find(|candidate| &candidate.id == controller)
        else {
            return ActionCode::InvalidTarget;
        };
        if !view.position.in_range(&target.position, 1) {
            return ActionCode::NotInRange;
        }
        let parts = view.loadout.count(Part::Claim);
        match target.reservation.as_mut() {
            Some(reservation) if reservation.owner != owner => {
                if !contest {
                    return ActionCode::InvalidTarget;
                }
                reservation.ticks_to_end = reservation.ticks_to_end.saturating_sub(parts * 300);
                if reservation.ticks_to_end == 0 {
                    target.reservation = None;
                }
            }
            Some(reservation) => reservation.ticks_to_end += parts,
            None => {
                target.reservation = Some(ReservationView {
                    owner,
                    ticks_to_end: parts,
                });
            }
        }
        ActionCode::Ok
    }
}

fn simulate<S: KeyValueStore>(
    ops: &mut RemoteOps<S>,
    sim: &Shared,
    ticks: u64,
) -> Result<Option<RemoteReport>> {
    let mut last = None;
    for _ in 0..ticks {
        let world = sim.borrow().world.clone();
        let producers: Vec<ProducerId> = world
            .homes
            .values()
            .flat_map(|home| home.producers.iter().map(|view| view.id.clone()))
            .collect();

        let mut session = ops.begin_tick(&world)?;
        session.plan_tick();
        for producer in &producers {
            if let ProductionDecision::Produce(plan) = session.plan_next_production(producer) {
                session.commit_production(producer, &plan);
            }
        }
        let outcomes = session.run_units();
        let report = session.report();
        tracing::debug!(
            target: "remote_ops::sim",
            tick = world.tick,
            units = outcomes.len(),
            fingerprint = report.fingerprint,
            "sim.tick"
        );
        session.finish()?;
        last = Some(report);

        sim.borrow_mut().advance();
    }
    Ok(last)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let (config, metadata) = load_remote_config_from_env();
    let scenario = load_scenario(&args.scenario)?;
    info!(
        target: "remote_ops::sim",
        scenario = %args.scenario.display(),
        config = ?metadata.path(),
        homes = scenario.world.homes.len(),
        territories = scenario.world.territories.len(),
        ticks = args.ticks,
        "sim.start"
    );

    let sim: Shared = Rc::new(RefCell::new(Sim {
        world: scenario.world,
        owner: config.owner.clone(),
        next_unit: 0,
        next_object: 0,
        pending: Vec::new(),
    }));
    let services = Services::default()
        .with_facility(Box::new(SimFacility(sim.clone())))
        .with_movement(Box::new(SimMovement(sim.clone())))
        .with_actions(Box::new(SimActions(sim.clone())));

    let report = match args.store {
        Some(path) => {
            let store = FileStore::open(&path)?;
            let mut ops = RemoteOps::new(config, store, services);
            ops.set_inputs(&scenario.inputs)?;
            let report = simulate(&mut ops, &sim, args.ticks)?;
            ops.store().flush()?;
            report
        }
        None => {
            let mut ops = RemoteOps::new(config, MemoryStore::new(), services);
            ops.set_inputs(&scenario.inputs)?;
            simulate(&mut ops, &sim, args.ticks)?
        }
    };

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
