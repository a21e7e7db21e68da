//! Per-tick demand planning.
//!
//! For every (home, territory) pair the planner refreshes what it can see,
//! classifies the territory and derives a [`DemandSummary`]. Everything it
//! learns is written to the ledger so the next tick can plan without vision.

use std::collections::{BTreeMap, BTreeSet};

use remote_schema::{
    ControllerMemo, HomeId, NodeId, RemoteLedgerEntry, RemoteStatus, ReservationMemo, Role,
    StatusReason, TerritoryClass, TerritoryId,
};
use serde::Serialize;

use crate::config::RemoteConfig;
use crate::context::TickContext;
use crate::estimate::{self, HaulerRequirement};
use crate::loadout::{LoadoutTemplate, Part};
use crate::scalar::Scalar;
use crate::services::{CostModel, Services};
use crate::store::RemoteState;
use crate::world::{HomeView, NodeView, TerritoryView, WorldSnapshot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoleQuotas {
    pub extractor: u32,
    pub transporter: u32,
    pub claim_holder: u32,
}

impl RoleQuotas {
    pub fn for_role(&self, role: Role) -> u32 {
        match role {
            Role::Extractor => self.extractor,
            Role::Transporter => self.transporter,
            Role::ClaimHolder => self.claim_holder,
        }
    }

    pub fn add(&mut self, role: Role, amount: u32) {
        match role {
            Role::Extractor => self.extractor += amount,
            Role::Transporter => self.transporter += amount,
            Role::ClaimHolder => self.claim_holder += amount,
        }
    }

    pub fn total(&self) -> u32 {
        self.extractor + self.transporter + self.claim_holder
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReservationNeed {
    pub needed: bool,
    pub remaining_ticks: u32,
}

/// Demand for one territory, recomputed every tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DemandSummary {
    pub home: HomeId,
    pub territory: TerritoryId,
    pub status: RemoteStatus,
    pub reason: StatusReason,
    pub quotas: RoleQuotas,
    pub node_quotas: BTreeMap<NodeId, u32>,
    pub node_throughput: BTreeMap<NodeId, Scalar>,
    pub throughput: Scalar,
    pub route_length: u32,
    pub hauler: HaulerRequirement,
    pub reservation: ReservationNeed,
}

impl DemandSummary {
    pub fn peak_node_throughput(&self) -> Scalar {
        self.node_throughput
            .values()
            .copied()
            .max()
            .unwrap_or_default()
    }

    pub fn is_blocked(&self) -> bool {
        self.status == RemoteStatus::Blocked
    }
}

/// Runs the planning phase and leaves the result in `ctx.demands`.
pub fn plan(ctx: &mut TickContext<'_>, state: &mut RemoteState, services: &Services) {
    let tick = ctx.tick;
    let world = ctx.world;
    let config = ctx.config.clone();
    let targets = resolve_targets(world, state, &config, tick);

    let mut demands = BTreeMap::new();
    for (territory, home) in targets {
        let Some(home_view) = world.home(&home) else {
            tracing::debug!(
                target: "remote_ops::planner",
                home = %home,
                territory = %territory,
                "plan.home_not_visible"
            );
            continue;
        };
        let summary = plan_territory(
            world,
            home_view,
            &territory,
            state,
            services,
            &config,
            tick,
        );
        demands.insert(territory, summary);
    }
    ctx.demands = demands;
}

struct Candidate {
    home: HomeId,
    first_mention: u64,
}

#[derive(Default)]
struct Candidates(BTreeMap<TerritoryId, Vec<Candidate>>);

impl Candidates {
    fn mention(&mut self, territory: &TerritoryId, home: &HomeId, first_mention: u64) {
        let list = self.0.entry(territory.clone()).or_default();
        match list.iter_mut().find(|candidate| &candidate.home == home) {
            Some(candidate) => candidate.first_mention = candidate.first_mention.min(first_mention),
            None => list.push(Candidate {
                home: home.clone(),
                first_mention,
            }),
        }
    }

    fn held_by(&self, home: &HomeId) -> BTreeSet<TerritoryId> {
        self.0
            .iter()
            .filter(|(_, list)| list.iter().any(|candidate| &candidate.home == home))
            .map(|(territory, _)| territory.clone())
            .collect()
    }
}

/// Decides which home exploits which territory this tick.
///
/// Sources, in order: operator inputs, live units' assignments, recent ledger
/// history and visible neighbours. A territory claimed by several homes stays
/// with its ledger home when that home still wants it; otherwise the earliest
/// mention wins, ties by home id.
fn resolve_targets(
    world: &WorldSnapshot,
    state: &RemoteState,
    config: &RemoteConfig,
    tick: u64,
) -> BTreeMap<TerritoryId, HomeId> {
    let eligible = |territory: &TerritoryId| {
        !state.inputs.excluded.contains(territory)
            && !world.homes.contains_key(&HomeId::new(territory.as_str()))
    };
    let mut candidates = Candidates::default();

    for (home, territories) in &state.inputs.assignments {
        for territory in territories.iter().filter(|territory| eligible(territory)) {
            candidates.mention(territory, home, tick);
        }
    }

    for unit in world.units.values() {
        let (home, territory) = match state.assignments.get(&unit.id) {
            Some(record) => (&record.home, &record.territory),
            None => match unit.tag.as_ref() {
                Some(tag) => (&tag.home, &tag.territory),
                None => continue,
            },
        };
        if eligible(territory) {
            candidates.mention(territory, home, unit.born_tick);
        }
    }

    for entry in state.ledger.entries() {
        let last_seen = entry.last_seen_tick.max(entry.created_tick);
        let recent =
            tick.saturating_sub(last_seen) <= config.planning.history_retention_ticks;
        if recent && eligible(&entry.id) {
            candidates.mention(&entry.id, &entry.home, entry.created_tick);
        }
    }

    if config.planning.auto_discover {
        for home in world.homes.values() {
            let mut held = candidates.held_by(&home.id);
            for neighbor in &home.neighbors {
                if held.len() >= config.planning.max_remotes_per_home {
                    break;
                }
                if held.contains(neighbor) || !eligible(neighbor) {
                    continue;
                }
                let Some(view) = world.territory(neighbor) else {
                    continue;
                };
                if is_exploitable(view, config) {
                    candidates.mention(neighbor, &home.id, tick);
                    held.insert(neighbor.clone());
                }
            }
        }
    }

    candidates
        .0
        .into_iter()
        .filter_map(|(territory, list)| {
            let ledger_home = state.ledger.entry(&territory).map(|entry| &entry.home);
            let chosen = list
                .iter()
                .find(|candidate| Some(&candidate.home) == ledger_home)
                .or_else(|| {
                    list.iter()
                        .min_by(|a, b| (a.first_mention, &a.home).cmp(&(b.first_mention, &b.home)))
                })?;
            Some((territory, chosen.home.clone()))
        })
        .collect()
}

fn is_exploitable(view: &TerritoryView, config: &RemoteConfig) -> bool {
    if view.nodes.is_empty() {
        return false;
    }
    match view.controller.as_ref() {
        Some(controller) => {
            controller.owner.is_none()
                && controller
                    .reservation
                    .as_ref()
                    .map_or(true, |reservation| reservation.owner == config.owner)
        }
        None => true,
    }
}

fn plan_territory(
    world: &WorldSnapshot,
    home: &HomeView,
    territory: &TerritoryId,
    state: &mut RemoteState,
    services: &Services,
    config: &RemoteConfig,
    tick: u64,
) -> DemandSummary {
    let entry = state.ledger.get_or_create(territory, &home.id, tick);
    if entry.home != home.id {
        tracing::info!(
            target: "remote_ops::planner",
            territory = %territory,
            from = %entry.home,
            to = %home.id,
            "territory.home_reassigned"
        );
        entry.reassign_home(home.id.clone());
    }

    let view = world.territory(territory);
    if let Some(view) = view {
        observe(entry, view, config, tick);
    }

    let (status, reason, cooldown) = classify(view, config);
    let previous = entry.status;
    if entry.mark_status(status, reason, cooldown, tick) {
        tracing::info!(
            target: "remote_ops::planner",
            territory = %territory,
            home = %home.id,
            from = previous.label(),
            to = entry.status.label(),
            reason = entry.status_reason.label(),
            blocked_until = entry.blocked_until,
            "territory.status_changed"
        );
    }

    let visible = view.is_some();
    let reserved = entry
        .reservation
        .as_ref()
        .is_some_and(|memo| memo.mine && memo.remaining_at(tick) > 0);
    let mut node_throughput = BTreeMap::new();
    let mut routes = Vec::with_capacity(entry.nodes.len());
    for node in entry.nodes.values_mut() {
        let route = estimate::refresh_route(
            node,
            &home.anchor,
            visible,
            services.routes.as_deref(),
            tick,
            &config.routes,
        );
        routes.push(route);
        let rate = estimate::node_throughput(node, visible, reserved, &config.nodes);
        node_throughput.insert(node.id.clone(), rate);
    }

    let throughput = node_throughput
        .values()
        .fold(Scalar::zero(), |total, rate| total + *rate);
    let route_length = estimate::aggregate_route(&routes);
    let carry_capacity = transporter_carry_capacity(entry, home, config, services.costs.as_ref());
    let hauler = estimate::hauler_requirement(
        route_length,
        throughput,
        config.routes.speed(),
        carry_capacity,
        &config.haulers,
    );

    let remaining_ticks = entry
        .reservation
        .as_ref()
        .filter(|memo| memo.mine)
        .map_or(0, |memo| memo.remaining_at(tick));
    let reservation = ReservationNeed {
        needed: reservation_needed(entry, home, remaining_ticks, config, services.costs.as_ref()),
        remaining_ticks,
    };

    let seat_capacity = u32::try_from(config.seats.capacity).unwrap_or(u32::MAX);
    let mut node_quotas: BTreeMap<NodeId, u32> = entry
        .nodes
        .keys()
        .map(|node| (node.clone(), seat_capacity))
        .collect();
    let quotas = match entry.status {
        RemoteStatus::Blocked => {
            node_quotas.values_mut().for_each(|quota| *quota = 0);
            RoleQuotas::default()
        }
        RemoteStatus::Healthy => RoleQuotas {
            extractor: node_quotas.values().sum(),
            transporter: hauler.count,
            claim_holder: u32::from(reservation.needed),
        },
        RemoteStatus::Degraded => {
            let scaled = hauler.count * config.haulers.degraded_ratio_percent / 100;
            RoleQuotas {
                extractor: node_quotas.values().sum(),
                transporter: if hauler.count > 0 { scaled.max(1) } else { 0 },
                claim_holder: u32::from(reservation.needed),
            }
        }
    };

    let summary = DemandSummary {
        home: home.id.clone(),
        territory: territory.clone(),
        status: entry.status,
        reason: entry.status_reason,
        quotas,
        node_quotas,
        node_throughput,
        throughput,
        route_length,
        hauler,
        reservation,
    };
    tracing::debug!(
        target: "remote_ops::planner",
        territory = %territory,
        home = %home.id,
        status = summary.status.label(),
        extractors = summary.quotas.extractor,
        transporters = summary.quotas.transporter,
        claim_holders = summary.quotas.claim_holder,
        throughput = %summary.throughput,
        route = summary.route_length,
        "territory.planned"
    );
    summary
}

/// Copies everything visible this tick into the ledger entry.
fn observe(entry: &mut RemoteLedgerEntry, view: &TerritoryView, config: &RemoteConfig, tick: u64) {
    entry.last_seen_tick = tick;
    entry.class = view.class;
    entry.controller = view.controller.as_ref().map(|controller| ControllerMemo {
        id: controller.id.clone(),
        position: controller.position.clone(),
    });
    entry.reservation = view
        .controller
        .as_ref()
        .and_then(|controller| controller.reservation.as_ref())
        .map(|reservation| ReservationMemo {
            owner: reservation.owner.clone(),
            mine: reservation.owner == config.owner,
            ticks_to_end: reservation.ticks_to_end,
            observed_tick: tick,
        });
    for node_view in &view.nodes {
        refresh_node(entry, node_view, view, tick);
    }
}

fn refresh_node(entry: &mut RemoteLedgerEntry, node_view: &NodeView, view: &TerritoryView, tick: u64) {
    let node = entry.get_or_create_node(&node_view.id);
    node.position = node_view.position.clone();
    let storage = view.storage_near(&node_view.position);
    node.storage = storage.map(|structure| structure.id.clone());
    node.storage_position = storage.map(|structure| structure.position.clone());
    node.seat_position = node
        .storage_position
        .clone()
        .or_else(|| node_view.seat_candidates.first().cloned());
    node.construction_site = match node.storage {
        Some(_) => None,
        None => view
            .site_near(&node_view.position)
            .map(|site| site.id.clone()),
    };
    node.capacity = node_view.capacity;
    node.regen_period = node_view.regen_period;
    node.fortified = view.class == TerritoryClass::Fortified;
    node.last_seen_tick = tick;
}

fn classify(
    view: Option<&TerritoryView>,
    config: &RemoteConfig,
) -> (RemoteStatus, StatusReason, u32) {
    let Some(view) = view else {
        return (RemoteStatus::Degraded, StatusReason::NoVision, 0);
    };
    let controller = view.controller.as_ref();
    let cooldowns = &config.cooldowns;

    if controller
        .and_then(|controller| controller.owner.as_ref())
        .is_some_and(|owner| owner != &config.owner)
    {
        return (
            RemoteStatus::Blocked,
            StatusReason::ForeignOwner,
            cooldowns.foreign_owner,
        );
    }
    if view.has_defended_structure() {
        return (
            RemoteStatus::Blocked,
            StatusReason::HostileStructure,
            cooldowns.hostile_structure,
        );
    }
    if view.armed_hostiles() > 0 {
        return (
            RemoteStatus::Blocked,
            StatusReason::HostileUnits,
            cooldowns.hostile_units,
        );
    }
    if controller
        .and_then(|controller| controller.reservation.as_ref())
        .is_some_and(|reservation| reservation.owner != config.owner)
    {
        return (RemoteStatus::Degraded, StatusReason::ForeignReservation, 0);
    }
    if view.class.is_restricted() {
        return (RemoteStatus::Degraded, StatusReason::Restricted, 0);
    }
    (RemoteStatus::Healthy, StatusReason::Clear, 0)
}

/// Carry capacity of one transporter: the last produced shape, else the best
/// transporter the home could produce at full capacity.
fn transporter_carry_capacity(
    entry: &RemoteLedgerEntry,
    home: &HomeView,
    config: &RemoteConfig,
    costs: &dyn CostModel,
) -> u32 {
    let per_part = config.haulers.carry_per_part;
    if let Some(shape) = entry.loadout_shape(Role::Transporter) {
        if shape.carry > 0 {
            return shape.carry * per_part;
        }
    }
    LoadoutTemplate::for_role(Role::Transporter, None, config)
        .size(home.energy_capacity, config.production.max_parts, costs)
        .count(Part::Carry)
        * per_part
}

fn reservation_needed(
    entry: &RemoteLedgerEntry,
    home: &HomeView,
    remaining_ticks: u32,
    config: &RemoteConfig,
    costs: &dyn CostModel,
) -> bool {
    if entry.class.is_restricted() || entry.controller.is_none() {
        return false;
    }
    let claim_cost = LoadoutTemplate::for_role(Role::ClaimHolder, None, config).min_cost(costs);
    if home.energy_capacity < claim_cost {
        return false;
    }
    let expiring = remaining_ticks < config.reservation.refresh_threshold_ticks;
    match (entry.status, entry.status_reason) {
        (RemoteStatus::Blocked, _) => false,
        (RemoteStatus::Degraded, StatusReason::ForeignReservation) => true,
        (RemoteStatus::Degraded, StatusReason::NoVision) => expiring,
        (RemoteStatus::Degraded, _) => false,
        (RemoteStatus::Healthy, _) => expiring,
    }
}
