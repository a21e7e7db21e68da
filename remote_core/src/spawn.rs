//! Production broker: hands the next request of a home's backlog to a
//! producer and records the outcome.

use std::fmt;

use remote_schema::{HomeId, NodeId, ProducerId, RequestState, Role, TerritoryId, UnitTag};

use crate::context::TickContext;
use crate::loadout::{Loadout, LoadoutTemplate};
use crate::services::{CostModel, ProduceResult, ProductionFacility};
use crate::store::RemoteState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HoldReason {
    UnknownProducer,
    ProducerBusy,
    EmptyQueue,
    /// Every request looked at belongs to a blocked territory.
    NoCandidate { rotations: usize },
    InsufficientEnergy { cost: u32, available: u32 },
    /// The smallest loadout for the role costs more than the home can ever hold.
    BodyTooLarge { cost: u32, capacity: u32 },
    NoViableLoadout,
}

impl HoldReason {
    pub fn label(&self) -> &'static str {
        match self {
            HoldReason::UnknownProducer => "unknown_producer",
            HoldReason::ProducerBusy => "producer_busy",
            HoldReason::EmptyQueue => "empty_queue",
            HoldReason::NoCandidate { .. } => "no_candidate",
            HoldReason::InsufficientEnergy { .. } => "insufficient_energy",
            HoldReason::BodyTooLarge { .. } => "body_too_large",
            HoldReason::NoViableLoadout => "no_viable_loadout",
        }
    }
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductionPlan {
    pub request_id: u64,
    pub home: HomeId,
    pub territory: TerritoryId,
    pub role: Role,
    pub node: Option<NodeId>,
    pub loadout: Loadout,
    pub cost: u32,
    pub ideal_cost: u32,
    pub tag: UnitTag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProductionDecision {
    Produce(ProductionPlan),
    Hold(HoldReason),
}

impl ProductionDecision {
    pub fn plan(&self) -> Option<&ProductionPlan> {
        match self {
            ProductionDecision::Produce(plan) => Some(plan),
            ProductionDecision::Hold(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Produced,
    InsufficientResources,
    ProducerBusy,
    /// The plan's request is gone or belongs to another home.
    Stale,
    Failed(String),
}

/// Picks the next request `producer` should build.
///
/// Requests of blocked territories are stamped with the block's end and sort
/// behind workable ones; within each group the order is priority, then
/// creation tick. A head whose territory is still blocked is rotated to the
/// tail and marked waiting, at most `production.max_rotations` times per call.
pub fn plan_next(
    ctx: &mut TickContext<'_>,
    state: &mut RemoteState,
    costs: &dyn CostModel,
    producer: &ProducerId,
) -> ProductionDecision {
    let tick = ctx.tick;
    let world = ctx.world;
    let config = ctx.config.clone();
    let Some((home, view)) = world.producer(producer) else {
        return ProductionDecision::Hold(HoldReason::UnknownProducer);
    };
    if view.busy {
        return ProductionDecision::Hold(HoldReason::ProducerBusy);
    }
    let Some(queue) = state.queues.get_mut(&home.id).filter(|queue| !queue.is_empty()) else {
        return ProductionDecision::Hold(HoldReason::EmptyQueue);
    };

    // Stamp every request of a blocked territory so it sorts behind workable
    // work; rotation then only pays for heads blocked since the last stamp.
    for request in &mut queue.requests {
        match state
            .ledger
            .entry(&request.territory)
            .filter(|entry| entry.is_blocked(tick))
        {
            Some(entry) => {
                request.state = RequestState::Waiting;
                request.blocked_until = entry.blocked_until;
            }
            None if request.is_parked(tick) => request.blocked_until = 0,
            None => {}
        }
    }
    queue.sort_at(tick);
    let limit = config.production.max_rotations.min(queue.len());
    let mut rotations = 0;
    loop {
        let head = &mut queue.requests[0];
        let blocked_until = state
            .ledger
            .entry(&head.territory)
            .filter(|entry| entry.is_blocked(tick))
            .map(|entry| entry.blocked_until);
        let Some(blocked_until) = blocked_until else {
            break;
        };
        if rotations >= limit {
            let reason = HoldReason::NoCandidate { rotations };
            log_hold(ctx, &home.id, &head.territory, head.role, &reason);
            return ProductionDecision::Hold(reason);
        }
        head.state = RequestState::Waiting;
        head.blocked_until = blocked_until;
        queue.rotate_to_tail(0);
        rotations += 1;
    }

    let request = &mut queue.requests[0];
    let template = LoadoutTemplate::for_role(request.role, ctx.demand(&request.territory), &config);
    let max_parts = config.production.max_parts;
    let ideal = template.size(home.energy_capacity, max_parts, costs);

    if ideal.is_empty() {
        let min_cost = template.min_cost(costs);
        if min_cost <= home.energy_capacity {
            let request_id = request.id;
            let (territory, role) = (request.territory.clone(), request.role);
            queue.remove(request_id);
            tracing::warn!(
                target: "remote_ops::spawn",
                home = %home.id,
                territory = %territory,
                role = role.label(),
                request = request_id,
                "production.dropped_no_viable_loadout"
            );
            return ProductionDecision::Hold(HoldReason::NoViableLoadout);
        }

        let reason = HoldReason::BodyTooLarge {
            cost: min_cost,
            capacity: home.energy_capacity,
        };
        let since = *request.capacity_wait_since.get_or_insert(tick);
        if tick.saturating_sub(since) >= config.production.capacity_wait_limit_ticks {
            let request_id = request.id;
            let (territory, role) = (request.territory.clone(), request.role);
            queue.remove(request_id);
            tracing::warn!(
                target: "remote_ops::spawn",
                home = %home.id,
                territory = %territory,
                role = role.label(),
                request = request_id,
                waited = tick - since,
                cost = min_cost,
                capacity = home.energy_capacity,
                "production.dropped_body_too_large"
            );
            return ProductionDecision::Hold(reason);
        }
        request.state = RequestState::Waiting;
        let (territory, role) = (request.territory.clone(), request.role);
        log_hold(ctx, &home.id, &territory, role, &reason);
        return ProductionDecision::Hold(reason);
    }
    request.capacity_wait_since = None;

    let ideal_cost = costs.cost_of(&ideal);
    let working = template.size(home.energy_available, max_parts, costs);
    let ideal_units = template.units_in(&ideal);
    let working_units = template.units_in(&working);
    let weak = working.is_empty()
        || working_units * 100 < ideal_units * config.production.min_working_ratio_percent;
    let loadout = if weak { ideal } else { working };
    let cost = costs.cost_of(&loadout);

    if cost > home.energy_available {
        request.state = RequestState::Waiting;
        let reason = HoldReason::InsufficientEnergy {
            cost,
            available: home.energy_available,
        };
        let (territory, role) = (request.territory.clone(), request.role);
        log_hold(ctx, &home.id, &territory, role, &reason);
        return ProductionDecision::Hold(reason);
    }

    request.state = RequestState::Ready;
    ProductionDecision::Produce(ProductionPlan {
        request_id: request.id,
        home: home.id.clone(),
        territory: request.territory.clone(),
        role: request.role,
        node: request.node.clone(),
        loadout,
        cost,
        ideal_cost,
        tag: UnitTag {
            role: request.role,
            home: home.id.clone(),
            territory: request.territory.clone(),
            node: request.node.clone(),
            request_id: request.id,
        },
    })
}

/// Asks the facility to build `plan` and settles the request.
pub fn commit(
    ctx: &TickContext<'_>,
    state: &mut RemoteState,
    facility: Option<&mut dyn ProductionFacility>,
    producer: &ProducerId,
    plan: &ProductionPlan,
) -> CommitOutcome {
    let owned_by_home = ctx
        .world
        .producer(producer)
        .is_some_and(|(home, _)| home.id == plan.home);
    let Some(queue) = state.queues.get_mut(&plan.home) else {
        return CommitOutcome::Stale;
    };
    if !owned_by_home || queue.get(plan.request_id).is_none() {
        return CommitOutcome::Stale;
    }
    let Some(facility) = facility else {
        return CommitOutcome::Failed("no production facility".to_string());
    };

    match facility.attempt_produce(producer, &plan.loadout, &plan.tag) {
        ProduceResult::Ok => {
            queue.remove(plan.request_id);
            if let Some(entry) = state.ledger.entry_mut(&plan.territory) {
                entry.record_loadout(plan.role, plan.loadout.shape(plan.cost, ctx.tick));
            }
            tracing::info!(
                target: "remote_ops::spawn",
                home = %plan.home,
                territory = %plan.territory,
                role = plan.role.label(),
                request = plan.request_id,
                parts = plan.loadout.len(),
                cost = plan.cost,
                "production.committed"
            );
            CommitOutcome::Produced
        }
        ProduceResult::InsufficientResources => {
            if let Some(request) = queue.get_mut(plan.request_id) {
                request.state = RequestState::Waiting;
            }
            CommitOutcome::InsufficientResources
        }
        ProduceResult::Busy => CommitOutcome::ProducerBusy,
        ProduceResult::Error(message) => {
            if let Some(request) = queue.get_mut(plan.request_id) {
                request.state = RequestState::Waiting;
            }
            tracing::warn!(
                target: "remote_ops::spawn",
                home = %plan.home,
                request = plan.request_id,
                error = %message,
                "production.failed"
            );
            CommitOutcome::Failed(message)
        }
    }
}

fn log_hold(
    ctx: &mut TickContext<'_>,
    home: &HomeId,
    territory: &TerritoryId,
    role: Role,
    reason: &HoldReason,
) {
    let key = format!("hold/{home}/{territory}/{}/{}", role.label(), reason.label());
    if ctx.first_log(key) {
        tracing::info!(
            target: "remote_ops::spawn",
            home = %home,
            territory = %territory,
            role = role.label(),
            reason = ?reason,
            "production.held"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::services::StandardCostModel;
    use crate::world::{HomeView, ProducerView, WorldSnapshot};
    use remote_schema::{Position, RemoteStatus, RequestReason, StatusReason};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world(available: u32, capacity: u32) -> WorldSnapshot {
        let mut world = WorldSnapshot {
            tick: 200,
            ..WorldSnapshot::default()
        };
        let home = HomeView {
            id: HomeId::from("W1N1"),
            anchor: Position::new("W1N1", 25, 25),
            energy_available: available,
            energy_capacity: capacity,
            producers: vec![ProducerView {
                id: ProducerId::from("p1"),
                position: Position::new("W1N1", 25, 26),
                busy: false,
            }],
            ..HomeView::default()
        };
        world.homes.insert(home.id.clone(), home);
        world
    }

    fn block(state: &mut RemoteState, territory: &str, tick: u64) {
        state
            .ledger
            .get_or_create(&TerritoryId::from(territory), &HomeId::from("W1N1"), 0)
            .mark_status(RemoteStatus::Blocked, StatusReason::HostileUnits, 50, tick);
    }

    fn push(state: &mut RemoteState, role: Role, territory: &str, tick: u64) -> u64 {
        state.queue_mut(&HomeId::from("W1N1")).push(
            role,
            TerritoryId::from(territory),
            None,
            1,
            RequestReason::Missing,
            tick,
        )
    }

    fn decide(world: &WorldSnapshot, state: &mut RemoteState) -> ProductionDecision {
        let mut ctx = TickContext::new(world, RemoteConfig::builtin());
        plan_next(&mut ctx, state, &StandardCostModel, &ProducerId::from("p1"))
    }

    #[test]
    fn extractor_before_transporter() {
        let world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        push(&mut state, Role::Transporter, "W2N1", 1);
        let extractor = push(&mut state, Role::Extractor, "W2N1", 5);
        let decision = decide(&world, &mut state);
        assert_eq!(decision.plan().map(|plan| plan.request_id), Some(extractor));
    }

    #[test]
    fn blocked_heads_rotate_to_next_candidate() {
        let world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        block(&mut state, "W3N1", 190);
        push(&mut state, Role::Extractor, "W3N1", 1);
        let hauler = push(&mut state, Role::Transporter, "W2N1", 2);
        let decision = decide(&world, &mut state);
        assert_eq!(decision.plan().map(|plan| plan.request_id), Some(hauler));

        let queue = state.queue(&HomeId::from("W1N1")).unwrap();
        let rotated = queue.requests.last().unwrap();
        assert_eq!(rotated.state, RequestState::Waiting);
        assert_eq!(rotated.blocked_until, 240);
    }

    #[test]
    fn workable_request_behind_many_blocked_heads_is_served() {
        let mut world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        state
            .ledger
            .get_or_create(&TerritoryId::from("W3N1"), &HomeId::from("W1N1"), 0)
            .mark_status(RemoteStatus::Blocked, StatusReason::ForeignOwner, 400, 190);
        for tick in 1..=4 {
            push(&mut state, Role::Transporter, "W3N1", tick);
        }
        let hauler = push(&mut state, Role::Transporter, "W2N1", 9);

        for tick in 200..205 {
            world.tick = tick;
            let decision = decide(&world, &mut state);
            assert_eq!(
                decision.plan().map(|plan| plan.request_id),
                Some(hauler),
                "tick {tick}: {decision:?}"
            );
        }
        let queue = state.queue(&HomeId::from("W1N1")).unwrap();
        assert!(queue
            .requests
            .iter()
            .filter(|request| request.territory == TerritoryId::from("W3N1"))
            .all(|request| request.state == RequestState::Waiting && request.blocked_until == 590));
    }

    #[test]
    fn lifted_block_restores_creation_order() {
        let mut world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        block(&mut state, "W3N1", 190);
        let early = push(&mut state, Role::Transporter, "W3N1", 1);
        push(&mut state, Role::Transporter, "W2N1", 9);
        decide(&world, &mut state);

        world.tick = 240;
        state
            .ledger
            .entry_mut(&TerritoryId::from("W3N1"))
            .unwrap()
            .mark_status(RemoteStatus::Healthy, StatusReason::Clear, 0, 240);
        let decision = decide(&world, &mut state);
        assert_eq!(decision.plan().map(|plan| plan.request_id), Some(early));
    }

    #[test]
    fn all_blocked_stops_after_bounded_rotations() {
        let world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        for (index, territory) in ["W2N1", "W3N1", "W4N1", "W5N1", "W6N1"].iter().enumerate() {
            block(&mut state, territory, 190);
            push(&mut state, Role::Extractor, territory, index as u64);
        }
        let decision = decide(&world, &mut state);
        assert_eq!(
            decision,
            ProductionDecision::Hold(HoldReason::NoCandidate { rotations: 3 })
        );
    }

    #[test]
    fn busy_producer_leaves_queue_untouched() {
        let mut world = world(1_000, 1_000);
        world
            .homes
            .get_mut(&HomeId::from("W1N1"))
            .unwrap()
            .producers[0]
            .busy = true;
        let mut state = RemoteState::default();
        push(&mut state, Role::Extractor, "W2N1", 1);
        let before = state.clone();
        assert_eq!(
            decide(&world, &mut state),
            ProductionDecision::Hold(HoldReason::ProducerBusy)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn low_energy_waits_for_ideal_loadout() {
        let world = world(150, 1_000);
        let mut state = RemoteState::default();
        push(&mut state, Role::Extractor, "W2N1", 1);
        let decision = decide(&world, &mut state);
        assert!(matches!(
            decision,
            ProductionDecision::Hold(HoldReason::InsufficientEnergy { available: 150, .. })
        ));
        let request = &state.queue(&HomeId::from("W1N1")).unwrap().requests[0];
        assert_eq!(request.state, RequestState::Waiting);
    }

    #[test]
    fn body_too_large_is_dropped_after_wait_limit() {
        let mut world = world(500, 500);
        let mut state = RemoteState::default();
        push(&mut state, Role::ClaimHolder, "W2N1", 1);
        let decision = decide(&world, &mut state);
        assert!(matches!(
            decision,
            ProductionDecision::Hold(HoldReason::BodyTooLarge { cost: 650, capacity: 500 })
        ));
        assert_eq!(
            state.queue(&HomeId::from("W1N1")).unwrap().requests[0].capacity_wait_since,
            Some(200)
        );

        world.tick = 1_699;
        decide(&world, &mut state);
        assert_eq!(state.queue(&HomeId::from("W1N1")).unwrap().len(), 1);

        world.tick = 1_700;
        decide(&world, &mut state);
        assert!(state.queue(&HomeId::from("W1N1")).unwrap().is_empty());
    }

    struct RecordingFacility {
        calls: Rc<RefCell<Vec<UnitTag>>>,
        result: ProduceResult,
    }

    impl ProductionFacility for RecordingFacility {
        fn attempt_produce(
            &mut self,
            _producer: &ProducerId,
            _loadout: &Loadout,
            tag: &UnitTag,
        ) -> ProduceResult {
            self.calls.borrow_mut().push(tag.clone());
            self.result.clone()
        }
    }

    #[test]
    fn commit_records_shape_and_removes_request() {
        let world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        state
            .ledger
            .get_or_create(&TerritoryId::from("W2N1"), &HomeId::from("W1N1"), 0);
        push(&mut state, Role::Transporter, "W2N1", 1);
        let plan = decide(&world, &mut state).plan().cloned().unwrap();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut facility = RecordingFacility {
            calls: calls.clone(),
            result: ProduceResult::Ok,
        };
        let ctx = TickContext::new(&world, RemoteConfig::builtin());
        let producer = ProducerId::from("p1");
        let outcome = commit(&ctx, &mut state, Some(&mut facility), &producer, &plan);
        assert_eq!(outcome, CommitOutcome::Produced);
        assert_eq!(calls.borrow().len(), 1);
        assert!(state.queue(&HomeId::from("W1N1")).unwrap().is_empty());
        let shape = state
            .ledger
            .entry(&TerritoryId::from("W2N1"))
            .unwrap()
            .loadout_shape(Role::Transporter)
            .unwrap();
        assert_eq!(shape.carry, plan.loadout.count(crate::loadout::Part::Carry));

        assert_eq!(
            commit(&ctx, &mut state, Some(&mut facility), &producer, &plan),
            CommitOutcome::Stale
        );
    }

    #[test]
    fn commit_without_resources_keeps_request_waiting() {
        let world = world(1_000, 1_000);
        let mut state = RemoteState::default();
        push(&mut state, Role::Transporter, "W2N1", 1);
        let plan = decide(&world, &mut state).plan().cloned().unwrap();
        let mut facility = RecordingFacility {
            calls: Rc::new(RefCell::new(Vec::new())),
            result: ProduceResult::InsufficientResources,
        };
        let ctx = TickContext::new(&world, RemoteConfig::builtin());
        let outcome = commit(
            &ctx,
            &mut state,
            Some(&mut facility),
            &ProducerId::from("p1"),
            &plan,
        );
        assert_eq!(outcome, CommitOutcome::InsufficientResources);
        let request = &state.queue(&HomeId::from("W1N1")).unwrap().requests[0];
        assert_eq!(request.state, RequestState::Waiting);
    }
}
