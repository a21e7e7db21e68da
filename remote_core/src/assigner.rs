//! Reconciles planned demand with live and queued units.
//!
//! Seats are rebuilt from scratch every pass. Queued requests count as supply
//! so running the pass twice against unchanged state leaves the queues
//! untouched.

use std::collections::{BTreeMap, BTreeSet};

use remote_schema::{
    AssignmentBook, HomeId, NodeId, ProductionQueue, RemoteLedger, RemoteStatus, RequestReason,
    Role, TerritoryId, UnitId,
};

use crate::context::TickContext;
use crate::estimate;
use crate::loadout::LoadoutTemplate;
use crate::planner::DemandSummary;
use crate::services::CostModel;
use crate::store::RemoteState;
use crate::world::WorldSnapshot;

pub fn assign(ctx: &TickContext<'_>, state: &mut RemoteState, costs: &dyn CostModel) {
    adopt_units(ctx.world, &mut state.assignments, ctx.tick);
    rebuild_seats(ctx, &mut state.ledger, &mut state.assignments);

    for summary in ctx.demands.values() {
        if summary.is_blocked() {
            tracing::debug!(
                target: "remote_ops::assigner",
                territory = %summary.territory,
                "requests.frozen"
            );
            continue;
        }
        let queue = state
            .queues
            .entry(summary.home.clone())
            .or_insert_with(|| ProductionQueue::new(summary.home.clone()));
        reconcile_extractors(ctx, summary, &mut state.ledger, queue, costs);
        reconcile_count(ctx, summary, Role::Transporter, &state.assignments, &state.ledger, queue);
        reconcile_count(ctx, summary, Role::ClaimHolder, &state.assignments, &state.ledger, queue);
    }

    drop_unplanned_requests(ctx, state);
}

/// Records newly produced units and forgets dead ones.
fn adopt_units(world: &WorldSnapshot, book: &mut AssignmentBook, tick: u64) {
    for unit in world.units.values() {
        let Some(tag) = unit.tag.as_ref() else {
            continue;
        };
        let created = if unit.born_tick > 0 { unit.born_tick } else { tick };
        if book.adopt(&unit.id, tag, created) {
            tracing::debug!(
                target: "remote_ops::assigner",
                unit = %unit.id,
                role = tag.role.label(),
                territory = %tag.territory,
                "unit.adopted"
            );
        }
    }
    let live: BTreeSet<UnitId> = world.units.keys().cloned().collect();
    let dropped = book.retain_live(&live);
    if dropped > 0 {
        tracing::debug!(
            target: "remote_ops::assigner",
            dropped,
            "assignments.pruned"
        );
    }
}

fn rebuild_seats(ctx: &TickContext<'_>, ledger: &mut RemoteLedger, book: &mut AssignmentBook) {
    let capacity = ctx.config.seats.capacity;
    for entry in ledger.entries.values_mut() {
        for node in entry.nodes.values_mut() {
            node.seat.reset();
        }
    }

    let mut extractors: Vec<(u64, UnitId)> = book
        .units
        .values()
        .filter(|record| record.role == Role::Extractor)
        .map(|record| (record.created_tick, record.unit.clone()))
        .collect();
    extractors.sort();

    // Existing bindings, oldest unit first.
    let mut unseated = Vec::new();
    for (_, unit) in &extractors {
        let Some(record) = book.get(unit) else {
            continue;
        };
        let node = record.node.as_ref().and_then(|node| {
            ledger
                .entry_mut(&record.territory)
                .and_then(|entry| entry.nodes.get_mut(node))
        });
        match node {
            Some(node) if node.seat.has_vacancy(capacity) => node.seat.occupants.push(unit.clone()),
            Some(node) => node.seat.wait_queue.push(unit.clone()),
            None => unseated.push(unit.clone()),
        }
    }

    let mut cursors: BTreeMap<HomeId, usize> = BTreeMap::new();
    for unit in unseated {
        let Some(record) = book.get_mut(&unit) else {
            continue;
        };
        let placement = vacancy_in(ledger, &record.territory, capacity, ctx)
            .map(|node| (record.territory.clone(), node))
            .or_else(|| {
                let cursor = cursors.entry(record.home.clone()).or_insert(0);
                round_robin_vacancy(ledger, &record.home, &record.territory, capacity, cursor, ctx)
            });

        match placement {
            Some((territory, node)) => {
                if let Some(entry) = ledger.entry_mut(&territory) {
                    if let Some(seat) = entry.nodes.get_mut(&node).map(|node| &mut node.seat) {
                        seat.occupants.push(unit.clone());
                        seat.last_assign_tick = ctx.tick;
                    }
                }
                tracing::debug!(
                    target: "remote_ops::assigner",
                    unit = %unit,
                    territory = %territory,
                    node = %node,
                    "seat.assigned"
                );
                record.territory = territory;
                record.node = Some(node);
            }
            None => {
                let shortest = ledger.entry_mut(&record.territory).and_then(|entry| {
                    entry
                        .nodes
                        .values_mut()
                        .min_by_key(|node| node.seat.wait_queue.len())
                });
                match shortest {
                    Some(node) => {
                        node.seat.wait_queue.push(unit.clone());
                        record.node = Some(node.id.clone());
                    }
                    None => record.node = None,
                }
            }
        }
    }
}

/// First node in `territory` with a free seat, if the territory is usable.
fn vacancy_in(
    ledger: &RemoteLedger,
    territory: &TerritoryId,
    capacity: usize,
    ctx: &TickContext<'_>,
) -> Option<NodeId> {
    let summary = ctx.demand(territory)?;
    if summary.is_blocked() {
        return None;
    }
    ledger
        .entry(territory)?
        .nodes
        .values()
        .find(|node| node.seat.has_vacancy(capacity))
        .map(|node| node.id.clone())
}

/// Next vacancy among the home's other planned territories, continuing from
/// `cursor` so consecutive units spread across territories.
fn round_robin_vacancy(
    ledger: &RemoteLedger,
    home: &HomeId,
    own: &TerritoryId,
    capacity: usize,
    cursor: &mut usize,
    ctx: &TickContext<'_>,
) -> Option<(TerritoryId, NodeId)> {
    let territories: Vec<&TerritoryId> = ctx
        .demands
        .values()
        .filter(|summary| &summary.home == home && &summary.territory != own)
        .map(|summary| &summary.territory)
        .collect();
    if territories.is_empty() {
        return None;
    }
    for step in 0..territories.len() {
        let index = (*cursor + step) % territories.len();
        let territory = territories[index];
        if let Some(node) = vacancy_in(ledger, territory, capacity, ctx) {
            *cursor = index + 1;
            return Some((territory.clone(), node));
        }
    }
    None
}

fn reconcile_extractors(
    ctx: &TickContext<'_>,
    summary: &DemandSummary,
    ledger: &mut RemoteLedger,
    queue: &mut ProductionQueue,
    costs: &dyn CostModel,
) {
    let Some(entry) = ledger.entry_mut(&summary.territory) else {
        return;
    };
    let loadout_parts = match entry.loadout_shape(Role::Extractor) {
        Some(shape) if shape.parts > 0 => shape.parts,
        _ => {
            let budget = ctx
                .world
                .home(&summary.home)
                .map_or(0, |home| home.energy_capacity);
            LoadoutTemplate::for_role(Role::Extractor, Some(summary), &ctx.config)
                .size(budget, ctx.config.production.max_parts, costs)
                .len() as u32
        }
    };

    let territory = &summary.territory;
    for node in entry.nodes.values_mut() {
        let quota = summary.node_quotas.get(&node.id).copied().unwrap_or(0);
        let route = node
            .route
            .as_ref()
            .map_or(summary.route_length, |route| route.length);
        let threshold = estimate::handoff_threshold(route, loadout_parts, &ctx.config.handoff);
        node.seat.handoff_threshold = threshold;

        let seated = node.seat.occupants.len() as u32;
        let waiting = node.seat.wait_queue.len() as u32;
        let expiring = waiting == 0
            && node.seat.occupants.iter().any(|unit| {
                ctx.world
                    .unit(unit)
                    .is_some_and(|view| view.remaining_life() <= threshold)
            });
        let missing = quota.saturating_sub(seated + waiting);
        let handoff = u32::from(missing == 0 && seated > 0 && expiring);
        let target = missing + handoff;
        let reason = if handoff > 0 {
            RequestReason::Handoff
        } else {
            RequestReason::Missing
        };

        let node_id = node.id.clone();
        let queued = queue.count_for_node(territory, &node_id) as u32;
        reconcile(
            ctx,
            queue,
            Role::Extractor,
            territory,
            Some(&node_id),
            queued,
            target,
            reason,
        );
    }

    // Requests for nodes the territory no longer has.
    let stale: Vec<u64> = queue
        .requests
        .iter()
        .filter(|request| request.targets(territory, Role::Extractor))
        .filter(|request| {
            request
                .node
                .as_ref()
                .map_or(true, |node| !summary.node_quotas.contains_key(node))
        })
        .map(|request| request.id)
        .collect();
    for id in stale {
        queue.remove(id);
    }
}

fn reconcile_count(
    ctx: &TickContext<'_>,
    summary: &DemandSummary,
    role: Role,
    book: &AssignmentBook,
    ledger: &RemoteLedger,
    queue: &mut ProductionQueue,
) {
    let live = book.with_role(&summary.territory, role).count() as u32;
    let target = summary.quotas.for_role(role).saturating_sub(live);
    let queued = queue.count_for(&summary.territory, role) as u32;
    let reason = match role {
        Role::ClaimHolder
            if ledger
                .entry(&summary.territory)
                .is_some_and(|entry| entry.reservation.is_some()) =>
        {
            RequestReason::Refresh
        }
        _ => RequestReason::Missing,
    };
    reconcile(ctx, queue, role, &summary.territory, None, queued, target, reason);
}

/// Brings the number of queued requests for one slot to `target`: new
/// requests are appended, surplus requests are trimmed newest first.
#[allow(clippy::too_many_arguments)]
fn reconcile(
    ctx: &TickContext<'_>,
    queue: &mut ProductionQueue,
    role: Role,
    territory: &TerritoryId,
    node: Option<&NodeId>,
    queued: u32,
    target: u32,
    reason: RequestReason,
) {
    if queued < target {
        let deficit = target - queued;
        for _ in 0..deficit {
            let id = queue.push(
                role,
                territory.clone(),
                node.cloned(),
                deficit,
                reason,
                ctx.tick,
            );
            tracing::info!(
                target: "remote_ops::assigner",
                home = %queue.home,
                territory = %territory,
                role = role.label(),
                reason = reason.label(),
                request = id,
                "production.requested"
            );
        }
        return;
    }

    let surplus = queued - target;
    if surplus == 0 {
        return;
    }
    let mut matching: Vec<(u64, u64)> = queue
        .requests
        .iter()
        .filter(|request| request.targets(territory, role))
        .filter(|request| node.is_none() || request.node.as_ref() == node)
        .map(|request| (request.created_tick, request.id))
        .collect();
    matching.sort_unstable_by(|a, b| b.cmp(a));
    for (_, id) in matching.into_iter().take(surplus as usize) {
        queue.remove(id);
        tracing::debug!(
            target: "remote_ops::assigner",
            territory = %territory,
            role = role.label(),
            request = id,
            "production.trimmed"
        );
    }
}

/// Removes requests for territories of visible homes that are no longer planned.
fn drop_unplanned_requests(ctx: &TickContext<'_>, state: &mut RemoteState) {
    for (home, queue) in state.queues.iter_mut() {
        if ctx.world.home(home).is_none() {
            continue;
        }
        let before = queue.len();
        queue.requests.retain(|request| {
            ctx.demands.contains_key(&request.territory)
                || state
                    .ledger
                    .entry(&request.territory)
                    .is_some_and(|entry| entry.status == RemoteStatus::Blocked)
        });
        let dropped = before - queue.len();
        if dropped > 0 {
            tracing::debug!(
                target: "remote_ops::assigner",
                home = %home,
                dropped,
                "production.unplanned_dropped"
            );
        }
    }
}
