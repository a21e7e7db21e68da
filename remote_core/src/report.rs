//! Read-only status rows for operators, plus the periodic audit log.

use std::collections::BTreeMap;

use remote_schema::{HomeId, RemoteLedgerEntry, RemoteStatus, StatusReason, TerritoryId};
use serde::Serialize;

use crate::context::TickContext;
use crate::planner::RoleQuotas;
use crate::scalar::Scalar;
use crate::store::RemoteState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TerritoryRow {
    pub territory: TerritoryId,
    pub home: HomeId,
    pub status: RemoteStatus,
    pub reason: StatusReason,
    pub blocked_until: u64,
    pub nodes: usize,
    pub seated: usize,
    /// Desired units per role this tick; zero when the territory was not planned.
    pub quotas: RoleQuotas,
    pub live: RoleQuotas,
    pub queued: RoleQuotas,
    pub throughput: Scalar,
    pub route_length: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HomeRow {
    pub home: HomeId,
    pub territories: usize,
    pub blocked: usize,
    pub quotas: RoleQuotas,
    pub live: RoleQuotas,
    pub queued: RoleQuotas,
    pub throughput: Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoteReport {
    pub tick: u64,
    pub homes: Vec<HomeRow>,
    pub territories: Vec<TerritoryRow>,
    pub fingerprint: u64,
}

impl RemoteReport {
    pub fn territory(&self, id: &TerritoryId) -> Option<&TerritoryRow> {
        self.territories.iter().find(|row| &row.territory == id)
    }

    pub fn home(&self, id: &HomeId) -> Option<&HomeRow> {
        self.homes.iter().find(|row| &row.home == id)
    }
}

/// Aggregate demand of one home for the current tick, for colony-level
/// budgeting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DemandTotal {
    pub home: HomeId,
    pub territories: usize,
    pub blocked: usize,
    pub quotas: RoleQuotas,
    pub queued: RoleQuotas,
    pub throughput: Scalar,
}

/// Builds the report and runs the audit for entries whose interval elapsed.
pub fn report(ctx: &TickContext<'_>, state: &mut RemoteState) -> RemoteReport {
    audit(ctx, state);

    let live = live_counts(state);
    let queued = queued_counts(state);
    let territories: Vec<TerritoryRow> = state
        .ledger
        .entries()
        .map(|entry| territory_row(ctx, entry, &live, &queued))
        .collect();

    let mut homes: BTreeMap<HomeId, HomeRow> = BTreeMap::new();
    for row in &territories {
        let home = homes.entry(row.home.clone()).or_insert_with(|| HomeRow {
            home: row.home.clone(),
            ..HomeRow::default()
        });
        home.territories += 1;
        if row.status == RemoteStatus::Blocked {
            home.blocked += 1;
        }
        merge(&mut home.quotas, &row.quotas);
        merge(&mut home.live, &row.live);
        merge(&mut home.queued, &row.queued);
        home.throughput += row.throughput;
    }

    RemoteReport {
        tick: ctx.tick,
        homes: homes.into_values().collect(),
        territories,
        fingerprint: state.fingerprint(),
    }
}

/// Sums this tick's demand for `home` with what is already queued there.
pub fn demand_total(ctx: &TickContext<'_>, state: &RemoteState, home: &HomeId) -> DemandTotal {
    let mut total = DemandTotal {
        home: home.clone(),
        ..DemandTotal::default()
    };
    for summary in ctx.demands.values().filter(|summary| &summary.home == home) {
        total.territories += 1;
        if summary.is_blocked() {
            total.blocked += 1;
        }
        merge(&mut total.quotas, &summary.quotas);
        total.throughput += summary.throughput;
    }
    if let Some(queue) = state.queue(home) {
        for request in &queue.requests {
            total.queued.add(request.role, 1);
        }
    }
    total
}

fn audit(ctx: &TickContext<'_>, state: &mut RemoteState) {
    let interval = ctx.config.report.interval_ticks;
    if interval == 0 {
        return;
    }
    for entry in state.ledger.entries.values_mut() {
        if ctx.tick.saturating_sub(entry.last_audit_tick) < interval {
            continue;
        }
        let quotas = ctx
            .demand(&entry.id)
            .map(|summary| summary.quotas)
            .unwrap_or_default();
        tracing::info!(
            target: "remote_ops::report",
            territory = %entry.id,
            home = %entry.home,
            status = entry.status.label(),
            reason = entry.status_reason.label(),
            blocked_until = entry.blocked_until,
            nodes = entry.nodes.len(),
            extractors = quotas.extractor,
            transporters = quotas.transporter,
            claim_holders = quotas.claim_holder,
            "remote.audit"
        );
        entry.last_audit_tick = ctx.tick;
    }
}

fn territory_row(
    ctx: &TickContext<'_>,
    entry: &RemoteLedgerEntry,
    live: &BTreeMap<TerritoryId, RoleQuotas>,
    queued: &BTreeMap<TerritoryId, RoleQuotas>,
) -> TerritoryRow {
    let demand = ctx.demand(&entry.id);
    let throughput = match demand {
        Some(summary) => summary.throughput,
        None => entry
            .nodes
            .values()
            .map(|node| Scalar::from_raw(node.throughput_raw))
            .fold(Scalar::zero(), |sum, value| sum + value),
    };
    TerritoryRow {
        territory: entry.id.clone(),
        home: entry.home.clone(),
        status: entry.status,
        reason: entry.status_reason,
        blocked_until: entry.blocked_until,
        nodes: entry.nodes.len(),
        seated: entry
            .nodes
            .values()
            .map(|node| node.seat.occupants.len())
            .sum(),
        quotas: demand.map(|summary| summary.quotas).unwrap_or_default(),
        live: live.get(&entry.id).copied().unwrap_or_default(),
        queued: queued.get(&entry.id).copied().unwrap_or_default(),
        throughput,
        route_length: demand.map(|summary| summary.route_length).unwrap_or(0),
    }
}

fn live_counts(state: &RemoteState) -> BTreeMap<TerritoryId, RoleQuotas> {
    let mut counts: BTreeMap<TerritoryId, RoleQuotas> = BTreeMap::new();
    for record in state.assignments.units.values() {
        counts
            .entry(record.territory.clone())
            .or_default()
            .add(record.role, 1);
    }
    counts
}

fn queued_counts(state: &RemoteState) -> BTreeMap<TerritoryId, RoleQuotas> {
    let mut counts: BTreeMap<TerritoryId, RoleQuotas> = BTreeMap::new();
    for request in state.queues.values().flat_map(|queue| &queue.requests) {
        counts
            .entry(request.territory.clone())
            .or_default()
            .add(request.role, 1);
    }
    counts
}

fn merge(into: &mut RoleQuotas, from: &RoleQuotas) {
    into.extractor += from.extractor;
    into.transporter += from.transporter;
    into.claim_holder += from.claim_holder;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::world::WorldSnapshot;
    use remote_schema::{NodeId, RequestReason, Role, UnitId, UnitTag};

    fn state() -> RemoteState {
        let mut state = RemoteState::default();
        let home = HomeId::from("W1N1");
        for name in ["W2N1", "W3N1"] {
            let entry = state
                .ledger
                .get_or_create(&TerritoryId::from(name), &home, 0);
            let node = entry.get_or_create_node(&NodeId::new(format!("{name}-a")));
            node.throughput_raw = Scalar::from_u32(10).raw();
        }
        if let Some(entry) = state.ledger.entry_mut(&TerritoryId::from("W3N1")) {
            entry.mark_status(RemoteStatus::Blocked, StatusReason::HostileUnits, 50, 0);
        }
        state.queue_mut(&home).push(
            Role::Extractor,
            TerritoryId::from("W2N1"),
            None,
            1,
            RequestReason::Missing,
            0,
        );
        state.assignments.adopt(
            &UnitId::from("t1"),
            &UnitTag {
                role: Role::Transporter,
                home: home.clone(),
                territory: TerritoryId::from("W2N1"),
                node: None,
                request_id: 0,
            },
            0,
        );
        state
    }

    #[test]
    fn rows_aggregate_per_home() {
        let world = WorldSnapshot {
            tick: 20,
            ..WorldSnapshot::default()
        };
        let ctx = TickContext::new(&world, RemoteConfig::builtin());
        let mut state = state();
        let report = report(&ctx, &mut state);

        assert_eq!(report.territories.len(), 2);
        let w2 = report.territory(&TerritoryId::from("W2N1")).unwrap();
        assert_eq!(w2.queued.extractor, 1);
        assert_eq!(w2.live.transporter, 1);
        assert_eq!(w2.throughput, Scalar::from_u32(10));

        let home = report.home(&HomeId::from("W1N1")).unwrap();
        assert_eq!(home.territories, 2);
        assert_eq!(home.blocked, 1);
        assert_eq!(home.throughput, Scalar::from_u32(20));
        assert_eq!(report.fingerprint, state.fingerprint());
    }

    #[test]
    fn audit_stamps_only_after_interval() {
        let mut state = state();
        let early = WorldSnapshot {
            tick: 99,
            ..WorldSnapshot::default()
        };
        let ctx = TickContext::new(&early, RemoteConfig::builtin());
        report(&ctx, &mut state);
        assert!(state.ledger.entries().all(|entry| entry.last_audit_tick == 0));

        let due = WorldSnapshot {
            tick: 100,
            ..WorldSnapshot::default()
        };
        let ctx = TickContext::new(&due, RemoteConfig::builtin());
        report(&ctx, &mut state);
        assert!(state.ledger.entries().all(|entry| entry.last_audit_tick == 100));
    }

    #[test]
    fn demand_total_counts_queue_without_plan() {
        let world = WorldSnapshot::default();
        let ctx = TickContext::new(&world, RemoteConfig::builtin());
        let state = state();
        let total = demand_total(&ctx, &state, &HomeId::from("W1N1"));
        assert_eq!(total.territories, 0);
        assert_eq!(total.queued.extractor, 1);
        assert_eq!(total.quotas.total(), 0);
    }
}
