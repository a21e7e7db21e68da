use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{HomeId, NodeId, ObjectId, Position, Role, TerritoryId, UnitId, SCHEMA_VERSION};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStatus {
    #[default]
    Healthy,
    Degraded,
    Blocked,
}

impl RemoteStatus {
    pub fn label(self) -> &'static str {
        match self {
            RemoteStatus::Healthy => "healthy",
            RemoteStatus::Degraded => "degraded",
            RemoteStatus::Blocked => "blocked",
        }
    }
}

/// Why a territory carries its current status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusReason {
    #[default]
    Clear,
    NoVision,
    ForeignReservation,
    Restricted,
    HostileUnits,
    HostileStructure,
    ForeignOwner,
    CooldownActive,
}

impl StatusReason {
    pub fn label(self) -> &'static str {
        match self {
            StatusReason::Clear => "clear",
            StatusReason::NoVision => "no_vision",
            StatusReason::ForeignReservation => "foreign_reservation",
            StatusReason::Restricted => "restricted",
            StatusReason::HostileUnits => "hostile_units",
            StatusReason::HostileStructure => "hostile_structure",
            StatusReason::ForeignOwner => "foreign_owner",
            StatusReason::CooldownActive => "cooldown_active",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerritoryClass {
    #[default]
    Standard,
    /// Throughway zone: no controller, extraction only.
    Throughway,
    /// Nodes guarded by native defenders; larger yields.
    Fortified,
}

impl TerritoryClass {
    pub fn is_restricted(self) -> bool {
        matches!(self, TerritoryClass::Throughway)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerMemo {
    pub id: ObjectId,
    pub position: Position,
}

/// Last observed holding reservation on a territory's controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationMemo {
    pub owner: String,
    pub mine: bool,
    pub ticks_to_end: u32,
    pub observed_tick: u64,
}

impl ReservationMemo {
    /// Remaining reservation ticks extrapolated from the last observation.
    pub fn remaining_at(&self, tick: u64) -> u32 {
        let elapsed = tick.saturating_sub(self.observed_tick);
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        self.ticks_to_end.saturating_sub(elapsed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteSource {
    #[default]
    Heuristic,
    Path,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteEstimate {
    pub length: u32,
    pub computed_tick: u64,
    pub source: RouteSource,
}

impl RouteEstimate {
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.computed_tick)
    }

    pub fn is_fresh(&self, tick: u64, ttl: u64) -> bool {
        self.age(tick) <= ttl
    }
}

/// Extractor seat at a node. Occupancy is rebuilt every assign pass; only the
/// ids and the assignment tick are carried across ticks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seat {
    pub occupants: Vec<UnitId>,
    pub wait_queue: Vec<UnitId>,
    pub last_assign_tick: u64,
    pub handoff_threshold: u32,
}

impl Seat {
    pub fn has_vacancy(&self, capacity: usize) -> bool {
        self.occupants.len() < capacity
    }

    pub fn holds(&self, unit: &UnitId) -> bool {
        self.occupants.contains(unit)
    }

    pub fn reset(&mut self) {
        self.occupants.clear();
        self.wait_queue.clear();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeEntry {
    pub id: NodeId,
    pub home: HomeId,
    pub position: Position,
    pub seat_position: Option<Position>,
    pub storage: Option<ObjectId>,
    pub storage_position: Option<Position>,
    pub construction_site: Option<ObjectId>,
    pub route: Option<RouteEstimate>,
    pub capacity: u32,
    pub regen_period: u32,
    pub throughput_raw: i64,
    pub fortified: bool,
    pub last_seen_tick: u64,
    pub seat: Seat,
}

/// Shape of the last unit successfully produced for a role in a territory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadoutShape {
    pub parts: u32,
    pub work: u32,
    pub carry: u32,
    pub claim: u32,
    pub moves: u32,
    pub cost: u32,
    pub recorded_tick: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLedgerEntry {
    pub version: u32,
    pub id: TerritoryId,
    pub home: HomeId,
    pub status: RemoteStatus,
    pub status_reason: StatusReason,
    pub blocked_until: u64,
    pub last_audit_tick: u64,
    pub last_seen_tick: u64,
    pub created_tick: u64,
    pub class: TerritoryClass,
    pub controller: Option<ControllerMemo>,
    pub reservation: Option<ReservationMemo>,
    pub nodes: BTreeMap<NodeId, NodeEntry>,
    pub loadout_shapes: BTreeMap<Role, LoadoutShape>,
}

impl RemoteLedgerEntry {
    pub fn new(id: TerritoryId, home: HomeId, tick: u64) -> Self {
        Self {
            version: SCHEMA_VERSION,
            id,
            home,
            created_tick: tick,
            ..Self::default()
        }
    }

    pub fn get_or_create_node(&mut self, node: &NodeId) -> &mut NodeEntry {
        let home = self.home.clone();
        self.nodes.entry(node.clone()).or_insert_with(|| NodeEntry {
            id: node.clone(),
            home,
            ..NodeEntry::default()
        })
    }

    /// Moves the entry (and every node under it) to another home.
    pub fn reassign_home(&mut self, home: HomeId) {
        for node in self.nodes.values_mut() {
            node.home = home.clone();
        }
        self.home = home;
    }

    /// Applies a classification for `tick`.
    ///
    /// A Blocked classification can only raise `blocked_until`. Any other
    /// classification while a cooldown is still running keeps the entry
    /// Blocked. Returns true when status or reason changed.
    pub fn mark_status(
        &mut self,
        status: RemoteStatus,
        reason: StatusReason,
        cooldown_ticks: u32,
        tick: u64,
    ) -> bool {
        let before = (self.status, self.status_reason);
        match status {
            RemoteStatus::Blocked => {
                let until = tick.saturating_add(u64::from(cooldown_ticks));
                self.blocked_until = self.blocked_until.max(until);
                self.status = RemoteStatus::Blocked;
                self.status_reason = reason;
            }
            _ if self.blocked_until > tick => {
                self.status = RemoteStatus::Blocked;
                self.status_reason = StatusReason::CooldownActive;
            }
            _ => {
                self.status = status;
                self.status_reason = reason;
            }
        }
        before != (self.status, self.status_reason)
    }

    pub fn is_blocked(&self, tick: u64) -> bool {
        self.status == RemoteStatus::Blocked || self.blocked_until > tick
    }

    pub fn record_loadout(&mut self, role: Role, shape: LoadoutShape) {
        self.loadout_shapes.insert(role, shape);
    }

    pub fn loadout_shape(&self, role: Role) -> Option<&LoadoutShape> {
        self.loadout_shapes.get(&role)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLedger {
    pub version: u32,
    pub entries: BTreeMap<TerritoryId, RemoteLedgerEntry>,
}

impl Default for RemoteLedger {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl RemoteLedger {
    /// Returns the entry for `territory`, creating it under `home` on first mention.
    pub fn get_or_create(
        &mut self,
        territory: &TerritoryId,
        home: &HomeId,
        tick: u64,
    ) -> &mut RemoteLedgerEntry {
        self.entries
            .entry(territory.clone())
            .or_insert_with(|| RemoteLedgerEntry::new(territory.clone(), home.clone(), tick))
    }

    pub fn entry(&self, territory: &TerritoryId) -> Option<&RemoteLedgerEntry> {
        self.entries.get(territory)
    }

    pub fn entry_mut(&mut self, territory: &TerritoryId) -> Option<&mut RemoteLedgerEntry> {
        self.entries.get_mut(territory)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RemoteLedgerEntry> {
        self.entries.values()
    }

    pub fn entries_for_home<'a>(
        &'a self,
        home: &'a HomeId,
    ) -> impl Iterator<Item = &'a RemoteLedgerEntry> + 'a {
        self.entries.values().filter(move |entry| &entry.home == home)
    }

    pub fn node(&self, territory: &TerritoryId, node: &NodeId) -> Option<&NodeEntry> {
        self.entries.get(territory)?.nodes.get(node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RemoteLedgerEntry {
        RemoteLedgerEntry::new(TerritoryId::from("W2N1"), HomeId::from("W1N1"), 0)
    }

    #[test]
    fn blocked_until_never_lowers() {
        let mut entry = entry();
        entry.mark_status(RemoteStatus::Blocked, StatusReason::ForeignOwner, 400, 100);
        assert_eq!(entry.blocked_until, 500);

        entry.mark_status(RemoteStatus::Blocked, StatusReason::HostileUnits, 50, 120);
        assert_eq!(entry.blocked_until, 500, "shorter cooldown must not lower the block");
        assert_eq!(entry.status_reason, StatusReason::HostileUnits);

        entry.mark_status(RemoteStatus::Blocked, StatusReason::HostileUnits, 50, 480);
        assert_eq!(entry.blocked_until, 530);
    }

    #[test]
    fn never_healthy_while_cooldown_runs() {
        let mut entry = entry();
        entry.mark_status(RemoteStatus::Blocked, StatusReason::HostileUnits, 50, 10);

        let changed = entry.mark_status(RemoteStatus::Healthy, StatusReason::Clear, 0, 20);
        assert!(changed);
        assert_eq!(entry.status, RemoteStatus::Blocked);
        assert_eq!(entry.status_reason, StatusReason::CooldownActive);
        assert_eq!(entry.blocked_until, 60);

        entry.mark_status(RemoteStatus::Healthy, StatusReason::Clear, 0, 60);
        assert_eq!(entry.status, RemoteStatus::Healthy);
        assert!(!entry.is_blocked(60));
    }

    #[test]
    fn mark_status_is_idempotent_within_a_tick() {
        let mut entry = entry();
        assert!(entry.mark_status(RemoteStatus::Degraded, StatusReason::NoVision, 0, 5));
        assert!(!entry.mark_status(RemoteStatus::Degraded, StatusReason::NoVision, 0, 5));
        assert_eq!(entry.blocked_until, 0);
    }

    #[test]
    fn nodes_follow_home_reassignment() {
        let mut ledger = RemoteLedger::default();
        let territory = TerritoryId::from("W2N1");
        let entry = ledger.get_or_create(&territory, &HomeId::from("W1N1"), 3);
        entry.get_or_create_node(&NodeId::from("a"));
        entry.get_or_create_node(&NodeId::from("a"));
        assert_eq!(entry.nodes.len(), 1);

        entry.reassign_home(HomeId::from("W3N1"));
        let node = ledger.node(&territory, &NodeId::from("a")).unwrap();
        assert_eq!(node.home, HomeId::from("W3N1"));
        assert_eq!(ledger.entry(&territory).unwrap().created_tick, 3);
    }

    #[test]
    fn reservation_extrapolates_remaining_ticks() {
        let memo = ReservationMemo {
            owner: "me".into(),
            mine: true,
            ticks_to_end: 900,
            observed_tick: 1_000,
        };
        assert_eq!(memo.remaining_at(1_000), 900);
        assert_eq!(memo.remaining_at(1_300), 600);
        assert_eq!(memo.remaining_at(5_000), 0);
    }

    #[test]
    fn older_records_default_missing_fields() {
        let json = r#"{"id":"W2N1","home":"W1N1","status":"Blocked","blocked_until":77}"#;
        let entry: RemoteLedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.status, RemoteStatus::Blocked);
        assert_eq!(entry.blocked_until, 77);
        assert!(entry.nodes.is_empty());
        assert_eq!(entry.class, TerritoryClass::Standard);
    }
}
