use serde::{Deserialize, Serialize};

use crate::{HomeId, NodeId, Role, TerritoryId, SCHEMA_VERSION};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestReason {
    #[default]
    Missing,
    Handoff,
    Refresh,
}

impl RequestReason {
    pub fn label(self) -> &'static str {
        match self {
            RequestReason::Missing => "missing",
            RequestReason::Handoff => "handoff",
            RequestReason::Refresh => "refresh",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    #[default]
    Pending,
    Waiting,
    Ready,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionRequest {
    pub id: u64,
    pub role: Role,
    pub home: HomeId,
    pub territory: TerritoryId,
    pub node: Option<NodeId>,
    pub deficit: u32,
    pub priority: u8,
    pub reason: RequestReason,
    pub state: RequestState,
    pub blocked_until: u64,
    pub created_tick: u64,
    /// Tick the request first failed because no loadout fits the producer's
    /// maximum budget.
    pub capacity_wait_since: Option<u64>,
}

impl Default for ProductionRequest {
    fn default() -> Self {
        Self {
            id: 0,
            role: Role::Transporter,
            home: HomeId::default(),
            territory: TerritoryId::default(),
            node: None,
            deficit: 0,
            priority: Role::Transporter.priority(),
            reason: RequestReason::default(),
            state: RequestState::default(),
            blocked_until: 0,
            created_tick: 0,
            capacity_wait_since: None,
        }
    }
}

impl ProductionRequest {
    /// Total order: priority class, then creation tick, then id.
    pub fn sort_key(&self) -> (u8, u64, u64) {
        (self.priority, self.created_tick, self.id)
    }

    /// Still waiting out the block stamped on it by the broker.
    pub fn is_parked(&self, tick: u64) -> bool {
        self.blocked_until > tick
    }

    pub fn targets(&self, territory: &TerritoryId, role: Role) -> bool {
        &self.territory == territory && self.role == role
    }
}

/// Per-home production backlog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionQueue {
    pub version: u32,
    pub home: HomeId,
    pub next_seq: u64,
    pub requests: Vec<ProductionRequest>,
}

impl Default for ProductionQueue {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            home: HomeId::default(),
            next_seq: 1,
            requests: Vec::new(),
        }
    }
}

impl ProductionQueue {
    pub fn new(home: HomeId) -> Self {
        Self {
            home,
            ..Self::default()
        }
    }

    pub fn push(
        &mut self,
        role: Role,
        territory: TerritoryId,
        node: Option<NodeId>,
        deficit: u32,
        reason: RequestReason,
        tick: u64,
    ) -> u64 {
        let id = self.next_seq;
        self.next_seq += 1;
        self.requests.push(ProductionRequest {
            id,
            role,
            home: self.home.clone(),
            territory,
            node,
            deficit,
            priority: role.priority(),
            reason,
            state: RequestState::Pending,
            blocked_until: 0,
            created_tick: tick,
            capacity_wait_since: None,
        });
        id
    }

    /// Orders the backlog for `tick`: requests still parked behind a
    /// territory block go after every workable one, each group by
    /// [`ProductionRequest::sort_key`].
    pub fn sort_at(&mut self, tick: u64) {
        self.requests
            .sort_by_key(|request| (request.is_parked(tick), request.sort_key()));
    }

    pub fn get(&self, id: u64) -> Option<&ProductionRequest> {
        self.requests.iter().find(|request| request.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut ProductionRequest> {
        self.requests.iter_mut().find(|request| request.id == id)
    }

    pub fn remove(&mut self, id: u64) -> Option<ProductionRequest> {
        let index = self.requests.iter().position(|request| request.id == id)?;
        Some(self.requests.remove(index))
    }

    /// Moves the request at `index` behind every other request.
    pub fn rotate_to_tail(&mut self, index: usize) {
        if index < self.requests.len() {
            let request = self.requests.remove(index);
            self.requests.push(request);
        }
    }

    pub fn count_for(&self, territory: &TerritoryId, role: Role) -> usize {
        self.requests
            .iter()
            .filter(|request| request.targets(territory, role))
            .count()
    }

    pub fn count_for_node(&self, territory: &TerritoryId, node: &NodeId) -> usize {
        self.requests
            .iter()
            .filter(|request| {
                request.targets(territory, Role::Extractor) && request.node.as_ref() == Some(node)
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
