use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use remote_schema::TerritoryId;

use crate::config::RemoteConfig;
use crate::planner::DemandSummary;
use crate::world::WorldSnapshot;

/// State that is valid for exactly one tick.
///
/// Built fresh by [`crate::RemoteOps::begin_tick`] and passed explicitly to every
/// phase; nothing in here outlives the tick.
pub struct TickContext<'w> {
    pub tick: u64,
    pub world: &'w WorldSnapshot,
    pub config: Arc<RemoteConfig>,
    /// Demand computed by the planner this tick, keyed by territory.
    pub demands: BTreeMap<TerritoryId, DemandSummary>,
    logged: HashSet<String>,
}

impl<'w> TickContext<'w> {
    pub fn new(world: &'w WorldSnapshot, config: Arc<RemoteConfig>) -> Self {
        Self {
            tick: world.tick,
            world,
            config,
            demands: BTreeMap::new(),
            logged: HashSet::new(),
        }
    }

    /// True the first time `key` is seen this tick.
    pub fn first_log(&mut self, key: String) -> bool {
        self.logged.insert(key)
    }

    pub fn demand(&self, territory: &TerritoryId) -> Option<&DemandSummary> {
        self.demands.get(territory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_gate_fires_once_per_key() {
        let world = WorldSnapshot {
            tick: 12,
            ..WorldSnapshot::default()
        };
        let mut ctx = TickContext::new(&world, RemoteConfig::builtin());
        assert_eq!(ctx.tick, 12);
        assert!(ctx.first_log("u1/missing_node".into()));
        assert!(!ctx.first_log("u1/missing_node".into()));
        assert!(ctx.first_log("u2/missing_node".into()));
    }
}
