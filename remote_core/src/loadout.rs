//! Unit loadouts and the per-role composition rules used to size them.

use remote_schema::{LoadoutShape, Role};
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::planner::DemandSummary;
use crate::services::CostModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Part {
    Move,
    Work,
    Carry,
    Claim,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Loadout {
    parts: Vec<Part>,
}

impl Loadout {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn count(&self, part: Part) -> u32 {
        self.parts.iter().filter(|candidate| **candidate == part).count() as u32
    }

    pub fn shape(&self, cost: u32, tick: u64) -> LoadoutShape {
        LoadoutShape {
            parts: self.len() as u32,
            work: self.count(Part::Work),
            carry: self.count(Part::Carry),
            claim: self.count(Part::Claim),
            moves: self.count(Part::Move),
            cost,
            recorded_tick: tick,
        }
    }
}

/// Fixed prefix followed by up to `max_units` copies of a repeating unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadoutTemplate {
    pub base: Vec<Part>,
    pub unit: Vec<Part>,
    pub max_units: u32,
}

impl LoadoutTemplate {
    /// Template for `role`, bounded by what the territory's demand can use.
    pub fn for_role(role: Role, demand: Option<&DemandSummary>, config: &RemoteConfig) -> Self {
        match role {
            Role::Extractor => {
                let per_work = config.extractor.harvest_per_work.max(1);
                let work = demand
                    .map(|summary| summary.peak_node_throughput().ceil_u32().div_ceil(per_work))
                    .unwrap_or(5)
                    .max(1);
                Self {
                    base: vec![Part::Carry, Part::Move],
                    unit: vec![Part::Work, Part::Work, Part::Move],
                    max_units: work.div_ceil(2),
                }
            }
            Role::Transporter => {
                let carry = demand
                    .map(|summary| summary.hauler.carry_parts_per_hauler(config))
                    .unwrap_or(8);
                Self {
                    base: Vec::new(),
                    unit: vec![Part::Carry, Part::Carry, Part::Move],
                    max_units: carry.div_ceil(2),
                }
            }
            Role::ClaimHolder => Self {
                base: Vec::new(),
                unit: vec![Part::Claim, Part::Move],
                max_units: 2,
            },
        }
    }

    fn cost_of_parts(parts: &[Part], costs: &dyn CostModel) -> u32 {
        costs.cost_of(&Loadout::new(parts.to_vec()))
    }

    /// Cheapest composition the template can produce.
    pub fn min_cost(&self, costs: &dyn CostModel) -> u32 {
        let mut parts = self.base.clone();
        parts.extend_from_slice(&self.unit);
        Self::cost_of_parts(&parts, costs)
    }

    /// Largest composition affordable with `budget`; empty when nothing fits.
    pub fn size(&self, budget: u32, max_parts: usize, costs: &dyn CostModel) -> Loadout {
        let base_cost = Self::cost_of_parts(&self.base, costs);
        let unit_cost = Self::cost_of_parts(&self.unit, costs);
        if unit_cost == 0 || self.unit.is_empty() || base_cost >= budget {
            return Loadout::default();
        }

        let by_budget = (budget - base_cost) / unit_cost;
        let by_parts = max_parts.saturating_sub(self.base.len()) / self.unit.len();
        let units = by_budget.min(self.max_units).min(by_parts as u32);
        if units == 0 {
            return Loadout::default();
        }

        let mut parts = self.base.clone();
        for _ in 0..units {
            parts.extend_from_slice(&self.unit);
        }
        // Movement last so damage strips working parts first.
        parts.sort_by_key(|part| matches!(part, Part::Move));
        Loadout::new(parts)
    }

    /// Number of repeating units contained in `loadout`.
    pub fn units_in(&self, loadout: &Loadout) -> u32 {
        let Some(first) = self.unit.first() else {
            return 0;
        };
        let per_unit = self.unit.iter().filter(|part| *part == first).count() as u32;
        let in_base = self.base.iter().filter(|part| *part == first).count() as u32;
        loadout.count(*first).saturating_sub(in_base) / per_unit.max(1)
    }
}
