//! Estimation math shared by the planner and the assigner.

use remote_schema::{NodeEntry, Position, RouteEstimate, RouteSource};
use serde::Serialize;

use crate::config::{HandoffConfig, HaulerConfig, NodeConfig, RemoteConfig, RouteConfig};
use crate::scalar::Scalar;
use crate::services::RouteEstimator;

/// Linear distance scaled by the configured detour factor.
pub fn heuristic_route(anchor: &Position, target: &Position, config: &RouteConfig) -> u32 {
    let linear = u64::from(anchor.range_to(target));
    let scaled = (linear * u64::from(config.heuristic_factor_percent)).div_ceil(100);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// Returns the route length from `anchor` to the node and caches it on the node.
///
/// A fresh cached length is reused. With vision, a path-based length from
/// `estimator` replaces cached heuristics; otherwise the heuristic is used.
pub fn refresh_route(
    node: &mut NodeEntry,
    anchor: &Position,
    visible: bool,
    estimator: Option<&dyn RouteEstimator>,
    tick: u64,
    config: &RouteConfig,
) -> u32 {
    if let Some(cached) = node.route.as_ref() {
        let reusable = cached.is_fresh(tick, config.cache_ttl_ticks)
            && (!visible || estimator.is_none() || cached.source == RouteSource::Path);
        if reusable {
            return cached.length;
        }
    }

    let from_path = if visible {
        estimator.and_then(|routes| routes.route_length(anchor, &node.position))
    } else {
        None
    };
    let estimate = match from_path {
        Some(length) => RouteEstimate {
            length,
            computed_tick: tick,
            source: RouteSource::Path,
        },
        None => RouteEstimate {
            length: heuristic_route(anchor, &node.position, config),
            computed_tick: tick,
            source: RouteSource::Heuristic,
        },
    };
    let length = estimate.length;
    node.route = Some(estimate);
    length
}

/// Capacity assumed for a node that has never been observed.
pub fn estimated_capacity(fortified: bool, reserved: bool, config: &NodeConfig) -> u32 {
    if fortified {
        config.fortified_capacity
    } else if reserved {
        config.reserved_capacity
    } else {
        config.base_capacity
    }
}

/// Per-tick yield of a node; observed values are cached on the node.
pub fn node_throughput(
    node: &mut NodeEntry,
    visible: bool,
    reserved: bool,
    config: &NodeConfig,
) -> Scalar {
    if visible && node.capacity > 0 {
        let period = if node.regen_period == 0 {
            config.regen_period
        } else {
            node.regen_period
        };
        let rate = Scalar::from_ratio(node.capacity, period);
        node.throughput_raw = rate.raw();
        return rate;
    }
    if node.throughput_raw > 0 {
        return Scalar::from_raw(node.throughput_raw);
    }
    Scalar::from_ratio(
        estimated_capacity(node.fortified, reserved, config),
        config.regen_period,
    )
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HaulerRequirement {
    pub count: u32,
    pub round_trip_ticks: u32,
    pub energy_per_trip: u32,
    pub carry_capacity: u32,
}

impl HaulerRequirement {
    /// Carry parts each hauler needs so `count` haulers move one trip's worth.
    pub fn carry_parts_per_hauler(&self, config: &RemoteConfig) -> u32 {
        let per_hauler = self.energy_per_trip.div_ceil(self.count.max(1));
        per_hauler
            .div_ceil(config.haulers.carry_per_part.max(1))
            .max(1)
    }
}

/// Sizes the transporter fleet for one territory.
///
/// `round_trip = min(max, ceil(route * 2 / speed) + buffer)`,
/// `energy_per_trip = ceil(throughput * round_trip)` and
/// `count = max(1 if throughput > 0, ceil(energy_per_trip / carry_capacity))`.
pub fn hauler_requirement(
    route_length: u32,
    throughput: Scalar,
    speed: Scalar,
    carry_capacity: u32,
    config: &HaulerConfig,
) -> HaulerRequirement {
    let speed = if speed.is_positive() {
        speed
    } else {
        Scalar::one()
    };
    let travel = Scalar::from_u32(route_length.saturating_mul(2)).ceil_div(speed);
    let round_trip = travel
        .saturating_add(config.round_trip_buffer_ticks)
        .min(config.max_round_trip_ticks);
    let energy_per_trip = throughput.mul_u32(round_trip).ceil_u32();
    let floor = u32::from(throughput.is_positive());
    let by_carry = if carry_capacity == 0 {
        0
    } else {
        energy_per_trip.div_ceil(carry_capacity)
    };
    HaulerRequirement {
        count: floor.max(by_carry),
        round_trip_ticks: round_trip,
        energy_per_trip,
        carry_capacity,
    }
}

/// Remaining-lifetime cutoff below which a seat holder needs a successor.
pub fn handoff_threshold(route_length: u32, loadout_parts: u32, config: &HandoffConfig) -> u32 {
    route_length
        .saturating_add(loadout_parts.saturating_mul(config.production_ticks_per_part))
        .saturating_add(config.buffer_ticks)
}

/// Mean of the node route lengths, rounded up.
pub fn aggregate_route(lengths: &[u32]) -> u32 {
    if lengths.is_empty() {
        return 0;
    }
    let total: u64 = lengths.iter().copied().map(u64::from).sum();
    let mean = total.div_ceil(lengths.len() as u64);
    u32::try_from(mean).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_schema::NodeId;

    struct FixedRoutes(u32);

    impl RouteEstimator for FixedRoutes {
        fn route_length(&self, _from: &Position, _to: &Position) -> Option<u32> {
            Some(self.0)
        }
    }

    fn node_at(x: i32, y: i32) -> NodeEntry {
        NodeEntry {
            id: NodeId::from("a"),
            position: Position::new("W2N1", x, y),
            ..NodeEntry::default()
        }
    }

    #[test]
    fn hauler_sizing_worked_example() {
        let config = HaulerConfig::default();
        let requirement =
            hauler_requirement(50, Scalar::from_u32(10), Scalar::one(), 500, &config);
        assert_eq!(requirement.round_trip_ticks, 106);
        assert_eq!(requirement.energy_per_trip, 1060);
        assert_eq!(requirement.count, 3);
    }

    #[test]
    fn hauler_sizing_edges() {
        let config = HaulerConfig::default();
        let idle = hauler_requirement(50, Scalar::zero(), Scalar::one(), 500, &config);
        assert_eq!(idle.count, 0);

        let trickle = hauler_requirement(5, Scalar::from_ratio(1, 300), Scalar::one(), 500, &config);
        assert_eq!(trickle.count, 1, "positive throughput always gets a hauler");

        let far = hauler_requirement(1_000, Scalar::from_u32(10), Scalar::one(), 500, &config);
        assert_eq!(far.round_trip_ticks, config.max_round_trip_ticks);

        let fast = hauler_requirement(50, Scalar::from_u32(10), Scalar::from_u32(2), 500, &config);
        assert_eq!(fast.round_trip_ticks, 56);
    }

    #[test]
    fn carry_parts_split_evenly() {
        let config = RemoteConfig::default();
        let requirement =
            hauler_requirement(50, Scalar::from_u32(10), Scalar::one(), 500, &config.haulers);
        // 1060 across 3 haulers is 354 each, i.e. 8 carry parts.
        assert_eq!(requirement.carry_parts_per_hauler(&config), 8);
    }

    #[test]
    fn handoff_worked_example() {
        let config = HandoffConfig {
            buffer_ticks: 9,
            production_ticks_per_part: 1,
        };
        let threshold = handoff_threshold(30, 6, &config);
        assert_eq!(threshold, 45);
        assert!(40 <= threshold);
    }

    #[test]
    fn heuristic_applies_factor() {
        let config = RouteConfig::default();
        let anchor = Position::new("W1N1", 0, 0);
        assert_eq!(heuristic_route(&anchor, &Position::new("W2N1", 40, 10), &config), 60);
    }

    #[test]
    fn cached_route_expires_after_ttl() {
        let config = RouteConfig::default();
        let anchor = Position::new("W1N1", 0, 0);
        let mut node = node_at(20, 0);
        node.route = Some(RouteEstimate {
            length: 77,
            computed_tick: 100,
            source: RouteSource::Path,
        });

        assert_eq!(refresh_route(&mut node, &anchor, false, None, 600, &config), 77);
        assert_eq!(refresh_route(&mut node, &anchor, false, None, 601, &config), 30);
        let cached = node.route.as_ref().unwrap();
        assert_eq!(cached.source, RouteSource::Heuristic);
        assert_eq!(cached.computed_tick, 601);
    }

    #[test]
    fn visible_node_prefers_path_length() {
        let config = RouteConfig::default();
        let anchor = Position::new("W1N1", 0, 0);
        let mut node = node_at(20, 0);
        assert_eq!(refresh_route(&mut node, &anchor, false, None, 1, &config), 30);

        let routes = FixedRoutes(42);
        assert_eq!(refresh_route(&mut node, &anchor, true, Some(&routes), 2, &config), 42);
        assert_eq!(node.route.as_ref().unwrap().source, RouteSource::Path);
        // Without vision the path estimate stays in use.
        assert_eq!(refresh_route(&mut node, &anchor, false, None, 3, &config), 42);
    }

    #[test]
    fn throughput_falls_back_to_estimates() {
        let config = NodeConfig::default();
        let mut node = node_at(1, 1);
        assert_eq!(
            node_throughput(&mut node, false, false, &config),
            Scalar::from_u32(5)
        );
        assert_eq!(
            node_throughput(&mut node, false, true, &config),
            Scalar::from_u32(10)
        );
        node.fortified = true;
        assert_eq!(
            node_throughput(&mut node, false, true, &config),
            Scalar::from_ratio(4000, 300)
        );

        node.capacity = 3000;
        node.regen_period = 300;
        assert_eq!(
            node_throughput(&mut node, true, false, &config),
            Scalar::from_u32(10)
        );
        node.capacity = 0;
        assert_eq!(
            node_throughput(&mut node, false, false, &config),
            Scalar::from_u32(10),
            "observed rate is cached"
        );
    }

    #[test]
    fn aggregate_route_rounds_up() {
        assert_eq!(aggregate_route(&[]), 0);
        assert_eq!(aggregate_route(&[30, 45]), 38);
    }
}
