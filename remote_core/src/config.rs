//! Tuning knobs for the remote scheduler.
//!
//! Loaded from `remote_config.json` with support for an environment variable
//! override.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::scalar::Scalar;

pub const BUILTIN_REMOTE_CONFIG: &str = include_str!("data/remote_config.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Owner name used to tell our reservations from foreign ones.
    pub owner: String,
    pub seats: SeatConfig,
    pub cooldowns: CooldownConfig,
    pub routes: RouteConfig,
    pub haulers: HaulerConfig,
    pub nodes: NodeConfig,
    pub reservation: ReservationConfig,
    pub handoff: HandoffConfig,
    pub production: ProductionConfig,
    pub extractor: ExtractorConfig,
    pub planning: PlanningConfig,
    pub report: ReportConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            owner: "colony".to_string(),
            seats: SeatConfig::default(),
            cooldowns: CooldownConfig::default(),
            routes: RouteConfig::default(),
            haulers: HaulerConfig::default(),
            nodes: NodeConfig::default(),
            reservation: ReservationConfig::default(),
            handoff: HandoffConfig::default(),
            production: ProductionConfig::default(),
            extractor: ExtractorConfig::default(),
            planning: PlanningConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl RemoteConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_REMOTE_CONFIG)
                .expect("builtin remote config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, RemoteConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| RemoteConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = RemoteConfig::from_json_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeatConfig {
    /// Extractors allowed to hold a node at once.
    pub capacity: usize,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self { capacity: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub hostile_units: u32,
    pub hostile_structure: u32,
    pub foreign_owner: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            hostile_units: 50,
            hostile_structure: 150,
            foreign_owner: 400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub cache_ttl_ticks: u64,
    /// Linear distance multiplier used when no path length is known.
    pub heuristic_factor_percent: u32,
    /// Tiles moved per tick by a loaded transporter.
    pub speed: f32,
}

impl RouteConfig {
    pub fn speed(&self) -> Scalar {
        Scalar::from_f32(self.speed)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ticks: 500,
            heuristic_factor_percent: 150,
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HaulerConfig {
    pub round_trip_buffer_ticks: u32,
    pub max_round_trip_ticks: u32,
    pub degraded_ratio_percent: u32,
    pub carry_per_part: u32,
}

impl Default for HaulerConfig {
    fn default() -> Self {
        Self {
            round_trip_buffer_ticks: 6,
            max_round_trip_ticks: 400,
            degraded_ratio_percent: 50,
            carry_per_part: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub regen_period: u32,
    /// Capacity assumed for an unobserved node without our reservation.
    pub base_capacity: u32,
    pub reserved_capacity: u32,
    pub fortified_capacity: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            regen_period: 300,
            base_capacity: 1500,
            reserved_capacity: 3000,
            fortified_capacity: 4000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    pub refresh_threshold_ticks: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_ticks: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub buffer_ticks: u32,
    pub production_ticks_per_part: u32,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            buffer_ticks: 10,
            production_ticks_per_part: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    pub max_rotations: usize,
    /// A working loadout weaker than this share of the ideal is not accepted.
    pub min_working_ratio_percent: u32,
    /// How long a request may wait on a loadout that exceeds the producer's
    /// maximum budget before it is dropped.
    pub capacity_wait_limit_ticks: u64,
    pub max_parts: usize,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            max_rotations: 3,
            min_working_ratio_percent: 50,
            capacity_wait_limit_ticks: 1500,
            max_parts: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub allow_drop_when_full: bool,
    pub harvest_per_work: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            allow_drop_when_full: true,
            harvest_per_work: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub history_retention_ticks: u64,
    pub auto_discover: bool,
    pub max_remotes_per_home: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            history_retention_ticks: 5000,
            auto_discover: true,
            max_remotes_per_home: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub interval_ticks: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { interval_ticks: 100 }
    }
}

#[derive(Debug, Error)]
pub enum RemoteConfigError {
    #[error("failed to parse remote config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read remote config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the active configuration came from.
#[derive(Debug, Clone)]
pub struct RemoteConfigMetadata {
    path: Option<PathBuf>,
}

impl RemoteConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load the remote configuration from `REMOTE_CONFIG_PATH` or the crate data
/// directory, falling back to the builtin copy.
pub fn load_remote_config_from_env() -> (Arc<RemoteConfig>, RemoteConfigMetadata) {
    let override_path = env::var("REMOTE_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/remote_config.json");

    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path],
    };

    for path in candidates {
        match RemoteConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "remote_ops::config",
                    path = %path.display(),
                    "remote_config.loaded=file"
                );
                return (Arc::new(config), RemoteConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "remote_ops::config",
                    path = %path.display(),
                    error = %err,
                    "remote_config.load_failed"
                );
            }
        }
    }

    let config = RemoteConfig::builtin();
    tracing::info!(
        target: "remote_ops::config",
        "remote_config.loaded=builtin"
    );
    (config, RemoteConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_matches_defaults() {
        let config = RemoteConfig::builtin();
        assert_eq!(config.seats.capacity, 1);
        assert_eq!(config.cooldowns.hostile_units, 50);
        assert_eq!(config.cooldowns.hostile_structure, 150);
        assert_eq!(config.cooldowns.foreign_owner, 400);
        assert_eq!(config.routes.cache_ttl_ticks, 500);
        assert_eq!(config.production.max_rotations, 3);
        assert_eq!(config.routes.speed(), Scalar::one());
    }

    #[test]
    fn partial_json_keeps_section_defaults() {
        let config =
            RemoteConfig::from_json_str(r#"{"haulers": {"round_trip_buffer_ticks": 9}}"#)
                .expect("partial config should parse");
        assert_eq!(config.haulers.round_trip_buffer_ticks, 9);
        assert_eq!(config.haulers.carry_per_part, 50);
        assert_eq!(config.nodes.regen_period, 300);
        assert_eq!(config.owner, "colony");
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = RemoteConfig::from_file(Path::new("/nonexistent/remote_config.json"))
            .expect_err("missing file should fail");
        assert!(matches!(err, RemoteConfigError::Read { .. }));
    }
}
