//! Persisted data contracts for the remote-operations scheduler.
//!
//! Everything in this crate is plain serde data that survives process
//! restarts: the per-territory ledger, the per-home production queues and the
//! per-unit assignment records. Records carry `#[serde(default)]` so an older
//! blob decodes into the current shape once, at load time.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

mod assignment;
mod ledger;
mod queue;

pub use assignment::{
    AssignmentBook, AssignmentFlags, PlanningInputs, UnitTag, WorkerAssignment,
};
pub use ledger::{
    ControllerMemo, LoadoutShape, NodeEntry, RemoteLedger, RemoteLedgerEntry, RemoteStatus,
    ReservationMemo, RouteEstimate, RouteSource, Seat, StatusReason, TerritoryClass,
};
pub use queue::{ProductionQueue, ProductionRequest, RequestReason, RequestState};

/// Version stamped on every record written by this build.
pub const SCHEMA_VERSION: u32 = 1;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Home base that produces units and receives hauled resources.
    HomeId
);
string_id!(
    /// Remote territory outside any home base.
    TerritoryId
);
string_id!(
    /// Extractable resource node.
    NodeId
);
string_id!(
    /// Live worker unit.
    UnitId
);
string_id!(
    /// Any other world object (structures, controllers, construction sites).
    ObjectId
);
string_id!(
    /// Production facility inside a home base.
    ProducerId
);

/// Global tile coordinate tagged with the territory that contains it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub territory: TerritoryId,
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(territory: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            territory: TerritoryId(territory.into()),
            x,
            y,
        }
    }

    /// Chebyshev distance; the world allows diagonal steps.
    pub fn range_to(&self, other: &Position) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    pub fn in_range(&self, other: &Position, range: u32) -> bool {
        self.range_to(other) <= range
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{},{}", self.territory, self.x, self.y)
    }
}

/// Closed set of roles driven by the remote scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Extractor,
    Transporter,
    ClaimHolder,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Extractor, Role::ClaimHolder, Role::Transporter];

    /// Production priority class; lower is served first.
    pub fn priority(self) -> u8 {
        match self {
            Role::Extractor => 1,
            Role::ClaimHolder => 2,
            Role::Transporter => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Extractor => "extractor",
            Role::Transporter => "transporter",
            Role::ClaimHolder => "claim_holder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable 64-bit digest of any serializable state.
///
/// Uses a fixed-seed hasher over the bincode encoding so the value is
/// identical across processes; ordered maps keep it independent of insertion
/// order.
pub fn fingerprint<T: Serialize>(value: &T) -> u64 {
    let encoded = bincode::serialize(value).unwrap_or_default();
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn role_priority_is_total() {
        let mut roles = Role::ALL.to_vec();
        roles.sort_by_key(|role| role.priority());
        assert_eq!(
            roles,
            vec![Role::Extractor, Role::ClaimHolder, Role::Transporter]
        );
    }

    #[test]
    fn chebyshev_range() {
        let a = Position::new("W1N1", 10, 10);
        let b = Position::new("W1N1", 13, 8);
        assert_eq!(a.range_to(&b), 3);
        assert!(a.in_range(&b, 3));
        assert!(!a.in_range(&b, 2));
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let mut left = BTreeMap::new();
        left.insert(TerritoryId::from("W2N1"), 3u32);
        left.insert(TerritoryId::from("W1N1"), 7u32);

        let mut right = BTreeMap::new();
        right.insert(TerritoryId::from("W1N1"), 7u32);
        right.insert(TerritoryId::from("W2N1"), 3u32);

        assert_eq!(fingerprint(&left), fingerprint(&right));
        right.insert(TerritoryId::from("W3N1"), 1u32);
        assert_ne!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&NodeId::from("src-a")).unwrap();
        assert_eq!(json, "\"src-a\"");
    }
}
