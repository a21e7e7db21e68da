//! Remote-operations scheduler.
//!
//! Each tick the host hands over a [`WorldSnapshot`]; the scheduler loads its
//! persistent state from a [`KeyValueStore`], plans per-territory demand,
//! keeps the per-home production queues in step with that demand, drives the
//! units already working remote territories and writes everything back.
//!
//! ```text
//! let mut session = ops.begin_tick(&world)?;
//! session.plan_tick();                       // planner, then assigner
//! let decision = session.plan_next_production(&producer);
//! session.run_units();
//! let report = session.report();
//! session.finish()?;                         // persist
//! ```

pub mod assigner;
pub mod behavior;
pub mod config;
mod context;
pub mod error;
pub mod estimate;
pub mod loadout;
pub mod planner;
pub mod report;
mod scalar;
pub mod services;
pub mod spawn;
pub mod store;
pub mod world;

use std::collections::BTreeMap;
use std::sync::Arc;

use remote_schema::{HomeId, PlanningInputs, ProducerId, UnitId};

pub use behavior::{Activity, UnitOutcome};
pub use config::{load_remote_config_from_env, RemoteConfig, RemoteConfigError};
pub use context::TickContext;
pub use error::{RemoteError, Result, StoreError};
pub use planner::{DemandSummary, RoleQuotas};
pub use report::{DemandTotal, RemoteReport};
pub use scalar::Scalar;
pub use services::Services;
pub use spawn::{CommitOutcome, HoldReason, ProductionDecision, ProductionPlan};
pub use store::{FileStore, KeyValueStore, MemoryStore, RemoteState};
pub use world::WorldSnapshot;

use services::ProductionFacility;

/// Entry point owned by the host for the lifetime of the process.
pub struct RemoteOps<S: KeyValueStore> {
    config: Arc<RemoteConfig>,
    store: S,
    services: Services,
}

impl<S: KeyValueStore> RemoteOps<S> {
    pub fn new(config: Arc<RemoteConfig>, store: S, services: Services) -> Self {
        Self {
            config,
            store,
            services,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Replaces the operator's planning inputs.
    pub fn set_inputs(&mut self, inputs: &PlanningInputs) -> Result<()> {
        store::save_inputs(&mut self.store, inputs)?;
        Ok(())
    }

    /// Loads persisted state and opens a session for `world.tick`.
    pub fn begin_tick<'a>(&'a mut self, world: &'a WorldSnapshot) -> Result<TickSession<'a, S>> {
        let state = RemoteState::load(&self.store)?;
        tracing::debug!(
            target: "remote_ops::store",
            tick = world.tick,
            territories = state.ledger.len(),
            units = state.assignments.len(),
            "state.loaded"
        );
        Ok(TickSession {
            ctx: TickContext::new(world, self.config.clone()),
            state,
            store: &mut self.store,
            services: &mut self.services,
        })
    }

    /// Plans and assigns one tick, persists, and returns the report.
    pub fn plan_tick(&mut self, world: &WorldSnapshot) -> Result<RemoteReport> {
        let mut session = self.begin_tick(world)?;
        session.plan_tick();
        let report = session.report();
        session.finish()?;
        Ok(report)
    }
}

/// One tick of work against loaded state. Nothing reaches the store until
/// [`TickSession::finish`].
pub struct TickSession<'a, S: KeyValueStore> {
    ctx: TickContext<'a>,
    state: RemoteState,
    store: &'a mut S,
    services: &'a mut Services,
}

impl<'a, S: KeyValueStore> TickSession<'a, S> {
    pub fn tick(&self) -> u64 {
        self.ctx.tick
    }

    pub fn state(&self) -> &RemoteState {
        &self.state
    }

    pub fn demands(&self) -> &BTreeMap<remote_schema::TerritoryId, DemandSummary> {
        &self.ctx.demands
    }

    /// Refreshes demand and reconciles the production queues against it.
    pub fn plan_tick(&mut self) {
        planner::plan(&mut self.ctx, &mut self.state, self.services);
        assigner::assign(&self.ctx, &mut self.state, self.services.costs.as_ref());
    }

    pub fn plan_next_production(&mut self, producer: &ProducerId) -> ProductionDecision {
        spawn::plan_next(
            &mut self.ctx,
            &mut self.state,
            self.services.costs.as_ref(),
            producer,
        )
    }

    pub fn commit_production(
        &mut self,
        producer: &ProducerId,
        plan: &ProductionPlan,
    ) -> CommitOutcome {
        let facility = self
            .services
            .facility
            .as_deref_mut()
            .map(|facility| facility as &mut dyn ProductionFacility);
        spawn::commit(&self.ctx, &mut self.state, facility, producer, plan)
    }

    pub fn run_unit(&mut self, unit: &UnitId) -> UnitOutcome {
        behavior::run_unit(
            &mut self.ctx,
            &self.state.ledger,
            &mut self.state.assignments,
            self.services,
            unit,
        )
    }

    /// Runs every assigned unit in id order.
    pub fn run_units(&mut self) -> BTreeMap<UnitId, UnitOutcome> {
        let units: Vec<UnitId> = self.state.assignments.units.keys().cloned().collect();
        units
            .into_iter()
            .map(|unit| {
                let outcome = self.run_unit(&unit);
                (unit, outcome)
            })
            .collect()
    }

    pub fn demand_total(&self, home: &HomeId) -> DemandTotal {
        report::demand_total(&self.ctx, &self.state, home)
    }

    pub fn report(&mut self) -> RemoteReport {
        report::report(&self.ctx, &mut self.state)
    }

    /// Persists the session's state.
    pub fn finish(self) -> Result<RemoteState> {
        self.state.save(self.store)?;
        tracing::debug!(
            target: "remote_ops::store",
            tick = self.ctx.tick,
            fingerprint = self.state.fingerprint(),
            "state.saved"
        );
        Ok(self.state)
    }
}
