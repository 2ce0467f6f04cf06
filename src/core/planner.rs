//! Planning phase.
//!
//! A planner turns a job's inputs into a plan. Plans are static per job
//! type: nothing branches here, branching only happens later through
//! recovery rewinding the cursor.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use crate::domain::{ExecutionState, Phase, Plan};

use super::error::JobError;

/// Builds the plan for a job
pub trait Planner: Send + Sync {
    fn build_plan(&self, state: &ExecutionState) -> Result<Plan>;
}

/// Always returns the standard document plan
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPlanner;

impl Planner for StaticPlanner {
    fn build_plan(&self, _state: &ExecutionState) -> Result<Plan> {
        Ok(Plan::document())
    }
}

/// Returns a caller-supplied plan (e.g. loaded from YAML)
#[derive(Debug, Clone)]
pub struct FixedPlanner {
    plan: Plan,
}

impl FixedPlanner {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

impl Planner for FixedPlanner {
    fn build_plan(&self, _state: &ExecutionState) -> Result<Plan> {
        Ok(self.plan.clone())
    }
}

/// Run the planning phase: build, validate and install the plan.
///
/// Resets the cursor and completed steps. Any error is fatal to the job.
pub fn plan_job(planner: &dyn Planner, state: &mut ExecutionState) -> Result<(), JobError> {
    if state.is_terminal() {
        return Err(JobError::StateTerminal(state.job_id));
    }

    info!(job_id = %state.job_id, "planner started");

    let plan = planner
        .build_plan(state)
        .and_then(|plan| plan.validate().map(|_| plan))
        .map_err(|e| {
            error!(job_id = %state.job_id, error = %e, "planner failed");
            JobError::Planning(format!("{:#}", e))
        })?;

    let steps = plan.len();
    let plan_name = plan.name.clone();
    state.set_plan(plan);
    state.log(
        Phase::Planner,
        json!({"plan_created": true, "plan": plan_name, "steps": steps}),
    );

    info!(job_id = %state.job_id, plan_steps = steps, "planner completed");
    Ok(())
}
