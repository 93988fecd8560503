mod engine;
mod frontier;
mod planner;
mod returns;
mod solver;
mod types;

pub use engine::simulate_policy;
pub use frontier::{FrontierPoint, FrontierSweep, RiskTolerance, sweep_frontier};
pub use planner::{
    ContributionIteration, ContributionSolveConfig, ContributionSolveResult, Goal, GoalPlan,
    GoalPlanEntry, plan_goals, solve_required_contribution,
};
pub use returns::{ReturnStats, price_series_stats};
pub use solver::solve;
pub use types::{
    AllocationPoint, ExpectationMode, Inputs, Objective, PolicySimulation, SolveResult,
};
