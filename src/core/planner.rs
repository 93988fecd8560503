use serde::Serialize;

use super::solver::solve;
use super::types::{Inputs, Objective};

#[derive(Debug, Clone, Copy)]
pub struct ContributionSolveConfig {
    pub target_success: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_contribution: f64,
    pub goal_probability: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionSolveResult {
    pub target_success: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub solved_contribution: Option<f64>,
    pub achieved_probability: Option<f64>,
    pub iterations: Vec<ContributionIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// An explicit goal record; plans always carry an ordered sequence of
/// these rather than positional spreadsheet columns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub label: String,
    pub amount: f64,
    pub years: u32,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPlanEntry {
    pub label: String,
    pub amount: f64,
    pub years: u32,
    pub priority: u32,
    pub required_contribution: Option<f64>,
    pub achieved_probability: Option<f64>,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPlan {
    pub monthly_capacity: f64,
    pub allocated: f64,
    pub remaining_capacity: f64,
    pub entries: Vec<GoalPlanEntry>,
}

/// Smallest monthly contribution whose solved goal probability at the
/// initial state meets the target, found by bisection over the DP
/// solve. Infeasibility within the search bounds is an outcome, not
/// an error.
pub fn solve_required_contribution(
    inputs: &Inputs,
    config: ContributionSolveConfig,
) -> Result<ContributionSolveResult, String> {
    validate_config(inputs, config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_probability = evaluate_candidate(inputs, config.search_min)?;
    let high_probability = evaluate_candidate(inputs, config.search_max)?;

    let mut solved_contribution = None;
    let mut converged = false;
    let feasible;
    let message;

    if low_probability + 1e-12 >= config.target_success {
        solved_contribution = Some(config.search_min);
        converged = true;
        feasible = true;
        message = "Already meets target at lower contribution bound.".to_string();
    } else if high_probability + 1e-12 < config.target_success {
        feasible = false;
        message = "No feasible contribution found within the search bounds.".to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let goal_probability = evaluate_candidate(inputs, mid)?;
            iterations.push(ContributionIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_contribution: mid,
                goal_probability,
            });

            if goal_probability + 1e-12 >= config.target_success {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                solved_contribution = Some(hi);
                break;
            }
        }
        if solved_contribution.is_none() {
            solved_contribution = Some(hi);
        }
        feasible = true;
        message = if converged {
            "Solved required monthly contribution.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    let achieved_probability = match solved_contribution {
        Some(contribution) => Some(evaluate_candidate(inputs, contribution)?),
        None => None,
    };

    Ok(ContributionSolveResult {
        target_success: config.target_success,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        solved_contribution,
        achieved_probability,
        iterations,
        converged,
        feasible,
        message,
    })
}

/// Funds goals one at a time in priority order (larger amounts first
/// within a priority), each goal consuming its solved minimum from
/// the remaining monthly capacity.
pub fn plan_goals(
    base: &Inputs,
    config: ContributionSolveConfig,
    monthly_capacity: f64,
    goals: &[Goal],
) -> Result<GoalPlan, String> {
    if !monthly_capacity.is_finite() || monthly_capacity <= 0.0 {
        return Err("monthly_capacity must be > 0".to_string());
    }
    if goals.is_empty() || goals.len() > 10 {
        return Err("goals must contain between 1 and 10 entries".to_string());
    }
    for goal in goals {
        if !goal.amount.is_finite() || goal.amount <= 0.0 {
            return Err(format!("goal '{}': amount must be > 0", goal.label));
        }
        if goal.years < 1 {
            return Err(format!("goal '{}': years must be >= 1", goal.label));
        }
    }

    let mut ordered: Vec<&Goal> = goals.iter().collect();
    ordered.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.amount.total_cmp(&a.amount))
    });

    let mut remaining = monthly_capacity;
    let mut allocated = 0.0;
    let mut entries = Vec::with_capacity(ordered.len());

    for goal in ordered {
        if remaining <= config.search_min {
            entries.push(GoalPlanEntry {
                label: goal.label.clone(),
                amount: goal.amount,
                years: goal.years,
                priority: goal.priority,
                required_contribution: None,
                achieved_probability: None,
                feasible: false,
                message: "No monthly capacity remaining.".to_string(),
            });
            continue;
        }

        let inputs = inputs_for_goal(base, goal);
        let goal_config = ContributionSolveConfig {
            search_max: remaining,
            ..config
        };
        let result = solve_required_contribution(&inputs, goal_config)?;

        if let Some(contribution) = result.solved_contribution.filter(|_| result.feasible) {
            remaining -= contribution;
            allocated += contribution;
            entries.push(GoalPlanEntry {
                label: goal.label.clone(),
                amount: goal.amount,
                years: goal.years,
                priority: goal.priority,
                required_contribution: Some(contribution),
                achieved_probability: result.achieved_probability,
                feasible: true,
                message: result.message,
            });
        } else {
            entries.push(GoalPlanEntry {
                label: goal.label.clone(),
                amount: goal.amount,
                years: goal.years,
                priority: goal.priority,
                required_contribution: None,
                achieved_probability: result.achieved_probability,
                feasible: false,
                message: result.message,
            });
        }
    }

    Ok(GoalPlan {
        monthly_capacity,
        allocated,
        remaining_capacity: remaining,
        entries,
    })
}

/// Per-goal solver inputs: the horizon comes from the goal record and
/// the grid is rebuilt to twice the goal amount, the span the legacy
/// planner used for its wealth discretization.
fn inputs_for_goal(base: &Inputs, goal: &Goal) -> Inputs {
    let wealth_max = 2.0 * goal.amount;
    Inputs {
        horizon_months: goal.years * 12,
        goal_amount: goal.amount,
        wealth_max,
        initial_wealth: base.initial_wealth.min(wealth_max),
        ..base.clone()
    }
}

fn evaluate_candidate(base: &Inputs, contribution: f64) -> Result<f64, String> {
    let mut inputs = base.clone();
    inputs.monthly_contribution = contribution.max(0.0);
    Ok(solve(&inputs)?.initial_value)
}

fn validate_config(inputs: &Inputs, config: ContributionSolveConfig) -> Result<(), String> {
    if inputs.objective != Objective::GoalProbability {
        return Err("objective must be goal-probability for contribution solving".to_string());
    }
    if !(0.0..=1.0).contains(&config.target_success) {
        return Err("target_success must be between 0 and 1".to_string());
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_min < 0.0 {
        return Err("search_min must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    Ok(())
}
