use serde::Serialize;

/// Objective optimized by the backward induction: the probability of
/// finishing at or above the goal amount, or expected log-wealth.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Objective {
    GoalProbability,
    LogUtility,
}

/// How the Bellman expectation over next-period wealth is evaluated.
///
/// `Analytic` integrates the lognormal transition against the wealth
/// grid in closed form. `MonteCarlo` averages `transition_samples`
/// seeded draws per grid cell; with one sample it reproduces the
/// single-draw approximation of the legacy planner.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExpectationMode {
    Analytic,
    MonteCarlo,
}

#[derive(Debug, Clone)]
pub struct Inputs {
    pub horizon_months: u32,
    pub goal_amount: f64,
    pub initial_wealth: f64,
    pub wealth_max: f64,
    pub wealth_levels: usize,
    pub equity_mean: f64,
    pub equity_vol: f64,
    pub debt_mean: f64,
    pub debt_vol: f64,
    pub correlation: f64,
    pub monthly_contribution: f64,
    pub allocation_min: f64,
    pub allocation_max: f64,
    pub allocation_steps: usize,
    pub objective: Objective,
    pub expectation: ExpectationMode,
    pub transition_samples: u32,
    pub seed: u64,
}

/// One reported policy cell: the equity/debt split chosen at a given
/// month for a given wealth level.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPoint {
    pub time: u32,
    pub wealth: f64,
    pub equity: f64,
    pub debt: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub wealth_levels: Vec<f64>,
    pub allocations: Vec<f64>,
    /// `(horizon_months + 1) x wealth_levels`; row `horizon_months` is
    /// the boundary row.
    pub value: Vec<Vec<f64>>,
    /// `horizon_months x wealth_levels`; equity fraction per cell.
    pub policy: Vec<Vec<f64>>,
    pub initial_wealth_index: usize,
    /// `value[0]` at the snapped initial wealth: the goal probability
    /// (or expected utility) achievable from the starting state.
    pub initial_value: f64,
}

impl SolveResult {
    /// Flattens the policy table into `(time, wealth, equity, debt)`
    /// rows, the shape consumed by spreadsheet writers and charts.
    pub fn allocation_report(&self) -> Vec<AllocationPoint> {
        let mut report = Vec::with_capacity(self.policy.len() * self.wealth_levels.len());
        for (t, row) in self.policy.iter().enumerate() {
            for (i, &equity) in row.iter().enumerate() {
                report.push(AllocationPoint {
                    time: t as u32,
                    wealth: self.wealth_levels[i],
                    equity,
                    debt: 1.0 - equity,
                });
            }
        }
        report
    }
}

/// Forward Monte Carlo of a solved policy from the initial wealth.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySimulation {
    pub scenarios: u32,
    pub success_rate: f64,
    pub terminal_p10: f64,
    pub terminal_median: f64,
    pub terminal_p90: f64,
    /// Median wealth by month, index 0 = starting wealth.
    pub median_wealth_path: Vec<f64>,
}
