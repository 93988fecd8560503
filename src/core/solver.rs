use std::f64::consts::PI;

use super::engine::{Rng, derive_seed};
use super::types::{ExpectationMode, Inputs, Objective, SolveResult};

/// Backward induction over the (month, wealth) grid.
///
/// Row `horizon_months` is fixed by the boundary rule; every earlier
/// row is the maximum over the candidate allocation set of the
/// expected next-row value, so row `t` depends only on row `t + 1`.
pub fn solve(inputs: &Inputs) -> Result<SolveResult, String> {
    validate_inputs(inputs)?;

    let levels = wealth_grid(inputs.wealth_max, inputs.wealth_levels);
    let allocations = allocation_candidates(
        inputs.allocation_min,
        inputs.allocation_max,
        inputs.allocation_steps,
    );
    let months = inputs.horizon_months as usize;
    let k = levels.len();

    let mut value = vec![vec![0.0; k]; months + 1];
    let mut policy = vec![vec![0.0; k]; months];

    for (i, &wealth) in levels.iter().enumerate() {
        value[months][i] = match inputs.objective {
            Objective::GoalProbability => {
                if wealth >= inputs.goal_amount {
                    1.0
                } else {
                    0.0
                }
            }
            Objective::LogUtility => (wealth + 1.0).ln(),
        };
    }

    for t in (0..months).rev() {
        let next = value[t + 1].clone();
        for i in 0..k {
            let cell_seed = derive_seed(inputs.seed, t as u32, i as u32);
            let mut best_value = f64::NEG_INFINITY;
            let mut best_allocation = allocations[0];
            for &allocation in &allocations {
                let expected =
                    expected_next_value(inputs, &levels, &next, levels[i], allocation, cell_seed);
                // Strict improvement only: ties keep the lowest equity
                // fraction in the ascending candidate set.
                if expected > best_value {
                    best_value = expected;
                    best_allocation = allocation;
                }
            }
            value[t][i] = best_value;
            policy[t][i] = best_allocation;
        }
    }

    let initial_wealth_index = snap_index(&levels, inputs.initial_wealth);
    let initial_value = value[0][initial_wealth_index];

    Ok(SolveResult {
        wealth_levels: levels,
        allocations,
        value,
        policy,
        initial_wealth_index,
        initial_value,
    })
}

fn expected_next_value(
    inputs: &Inputs,
    levels: &[f64],
    next: &[f64],
    wealth: f64,
    allocation: f64,
    cell_seed: u64,
) -> f64 {
    let (mean, vol) = portfolio_moments(inputs, allocation);
    let base = wealth + inputs.monthly_contribution;
    let drift = mean - 0.5 * vol * vol;

    if base <= 0.0 {
        // Depleted wealth with no contribution stays at the floor.
        return next[0];
    }

    if vol == 0.0 {
        return next[snap_index(levels, base * drift.exp())];
    }

    match inputs.expectation {
        ExpectationMode::Analytic => analytic_expectation(levels, next, base, drift, vol),
        ExpectationMode::MonteCarlo => {
            // Fresh generator per cell so every candidate allocation
            // sees the same draws (common random numbers) and results
            // are independent of loop order.
            let mut rng = Rng::new(cell_seed);
            let samples = inputs.transition_samples.max(1);
            let mut total = 0.0;
            for _ in 0..samples {
                let z = rng.standard_normal();
                let next_wealth = base * (drift + vol * z).exp();
                total += next[snap_index(levels, next_wealth)];
            }
            total / samples as f64
        }
    }
}

/// Exact Bellman expectation: integrates the lognormal next-wealth
/// density over each grid bucket. Bucket `j` spans
/// `[levels[j], levels[j + 1])`; the bottom bucket absorbs everything
/// below `levels[1]` and the top bucket everything at or above
/// `levels[k - 1]`, matching the snap-and-clamp rule.
fn analytic_expectation(levels: &[f64], next: &[f64], base: f64, drift: f64, vol: f64) -> f64 {
    let mut total = 0.0;
    let mut lower_cdf = 0.0;
    for j in 1..levels.len() {
        let z = ((levels[j] / base).ln() - drift) / vol;
        let cdf = norm_cdf(z);
        total += (cdf - lower_cdf) * next[j - 1];
        lower_cdf = cdf;
    }
    total + (1.0 - lower_cdf) * next[levels.len() - 1]
}

pub(super) fn portfolio_moments(inputs: &Inputs, allocation: f64) -> (f64, f64) {
    let a = allocation;
    let b = 1.0 - a;
    let covariance = inputs.correlation * inputs.equity_vol * inputs.debt_vol;
    let mean = a * inputs.equity_mean + b * inputs.debt_mean;
    let variance = a * a * inputs.equity_vol * inputs.equity_vol
        + b * b * inputs.debt_vol * inputs.debt_vol
        + 2.0 * a * b * covariance;
    (mean, variance.max(0.0).sqrt())
}

/// Largest grid index whose level is <= `wealth`, clamped to the grid.
pub(super) fn snap_index(levels: &[f64], wealth: f64) -> usize {
    levels
        .partition_point(|&level| level <= wealth)
        .saturating_sub(1)
}

pub(super) fn wealth_grid(wealth_max: f64, count: usize) -> Vec<f64> {
    let step = wealth_max / (count - 1) as f64;
    (0..count).map(|i| i as f64 * step).collect()
}

fn allocation_candidates(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps == 1 {
        return vec![min];
    }
    let span = max - min;
    (0..steps)
        .map(|i| min + span * i as f64 / (steps - 1) as f64)
        .collect()
}

/// Hart polynomial approximation of the standard normal CDF,
/// absolute error below 1e-7.
fn norm_cdf(x: f64) -> f64 {
    const P: f64 = 0.231_641_9;
    const A1: f64 = 0.319_381_530;
    const A2: f64 = -0.356_563_782;
    const A3: f64 = 1.781_477_937;
    const A4: f64 = -1.821_255_978;
    const A5: f64 = 1.330_274_429;

    let z = x.abs();
    let t = 1.0 / (1.0 + P * z);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    let pdf = (-0.5 * z * z).exp() / (2.0 * PI).sqrt();
    let upper = 1.0 - pdf * poly;
    if x >= 0.0 { upper } else { 1.0 - upper }
}

pub(super) fn validate_inputs(inputs: &Inputs) -> Result<(), String> {
    if inputs.horizon_months < 1 {
        return Err("horizon_months must be >= 1".to_string());
    }
    if inputs.wealth_levels < 2 {
        return Err("wealth_levels must be >= 2".to_string());
    }
    if !inputs.wealth_max.is_finite() || inputs.wealth_max <= 0.0 {
        return Err("wealth_max must be > 0".to_string());
    }
    if !inputs.goal_amount.is_finite() || inputs.goal_amount <= 0.0 {
        return Err("goal_amount must be > 0".to_string());
    }
    if inputs.wealth_max < inputs.goal_amount {
        return Err("wealth_max must be >= goal_amount".to_string());
    }
    if !inputs.initial_wealth.is_finite()
        || inputs.initial_wealth < 0.0
        || inputs.initial_wealth > inputs.wealth_max
    {
        return Err("initial_wealth must be between 0 and wealth_max".to_string());
    }
    if !inputs.monthly_contribution.is_finite() || inputs.monthly_contribution < 0.0 {
        return Err("monthly_contribution must be >= 0".to_string());
    }
    for (name, mean) in [
        ("equity_mean", inputs.equity_mean),
        ("debt_mean", inputs.debt_mean),
    ] {
        if !mean.is_finite() {
            return Err(format!("{name} must be finite"));
        }
    }
    for (name, vol) in [
        ("equity_vol", inputs.equity_vol),
        ("debt_vol", inputs.debt_vol),
    ] {
        if !vol.is_finite() || vol < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }
    if !(-1.0..=1.0).contains(&inputs.correlation) {
        return Err("correlation must be between -1 and 1".to_string());
    }
    if !inputs.allocation_min.is_finite() || !inputs.allocation_max.is_finite() {
        return Err("allocation bounds must be finite".to_string());
    }
    if inputs.allocation_min < 0.0 || inputs.allocation_max > 1.0 {
        return Err("allocation_min and allocation_max must be between 0 and 1".to_string());
    }
    if inputs.allocation_min > inputs.allocation_max {
        return Err("allocation_min must be <= allocation_max".to_string());
    }
    if inputs.allocation_steps < 1 {
        return Err("allocation_steps must be >= 1".to_string());
    }
    if inputs.expectation == ExpectationMode::MonteCarlo && inputs.transition_samples < 1 {
        return Err("transition_samples must be >= 1".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn base_inputs() -> Inputs {
        Inputs {
            horizon_months: 12,
            goal_amount: 200_000.0,
            initial_wealth: 100_000.0,
            wealth_max: 400_000.0,
            wealth_levels: 50,
            equity_mean: 0.01,
            equity_vol: 0.05,
            debt_mean: 0.005,
            debt_vol: 0.02,
            correlation: 0.3,
            monthly_contribution: 1_000.0,
            allocation_min: 0.0,
            allocation_max: 1.0,
            allocation_steps: 11,
            objective: Objective::GoalProbability,
            expectation: ExpectationMode::Analytic,
            transition_samples: 1,
            seed: 42,
        }
    }

    fn deterministic_two_period_inputs() -> Inputs {
        Inputs {
            horizon_months: 2,
            goal_amount: 100_000.0,
            initial_wealth: 0.0,
            wealth_max: 100_000.0,
            wealth_levels: 3,
            equity_mean: 0.0,
            equity_vol: 0.0,
            debt_mean: 0.0,
            debt_vol: 0.0,
            correlation: 0.0,
            monthly_contribution: 0.0,
            allocation_min: 1.0,
            allocation_max: 1.0,
            allocation_steps: 1,
            objective: Objective::GoalProbability,
            expectation: ExpectationMode::Analytic,
            transition_samples: 1,
            seed: 7,
        }
    }

    #[test]
    fn wealth_grid_spans_zero_to_max_inclusive() {
        let levels = wealth_grid(100_000.0, 3);
        assert_eq!(levels.len(), 3);
        assert_approx(levels[0], 0.0);
        assert_approx(levels[1], 50_000.0);
        assert_approx(levels[2], 100_000.0);
    }

    #[test]
    fn snap_index_clamps_to_grid() {
        let levels = wealth_grid(100_000.0, 3);
        assert_eq!(snap_index(&levels, -5_000.0), 0);
        assert_eq!(snap_index(&levels, 0.0), 0);
        assert_eq!(snap_index(&levels, 49_999.0), 0);
        assert_eq!(snap_index(&levels, 50_000.0), 1);
        assert_eq!(snap_index(&levels, 99_999.0), 1);
        assert_eq!(snap_index(&levels, 100_000.0), 2);
        assert_eq!(snap_index(&levels, 1_000_000.0), 2);
    }

    #[test]
    fn terminal_row_is_goal_indicator() {
        let inputs = deterministic_two_period_inputs();
        let solved = solve(&inputs).expect("must solve");
        assert_eq!(solved.value[2], vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn terminal_row_is_log_utility_in_utility_mode() {
        let mut inputs = deterministic_two_period_inputs();
        inputs.objective = Objective::LogUtility;
        let solved = solve(&inputs).expect("must solve");
        assert_approx(solved.value[2][0], 1.0_f64.ln());
        assert_approx(solved.value[2][1], 50_001.0_f64.ln());
        assert_approx(solved.value[2][2], 100_001.0_f64.ln());
    }

    #[test]
    fn two_period_deterministic_scenario_without_contribution() {
        let inputs = deterministic_two_period_inputs();
        let solved = solve(&inputs).expect("must solve");
        // Zero drift, zero volatility: each wealth level maps to
        // itself, so only the top level ever reaches the goal.
        assert_eq!(solved.value[1], vec![0.0, 0.0, 1.0]);
        assert_eq!(solved.value[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(solved.initial_wealth_index, 0);
        assert_approx(solved.initial_value, 0.0);
    }

    #[test]
    fn two_period_deterministic_scenario_with_contribution() {
        let mut inputs = deterministic_two_period_inputs();
        inputs.monthly_contribution = 50_000.0;
        let solved = solve(&inputs).expect("must solve");
        // One contribution moves each level up one bucket per month:
        // 0 -> 50k -> 100k reaches the goal in two periods.
        assert_eq!(solved.value[1], vec![0.0, 1.0, 1.0]);
        assert_eq!(solved.value[0], vec![1.0, 1.0, 1.0]);
        assert_approx(solved.initial_value, 1.0);
    }

    #[test]
    fn singleton_allocation_set_forces_constant_policy() {
        let mut inputs = base_inputs();
        inputs.allocation_min = 0.7;
        inputs.allocation_max = 0.7;
        inputs.allocation_steps = 1;
        let solved = solve(&inputs).expect("must solve");
        assert_eq!(solved.allocations, vec![0.7]);
        for row in &solved.policy {
            for &cell in row {
                assert_approx(cell, 0.7);
            }
        }
    }

    #[test]
    fn ties_resolve_to_lowest_equity_fraction() {
        // Identical assets and zero volatility: every allocation gives
        // the same deterministic transition, so the argmax must keep
        // the first (lowest) candidate.
        let mut inputs = base_inputs();
        inputs.equity_mean = 0.005;
        inputs.debt_mean = 0.005;
        inputs.equity_vol = 0.0;
        inputs.debt_vol = 0.0;
        let solved = solve(&inputs).expect("must solve");
        for row in &solved.policy {
            for &cell in row {
                assert_approx(cell, 0.0);
            }
        }
    }

    #[test]
    fn solve_is_bit_identical_across_runs() {
        for expectation in [ExpectationMode::Analytic, ExpectationMode::MonteCarlo] {
            let mut inputs = base_inputs();
            inputs.expectation = expectation;
            inputs.transition_samples = 8;
            inputs.wealth_levels = 20;
            inputs.horizon_months = 6;
            let first = solve(&inputs).expect("must solve");
            let second = solve(&inputs).expect("must solve");
            assert_eq!(first.value, second.value);
            assert_eq!(first.policy, second.policy);
        }
    }

    #[test]
    fn policy_cells_come_from_candidate_set() {
        let mut inputs = base_inputs();
        inputs.wealth_levels = 15;
        inputs.horizon_months = 4;
        let solved = solve(&inputs).expect("must solve");
        for row in &solved.policy {
            for cell in row {
                assert!(solved.allocations.iter().any(|a| (a - cell).abs() <= EPS));
            }
        }
    }

    #[test]
    fn probability_values_stay_in_unit_interval() {
        let mut inputs = base_inputs();
        inputs.wealth_levels = 25;
        inputs.horizon_months = 8;
        let solved = solve(&inputs).expect("must solve");
        for row in &solved.value {
            for &cell in row {
                assert!((-EPS..=1.0 + EPS).contains(&cell));
            }
        }
    }

    #[test]
    fn allocation_report_matches_policy_shape() {
        let mut inputs = base_inputs();
        inputs.wealth_levels = 10;
        inputs.horizon_months = 3;
        let solved = solve(&inputs).expect("must solve");
        let report = solved.allocation_report();
        assert_eq!(report.len(), 3 * 10);
        for point in &report {
            assert_approx(point.equity + point.debt, 1.0);
        }
    }

    #[test]
    fn rejects_invalid_configuration_before_solving() {
        let cases: Vec<(Box<dyn Fn(&mut Inputs)>, &str)> = vec![
            (Box::new(|i| i.horizon_months = 0), "horizon_months"),
            (Box::new(|i| i.wealth_levels = 1), "wealth_levels"),
            (Box::new(|i| i.wealth_max = 0.0), "wealth_max"),
            (Box::new(|i| i.wealth_max = 100_000.0), "wealth_max"),
            (Box::new(|i| i.goal_amount = -1.0), "goal_amount"),
            (Box::new(|i| i.initial_wealth = -1.0), "initial_wealth"),
            (Box::new(|i| i.monthly_contribution = -1.0), "monthly_contribution"),
            (Box::new(|i| i.equity_vol = -0.1), "equity_vol"),
            (Box::new(|i| i.correlation = 1.5), "correlation"),
            (Box::new(|i| i.allocation_min = 0.9), "allocation_min"),
            (Box::new(|i| i.allocation_steps = 0), "allocation_steps"),
        ];
        for (mutate, field) in cases {
            let mut inputs = base_inputs();
            inputs.allocation_max = 0.8;
            mutate(&mut inputs);
            let err = solve(&inputs).expect_err("must reject");
            assert!(err.contains(field), "error {err:?} should mention {field}");
        }
    }

    #[test]
    fn norm_cdf_matches_reference_points() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.0) - 0.841_344_746).abs() < 1e-6);
        assert!((norm_cdf(-1.0) - 0.158_655_254).abs() < 1e-6);
        assert!(norm_cdf(8.0) > 0.999_999);
        assert!(norm_cdf(-8.0) < 1e-6);
    }

    #[test]
    fn analytic_bucket_probabilities_sum_against_constant_row() {
        // With a constant next row the expectation must reproduce it
        // exactly, regardless of the transition parameters.
        let levels = wealth_grid(100_000.0, 8);
        let next = vec![0.25; 8];
        let expected = analytic_expectation(&levels, &next, 40_000.0, 0.002, 0.04);
        assert!((expected - 0.25).abs() < 1e-9);
    }

    #[test]
    fn monte_carlo_single_sample_mirrors_legacy_single_draw() {
        let mut inputs = base_inputs();
        inputs.expectation = ExpectationMode::MonteCarlo;
        inputs.transition_samples = 1;
        inputs.wealth_levels = 12;
        inputs.horizon_months = 5;
        let solved = solve(&inputs).expect("must solve");
        for row in &solved.value {
            for &cell in row {
                assert!((0.0..=1.0).contains(&cell));
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_analytic_value_rows_are_monotone_in_wealth(
            seed in 0u64..1_000,
            horizon in 1u32..10,
            levels in 3usize..30,
            equity_mean_bp in -100i32..200,
            debt_mean_bp in -50i32..100,
            equity_vol_bp in 0u32..800,
            debt_vol_bp in 0u32..300,
            correlation_pct in -100i32..101,
            contribution in 0u32..5_000,
        ) {
            let mut inputs = base_inputs();
            inputs.seed = seed;
            inputs.horizon_months = horizon;
            inputs.wealth_levels = levels;
            inputs.equity_mean = equity_mean_bp as f64 / 10_000.0;
            inputs.debt_mean = debt_mean_bp as f64 / 10_000.0;
            inputs.equity_vol = equity_vol_bp as f64 / 10_000.0;
            inputs.debt_vol = debt_vol_bp as f64 / 10_000.0;
            inputs.correlation = correlation_pct as f64 / 100.0;
            inputs.monthly_contribution = contribution as f64;

            let solved = solve(&inputs).expect("must solve");
            for row in &solved.value {
                for pair in row.windows(2) {
                    prop_assert!(pair[1] >= pair[0] - 1e-7);
                }
            }
        }
    }
}
