use std::f64::consts::PI;

use super::solver::{portfolio_moments, snap_index, validate_inputs};
use super::types::{Inputs, PolicySimulation, SolveResult};

/// Replays the solved policy forward with fresh market draws: each
/// month the path snaps its wealth onto the grid, reads the policy
/// cell, and applies one lognormal step. Measures how often the
/// terminal wealth actually reaches the goal, as a check on the
/// grid-approximated value table.
pub fn simulate_policy(
    inputs: &Inputs,
    solved: &SolveResult,
    scenarios: u32,
) -> Result<PolicySimulation, String> {
    validate_inputs(inputs)?;
    if scenarios < 1 {
        return Err("scenarios must be >= 1".to_string());
    }
    if solved.policy.len() != inputs.horizon_months as usize {
        return Err("policy table does not match horizon_months".to_string());
    }

    let months = inputs.horizon_months as usize;
    let mut successes = 0u32;
    let mut terminal_wealth = Vec::with_capacity(scenarios as usize);
    let mut monthly_wealth: Vec<Vec<f64>> = (0..=months)
        .map(|_| Vec::with_capacity(scenarios as usize))
        .collect();

    for scenario in 0..scenarios {
        // The solver derives its seeds from lanes 0..horizon_months,
        // so the horizon itself is a free lane for simulation.
        let mut rng = Rng::new(derive_seed(inputs.seed, inputs.horizon_months, scenario));
        let mut wealth = inputs.initial_wealth;
        monthly_wealth[0].push(wealth);

        for t in 0..months {
            let cell = snap_index(&solved.wealth_levels, wealth);
            let allocation = solved.policy[t][cell];
            let (mean, vol) = portfolio_moments(inputs, allocation);
            let drift = mean - 0.5 * vol * vol;
            let base = wealth + inputs.monthly_contribution;
            wealth = if base <= 0.0 {
                0.0
            } else if vol == 0.0 {
                base * drift.exp()
            } else {
                base * (drift + vol * rng.standard_normal()).exp()
            };
            monthly_wealth[t + 1].push(wealth);
        }

        if wealth >= inputs.goal_amount {
            successes += 1;
        }
        terminal_wealth.push(wealth);
    }

    let median_wealth_path = monthly_wealth
        .iter_mut()
        .map(|month| percentile(month, 50.0))
        .collect();

    Ok(PolicySimulation {
        scenarios,
        success_rate: successes as f64 / scenarios as f64,
        terminal_p10: percentile(&mut terminal_wealth, 10.0),
        terminal_median: percentile(&mut terminal_wealth, 50.0),
        terminal_p90: percentile(&mut terminal_wealth, 90.0),
        median_wealth_path,
    })
}

pub(super) fn derive_seed(base_seed: u64, lane: u32, index: u32) -> u64 {
    let mixed = base_seed ^ ((lane as u64) << 32) ^ index as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

pub(super) struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    pub(super) fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    pub(super) fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}

pub(super) fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
